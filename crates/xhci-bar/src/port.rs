//! Root hub port register sets (PORTSC, PORTPMSC, PORTLI).

use serde::Deserialize;

use crate::map::{PortId, PortReg};
use crate::policy;
use crate::regs::{self, port};

/// Initial condition of a port after reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortPreset {
    /// Port power (PP) after reset.
    pub powered: bool,
    /// Whether a device is attached after reset.
    pub connected: bool,
    /// Protocol Speed ID of the attached device (1..=4).
    pub speed: u8,
}

impl PortPreset {
    /// Powered, SuperSpeed device attached and enabled.
    pub const fn usb3_attached() -> Self {
        Self {
            powered: true,
            connected: true,
            speed: regs::SPEED_SUPER,
        }
    }

    /// Powered, nothing attached.
    pub const fn usb2_empty() -> Self {
        Self {
            powered: true,
            connected: false,
            speed: regs::SPEED_HIGH,
        }
    }

    /// PORTSC value the port comes out of reset with.
    pub fn reset_portsc(&self) -> u32 {
        if !self.powered {
            return port::PLS_DISABLED << port::PORTSC_PLS_SHIFT;
        }
        if !self.connected {
            return port::PORTSC_PP | port::PLS_RX_DETECT << port::PORTSC_PLS_SHIFT;
        }
        connected_portsc(port::PORTSC_PP, self.speed)
    }
}

impl Default for PortPreset {
    fn default() -> Self {
        Self::usb2_empty()
    }
}

/// PORTSC for a freshly attached device, keeping only the bits of `base` that survive attach.
///
/// SuperSpeed links train straight into U0 and are enabled; USB2 ports sit in Polling until
/// software resets them.
fn connected_portsc(base: u32, speed: u8) -> u32 {
    let keep = base & (port::PORTSC_PP | port::PORTSC_PIC_MASK | port::PORTSC_WCE
        | port::PORTSC_WDE
        | port::PORTSC_WOE);
    let speed_bits = (u32::from(speed) << port::PORTSC_SPEED_SHIFT) & port::PORTSC_SPEED_MASK;
    let link = if speed >= regs::SPEED_SUPER {
        port::PORTSC_PED | port::PLS_U0 << port::PORTSC_PLS_SHIFT
    } else {
        port::PLS_POLLING << port::PORTSC_PLS_SHIFT
    };
    keep | port::PORTSC_CCS | port::PORTSC_CSC | speed_bits | link
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRegs {
    pub portsc: u32,
    pub portpmsc: u32,
    pub portli: u32,
    /// Software has written PP = 1 since reset.
    pub powered: bool,
}

impl PortRegs {
    pub fn new(preset: &PortPreset) -> Self {
        Self {
            portsc: preset.reset_portsc(),
            portpmsc: 0,
            portli: 0,
            powered: false,
        }
    }

    pub fn read(&self, reg: PortReg) -> u32 {
        match reg {
            PortReg::PortSc => self.portsc,
            PortReg::PortPmsc => self.portpmsc,
            PortReg::PortLi => self.portli,
        }
    }

    pub fn write(&mut self, reg: PortReg, value: u32) {
        match reg {
            PortReg::PortSc => {
                self.portsc = policy::PORTSC.apply(self.portsc, value);
                if value & port::PORTSC_PP != 0 {
                    self.powered = true;
                }
            }
            PortReg::PortPmsc => self.portpmsc = value,
            PortReg::PortLi => {}
        }
    }

    /// Physical attach reported by the link collaborator.
    pub fn attach(&mut self, speed: u8) {
        self.portsc = policy::PORTSC.settle(connected_portsc(self.portsc, speed) | self.change_bits());
    }

    /// Physical detach reported by the link collaborator.
    pub fn detach(&mut self) {
        let keep = self.portsc
            & (port::PORTSC_PP | port::PORTSC_PIC_MASK | port::PORTSC_WCE | port::PORTSC_WDE
                | port::PORTSC_WOE);
        let pls = if keep & port::PORTSC_PP != 0 {
            port::PLS_RX_DETECT
        } else {
            port::PLS_DISABLED
        };
        let mut changes = self.change_bits() | port::PORTSC_CSC;
        if self.portsc & port::PORTSC_PED != 0 {
            changes |= port::PORTSC_PEC;
        }
        self.portsc = keep | changes | pls << port::PORTSC_PLS_SHIFT;
    }

    fn change_bits(&self) -> u32 {
        self.portsc & (port::PORTSC_CHANGE_BYTE & !port::PORTSC_LWS)
    }
}

/// Both port register sets. The secondary set is reachable through four aliases, but there is
/// only ever one copy of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBanks {
    ports: [PortRegs; 2],
}

impl PortBanks {
    pub fn new(primary: &PortPreset, secondary: &PortPreset) -> Self {
        Self {
            ports: [PortRegs::new(primary), PortRegs::new(secondary)],
        }
    }

    pub fn get(&self, id: PortId) -> &PortRegs {
        &self.ports[id.index()]
    }

    pub fn get_mut(&mut self, id: PortId) -> &mut PortRegs {
        &mut self.ports[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_produce_expected_reset_values() {
        let usb3 = PortPreset::usb3_attached().reset_portsc();
        assert_eq!(
            usb3,
            port::PORTSC_CCS
                | port::PORTSC_PED
                | port::PORTSC_PP
                | (4 << port::PORTSC_SPEED_SHIFT)
                | port::PORTSC_CSC
        );

        let usb2 = PortPreset::usb2_empty().reset_portsc();
        assert_eq!(usb2, port::PORTSC_PP | (5 << port::PORTSC_PLS_SHIFT));
    }

    #[test]
    fn change_bits_are_rw1c() {
        let mut p = PortRegs::new(&PortPreset::usb3_attached());
        p.write(PortReg::PortSc, port::PORTSC_PP);
        assert_ne!(p.portsc & port::PORTSC_CSC, 0, "writing 0 leaves CSC set");

        p.write(PortReg::PortSc, port::PORTSC_PP | port::PORTSC_CSC);
        assert_eq!(p.portsc & port::PORTSC_CSC, 0);
        assert_ne!(p.portsc & port::PORTSC_CCS, 0, "CCS is read-only");
    }

    #[test]
    fn port_reset_is_rw1s() {
        let mut p = PortRegs::new(&PortPreset::usb2_empty());
        p.write(PortReg::PortSc, port::PORTSC_PP | port::PORTSC_PR);
        assert_ne!(p.portsc & port::PORTSC_PR, 0);
        p.write(PortReg::PortSc, port::PORTSC_PP);
        assert_ne!(p.portsc & port::PORTSC_PR, 0, "PR cannot be cleared by software");
    }

    #[test]
    fn port_power_write_raises_powered_flag() {
        let mut p = PortRegs::new(&PortPreset::usb2_empty());
        assert!(!p.powered);
        p.write(PortReg::PortSc, 0);
        assert!(!p.powered);
        assert_eq!(p.portsc & port::PORTSC_PP, 0, "PP is plain read-write");
        p.write(PortReg::PortSc, port::PORTSC_PP);
        assert!(p.powered);
    }

    #[test]
    fn portli_is_read_only() {
        let mut p = PortRegs::new(&PortPreset::usb2_empty());
        p.write(PortReg::PortLi, 0xffff_ffff);
        assert_eq!(p.read(PortReg::PortLi), 0);
        p.write(PortReg::PortPmsc, 0x1234);
        assert_eq!(p.read(PortReg::PortPmsc), 0x1234);
    }

    #[test]
    fn attach_and_detach_set_connect_change() {
        let mut p = PortRegs::new(&PortPreset::usb2_empty());
        p.attach(regs::SPEED_HIGH);
        assert_ne!(p.portsc & port::PORTSC_CCS, 0);
        assert_ne!(p.portsc & port::PORTSC_CSC, 0);
        assert_eq!(
            (p.portsc & port::PORTSC_SPEED_MASK) >> port::PORTSC_SPEED_SHIFT,
            u32::from(regs::SPEED_HIGH)
        );
        assert_eq!(p.portsc & port::PORTSC_PED, 0, "USB2 ports need a reset to enable");

        p.write(PortReg::PortSc, port::PORTSC_PP | port::PORTSC_CSC);
        p.detach();
        assert_eq!(p.portsc & port::PORTSC_CCS, 0);
        assert_ne!(p.portsc & port::PORTSC_CSC, 0);
        assert_eq!(
            (p.portsc & port::PORTSC_PLS_MASK) >> port::PORTSC_PLS_SHIFT,
            port::PLS_RX_DETECT
        );
    }
}
