//! BAR offset decoding.
//!
//! Every dword offset in the window maps to at most one [`Reg`]. The register bank dispatches
//! on the decoded register rather than on raw offsets, so aliasing and policy lookup live in one
//! place.

use crate::policy::{self, FieldPolicy};
use crate::regs::{self, cap, op, port, runtime};

/// One of the two logical root hub ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortId {
    /// Port 1, USB3-capable, register set at 0x420.
    Primary,
    /// Port 2, USB2, register set aliased at 0x430/0x440/0x450/0x460.
    Secondary,
}

impl PortId {
    pub const ALL: [PortId; 2] = [PortId::Primary, PortId::Secondary];

    pub const fn index(self) -> usize {
        match self {
            PortId::Primary => 0,
            PortId::Secondary => 1,
        }
    }

    /// Register set base offsets through which this port is visible.
    pub fn bases(self) -> impl Iterator<Item = u32> {
        let (first, count) = match self {
            PortId::Primary => (port::PRIMARY_BASE, 1),
            PortId::Secondary => (port::SECONDARY_BASE, port::SECONDARY_ALIASES),
        };
        (0..count).map(move |i| first + i * port::STRIDE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortReg {
    PortSc,
    PortPmsc,
    PortLi,
}

/// A decoded register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    /// Fixed capability or extended capability dword.
    Capability(u32),
    UsbCmd,
    UsbSts,
    PageSize,
    DnCtrl,
    CrcrLo,
    CrcrHi,
    DcbaapLo,
    DcbaapHi,
    Config,
    CommandDoorbell,
    Port(PortId, PortReg),
    MfIndex,
    Iman,
    Imod,
    Erstsz,
    ErstbaLo,
    ErstbaHi,
    ErdpLo,
    ErdpHi,
}

impl Reg {
    /// Access policy applied to software writes.
    pub const fn policy(self) -> FieldPolicy {
        match self {
            Reg::Capability(_) | Reg::PageSize | Reg::MfIndex => FieldPolicy::READ_ONLY,
            Reg::Port(_, PortReg::PortLi) => FieldPolicy::READ_ONLY,
            Reg::UsbCmd => policy::USBCMD,
            Reg::UsbSts => policy::USBSTS,
            Reg::CrcrLo => policy::CRCR_LO,
            Reg::Port(_, PortReg::PortSc) => policy::PORTSC,
            Reg::Iman => policy::IMAN,
            Reg::ErdpLo => policy::ERDP_LO,
            Reg::DnCtrl
            | Reg::CrcrHi
            | Reg::DcbaapLo
            | Reg::DcbaapHi
            | Reg::Config
            | Reg::CommandDoorbell
            | Reg::Port(_, PortReg::PortPmsc)
            | Reg::Imod
            | Reg::Erstsz
            | Reg::ErstbaLo
            | Reg::ErstbaHi
            | Reg::ErdpHi => FieldPolicy::READ_WRITE,
        }
    }
}

/// Masks a request address down to the BAR offset that selects a register.
///
/// Only the low 12 bits are decoded and the two byte-lane bits are dropped; larger BARs alias
/// the 4 KiB window.
#[inline]
pub const fn bar_offset(address: u32) -> u32 {
    address & !0x3 & 0xfff
}

/// Fixed value of a capability-block dword, or `None` if `offset` is not a capability.
pub const fn capability_value(offset: u32) -> Option<u32> {
    let value = match offset {
        cap::CAPLENGTH_HCIVERSION => regs::CAPLENGTH_HCIVERSION,
        cap::HCSPARAMS1 => regs::HCSPARAMS1_VALUE,
        cap::HCSPARAMS2 => regs::HCSPARAMS2_VALUE,
        cap::HCSPARAMS3 => regs::HCSPARAMS3_VALUE,
        cap::HCCPARAMS1 => regs::HCCPARAMS1_VALUE,
        cap::DBOFF => regs::DBOFF_VALUE,
        cap::RTSOFF => regs::RTSOFF_VALUE,
        cap::HCCPARAMS2 => regs::HCCPARAMS2_VALUE,

        0x800 => regs::USB3_PROTOCOL_HEADER,
        0x804 => regs::PROTOCOL_NAME_USB,
        0x808 => regs::USB3_COMPATIBLE_PORTS,
        0x80c => 0,
        0x810 => regs::USB2_PROTOCOL_HEADER,
        0x814 => regs::PROTOCOL_NAME_USB,
        0x818 => regs::USB2_COMPATIBLE_PORTS,
        0x81c => 0,
        _ => return None,
    };
    Some(value)
}

fn decode_port(offset: u32) -> Option<Reg> {
    let (id, base) = PortId::ALL
        .into_iter()
        .flat_map(|id| id.bases().map(move |base| (id, base)))
        .find(|(_, base)| (*base..*base + port::STRIDE).contains(&offset))?;

    let reg = match offset - base {
        port::PORTSC => PortReg::PortSc,
        port::PORTPMSC => PortReg::PortPmsc,
        port::PORTLI => PortReg::PortLi,
        _ => return None,
    };
    Some(Reg::Port(id, reg))
}

/// Decodes a masked BAR offset (see [`bar_offset`]).
pub fn decode(offset: u32) -> Option<Reg> {
    if let Some(value) = capability_value(offset) {
        return Some(Reg::Capability(value));
    }

    let reg = match offset {
        op::USBCMD => Reg::UsbCmd,
        op::USBSTS => Reg::UsbSts,
        op::PAGESIZE => Reg::PageSize,
        op::DNCTRL => Reg::DnCtrl,
        op::CRCR_LO => Reg::CrcrLo,
        op::CRCR_HI => Reg::CrcrHi,
        op::DCBAAP_LO => Reg::DcbaapLo,
        op::DCBAAP_HI => Reg::DcbaapHi,
        op::CONFIG => Reg::Config,
        regs::doorbell::DB0 => Reg::CommandDoorbell,
        runtime::MFINDEX => Reg::MfIndex,
        runtime::IMAN => Reg::Iman,
        runtime::IMOD => Reg::Imod,
        runtime::ERSTSZ => Reg::Erstsz,
        runtime::ERSTBA_LO => Reg::ErstbaLo,
        runtime::ERSTBA_HI => Reg::ErstbaHi,
        runtime::ERDP_LO => Reg::ErdpLo,
        runtime::ERDP_HI => Reg::ErdpHi,
        _ => return decode_port(offset),
    };
    Some(reg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_offset_keeps_low_twelve_bits_dword_aligned() {
        assert_eq!(bar_offset(0x1234_5423), 0x420);
        assert_eq!(bar_offset(0xffff_ffff), 0xffc);
        assert_eq!(bar_offset(0x1000), 0);
    }

    #[test]
    fn secondary_port_aliases_decode_to_one_register_set() {
        for base in [0x430, 0x440, 0x450, 0x460] {
            assert_eq!(decode(base), Some(Reg::Port(PortId::Secondary, PortReg::PortSc)));
            assert_eq!(
                decode(base + 4),
                Some(Reg::Port(PortId::Secondary, PortReg::PortPmsc))
            );
            assert_eq!(decode(base + 8), Some(Reg::Port(PortId::Secondary, PortReg::PortLi)));
            assert_eq!(decode(base + 0xc), None);
        }
        assert_eq!(decode(0x420), Some(Reg::Port(PortId::Primary, PortReg::PortSc)));
        assert_eq!(decode(0x470), None);
        assert_eq!(decode(0x410), None);
    }

    #[test]
    fn gaps_in_the_map_decode_to_nothing() {
        for offset in [0x2c, 0x30, 0x40, 0x5c, 0x104, 0x604, 0x62c, 0x640, 0x820, 0xffc] {
            assert_eq!(decode(offset), None, "offset {offset:#x}");
        }
    }

    #[test]
    fn capability_dwords_are_read_only() {
        assert_eq!(decode(0), Some(Reg::Capability(0x0100_0020)));
        assert_eq!(Reg::Capability(0).policy(), FieldPolicy::READ_ONLY);
    }
}
