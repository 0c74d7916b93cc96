//! Operational register bank: USBCMD, USBSTS, DNCTRL, CRCR, DCBAAP, CONFIG.

use crate::policy;
use crate::regs::op;

/// Side effects of a USBCMD write that the controller layer must record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsbCmdEffects {
    /// Run/Stop went 0 -> 1.
    pub run_requested: bool,
    /// Run/Stop went 1 -> 0.
    pub halt_requested: bool,
    /// HCRST was written as 1.
    pub reset_requested: bool,
}

/// Command ring control: the running flag plus the 64-bit CRCR image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandRing {
    running: bool,
    crcr_lo: u32,
    crcr_hi: u32,
}

impl CommandRing {
    pub fn running(&self) -> bool {
        self.running
    }

    pub fn crcr_lo(&self) -> u32 {
        self.crcr_lo
    }

    pub fn crcr_hi(&self) -> u32 {
        self.crcr_hi
    }

    /// 64-bit CRCR value as last programmed (pointer, RCS and CRR).
    pub fn crcr(&self) -> u64 {
        u64::from(self.crcr_hi) << 32 | u64::from(self.crcr_lo)
    }

    /// CRCR low dword write.
    ///
    /// CS/CA (bits 1, 2) stop the ring and win over CRR (bit 3) written in the same dword.
    pub fn write_lo(&mut self, value: u32) {
        let stop = value & (op::CRCR_CS | op::CRCR_CA) != 0;
        let start = value & op::CRCR_CRR != 0;

        self.crcr_lo = policy::CRCR_LO.apply(self.crcr_lo, value);
        if stop {
            if self.running {
                tracing::debug!(abort = value & op::CRCR_CA != 0, "command ring stopped");
            }
            self.set_running(false);
        } else if start {
            tracing::debug!("command ring started via CRCR");
            self.set_running(true);
        }
    }

    pub fn write_hi(&mut self, value: u32) {
        self.crcr_hi = value;
    }

    /// Command doorbell: the ring runs regardless of the written value.
    pub fn ring_doorbell(&mut self) {
        if !self.running {
            tracing::debug!("command ring started via doorbell");
        }
        self.set_running(true);
    }

    fn set_running(&mut self, running: bool) {
        self.running = running;
        if running {
            self.crcr_lo |= op::CRCR_CRR;
        } else {
            self.crcr_lo &= !op::CRCR_CRR;
        }
    }

    pub(crate) fn restore(running: bool, crcr_lo: u32, crcr_hi: u32) -> Self {
        let mut ring = Self {
            running,
            crcr_lo: policy::CRCR_LO.settle(crcr_lo),
            crcr_hi,
        };
        ring.set_running(running);
        ring
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationalRegs {
    pub usbcmd: u32,
    pub usbsts: u32,
    pub dnctrl: u32,
    pub command_ring: CommandRing,
    pub dcbaap_lo: u32,
    pub dcbaap_hi: u32,
    pub config: u32,
}

impl Default for OperationalRegs {
    fn default() -> Self {
        Self {
            usbcmd: 0,
            usbsts: op::USBSTS_HCH,
            dnctrl: 0,
            command_ring: CommandRing::default(),
            dcbaap_lo: 0,
            dcbaap_hi: 0,
            config: 0,
        }
    }
}

impl OperationalRegs {
    pub fn write_usbcmd(&mut self, value: u32) -> UsbCmdEffects {
        let was_running = self.usbcmd & op::USBCMD_RUN_STOP != 0;
        self.usbcmd = policy::USBCMD.apply(self.usbcmd, value);
        let is_running = self.usbcmd & op::USBCMD_RUN_STOP != 0;

        let effects = UsbCmdEffects {
            run_requested: !was_running && is_running,
            halt_requested: was_running && !is_running,
            reset_requested: value & op::USBCMD_HCRST != 0,
        };
        if effects.reset_requested {
            self.usbsts |= op::USBSTS_CNR;
        }
        effects
    }

    pub fn write_usbsts(&mut self, value: u32) {
        self.usbsts = policy::USBSTS.apply(self.usbsts, value);
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.usbcmd & op::USBCMD_INTE != 0
    }

    pub fn dcbaap(&self) -> u64 {
        u64::from(self.dcbaap_hi) << 32 | u64::from(self.dcbaap_lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_value_is_halted() {
        let regs = OperationalRegs::default();
        assert_eq!(regs.usbsts, op::USBSTS_HCH);
        assert_eq!(regs.usbcmd, 0);
        assert!(!regs.command_ring.running());
    }

    #[test]
    fn run_stop_edges_raise_requests() {
        let mut regs = OperationalRegs::default();

        let fx = regs.write_usbcmd(op::USBCMD_RUN_STOP);
        assert!(fx.run_requested && !fx.halt_requested);

        let fx = regs.write_usbcmd(op::USBCMD_RUN_STOP | op::USBCMD_INTE);
        assert_eq!(fx, UsbCmdEffects::default(), "no edge, no request");

        let fx = regs.write_usbcmd(0);
        assert!(fx.halt_requested && !fx.run_requested);
    }

    #[test]
    fn hcrst_sets_controller_not_ready() {
        let mut regs = OperationalRegs::default();
        let fx = regs.write_usbcmd(op::USBCMD_HCRST | (0b11 << 8));
        assert!(fx.reset_requested);
        assert_eq!(regs.usbcmd, op::USBCMD_HCRST, "CSS/CRS are masked");
        assert_ne!(regs.usbsts & op::USBSTS_CNR, 0);

        // CNR is controller-owned.
        regs.write_usbsts(u32::MAX);
        assert_ne!(regs.usbsts & op::USBSTS_CNR, 0);
    }

    #[test]
    fn crcr_stop_wins_over_start_in_same_write() {
        let mut ring = CommandRing::default();
        ring.write_lo(op::CRCR_CRR);
        assert!(ring.running());
        assert_eq!(ring.crcr_lo() & op::CRCR_CRR, op::CRCR_CRR);

        ring.write_lo(op::CRCR_CRR | op::CRCR_CS);
        assert!(!ring.running());
        assert_eq!(ring.crcr_lo() & op::CRCR_CRR, 0);
    }

    #[test]
    fn crcr_pointer_and_rcs_are_stored_but_cs_ca_are_not() {
        let mut ring = CommandRing::default();
        ring.write_lo(0xdead_bee0 | op::CRCR_RCS);
        assert_eq!(ring.crcr_lo(), 0xdead_bec1);
        ring.write_lo(op::CRCR_CA | 0x30);
        assert_eq!(ring.crcr_lo(), 0);
        ring.write_hi(0x1234_5678);
        assert_eq!(ring.crcr(), 0x1234_5678_0000_0000);
    }

    #[test]
    fn doorbell_starts_ring_and_sets_crr() {
        let mut ring = CommandRing::default();
        ring.ring_doorbell();
        assert!(ring.running());
        assert_eq!(ring.crcr_lo(), op::CRCR_CRR);
    }
}
