//! The register bank: every register group plus the controller's control-plane flags.
//!
//! Reads and writes arrive here already masked to a BAR offset and are dispatched through
//! [`crate::map::decode`]. Accesses to unmapped offsets read as zero and are dropped on write.

use bitflags::bitflags;

use crate::config::XhciBarConfig;
use crate::map::{self, PortId, Reg};
use crate::operational::OperationalRegs;
use crate::port::{PortBanks, PortPreset};
use crate::regs::{op, port};
use crate::runtime::{Interrupter, MicroframeTimer};

bitflags! {
    /// Controller-level transient flags.
    ///
    /// Only the request flags and `EVENT_RING_READY` are raised by register writes. The
    /// `*_IN_PROGRESS` flags are part of the state surface but nothing drives them yet; see
    /// [`TransitionTimers`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControllerFlags: u32 {
        const HALT_REQUESTED = 1 << 0;
        const RUN_REQUESTED = 1 << 1;
        const RESET_REQUESTED = 1 << 2;
        const EVENT_RING_READY = 1 << 3;
        const HALT_IN_PROGRESS = 1 << 8;
        const RUN_IN_PROGRESS = 1 << 9;
        const RESET_IN_PROGRESS = 1 << 10;
        const SAVE_IN_PROGRESS = 1 << 11;
        const RESTORE_IN_PROGRESS = 1 << 12;
    }
}

/// Countdown timers for the halt/run/reset/save/restore transitions.
///
/// They are reset to zero and never advanced: the timed transitions are not wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionTimers {
    pub halt: u32,
    pub run: u32,
    pub reset: u32,
    pub save: u32,
    pub restore: u32,
}

/// Complete register state of the emulated controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBank {
    pub(crate) op: OperationalRegs,
    pub(crate) ports: PortBanks,
    pub(crate) interrupter: Interrupter,
    pub(crate) mfindex: MicroframeTimer,
    pub(crate) doorbell: u32,
    pub(crate) flags: ControllerFlags,
    pub(crate) timers: TransitionTimers,
    pub(crate) irq_latch: bool,
    presets: [PortPreset; 2],
}

impl RegisterBank {
    /// Builds a bank in its reset state.
    ///
    /// `ticks_per_microframe` comes from [`XhciBarConfig::ticks_per_microframe`].
    pub fn new(config: &XhciBarConfig, ticks_per_microframe: u16) -> Self {
        let presets = [config.primary_port, config.secondary_port];
        Self {
            op: OperationalRegs::default(),
            ports: PortBanks::new(&presets[0], &presets[1]),
            interrupter: Interrupter::default(),
            mfindex: MicroframeTimer::new(ticks_per_microframe),
            doorbell: 0,
            flags: ControllerFlags::empty(),
            timers: TransitionTimers::default(),
            irq_latch: false,
            presets,
        }
    }

    /// Returns every register, counter and flag to its reset value.
    pub fn reset(&mut self) {
        self.op = OperationalRegs::default();
        self.ports = PortBanks::new(&self.presets[0], &self.presets[1]);
        self.interrupter = Interrupter::default();
        self.mfindex = MicroframeTimer::new(self.mfindex.ticks_per_microframe());
        self.doorbell = 0;
        self.flags = ControllerFlags::empty();
        self.timers = TransitionTimers::default();
        self.irq_latch = false;
    }

    pub fn read(&self, offset: u32) -> u32 {
        let Some(reg) = map::decode(offset) else {
            return 0;
        };
        let value = match reg {
            Reg::Capability(value) => value,
            Reg::UsbCmd => self.op.usbcmd,
            Reg::UsbSts => self.op.usbsts,
            Reg::PageSize => op::PAGESIZE_4K,
            Reg::DnCtrl => self.op.dnctrl,
            Reg::CrcrLo => self.op.command_ring.crcr_lo(),
            Reg::CrcrHi => self.op.command_ring.crcr_hi(),
            Reg::DcbaapLo => self.op.dcbaap_lo,
            Reg::DcbaapHi => self.op.dcbaap_hi,
            Reg::Config => self.op.config,
            Reg::CommandDoorbell => self.doorbell,
            Reg::Port(id, reg) => self.ports.get(id).read(reg),
            Reg::MfIndex => self.mfindex.mfindex(),
            Reg::Iman => self.interrupter.iman,
            Reg::Imod => self.interrupter.imod,
            Reg::Erstsz => self.interrupter.erstsz,
            Reg::ErstbaLo => self.interrupter.erstba_lo,
            Reg::ErstbaHi => self.interrupter.erstba_hi,
            Reg::ErdpLo => self.interrupter.erdp_lo,
            Reg::ErdpHi => self.interrupter.erdp_hi,
        };
        tracing::trace!("read {offset:#05x} -> {value:#010x}");
        value
    }

    pub fn write(&mut self, offset: u32, value: u32) {
        let Some(reg) = map::decode(offset) else {
            tracing::trace!("write {offset:#05x} <- {value:#010x} dropped (unmapped)");
            return;
        };
        tracing::trace!(?reg, "write {offset:#05x} <- {value:#010x}");

        match reg {
            Reg::Capability(_) | Reg::PageSize | Reg::MfIndex => {}
            Reg::UsbCmd => {
                let fx = self.op.write_usbcmd(value);
                if fx.run_requested {
                    tracing::debug!("run requested");
                    self.flags.insert(ControllerFlags::RUN_REQUESTED);
                }
                if fx.halt_requested {
                    tracing::debug!("halt requested");
                    self.flags.insert(ControllerFlags::HALT_REQUESTED);
                }
                if fx.reset_requested {
                    tracing::debug!("host controller reset requested");
                    self.flags.insert(ControllerFlags::RESET_REQUESTED);
                }
            }
            Reg::UsbSts => self.op.write_usbsts(value),
            Reg::DnCtrl => self.op.dnctrl = value,
            Reg::CrcrLo => self.op.command_ring.write_lo(value),
            Reg::CrcrHi => self.op.command_ring.write_hi(value),
            Reg::DcbaapLo => self.op.dcbaap_lo = value,
            Reg::DcbaapHi => self.op.dcbaap_hi = value,
            Reg::Config => self.op.config = value,
            Reg::CommandDoorbell => {
                self.doorbell = value;
                self.op.command_ring.ring_doorbell();
            }
            Reg::Port(id, reg) => self.ports.get_mut(id).write(reg, value),
            Reg::Iman => {
                if self.interrupter.write_iman(value).event_ring_ready {
                    self.flags.insert(ControllerFlags::EVENT_RING_READY);
                }
            }
            Reg::Imod => self.interrupter.imod = value,
            Reg::Erstsz => self.interrupter.erstsz = value,
            Reg::ErstbaLo => self.interrupter.erstba_lo = value,
            Reg::ErstbaHi => self.interrupter.erstba_hi = value,
            Reg::ErdpLo => self.interrupter.write_erdp_lo(value),
            Reg::ErdpHi => self.interrupter.erdp_hi = value,
        }
    }

    /// Per-tick housekeeping: advance MFINDEX and latch the interrupt request.
    pub fn tick(&mut self) {
        self.mfindex.tick();
        self.irq_latch = self.interrupt_condition();
    }

    /// IP && IE && INTE.
    fn interrupt_condition(&self) -> bool {
        self.interrupter.interrupt_pending()
            && self.interrupter.interrupt_enabled()
            && self.op.interrupts_enabled()
    }

    /// The event ring collaborator wrote an event TRB.
    pub fn raise_event(&mut self) {
        tracing::debug!("event posted on interrupter 0");
        self.interrupter.post_event();
        self.op.usbsts |= op::USBSTS_EINT;
    }

    /// The link collaborator saw a device attach on `id`.
    pub fn attach_port(&mut self, id: PortId, speed: u8) {
        tracing::debug!(?id, speed, "port attach");
        self.ports.get_mut(id).attach(speed);
        self.op.usbsts |= op::USBSTS_PCD;
    }

    /// The link collaborator saw a device detach on `id`.
    pub fn detach_port(&mut self, id: PortId) {
        tracing::debug!(?id, "port detach");
        self.ports.get_mut(id).detach();
        self.op.usbsts |= op::USBSTS_PCD;
    }

    pub fn irq_latched(&self) -> bool {
        self.irq_latch
    }

    pub fn flags(&self) -> ControllerFlags {
        self.flags
    }

    pub fn transition_timers(&self) -> TransitionTimers {
        self.timers
    }

    pub fn operational(&self) -> &OperationalRegs {
        &self.op
    }

    pub fn command_ring_running(&self) -> bool {
        self.op.command_ring.running()
    }

    pub fn interrupter(&self) -> &Interrupter {
        &self.interrupter
    }

    pub fn microframe_timer(&self) -> &MicroframeTimer {
        &self.mfindex
    }

    pub fn portsc(&self, id: PortId) -> u32 {
        self.ports.get(id).portsc
    }

    pub fn port_powered(&self, id: PortId) -> bool {
        self.ports.get(id).powered
    }

    /// True while software has a port reset pending on `id` (PR is never cleared internally).
    pub fn port_reset_pending(&self, id: PortId) -> bool {
        self.ports.get(id).portsc & port::PORTSC_PR != 0
    }
}
