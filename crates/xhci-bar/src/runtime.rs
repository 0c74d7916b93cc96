//! Runtime registers: MFINDEX and interrupter 0.

use crate::policy;
use crate::regs::runtime;

/// Free-running microframe index.
///
/// A 13-bit sub-counter counts clock ticks; every `ticks_per_microframe` ticks (125 us at the
/// configured clock) the 14-bit index advances by one and wraps at 16384.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroframeTimer {
    ticks_per_microframe: u16,
    sub_counter: u16,
    index: u16,
}

impl MicroframeTimer {
    /// Largest period the 13-bit sub-counter can represent.
    pub const MAX_TICKS_PER_MICROFRAME: u32 = 1 << 13;

    /// `ticks_per_microframe` must be in `1..=MAX_TICKS_PER_MICROFRAME`; the config layer
    /// validates this before a bank is built.
    pub fn new(ticks_per_microframe: u16) -> Self {
        debug_assert!(
            ticks_per_microframe >= 1
                && u32::from(ticks_per_microframe) <= Self::MAX_TICKS_PER_MICROFRAME
        );
        Self {
            ticks_per_microframe: ticks_per_microframe.max(1),
            sub_counter: 0,
            index: 0,
        }
    }

    pub fn tick(&mut self) {
        self.sub_counter += 1;
        if self.sub_counter >= self.ticks_per_microframe {
            self.sub_counter = 0;
            self.index = (self.index + 1) & runtime::MFINDEX_MASK as u16;
        }
    }

    /// MFINDEX register value (index zero-extended to 32 bits).
    pub fn mfindex(&self) -> u32 {
        u32::from(self.index)
    }

    pub fn sub_counter(&self) -> u16 {
        self.sub_counter
    }

    pub fn ticks_per_microframe(&self) -> u16 {
        self.ticks_per_microframe
    }

    pub(crate) fn restore(&mut self, sub_counter: u16, index: u16) {
        self.sub_counter = sub_counter.min(self.ticks_per_microframe - 1);
        self.index = index & runtime::MFINDEX_MASK as u16;
    }
}

/// Side effects of an IMAN write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImanEffects {
    pub event_ring_ready: bool,
}

/// Interrupter 0 register block.
///
/// IMOD is stored only; interrupt moderation timing is left to the interrupt delivery
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupter {
    pub iman: u32,
    pub imod: u32,
    pub erstsz: u32,
    pub erstba_lo: u32,
    pub erstba_hi: u32,
    pub erdp_lo: u32,
    pub erdp_hi: u32,
}

impl Default for Interrupter {
    fn default() -> Self {
        Self {
            iman: 0,
            imod: runtime::IMOD_RESET,
            erstsz: 0,
            erstba_lo: 0,
            erstba_hi: 0,
            erdp_lo: 0,
            erdp_hi: 0,
        }
    }
}

impl Interrupter {
    pub fn write_iman(&mut self, value: u32) -> ImanEffects {
        self.iman = policy::IMAN.apply(self.iman, value);
        ImanEffects {
            event_ring_ready: value & runtime::IMAN_IE != 0,
        }
    }

    pub fn write_erdp_lo(&mut self, value: u32) {
        self.erdp_lo = policy::ERDP_LO.apply(self.erdp_lo, value);
    }

    /// The event ring collaborator produced an event: set IP and EHB.
    pub fn post_event(&mut self) {
        self.iman |= runtime::IMAN_IP;
        self.erdp_lo |= runtime::ERDP_EHB;
    }

    pub fn interrupt_pending(&self) -> bool {
        self.iman & runtime::IMAN_IP != 0
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.iman & runtime::IMAN_IE != 0
    }

    pub fn erstba(&self) -> u64 {
        u64::from(self.erstba_hi) << 32 | u64::from(self.erstba_lo)
    }

    pub fn erdp(&self) -> u64 {
        u64::from(self.erdp_hi) << 32 | u64::from(self.erdp_lo)
    }
}
