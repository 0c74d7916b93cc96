//! Synchronous MMIO-style access on top of the clocked engine.

use crate::engine::XhciBar;
use crate::pipeline::{ReadTag, TickInputs, TickOutputs};

/// Upper bound on idle ticks spent waiting for a response. The pipeline is two stages deep, so
/// anything past this means the engine was reset underneath us.
const MAX_DRAIN_TICKS: usize = 4;

/// Drives an [`XhciBar`] one request at a time, ticking until each completes.
///
/// Every access costs three ticks, so MFINDEX keeps advancing as it would on hardware.
pub struct BlockingBar<'a> {
    bar: &'a mut XhciBar,
    next_tag: u64,
    need_interrupt: bool,
}

impl<'a> BlockingBar<'a> {
    pub fn new(bar: &'a mut XhciBar) -> Self {
        Self {
            need_interrupt: bar.need_interrupt(),
            bar,
            next_tag: 0,
        }
    }

    /// Interrupt line level as of the last tick driven through this handle.
    pub fn need_interrupt(&self) -> bool {
        self.need_interrupt
    }

    pub fn read_u32(&mut self, address: u32) -> u32 {
        let tag = ReadTag::from(self.next_tag);
        self.next_tag = self.next_tag.wrapping_add(1);

        self.step(TickInputs::read(tag, address));
        for _ in 0..MAX_DRAIN_TICKS {
            if let Some(resp) = self.step(TickInputs::idle()).read_response {
                debug_assert_eq!(resp.tag, tag);
                return resp.data;
            }
        }
        tracing::warn!("read {address:#010x} never completed");
        0
    }

    pub fn write_u32(&mut self, address: u32, data: u32) {
        self.step(TickInputs::write(address, data));
        self.drain();
    }

    /// Ticks with idle inputs until nothing is in flight.
    pub fn drain(&mut self) {
        for _ in 0..MAX_DRAIN_TICKS {
            if self.bar.pipeline_idle() {
                return;
            }
            self.step(TickInputs::idle());
        }
    }

    /// Runs `n` idle ticks.
    pub fn idle(&mut self, n: usize) {
        for _ in 0..n {
            self.step(TickInputs::idle());
        }
    }

    fn step(&mut self, inputs: TickInputs) -> TickOutputs {
        let out = self.bar.tick(inputs);
        self.need_interrupt = out.need_interrupt;
        out
    }
}
