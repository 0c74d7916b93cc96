#![allow(dead_code)]

use xhci_bar::{BlockingBar, TickInputs, TickOutputs, XhciBar, XhciBarConfig};

/// Engine with a short microframe so MFINDEX tests don't spin thousands of ticks.
pub fn fast_bar(ticks_per_microframe: u16) -> XhciBar {
    XhciBar::new(XhciBarConfig::with_ticks_per_microframe(ticks_per_microframe))
        .expect("valid config")
}

pub fn default_bar() -> XhciBar {
    XhciBar::new(XhciBarConfig::default()).expect("default config")
}

pub fn read(bar: &mut XhciBar, address: u32) -> u32 {
    BlockingBar::new(bar).read_u32(address)
}

pub fn write(bar: &mut XhciBar, address: u32, data: u32) {
    BlockingBar::new(bar).write_u32(address, data);
}

/// Ticks `n` times with idle inputs and returns the last outputs.
pub fn idle(bar: &mut XhciBar, n: usize) -> TickOutputs {
    let mut out = TickOutputs::default();
    for _ in 0..n {
        out = bar.tick(TickInputs::idle());
    }
    out
}
