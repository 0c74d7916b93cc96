//! Cycle-level emulation of an xHCI host controller's BAR register window.
//!
//! The engine models the MMIO-facing half of a controller: capability, operational, doorbell,
//! port and runtime registers behind a two-stage request pipeline, driven one clock tick at a
//! time. Transfer scheduling, DMA and the event ring itself live elsewhere and talk to the
//! engine through the collaborator hooks on [`XhciBar`].
//!
//! ```
//! use xhci_bar::{BlockingBar, XhciBar, XhciBarConfig};
//!
//! let mut bar = XhciBar::new(XhciBarConfig::default()).unwrap();
//! let mut mmio = BlockingBar::new(&mut bar);
//! assert_eq!(mmio.read_u32(0x00), 0x0100_0020);
//! ```

#![forbid(unsafe_code)]

pub mod blocking;
pub mod config;
pub mod controller;
pub mod engine;
pub mod map;
pub mod operational;
pub mod pipeline;
pub mod policy;
pub mod port;
pub mod regs;
pub mod runtime;
pub mod snapshot;

pub use blocking::BlockingBar;
pub use config::{ConfigError, XhciBarConfig};
pub use controller::{ControllerFlags, RegisterBank, TransitionTimers};
pub use engine::XhciBar;
pub use map::PortId;
pub use pipeline::{ReadRequest, ReadResponse, ReadTag, TickInputs, TickOutputs, WriteRequest};
pub use port::PortPreset;
pub use snapshot::{IoSnapshot, SnapshotError, SnapshotVersion};
