//! Two-stage request pipeline in front of the register bank.
//!
//! A request presented on tick T is latched, dispatched on T+1 and executed on T+2, so read
//! responses come back on T+2 in issue order.

use crate::map;

/// Width of the opaque read correlation tag.
pub const READ_TAG_BITS: u32 = 88;
const READ_TAG_MASK: u128 = (1u128 << READ_TAG_BITS) - 1;

/// Opaque 88-bit correlation tag echoed back with a read response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReadTag(u128);

impl ReadTag {
    /// Bits above bit 87 are discarded.
    pub const fn new(raw: u128) -> Self {
        Self(raw & READ_TAG_MASK)
    }

    pub const fn get(self) -> u128 {
        self.0
    }
}

impl From<u64> for ReadTag {
    fn from(raw: u64) -> Self {
        Self::new(u128::from(raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub tag: ReadTag,
    pub address: u32,
}

/// A full-dword write.
///
/// `byte_enable` is carried through the pipeline but no register consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    pub address: u32,
    pub data: u32,
    pub byte_enable: u8,
}

impl WriteRequest {
    pub const ALL_BYTES: u8 = 0xf;

    pub fn new(address: u32, data: u32) -> Self {
        Self {
            address,
            data,
            byte_enable: Self::ALL_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResponse {
    pub tag: ReadTag,
    pub data: u32,
}

/// Everything sampled on one tick. `None` means the valid strobe is low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickInputs {
    pub reset: bool,
    pub read: Option<ReadRequest>,
    pub write: Option<WriteRequest>,
}

impl TickInputs {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn reset() -> Self {
        Self {
            reset: true,
            ..Self::default()
        }
    }

    pub fn read(tag: impl Into<ReadTag>, address: u32) -> Self {
        Self {
            read: Some(ReadRequest {
                tag: tag.into(),
                address,
            }),
            ..Self::default()
        }
    }

    pub fn write(address: u32, data: u32) -> Self {
        Self {
            write: Some(WriteRequest::new(address, data)),
            ..Self::default()
        }
    }
}

/// Everything driven on one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutputs {
    /// `Some` exactly on the tick a read response is valid.
    pub read_response: Option<ReadResponse>,
    /// Level of the interrupt request line.
    pub need_interrupt: bool,
}

/// Register bank operation selected by the dispatch stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankOp {
    Read { tag: ReadTag, offset: u32 },
    Write { offset: u32, data: u32, byte_enable: u8 },
}

impl BankOp {
    /// Resolves a latched read/write pair into at most one operation. A pending read always
    /// wins; the write presented alongside it is lost.
    pub fn select(read: Option<ReadRequest>, write: Option<WriteRequest>) -> Option<Self> {
        match (read, write) {
            (Some(read), dropped) => {
                if let Some(write) = dropped {
                    tracing::debug!(
                        "write {:#010x} <- {:#010x} dropped: read {:#010x} has priority",
                        write.address,
                        write.data,
                        read.address
                    );
                }
                Some(BankOp::Read {
                    tag: read.tag,
                    offset: map::bar_offset(read.address),
                })
            }
            (None, Some(write)) => Some(BankOp::Write {
                offset: map::bar_offset(write.address),
                data: write.data,
                byte_enable: write.byte_enable,
            }),
            (None, None) => None,
        }
    }
}

/// Input latch stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latched {
    pub read: Option<ReadRequest>,
    pub write: Option<WriteRequest>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestPipeline {
    pub(crate) latched: Latched,
    pub(crate) dispatched: Option<BankOp>,
}

impl RequestPipeline {
    /// Shifts the pipeline by one tick and returns the operation to execute this tick.
    pub fn advance(&mut self, inputs: &TickInputs) -> Option<BankOp> {
        let execute = self.dispatched.take();
        self.dispatched = BankOp::select(self.latched.read, self.latched.write);
        self.latched = Latched {
            read: inputs.read,
            write: inputs.write,
        };
        execute
    }

    /// Discards everything in flight.
    pub fn flush(&mut self) {
        *self = Self::default();
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}
