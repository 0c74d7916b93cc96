//! Deterministic snapshot encoding for the engine.
//!
//! The format is a small tag-length-value (TLV) encoding:
//! - deterministic byte output (fields are emitted in ascending tag order)
//! - forward compatibility (unknown tags are skipped, missing tags keep reset values)
//! - explicit versioning (major/minor) of both the container and the device payload
//!
//! Layout (little-endian): `magic[4] format_major:u16 format_minor:u16 device_id[4]
//! device_major:u16 device_minor:u16`, then repeated `tag:u16 len:u32 bytes[len]`.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::controller::{ControllerFlags, TransitionTimers};
use crate::engine::XhciBar;
use crate::map::PortId;
use crate::operational::CommandRing;
use crate::pipeline::{BankOp, Latched, ReadRequest, ReadTag, RequestPipeline, WriteRequest};
use crate::policy;

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"XSNP";
pub const SNAPSHOT_FORMAT_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

const HEADER_LEN: usize = 4 + 2 + 2 + 4 + 2 + 2;
const FIELD_HEADER_LEN: usize = 2 + 4;

pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("unexpected end of snapshot data")]
    UnexpectedEof,

    #[error("invalid snapshot magic")]
    InvalidMagic,

    #[error("unsupported snapshot format version {major}.{minor}")]
    UnsupportedFormatVersion { major: u16, minor: u16 },

    #[error("snapshot is for device {found:?}, expected {expected:?}")]
    DeviceIdMismatch { expected: [u8; 4], found: [u8; 4] },

    #[error("unsupported device major version {found} (expected {expected})")]
    UnsupportedDeviceMajorVersion { expected: u16, found: u16 },

    #[error("duplicate field tag {0}")]
    DuplicateFieldTag(u16),

    #[error("invalid field encoding: {0}")]
    InvalidFieldEncoding(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub major: u16,
    pub minor: u16,
}

impl SnapshotVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

/// Snapshotting contract for emulated devices.
///
/// `DEVICE_ID` must stay stable forever; new state is added as new TLV fields within the same
/// major version.
pub trait IoSnapshot {
    const DEVICE_ID: [u8; 4];
    const DEVICE_VERSION: SnapshotVersion;

    fn save_state(&self) -> Vec<u8>;
    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()>;
}

pub mod codec {
    use super::{SnapshotError, SnapshotResult};

    /// Builder for a single field's payload.
    #[derive(Debug, Default)]
    pub struct Encoder {
        buf: Vec<u8>,
    }

    impl Encoder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn u8(mut self, v: u8) -> Self {
            self.buf.push(v);
            self
        }

        pub fn bool(self, v: bool) -> Self {
            self.u8(v as u8)
        }

        pub fn u16(mut self, v: u16) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn u32(mut self, v: u32) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn u64(mut self, v: u64) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn u128(mut self, v: u128) -> Self {
            self.buf.extend_from_slice(&v.to_le_bytes());
            self
        }

        pub fn finish(self) -> Vec<u8> {
            self.buf
        }
    }

    /// Cursor over a single field's payload.
    #[derive(Debug)]
    pub struct Decoder<'a> {
        buf: &'a [u8],
    }

    impl<'a> Decoder<'a> {
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf }
        }

        pub fn is_empty(&self) -> bool {
            self.buf.is_empty()
        }

        pub fn bytes(&mut self, len: usize) -> SnapshotResult<&'a [u8]> {
            if self.buf.len() < len {
                return Err(SnapshotError::UnexpectedEof);
            }
            let (head, tail) = self.buf.split_at(len);
            self.buf = tail;
            Ok(head)
        }

        fn array<const N: usize>(&mut self) -> SnapshotResult<[u8; N]> {
            let mut out = [0u8; N];
            out.copy_from_slice(self.bytes(N)?);
            Ok(out)
        }

        pub fn u8(&mut self) -> SnapshotResult<u8> {
            Ok(self.array::<1>()?[0])
        }

        pub fn bool(&mut self) -> SnapshotResult<bool> {
            match self.u8()? {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(SnapshotError::InvalidFieldEncoding("bool")),
            }
        }

        pub fn u16(&mut self) -> SnapshotResult<u16> {
            Ok(u16::from_le_bytes(self.array()?))
        }

        pub fn u32(&mut self) -> SnapshotResult<u32> {
            Ok(u32::from_le_bytes(self.array()?))
        }

        pub fn u64(&mut self) -> SnapshotResult<u64> {
            Ok(u64::from_le_bytes(self.array()?))
        }

        pub fn u128(&mut self) -> SnapshotResult<u128> {
            Ok(u128::from_le_bytes(self.array()?))
        }

        /// Fails if any payload bytes were left unread.
        pub fn finish(self) -> SnapshotResult<()> {
            if self.buf.is_empty() {
                Ok(())
            } else {
                Err(SnapshotError::InvalidFieldEncoding("trailing bytes"))
            }
        }
    }
}

use codec::{Decoder, Encoder};

pub struct SnapshotWriter {
    device_id: [u8; 4],
    version: SnapshotVersion,
    fields: BTreeMap<u16, Vec<u8>>,
}

impl SnapshotWriter {
    pub fn new(device_id: [u8; 4], version: SnapshotVersion) -> Self {
        Self {
            device_id,
            version,
            fields: BTreeMap::new(),
        }
    }

    pub fn field_bytes(&mut self, tag: u16, bytes: Vec<u8>) {
        self.fields.insert(tag, bytes);
    }

    pub fn field_u32(&mut self, tag: u16, v: u32) {
        self.field_bytes(tag, v.to_le_bytes().to_vec());
    }

    pub fn field_u64(&mut self, tag: u16, v: u64) {
        self.field_bytes(tag, v.to_le_bytes().to_vec());
    }

    pub fn field_bool(&mut self, tag: u16, v: bool) {
        self.field_bytes(tag, vec![v as u8]);
    }

    pub fn finish(self) -> Vec<u8> {
        let payload: usize = self
            .fields
            .values()
            .map(|v| FIELD_HEADER_LEN + v.len())
            .sum();
        let mut out = Vec::with_capacity(HEADER_LEN + payload);
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.major.to_le_bytes());
        out.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.minor.to_le_bytes());
        out.extend_from_slice(&self.device_id);
        out.extend_from_slice(&self.version.major.to_le_bytes());
        out.extend_from_slice(&self.version.minor.to_le_bytes());
        for (tag, bytes) in self.fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        out
    }
}

pub struct SnapshotReader<'a> {
    device_version: SnapshotVersion,
    fields: BTreeMap<u16, &'a [u8]>,
}

impl<'a> SnapshotReader<'a> {
    pub fn parse(bytes: &'a [u8], expected_id: [u8; 4]) -> SnapshotResult<Self> {
        let mut d = Decoder::new(bytes);
        if d.bytes(4)? != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        let major = d.u16()?;
        let minor = d.u16()?;
        if major != SNAPSHOT_FORMAT_VERSION.major {
            return Err(SnapshotError::UnsupportedFormatVersion { major, minor });
        }

        let mut found = [0u8; 4];
        found.copy_from_slice(d.bytes(4)?);
        if found != expected_id {
            return Err(SnapshotError::DeviceIdMismatch {
                expected: expected_id,
                found,
            });
        }
        let device_version = SnapshotVersion::new(d.u16()?, d.u16()?);

        let mut fields = BTreeMap::new();
        while !d.is_empty() {
            let tag = d.u16()?;
            let len = d.u32()? as usize;
            let value = d.bytes(len)?;
            if fields.insert(tag, value).is_some() {
                return Err(SnapshotError::DuplicateFieldTag(tag));
            }
        }

        Ok(Self {
            device_version,
            fields,
        })
    }

    pub fn device_version(&self) -> SnapshotVersion {
        self.device_version
    }

    pub fn ensure_device_major(&self, expected: u16) -> SnapshotResult<()> {
        if self.device_version.major != expected {
            return Err(SnapshotError::UnsupportedDeviceMajorVersion {
                expected,
                found: self.device_version.major,
            });
        }
        Ok(())
    }

    pub fn bytes(&self, tag: u16) -> Option<&'a [u8]> {
        self.fields.get(&tag).copied()
    }

    fn fixed<T>(
        &self,
        tag: u16,
        name: &'static str,
        read: impl FnOnce(&mut Decoder<'a>) -> SnapshotResult<T>,
    ) -> SnapshotResult<Option<T>> {
        let Some(buf) = self.bytes(tag) else {
            return Ok(None);
        };
        let mut d = Decoder::new(buf);
        let value = read(&mut d).map_err(|_| SnapshotError::InvalidFieldEncoding(name))?;
        d.finish()
            .map_err(|_| SnapshotError::InvalidFieldEncoding(name))?;
        Ok(Some(value))
    }

    pub fn u32(&self, tag: u16) -> SnapshotResult<Option<u32>> {
        self.fixed(tag, "u32", |d| d.u32())
    }

    pub fn u64(&self, tag: u16) -> SnapshotResult<Option<u64>> {
        self.fixed(tag, "u64", |d| d.u64())
    }

    pub fn bool(&self, tag: u16) -> SnapshotResult<Option<bool>> {
        self.fixed(tag, "bool", |d| d.bool())
    }
}

const TAG_USBCMD: u16 = 1;
const TAG_USBSTS: u16 = 2;
const TAG_DNCTRL: u16 = 3;
const TAG_COMMAND_RING: u16 = 4;
const TAG_DCBAAP: u16 = 5;
const TAG_CONFIG: u16 = 6;
const TAG_DOORBELL: u16 = 7;
const TAG_PORTS: u16 = 8;
const TAG_INTERRUPTER: u16 = 9;
const TAG_MFINDEX: u16 = 10;
const TAG_FLAGS: u16 = 11;
const TAG_TRANSITION_TIMERS: u16 = 12;
const TAG_IRQ_LATCH: u16 = 13;
const TAG_PIPELINE: u16 = 14;
const TAG_TICKS: u16 = 15;

const OP_NONE: u8 = 0;
const OP_READ: u8 = 1;
const OP_WRITE: u8 = 2;

fn encode_read(e: Encoder, read: Option<ReadRequest>) -> Encoder {
    match read {
        Some(r) => e.bool(true).u128(r.tag.get()).u32(r.address),
        None => e.bool(false),
    }
}

fn encode_write(e: Encoder, write: Option<WriteRequest>) -> Encoder {
    match write {
        Some(w) => e.bool(true).u32(w.address).u32(w.data).u8(w.byte_enable),
        None => e.bool(false),
    }
}

fn decode_read(d: &mut Decoder<'_>) -> SnapshotResult<Option<ReadRequest>> {
    if !d.bool()? {
        return Ok(None);
    }
    Ok(Some(ReadRequest {
        tag: ReadTag::new(d.u128()?),
        address: d.u32()?,
    }))
}

fn decode_write(d: &mut Decoder<'_>) -> SnapshotResult<Option<WriteRequest>> {
    if !d.bool()? {
        return Ok(None);
    }
    Ok(Some(WriteRequest {
        address: d.u32()?,
        data: d.u32()?,
        byte_enable: d.u8()? & WriteRequest::ALL_BYTES,
    }))
}

fn encode_pipeline(pipeline: &RequestPipeline) -> Vec<u8> {
    let mut e = encode_read(Encoder::new(), pipeline.latched.read);
    e = encode_write(e, pipeline.latched.write);
    e = match pipeline.dispatched {
        None => e.u8(OP_NONE),
        Some(BankOp::Read { tag, offset }) => e.u8(OP_READ).u128(tag.get()).u32(offset),
        Some(BankOp::Write {
            offset,
            data,
            byte_enable,
        }) => e.u8(OP_WRITE).u32(offset).u32(data).u8(byte_enable),
    };
    e.finish()
}

fn decode_pipeline(buf: &[u8]) -> SnapshotResult<RequestPipeline> {
    let mut d = Decoder::new(buf);
    let latched = Latched {
        read: decode_read(&mut d)?,
        write: decode_write(&mut d)?,
    };
    let dispatched = match d.u8()? {
        OP_NONE => None,
        OP_READ => Some(BankOp::Read {
            tag: ReadTag::new(d.u128()?),
            offset: crate::map::bar_offset(d.u32()?),
        }),
        OP_WRITE => Some(BankOp::Write {
            offset: crate::map::bar_offset(d.u32()?),
            data: d.u32()?,
            byte_enable: d.u8()? & WriteRequest::ALL_BYTES,
        }),
        _ => return Err(SnapshotError::InvalidFieldEncoding("pipeline op")),
    };
    d.finish()?;
    Ok(RequestPipeline {
        latched,
        dispatched,
    })
}

impl IoSnapshot for XhciBar {
    const DEVICE_ID: [u8; 4] = *b"XBAR";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        let bank = self.bank();
        let op = &bank.op;

        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_u32(TAG_USBCMD, op.usbcmd);
        w.field_u32(TAG_USBSTS, op.usbsts);
        w.field_u32(TAG_DNCTRL, op.dnctrl);
        w.field_bytes(
            TAG_COMMAND_RING,
            Encoder::new()
                .bool(op.command_ring.running())
                .u32(op.command_ring.crcr_lo())
                .u32(op.command_ring.crcr_hi())
                .finish(),
        );
        w.field_u64(TAG_DCBAAP, op.dcbaap());
        w.field_u32(TAG_CONFIG, op.config);
        w.field_u32(TAG_DOORBELL, bank.doorbell);

        let mut ports = Encoder::new();
        for id in PortId::ALL {
            let p = bank.ports.get(id);
            ports = ports
                .u32(p.portsc)
                .u32(p.portpmsc)
                .u32(p.portli)
                .bool(p.powered);
        }
        w.field_bytes(TAG_PORTS, ports.finish());

        let intr = &bank.interrupter;
        w.field_bytes(
            TAG_INTERRUPTER,
            Encoder::new()
                .u32(intr.iman)
                .u32(intr.imod)
                .u32(intr.erstsz)
                .u64(intr.erstba())
                .u64(intr.erdp())
                .finish(),
        );

        w.field_bytes(
            TAG_MFINDEX,
            Encoder::new()
                .u16(bank.mfindex.sub_counter())
                .u16(bank.mfindex.mfindex() as u16)
                .finish(),
        );
        w.field_u32(TAG_FLAGS, bank.flags.bits());

        let t = bank.timers;
        w.field_bytes(
            TAG_TRANSITION_TIMERS,
            Encoder::new()
                .u32(t.halt)
                .u32(t.run)
                .u32(t.reset)
                .u32(t.save)
                .u32(t.restore)
                .finish(),
        );
        w.field_bool(TAG_IRQ_LATCH, bank.irq_latch);
        w.field_bytes(TAG_PIPELINE, encode_pipeline(self.pipeline()));
        w.field_u64(TAG_TICKS, self.ticks());

        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;

        // Decode into a scratch copy so a malformed snapshot leaves `self` untouched.
        let mut next = self.clone();
        next.reset();
        let ticks = r.u64(TAG_TICKS)?;
        {
            let (pipeline, bank) = next.parts_mut();

            if let Some(v) = r.u32(TAG_USBCMD)? {
                bank.op.usbcmd = policy::USBCMD.settle(v);
            }
            if let Some(v) = r.u32(TAG_USBSTS)? {
                bank.op.usbsts = v;
            }
            if let Some(v) = r.u32(TAG_DNCTRL)? {
                bank.op.dnctrl = v;
            }
            if let Some(buf) = r.bytes(TAG_COMMAND_RING) {
                let mut d = Decoder::new(buf);
                let running = d.bool()?;
                let lo = d.u32()?;
                let hi = d.u32()?;
                d.finish()?;
                bank.op.command_ring = CommandRing::restore(running, lo, hi);
            }
            if let Some(v) = r.u64(TAG_DCBAAP)? {
                bank.op.dcbaap_lo = v as u32;
                bank.op.dcbaap_hi = (v >> 32) as u32;
            }
            if let Some(v) = r.u32(TAG_CONFIG)? {
                bank.op.config = v;
            }
            if let Some(v) = r.u32(TAG_DOORBELL)? {
                bank.doorbell = v;
            }

            if let Some(buf) = r.bytes(TAG_PORTS) {
                let mut d = Decoder::new(buf);
                for id in PortId::ALL {
                    let p = bank.ports.get_mut(id);
                    p.portsc = policy::PORTSC.settle(d.u32()?);
                    p.portpmsc = d.u32()?;
                    p.portli = d.u32()?;
                    p.powered = d.bool()?;
                }
                d.finish()?;
            }

            if let Some(buf) = r.bytes(TAG_INTERRUPTER) {
                let mut d = Decoder::new(buf);
                let intr = &mut bank.interrupter;
                intr.iman = d.u32()?;
                intr.imod = d.u32()?;
                intr.erstsz = d.u32()?;
                let erstba = d.u64()?;
                let erdp = d.u64()?;
                d.finish()?;
                intr.erstba_lo = erstba as u32;
                intr.erstba_hi = (erstba >> 32) as u32;
                intr.erdp_lo = erdp as u32;
                intr.erdp_hi = (erdp >> 32) as u32;
            }

            if let Some(buf) = r.bytes(TAG_MFINDEX) {
                let mut d = Decoder::new(buf);
                let sub_counter = d.u16()?;
                let index = d.u16()?;
                d.finish()?;
                bank.mfindex.restore(sub_counter, index);
            }

            if let Some(v) = r.u32(TAG_FLAGS)? {
                bank.flags = ControllerFlags::from_bits_truncate(v);
            }
            if let Some(buf) = r.bytes(TAG_TRANSITION_TIMERS) {
                let mut d = Decoder::new(buf);
                bank.timers = TransitionTimers {
                    halt: d.u32()?,
                    run: d.u32()?,
                    reset: d.u32()?,
                    save: d.u32()?,
                    restore: d.u32()?,
                };
                d.finish()?;
            }
            if let Some(v) = r.bool(TAG_IRQ_LATCH)? {
                bank.irq_latch = v;
            }

            if let Some(buf) = r.bytes(TAG_PIPELINE) {
                *pipeline = decode_pipeline(buf)?;
            }
        }
        if let Some(ticks) = ticks {
            next.set_ticks(ticks);
        }

        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_emits_fields_in_tag_order() {
        let mut w = SnapshotWriter::new(*b"TEST", SnapshotVersion::new(1, 2));
        w.field_u32(9, 0xaabb_ccdd);
        w.field_bool(3, true);
        let bytes = w.finish();

        assert_eq!(&bytes[..4], b"XSNP");
        assert_eq!(&bytes[8..12], b"TEST");
        let fields = &bytes[HEADER_LEN..];
        assert_eq!(&fields[..2], &3u16.to_le_bytes());
        assert_eq!(&fields[FIELD_HEADER_LEN + 1..FIELD_HEADER_LEN + 3], &9u16.to_le_bytes());

        let r = SnapshotReader::parse(&bytes, *b"TEST").unwrap();
        assert_eq!(r.device_version(), SnapshotVersion::new(1, 2));
        assert_eq!(r.u32(9).unwrap(), Some(0xaabb_ccdd));
        assert_eq!(r.bool(3).unwrap(), Some(true));
        assert_eq!(r.u32(4).unwrap(), None);
    }

    #[test]
    fn reader_rejects_foreign_device_and_bad_magic() {
        let bytes = SnapshotWriter::new(*b"AAAA", SnapshotVersion::new(1, 0)).finish();
        assert!(matches!(
            SnapshotReader::parse(&bytes, *b"BBBB"),
            Err(SnapshotError::DeviceIdMismatch { .. })
        ));

        let mut corrupt = bytes.clone();
        corrupt[0] = b'Z';
        assert_eq!(
            SnapshotReader::parse(&corrupt, *b"AAAA").err(),
            Some(SnapshotError::InvalidMagic)
        );

        assert_eq!(
            SnapshotReader::parse(&bytes[..6], *b"AAAA").err(),
            Some(SnapshotError::UnexpectedEof)
        );
    }

    #[test]
    fn reader_rejects_truncated_and_duplicate_fields() {
        let mut w = SnapshotWriter::new(*b"AAAA", SnapshotVersion::new(1, 0));
        w.field_u32(1, 5);
        let bytes = w.finish();
        assert_eq!(
            SnapshotReader::parse(&bytes[..bytes.len() - 1], *b"AAAA").err(),
            Some(SnapshotError::UnexpectedEof)
        );

        let mut dup = bytes.clone();
        dup.extend_from_slice(&bytes[HEADER_LEN..]);
        assert_eq!(
            SnapshotReader::parse(&dup, *b"AAAA").err(),
            Some(SnapshotError::DuplicateFieldTag(1))
        );
    }

    #[test]
    fn fixed_width_accessors_check_length() {
        let mut w = SnapshotWriter::new(*b"AAAA", SnapshotVersion::new(1, 0));
        w.field_bytes(1, vec![1, 2, 3]);
        let bytes = w.finish();
        let r = SnapshotReader::parse(&bytes, *b"AAAA").unwrap();
        assert_eq!(r.u32(1), Err(SnapshotError::InvalidFieldEncoding("u32")));
    }
}
