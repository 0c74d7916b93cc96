//! Field-level register access policies.
//!
//! Each policy is a pure function of the stored value and the written value. A register's
//! complete behaviour is described by a [`FieldPolicy`]: one mask per policy kind. Bits that
//! appear in none of the masks are reserved and always settle to zero.

use crate::regs::{op, port, runtime};

/// Read-write: take the written bits.
#[inline]
pub const fn rw(_old: u32, written: u32, mask: u32) -> u32 {
    written & mask
}

/// Read-only: keep the stored bits, ignore the write.
#[inline]
pub const fn read_only(old: u32, _written: u32, mask: u32) -> u32 {
    old & mask
}

/// Write-1-to-clear: bits written as 1 become 0, bits written as 0 are unchanged.
#[inline]
pub const fn rw1c(old: u32, written: u32, mask: u32) -> u32 {
    old & !written & mask
}

/// Write-1-to-set: bits written as 1 become 1, bits written as 0 are unchanged.
#[inline]
pub const fn rw1s(old: u32, written: u32, mask: u32) -> u32 {
    (old | written) & mask
}

/// Per-bit access policy of a 32-bit register.
///
/// The masks must be disjoint; [`FieldPolicy::reserved`] is everything left over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPolicy {
    /// Read-only or controller-owned bits.
    pub ro: u32,
    /// Plain read-write (including sticky) bits.
    pub rw: u32,
    /// Write-1-to-clear bits.
    pub rw1c: u32,
    /// Write-1-to-set bits.
    pub rw1s: u32,
}

impl FieldPolicy {
    pub const READ_ONLY: Self = Self::new(u32::MAX, 0, 0, 0);
    pub const READ_WRITE: Self = Self::new(0, u32::MAX, 0, 0);

    pub const fn new(ro: u32, rw: u32, rw1c: u32, rw1s: u32) -> Self {
        Self { ro, rw, rw1c, rw1s }
    }

    /// Bits that read and settle as zero regardless of what is written.
    pub const fn reserved(&self) -> u32 {
        !(self.ro | self.rw | self.rw1c | self.rw1s)
    }

    /// Computes the next stored value for a software write of `written` over `old`.
    pub const fn apply(&self, old: u32, written: u32) -> u32 {
        read_only(old, written, self.ro)
            | rw(old, written, self.rw)
            | rw1c(old, written, self.rw1c)
            | rw1s(old, written, self.rw1s)
    }

    /// Applies the policy's reserved-zero rule to a value produced by the controller itself.
    pub const fn settle(&self, value: u32) -> u32 {
        value & !self.reserved()
    }
}

/// USBCMD: read-write except CSS/CRS (bits 8-9), which always settle to zero.
pub const USBCMD: FieldPolicy = FieldPolicy::new(0, !op::USBCMD_CSS_CRS, 0, 0);

/// USBSTS: bits 2-10 are RW1C, everything else belongs to the controller.
pub const USBSTS: FieldPolicy = FieldPolicy::new(!op::USBSTS_RW1C_MASK, 0, op::USBSTS_RW1C_MASK, 0);

/// CRCR low dword: pointer bits and RCS are read-write, CRR is controller-owned. CS/CA are
/// commands and read as zero.
pub const CRCR_LO: FieldPolicy = FieldPolicy::new(op::CRCR_CRR, op::CRCR_PTR_MASK | op::CRCR_RCS, 0, 0);

/// IMAN: IP (bit 0) is RW1C, bits 1-31 are read-write.
pub const IMAN: FieldPolicy = FieldPolicy::new(0, !runtime::IMAN_IP, runtime::IMAN_IP, 0);

/// ERDP low dword: EHB (bit 3) is RW1C, everything else is read-write.
pub const ERDP_LO: FieldPolicy = FieldPolicy::new(0, !runtime::ERDP_EHB, runtime::ERDP_EHB, 0);

/// PORTSC, shared by both port groups.
pub const PORTSC: FieldPolicy = FieldPolicy::new(
    port::PORTSC_CCS
        | port::PORTSC_OCA
        | port::PORTSC_SPEED_MASK
        | port::PORTSC_CAS
        | port::PORTSC_DR,
    port::PORTSC_PLS_MASK
        | port::PORTSC_PP
        | port::PORTSC_PIC_MASK
        | port::PORTSC_LWS
        | port::PORTSC_WCE
        | port::PORTSC_WDE
        | port::PORTSC_WOE,
    port::PORTSC_PED
        | port::PORTSC_CSC
        | port::PORTSC_PEC
        | port::PORTSC_WRC
        | port::PORTSC_OCC
        | port::PORTSC_PRC
        | port::PORTSC_PLC
        | port::PORTSC_CEC,
    port::PORTSC_PR,
);
