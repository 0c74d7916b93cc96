//! xHCI register offsets, bit definitions and fixed capability values.
//!
//! All offsets are absolute byte offsets into the 4 KiB BAR window. Only the low 12 bits of a
//! request address are significant, see [`BAR_OFFSET_MASK`].

/// Size of the decoded BAR window.
pub const BAR_WINDOW_SIZE: u32 = 0x1000;

/// Mask applied to every request address: low 12 bits, dword aligned.
pub const BAR_OFFSET_MASK: u32 = 0xffc;

/// Capability registers (base of the BAR).
pub mod cap {
    /// CAPLENGTH (u8) + HCIVERSION (u16).
    pub const CAPLENGTH_HCIVERSION: u32 = 0x00;
    /// HCSPARAMS1 (u32).
    pub const HCSPARAMS1: u32 = 0x04;
    /// HCSPARAMS2 (u32).
    pub const HCSPARAMS2: u32 = 0x08;
    /// HCSPARAMS3 (u32).
    pub const HCSPARAMS3: u32 = 0x0c;
    /// HCCPARAMS1 (u32).
    pub const HCCPARAMS1: u32 = 0x10;
    /// DBOFF (u32): Doorbell array offset.
    pub const DBOFF: u32 = 0x14;
    /// RTSOFF (u32): Runtime registers offset.
    pub const RTSOFF: u32 = 0x18;
    /// HCCPARAMS2 (u32).
    pub const HCCPARAMS2: u32 = 0x1c;
}

/// Operational registers. Offsets are absolute (operational base is [`CAPLENGTH_BYTES`]).
pub mod op {
    pub const USBCMD: u32 = 0x20;
    pub const USBSTS: u32 = 0x24;
    pub const PAGESIZE: u32 = 0x28;
    pub const DNCTRL: u32 = 0x34;
    pub const CRCR_LO: u32 = 0x38;
    pub const CRCR_HI: u32 = 0x3c;
    pub const DCBAAP_LO: u32 = 0x50;
    pub const DCBAAP_HI: u32 = 0x54;
    pub const CONFIG: u32 = 0x58;

    // USBCMD bits.
    pub const USBCMD_RUN_STOP: u32 = 1 << 0;
    pub const USBCMD_HCRST: u32 = 1 << 1;
    pub const USBCMD_INTE: u32 = 1 << 2;
    /// Controller Save State / Controller Restore State. Not supported; forced to zero.
    pub const USBCMD_CSS_CRS: u32 = 0b11 << 8;

    // USBSTS bits.
    pub const USBSTS_HCH: u32 = 1 << 0;
    pub const USBSTS_EINT: u32 = 1 << 3;
    pub const USBSTS_PCD: u32 = 1 << 4;
    pub const USBSTS_CNR: u32 = 1 << 11;
    /// Bits 2..=10: the only USBSTS bits software may clear.
    pub const USBSTS_RW1C_MASK: u32 = 0x0000_07fc;

    // CRCR (low dword) bits.
    pub const CRCR_RCS: u32 = 1 << 0;
    pub const CRCR_CS: u32 = 1 << 1;
    pub const CRCR_CA: u32 = 1 << 2;
    pub const CRCR_CRR: u32 = 1 << 3;
    /// Command ring pointer bits 6..=31.
    pub const CRCR_PTR_MASK: u32 = 0xffff_ffc0;

    /// PAGESIZE value: 4 KiB pages only.
    pub const PAGESIZE_4K: u32 = 1;
}

/// Doorbell array (base at `DBOFF`). Only doorbell 0 (command ring) is modelled.
pub mod doorbell {
    pub const DB0: u32 = super::DBOFF_VALUE;
}

/// Port register sets.
pub mod port {
    /// Register set stride in bytes.
    pub const STRIDE: u32 = 0x10;
    /// Port 1 register set (primary, USB3).
    pub const PRIMARY_BASE: u32 = 0x420;
    /// First of the four aliased register sets for port 2 (USB2).
    pub const SECONDARY_BASE: u32 = 0x430;
    /// Number of port-number slots that alias the secondary register set.
    pub const SECONDARY_ALIASES: u32 = 4;

    pub const PORTSC: u32 = 0x0;
    pub const PORTPMSC: u32 = 0x4;
    pub const PORTLI: u32 = 0x8;

    // PORTSC bits.
    pub const PORTSC_CCS: u32 = 1 << 0;
    pub const PORTSC_PED: u32 = 1 << 1;
    pub const PORTSC_OCA: u32 = 1 << 3;
    pub const PORTSC_PR: u32 = 1 << 4;
    pub const PORTSC_PLS_SHIFT: u32 = 5;
    pub const PORTSC_PLS_MASK: u32 = 0xf << PORTSC_PLS_SHIFT;
    pub const PORTSC_PP: u32 = 1 << 9;
    pub const PORTSC_SPEED_SHIFT: u32 = 10;
    pub const PORTSC_SPEED_MASK: u32 = 0xf << PORTSC_SPEED_SHIFT;
    pub const PORTSC_PIC_MASK: u32 = 0b11 << 14;
    pub const PORTSC_LWS: u32 = 1 << 16;
    pub const PORTSC_CSC: u32 = 1 << 17;
    pub const PORTSC_PEC: u32 = 1 << 18;
    pub const PORTSC_WRC: u32 = 1 << 19;
    pub const PORTSC_OCC: u32 = 1 << 20;
    pub const PORTSC_PRC: u32 = 1 << 21;
    pub const PORTSC_PLC: u32 = 1 << 22;
    pub const PORTSC_CEC: u32 = 1 << 23;
    pub const PORTSC_CAS: u32 = 1 << 24;
    pub const PORTSC_WCE: u32 = 1 << 25;
    pub const PORTSC_WDE: u32 = 1 << 26;
    pub const PORTSC_WOE: u32 = 1 << 27;
    pub const PORTSC_DR: u32 = 1 << 30;

    /// The change-bit byte (bits 16..=23) that must never be blindly overwritten.
    pub const PORTSC_CHANGE_BYTE: u32 = 0x00ff_0000;

    // Port link states (PLS).
    pub const PLS_U0: u32 = 0;
    pub const PLS_DISABLED: u32 = 4;
    pub const PLS_RX_DETECT: u32 = 5;
    pub const PLS_POLLING: u32 = 7;
}

/// Runtime registers. Offsets are absolute (runtime base is [`RTSOFF_VALUE`]).
pub mod runtime {
    /// Microframe Index register.
    pub const MFINDEX: u32 = 0x600;
    /// MFINDEX is 14 bits wide.
    pub const MFINDEX_MASK: u32 = 0x3fff;

    /// Interrupter 0 register block.
    pub const IMAN: u32 = 0x620;
    pub const IMOD: u32 = 0x624;
    pub const ERSTSZ: u32 = 0x628;
    pub const ERSTBA_LO: u32 = 0x630;
    pub const ERSTBA_HI: u32 = 0x634;
    pub const ERDP_LO: u32 = 0x638;
    pub const ERDP_HI: u32 = 0x63c;

    pub const IMAN_IP: u32 = 1 << 0;
    pub const IMAN_IE: u32 = 1 << 1;
    /// ERDP Event Handler Busy.
    pub const ERDP_EHB: u32 = 1 << 3;

    /// IMOD reset value: 4000 * 250ns = 1ms moderation interval.
    pub const IMOD_RESET: u32 = 0x0000_0fa0;
}

// ---- Capability register values ----

/// Capability block length; operational registers start here.
pub const CAPLENGTH_BYTES: u8 = 0x20;

/// xHCI interface version (HCIVERSION): 1.0.
pub const HCIVERSION_VALUE: u16 = 0x0100;

/// DWORD0 value at offset 0x00 (CAPLENGTH + HCIVERSION).
pub const CAPLENGTH_HCIVERSION: u32 = (HCIVERSION_VALUE as u32) << 16 | (CAPLENGTH_BYTES as u32);

/// Root hub port numbers: port 1 (USB3) plus four slots aliasing port 2 (USB2).
pub const MAX_PORTS: u8 = 5;
pub const MAX_INTERRUPTERS: u16 = 1;
pub const MAX_SLOTS: u8 = 1;

/// HCSPARAMS1: MaxPorts[31:24], MaxIntrs[18:8], MaxSlots[7:0].
pub const HCSPARAMS1_VALUE: u32 =
    (MAX_PORTS as u32) << 24 | (MAX_INTERRUPTERS as u32) << 8 | MAX_SLOTS as u32;

/// HCSPARAMS2: IST = 1 microframe, ERST Max = 0 (one segment).
pub const HCSPARAMS2_VALUE: u32 = 0x0000_0001;

/// HCSPARAMS3: U2 device exit latency 0x07ff us, U1 device exit latency 0x0a us.
pub const HCSPARAMS3_VALUE: u32 = 0x07ff_000a;

/// Byte offset of the first extended capability.
pub const EXT_CAPS_OFFSET_BYTES: u32 = 0x800;

/// HCCPARAMS1: xECP (in dwords) in bits 31:16, AC64 in bit 0.
pub const HCCPARAMS1_VALUE: u32 = (EXT_CAPS_OFFSET_BYTES / 4) << 16 | 1;

pub const DBOFF_VALUE: u32 = 0x100;
pub const RTSOFF_VALUE: u32 = 0x600;
pub const HCCPARAMS2_VALUE: u32 = 0;

// ---- Extended capabilities (xECP) ----

/// xHCI Extended Capability ID: Supported Protocol.
pub const EXT_CAP_ID_SUPPORTED_PROTOCOL: u8 = 2;

/// Supported Protocol: Protocol name string "USB ".
pub const PROTOCOL_NAME_USB: u32 = u32::from_le_bytes(*b"USB ");

/// Supported Protocol capability for the USB3 port (port 1).
pub const EXT_CAP_USB3_OFFSET: u32 = EXT_CAPS_OFFSET_BYTES;
/// Supported Protocol capability for the USB2 port slots (ports 2..=5).
pub const EXT_CAP_USB2_OFFSET: u32 = EXT_CAPS_OFFSET_BYTES + 0x10;

/// Encodes dword 0 of a Supported Protocol capability.
///
/// Field layout: Capability ID [7:0], Next pointer in dwords [15:8], Minor revision [23:16],
/// Major revision [31:24].
pub const fn encode_supported_protocol_header(next_dwords: u8, major: u8, minor: u8) -> u32 {
    EXT_CAP_ID_SUPPORTED_PROTOCOL as u32
        | (next_dwords as u32) << 8
        | (minor as u32) << 16
        | (major as u32) << 24
}

/// Encodes dword 2 of a Supported Protocol capability: Compatible Port Offset [7:0], Compatible
/// Port Count [15:8].
pub const fn encode_compatible_ports(first_port: u8, count: u8) -> u32 {
    first_port as u32 | (count as u32) << 8
}

pub const USB3_PROTOCOL_HEADER: u32 = encode_supported_protocol_header(4, 0x03, 0x00);
pub const USB3_COMPATIBLE_PORTS: u32 = encode_compatible_ports(1, 1);
pub const USB2_PROTOCOL_HEADER: u32 = encode_supported_protocol_header(0, 0x02, 0x00);
pub const USB2_COMPATIBLE_PORTS: u32 = encode_compatible_ports(2, 4);

// ---- Port speeds (Protocol Speed ID values) ----

pub const SPEED_FULL: u8 = 1;
pub const SPEED_LOW: u8 = 2;
pub const SPEED_HIGH: u8 = 3;
pub const SPEED_SUPER: u8 = 4;
