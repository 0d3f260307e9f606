//! Bootloader command set, status codes and memory regions.
//!
//! Every command is a USB vendor control request on interface 1 with
//! `wValue = 0`. Page data moves over a pair of bulk endpoints:
//!
//! ```text
//! +-----------+------------+--------+-----------------------------+
//! | Request   | bmReqType  | Code   | Reply                       |
//! +-----------+------------+--------+-----------------------------+
//! | NOP       | 0xC0 (IN)  | 0xFE   | status                      |
//! | RESET     | 0xC0 (IN)  | 0xFF   | status                      |
//! | GET_ADDR  | 0xC0 (IN)  | 0xA0   | status, addr (u16 LE)       |
//! | GET_TYPE  | 0xC0 (IN)  | 0xA1   | status, region              |
//! | READ_PAGE | 0xC0 (IN)  | 0xA2   | status, len (u16 LE) + bulk |
//! | WRITE_PAGE| 0xC0 (IN)  | 0x52   | status, addr (u16 LE)       |
//! | SET_ADDR  | 0x40 (OUT) | 0x50   | addr (u16 LE) -> NOP        |
//! | SET_TYPE  | 0x40 (OUT) | 0x51   | region -> NOP               |
//! +-----------+------------+--------+-----------------------------+
//! ```

use std::fmt;

/// bmRequestType for device-to-host vendor requests.
pub const REQUEST_TYPE_IN: u8 = 0xC0;

/// bmRequestType for host-to-device vendor requests.
pub const REQUEST_TYPE_OUT: u8 = 0x40;

/// Interface index carried in `wIndex` of every control request.
pub const DFU_INTERFACE: u8 = 1;

/// Bulk OUT endpoint receiving page write chunks.
pub const BULK_OUT_ENDPOINT: u8 = 0x02;

/// Bulk IN endpoint delivering page reads.
pub const BULK_IN_ENDPOINT: u8 = 0x81;

/// Largest chunk the device accepts in one bulk OUT transfer.
pub const MAX_BULK_CHUNK: usize = 64;

/// Direction of a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    Out,
    /// Device to host.
    In,
}

/// Bootloader control requests (`bRequest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Request {
    /// Set the address cursor (0x50).
    SetAddress = 0x50,
    /// Select the memory region (0x51).
    SetType = 0x51,
    /// Commit the page received over bulk OUT (0x52).
    WritePage = 0x52,
    /// Read the address cursor (0xA0).
    GetAddress = 0xA0,
    /// Read the selected memory region (0xA1).
    GetType = 0xA1,
    /// Stage one page for bulk IN (0xA2).
    ReadPage = 0xA2,
    /// Return the status of the last command (0xFE).
    Nop = 0xFE,
    /// Leave the bootloader (0xFF).
    Reset = 0xFF,
}

impl Request {
    /// All requests, in wire-code order.
    pub const ALL: [Self; 8] = [
        Self::SetAddress,
        Self::SetType,
        Self::WritePage,
        Self::GetAddress,
        Self::GetType,
        Self::ReadPage,
        Self::Nop,
        Self::Reset,
    ];

    /// Raw request code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a request by its raw code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    /// Transfer direction of the control stage.
    ///
    /// `WRITE_PAGE` is an IN request: the page itself travels over bulk OUT
    /// and the control transfer only collects the commit result.
    pub fn direction(self) -> Direction {
        match self {
            Self::SetAddress | Self::SetType => Direction::Out,
            _ => Direction::In,
        }
    }

    /// bmRequestType for this request.
    pub fn request_type(self) -> u8 {
        match self.direction() {
            Direction::Out => REQUEST_TYPE_OUT,
            Direction::In => REQUEST_TYPE_IN,
        }
    }

    /// Fixed reply length of an IN request (0 for OUT requests).
    pub fn reply_len(self) -> usize {
        match self {
            Self::Nop | Self::Reset => 1,
            Self::GetType => 2,
            Self::GetAddress | Self::ReadPage | Self::WritePage => 3,
            Self::SetAddress | Self::SetType => 0,
        }
    }

    /// Protocol name of the request.
    pub fn name(self) -> &'static str {
        match self {
            Self::SetAddress => "SET_ADDR",
            Self::SetType => "SET_TYPE",
            Self::WritePage => "WRITE_PAGE",
            Self::GetAddress => "GET_ADDR",
            Self::GetType => "GET_TYPE",
            Self::ReadPage => "READ_PAGE",
            Self::Nop => "NOP",
            Self::Reset => "RESET",
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Command succeeded (0x00).
    Ok,
    /// Unknown command (0x80).
    BadCommand,
    /// Wrong payload length (0x81).
    BadLength,
    /// Address out of range (0x82).
    BadAddress,
    /// Unknown memory region (0x83).
    BadType,
    /// Address not page aligned (0x84).
    Misaligned,
    /// Page operation failed (0x85).
    BadPage,
    /// Address cursor ran past the end of the region (0x86).
    Overflow,
    /// Value outside the documented set.
    Unknown(u8),
}

impl StatusCode {
    /// Decode a raw status byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Ok,
            0x80 => Self::BadCommand,
            0x81 => Self::BadLength,
            0x82 => Self::BadAddress,
            0x83 => Self::BadType,
            0x84 => Self::Misaligned,
            0x85 => Self::BadPage,
            0x86 => Self::Overflow,
            other => Self::Unknown(other),
        }
    }

    /// Raw status byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::BadCommand => 0x80,
            Self::BadLength => 0x81,
            Self::BadAddress => 0x82,
            Self::BadType => 0x83,
            Self::Misaligned => 0x84,
            Self::BadPage => 0x85,
            Self::Overflow => 0x86,
            Self::Unknown(b) => b,
        }
    }

    /// Whether the status is `Ok`.
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Short human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::BadCommand => "bad command",
            Self::BadLength => "bad length",
            Self::BadAddress => "bad address",
            Self::BadType => "bad memory type",
            Self::Misaligned => "misaligned address",
            Self::BadPage => "bad page",
            Self::Overflow => "address overflow",
            Self::Unknown(_) => "unknown status",
        }
    }
}

impl From<u8> for StatusCode {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x} ({})", self.as_byte(), self.description())
    }
}

/// Memory region selectable with `SET_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemoryRegion {
    /// Program flash.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "flash"))]
    Program,
    /// EEPROM.
    #[cfg_attr(feature = "serde", serde(rename = "eeprom"))]
    Persistent,
}

impl MemoryRegion {
    /// Page size in bytes.
    pub fn page_size(self) -> usize {
        match self {
            Self::Program => 128,
            Self::Persistent => 4,
        }
    }

    /// Region identifier sent with `SET_TYPE`.
    pub fn id(self) -> u8 {
        match self {
            Self::Program => 0xB0,
            Self::Persistent => 0xB1,
        }
    }

    /// Look up a region by its identifier.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0xB0 => Some(Self::Program),
            0xB1 => Some(Self::Persistent),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program => write!(f, "FLASH"),
            Self::Persistent => write!(f, "EEPROM"),
        }
    }
}
