//! Intel HEX decoding.
//!
//! Only the two record types the bootloader toolchain emits are accepted:
//!
//! ```text
//! +---+-------+---------+------+-------------+----------+
//! | : | count | address | type |    data     | checksum |
//! +---+-------+---------+------+-------------+----------+
//! | 1 |   2   |    4    |  2   | 2 * count   |    2     |
//! +---+-------+---------+------+-------------+----------+
//!                         00 = Data, 01 = End Of File
//! ```
//!
//! The checksum is the two's complement of the sum of all preceding record
//! bytes, so the sum of every byte on a valid line is zero mod 256.

use crate::error::{Error, Result};
use crate::image::ProgramImage;
use crate::protocol::MemoryRegion;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Bytes in a record besides its data: count, address (2), type, checksum.
const RECORD_OVERHEAD: usize = 5;

/// Intel HEX record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Data record (0x00).
    Data = 0x00,
    /// End Of File record (0x01).
    EndOfFile = 0x01,
}

impl RecordType {
    /// Decode a record type byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Data),
            0x01 => Some(Self::EndOfFile),
            _ => None,
        }
    }
}

/// One decoded line of an Intel HEX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    /// Load offset of the record.
    pub address: u16,
    /// Record type.
    pub record_type: RecordType,
    /// Record payload (`byte_count` bytes).
    pub data: Vec<u8>,
    /// Stored checksum byte.
    pub checksum: u8,
}

impl HexRecord {
    /// Parse a single record line.
    ///
    /// `line` is the 1-based line number used in error reports. Trailing
    /// whitespace (including `\r`) is ignored.
    pub fn parse(text: &str, line: usize) -> Result<Self> {
        let format_error = |reason: String| Error::HexFormat { line, reason };

        let body = text
            .trim_end()
            .strip_prefix(':')
            .ok_or_else(|| format_error("only Intel HEX is supported (missing ':')".into()))?;

        let bytes = decode_hex(body).ok_or_else(|| format_error("invalid hex digits".into()))?;
        if bytes.len() < RECORD_OVERHEAD {
            return Err(format_error(format!(
                "record too short ({} bytes)",
                bytes.len()
            )));
        }

        let byte_count = usize::from(bytes[0]);
        if bytes.len() != byte_count + RECORD_OVERHEAD {
            return Err(format_error(format!(
                "byte count {byte_count} does not match record length {}",
                bytes.len() - RECORD_OVERHEAD
            )));
        }

        let (content, stored) = bytes.split_at(bytes.len() - 1);
        let computed = checksum(content);
        if computed != stored[0] {
            return Err(Error::Checksum {
                line,
                expected: computed,
                actual: stored[0],
            });
        }

        let record_type = RecordType::from_byte(bytes[3]).ok_or_else(|| {
            format_error(format!("unsupported record type {:#04x}", bytes[3]))
        })?;

        Ok(Self {
            address: BigEndian::read_u16(&bytes[1..3]),
            record_type,
            data: bytes[4..4 + byte_count].to_vec(),
            checksum: stored[0],
        })
    }

    /// Number of data bytes in the record.
    pub fn byte_count(&self) -> usize {
        self.data.len()
    }
}

/// Two's complement of the byte sum, mod 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg()
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

/// Builds a contiguous, page-padded [`ProgramImage`] from Intel HEX text.
#[derive(Debug, Clone, Copy)]
pub struct HexImageLoader {
    page_size: usize,
}

impl HexImageLoader {
    /// Create a loader padding to `page_size` bytes.
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }

    /// Create a loader for the page size of `region`.
    pub fn for_region(region: MemoryRegion) -> Self {
        Self::new(region.page_size())
    }

    /// Load an image from a HEX file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<ProgramImage> {
        let path = path.as_ref();
        debug!("Loading Intel HEX from: {}", path.display());
        self.load(BufReader::new(File::open(path)?))
    }

    /// Load an image from a HEX text stream.
    ///
    /// Data records must appear in non-decreasing address order; gaps
    /// between records are zero-filled. The first data record's address
    /// becomes the image start address.
    pub fn load<R: BufRead>(&self, reader: R) -> Result<ProgramImage> {
        let mut start: Option<u16> = None;
        let mut offset = 0usize;
        let mut program = Vec::new();
        let mut end_seen = false;

        for (index, text) in reader.lines().enumerate() {
            let text = text?;
            let line = index + 1;

            if text.trim().is_empty() {
                continue;
            }
            if end_seen {
                return Err(Error::TrailingData { line });
            }

            let record = HexRecord::parse(&text, line)?;
            trace!(
                "line {line}: {:?} @ {:#06x}, {} bytes",
                record.record_type,
                record.address,
                record.byte_count()
            );

            match record.record_type {
                RecordType::EndOfFile => {
                    if !record.data.is_empty() {
                        return Err(Error::HexFormat {
                            line,
                            reason: "end-of-file record is not empty".into(),
                        });
                    }
                    end_seen = true;
                },
                RecordType::Data => {
                    let address = usize::from(record.address);
                    if start.is_none() {
                        start = Some(record.address);
                        offset = address;
                    }
                    if address < offset {
                        return Err(Error::HexFormat {
                            line,
                            reason: format!(
                                "record at {address:#06x} overlaps or precedes data ending at {offset:#06x}"
                            ),
                        });
                    }

                    program.resize(program.len() + (address - offset), 0);
                    program.extend_from_slice(&record.data);
                    offset = address + record.byte_count();
                },
            }
        }

        let start = start.ok_or(Error::EmptyImage)?;
        if !end_seen {
            warn!("Intel HEX input has no end-of-file record");
        }

        ProgramImage::new(start, program, self.page_size)
    }
}
