//! Error types for kbdfu.

use crate::protocol::{MemoryRegion, Request, StatusCode};
use std::io;
use thiserror::Error;

/// Result type for kbdfu operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for kbdfu operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// USB transfer or device handle error.
    #[cfg(feature = "native")]
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// Malformed Intel HEX input.
    #[error("Invalid Intel HEX at line {line}: {reason}")]
    HexFormat {
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// Intel HEX record checksum mismatch.
    #[error("Checksum error on line {line}: expected {expected:#04x}, got {actual:#04x}")]
    Checksum {
        /// 1-based line number.
        line: usize,
        /// Checksum computed from the record bytes.
        expected: u8,
        /// Checksum stored in the record.
        actual: u8,
    },

    /// Content found after the end-of-file record.
    #[error("Content after end-of-file record at line {line}")]
    TrailingData {
        /// 1-based line number of the first trailing line.
        line: usize,
    },

    /// The HEX input contained no data records.
    #[error("Image contains no data records")]
    EmptyImage,

    /// The padded image does not fit in the 16-bit device address space.
    #[error(
        "Image at {start:#06x} with {len} bytes ({page_size}-byte pages) exceeds the 16-bit address space"
    )]
    ImageTooLarge {
        /// Start address of the image.
        start: u16,
        /// Padded image length.
        len: usize,
        /// Page size the image was padded to.
        page_size: usize,
    },

    /// Device returned a non-Ok status.
    #[error("{request} failed with status {status}")]
    Protocol {
        /// Request that failed.
        request: Request,
        /// Status reported by the device.
        status: StatusCode,
    },

    /// Device rejected a page write.
    #[error("Cannot write {region} page {page}: status {status}")]
    PageWrite {
        /// Active memory region.
        region: MemoryRegion,
        /// Page index.
        page: usize,
        /// Status reported by the device.
        status: StatusCode,
    },

    /// Device rejected a page read.
    #[error("Cannot read {region} page {page}: status {status}")]
    PageRead {
        /// Active memory region.
        region: MemoryRegion,
        /// Page index.
        page: usize,
        /// Status reported by the device.
        status: StatusCode,
    },

    /// Control response shorter than the request's fixed reply size.
    #[error("{request} returned {actual} bytes, expected {expected}")]
    ShortResponse {
        /// Request that was issued.
        request: Request,
        /// Expected reply length.
        expected: usize,
        /// Received reply length.
        actual: usize,
    },

    /// Device reports a different memory region than the one requested.
    #[error("Cannot verify memory region {expected}: device reports {actual:#04x}")]
    RegionMismatch {
        /// Region that was requested.
        expected: MemoryRegion,
        /// Raw region identifier returned by the device.
        actual: u8,
    },

    /// Device address cursor differs from the address that was set.
    #[error("Cannot verify {region} address: expected {expected:#06x}, device reports {actual:#06x}")]
    AddressMismatch {
        /// Active memory region.
        region: MemoryRegion,
        /// Address that was set.
        expected: u16,
        /// Address reported by the device.
        actual: u16,
    },

    /// A page write was committed at an unexpected address.
    #[error("Wrong address for {region} page {page}: expected {expected:#06x}, device wrote {actual:#06x}")]
    PageAddressMismatch {
        /// Active memory region.
        region: MemoryRegion,
        /// Page index.
        page: usize,
        /// Address the page should have been written to.
        expected: u16,
        /// Address echoed back by the device.
        actual: u16,
    },

    /// Verification read back different bytes.
    #[error(
        "{region} page {page} does not match at offset {offset}: expected {expected:#04x}, read {actual:#04x}"
    )]
    PageDataMismatch {
        /// Active memory region.
        region: MemoryRegion,
        /// Page index.
        page: usize,
        /// First differing byte offset within the page.
        offset: usize,
        /// Byte from the image.
        expected: u8,
        /// Byte read from the device.
        actual: u8,
    },

    /// Verification read returned a page of the wrong length.
    #[error("{region} page {page} read returned {actual} bytes, expected {expected}")]
    PageLengthMismatch {
        /// Active memory region.
        region: MemoryRegion,
        /// Page index.
        page: usize,
        /// Region page size.
        expected: usize,
        /// Bytes received.
        actual: usize,
    },

    /// Image was padded for a different page size than the target region.
    #[error("Image uses {image}-byte pages but {region} pages are {} bytes", region.page_size())]
    PageSizeMismatch {
        /// Target region.
        region: MemoryRegion,
        /// Page size of the image.
        image: usize,
    },

    /// A bulk write accepted no data.
    #[error("Bulk transfer on endpoint {endpoint:#04x} stalled")]
    StalledTransfer {
        /// Endpoint address.
        endpoint: u8,
    },

    /// Device not found within the discovery budget.
    #[error("Device {vid:04x}:{pid:04x} not found or not in DFU mode after {attempts} attempts")]
    DeviceNotFound {
        /// USB vendor ID searched for.
        vid: u16,
        /// USB product ID searched for.
        pid: u16,
        /// Number of discovery attempts made.
        attempts: usize,
    },

    /// Operation interrupted by the embedding application.
    #[error("Operation interrupted")]
    Interrupted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
