//! Firmware image handling.
//!
//! A [`ProgramImage`] is the contiguous byte buffer written to the device,
//! zero-padded to a whole number of pages. It is built once by
//! [`HexImageLoader`](ihex::HexImageLoader) and only read afterwards.

pub mod ihex;

use crate::error::{Error, Result};
use crate::protocol::MemoryRegion;
use std::path::Path;

/// Highest address the bootloader's 16-bit cursor can hold.
const MAX_ADDRESS: usize = u16::MAX as usize;

/// Contiguous, page-aligned program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    start_address: u16,
    data: Vec<u8>,
    payload_len: usize,
    page_size: usize,
}

impl ProgramImage {
    /// Build an image from raw bytes, zero-padding to a page boundary.
    pub fn new(start_address: u16, mut data: Vec<u8>, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::Config("page size must be non-zero".into()));
        }

        let payload_len = data.len();
        let remainder = data.len() % page_size;
        if remainder != 0 {
            data.resize(data.len() + page_size - remainder, 0);
        }

        let image = Self {
            start_address,
            data,
            payload_len,
            page_size,
        };

        if let Some(last) = image.page_count().checked_sub(1) {
            if usize::from(start_address) + last * page_size > MAX_ADDRESS {
                return Err(Error::ImageTooLarge {
                    start: start_address,
                    len: image.data.len(),
                    page_size,
                });
            }
        }

        Ok(image)
    }

    /// Load an Intel HEX file padded for `region`.
    pub fn from_file<P: AsRef<Path>>(path: P, region: MemoryRegion) -> Result<Self> {
        ihex::HexImageLoader::for_region(region).load_file(path)
    }

    /// Parse Intel HEX text padded for `region`.
    pub fn from_hex_str(text: &str, region: MemoryRegion) -> Result<Self> {
        ihex::HexImageLoader::for_region(region).load(text.as_bytes())
    }

    /// Address of the first byte.
    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    /// Padded image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Padded length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image holds no pages.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length before page padding.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Page size the image is padded to.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.data.len() / self.page_size
    }

    /// One past the last padded byte, as a device address.
    pub fn end_address(&self) -> u32 {
        // Bounded by the address check in `new`.
        #[allow(clippy::cast_possible_truncation)]
        let len = self.data.len() as u32;
        u32::from(self.start_address) + len
    }

    /// Page `index`, if it exists.
    pub fn page(&self, index: usize) -> Option<Page<'_>> {
        let offset = index.checked_mul(self.page_size)?;
        let data = self.data.get(offset..offset + self.page_size)?;
        // Every page address was checked to fit in 16 bits in `new`.
        #[allow(clippy::cast_possible_truncation)]
        let address = (usize::from(self.start_address) + offset) as u16;
        Some(Page {
            index,
            address,
            data,
        })
    }

    /// Pages in ascending address order.
    pub fn pages(&self) -> impl Iterator<Item = Page<'_>> + '_ {
        (0..self.page_count()).filter_map(move |i| self.page(i))
    }

    /// Summary for display.
    pub fn summary(&self) -> ImageSummary {
        ImageSummary {
            start_address: self.start_address,
            end_address: self.end_address(),
            payload_len: self.payload_len,
            padded_len: self.data.len(),
            page_size: self.page_size,
            page_count: self.page_count(),
        }
    }
}

/// A page-sized slice of a [`ProgramImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page<'a> {
    /// Page index within the image.
    pub index: usize,
    /// Device address of the first byte.
    pub address: u16,
    /// Page bytes (`page_size` long).
    pub data: &'a [u8],
}

/// Image layout summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImageSummary {
    /// Address of the first byte.
    pub start_address: u16,
    /// One past the last padded byte.
    pub end_address: u32,
    /// Length before padding.
    pub payload_len: usize,
    /// Length after padding.
    pub padded_len: usize,
    /// Page size.
    pub page_size: usize,
    /// Number of pages.
    pub page_count: usize,
}
