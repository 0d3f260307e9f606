//! # kbdfu
//!
//! A library for flashing keyboards running a paged USB DFU bootloader.
//!
//! This crate provides the host side of the bootloader protocol:
//!
//! - Intel HEX parsing into page-aligned program images
//! - The vendor control/bulk command set
//! - Bootloader discovery by VID/PID
//! - A write-then-verify flashing state machine
//!
//! ## Memory Regions
//!
//! - **Program** flash, 128-byte pages
//! - **Persistent** EEPROM, 4-byte pages
//!
//! ## Features
//!
//! - `native` (default): USB access via `rusb`
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use kbdfu::{DiscoveryConfig, MemoryRegion, PagedFlasher, ProgramImage, UsbConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Parse and pad the firmware image
//!     let image = ProgramImage::from_file("firmware.hex", MemoryRegion::Program)?;
//!
//!     // Wait for the bootloader and flash (native only)
//!     #[cfg(feature = "native")]
//!     {
//!         let mut flasher = PagedFlasher::open(
//!             &UsbConfig::default(),
//!             &DiscoveryConfig::default(),
//!             MemoryRegion::Program,
//!         )?;
//!         flasher.run(&image, |phase, current, total| {
//!             println!("{}: {}/{}", phase, current, total);
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod error;
pub mod flasher;
pub mod image;
pub mod protocol;
pub mod transport;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). It is consulted
/// between discovery attempts and between pages, never inside a transfer.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use transport::UsbTransport;
pub use {
    device::{DEFAULT_PID, DEFAULT_VID, DiscoveryConfig, wait_for},
    error::{Error, Result},
    flasher::{FlashState, PagedFlasher, Phase},
    image::{ImageSummary, Page, ProgramImage, ihex::HexImageLoader},
    protocol::{MemoryRegion, ProtocolEngine, Request, StatusCode},
    transport::{Transport, UsbConfig},
};
