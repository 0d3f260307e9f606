//! Paged write/verify state machine.
//!
//! A run walks the device through a fixed sequence and aborts on the first
//! unexpected status, address or byte:
//!
//! ```text
//! Idle -> ModeSet -> ModeVerified -> AddressSet(write) -> Writing(0..n)
//!      -> AddressSet(verify) -> Verifying(0..n) -> Resetting -> Done
//! ```
//!
//! The device's address cursor only advances on a successful page
//! operation, so pages are always written and read in ascending order and
//! nothing is retried.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kbdfu::{DiscoveryConfig, MemoryRegion, PagedFlasher, ProgramImage, UsbConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let region = MemoryRegion::Program;
//!     let image = ProgramImage::from_file("firmware.hex", region)?;
//!
//!     let mut flasher =
//!         PagedFlasher::open(&UsbConfig::default(), &DiscoveryConfig::default(), region)?;
//!     flasher.run(&image, |phase, done, total| {
//!         println!("{phase}: {done}/{total}");
//!     })?;
//!
//!     Ok(())
//! }
//! ```

use std::fmt;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::image::{Page, ProgramImage};
use crate::protocol::{MemoryRegion, ProtocolEngine, Request, StatusCode};
use crate::transport::Transport;

/// Pass over the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Programming pages.
    Write,
    /// Reading pages back.
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => write!(f, "write"),
            Self::Verify => write!(f, "verify"),
        }
    }
}

/// Step of a flashing run.
///
/// The flasher enters a state before issuing its transfers, so after an
/// abort [`PagedFlasher::state`] names the step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    /// Nothing issued yet.
    Idle,
    /// Selecting the memory region.
    ModeSet,
    /// Confirming the selected region.
    ModeVerified,
    /// Positioning the address cursor at the image start.
    AddressSet(Phase),
    /// Writing a page.
    Writing {
        /// Page index.
        page: usize,
    },
    /// Reading back a page.
    Verifying {
        /// Page index.
        page: usize,
    },
    /// Leaving the bootloader.
    Resetting,
    /// Image written, verified and device reset.
    Done,
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ModeSet => write!(f, "setting memory region"),
            Self::ModeVerified => write!(f, "verifying memory region"),
            Self::AddressSet(phase) => write!(f, "setting {phase} address"),
            Self::Writing { page } => write!(f, "writing page {page}"),
            Self::Verifying { page } => write!(f, "verifying page {page}"),
            Self::Resetting => write!(f, "resetting device"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Drives one write-then-verify run against a device.
///
/// Generic over the transport type `T`, so the same state machine runs on
/// real hardware and against a simulated device.
pub struct PagedFlasher<T: Transport> {
    engine: ProtocolEngine<T>,
    region: MemoryRegion,
    state: FlashState,
    aborted: bool,
}

impl<T: Transport> PagedFlasher<T> {
    /// Create a flasher for `region` on an opened transport.
    pub fn new(transport: T, region: MemoryRegion) -> Self {
        Self {
            engine: ProtocolEngine::new(transport),
            region,
            state: FlashState::Idle,
            aborted: false,
        }
    }

    /// Target memory region.
    pub fn region(&self) -> MemoryRegion {
        self.region
    }

    /// Current step, or the failed step after an abort.
    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Whether the last run aborted.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Get a reference to the protocol engine.
    pub fn engine(&self) -> &ProtocolEngine<T> {
        &self.engine
    }

    /// Consume the flasher and return the underlying transport.
    pub fn into_transport(self) -> T {
        self.engine.into_transport()
    }

    /// Write `image`, verify it and reset the device.
    ///
    /// `progress` is called after every page with the phase, the number of
    /// pages completed in that phase and the page count. A flasher drives a
    /// single run; any failure is terminal.
    pub fn run<F>(&mut self, image: &ProgramImage, mut progress: F) -> Result<()>
    where
        F: FnMut(Phase, usize, usize),
    {
        if self.aborted || self.state != FlashState::Idle {
            return Err(Error::Config(format!(
                "flasher already used (state: {})",
                self.state
            )));
        }

        let result = self.run_sequence(image, &mut progress);
        if let Err(e) = &result {
            self.aborted = true;
            debug!("Aborted while {}: {e}", self.state);
        }
        result
    }

    fn run_sequence(
        &mut self,
        image: &ProgramImage,
        progress: &mut dyn FnMut(Phase, usize, usize),
    ) -> Result<()> {
        if image.page_size() != self.region.page_size() {
            return Err(Error::PageSizeMismatch {
                region: self.region,
                image: image.page_size(),
            });
        }

        self.select_region()?;

        info!(
            "Programming {} pages of {} at {:#06x}",
            image.page_count(),
            self.region,
            image.start_address()
        );
        self.state = FlashState::AddressSet(Phase::Write);
        self.seek(image.start_address())?;
        self.write_pages(image, progress)?;

        info!("Verifying...");
        self.state = FlashState::AddressSet(Phase::Verify);
        self.seek(image.start_address())?;
        self.verify_pages(image, progress)?;

        info!("Resetting...");
        self.state = FlashState::Resetting;
        let status = self.engine.reset()?;
        ensure_ok(Request::Reset, status)?;

        self.state = FlashState::Done;
        Ok(())
    }

    fn select_region(&mut self) -> Result<()> {
        info!("Setting address mode to {}", self.region);
        self.state = FlashState::ModeSet;
        let status = self.engine.set_type(self.region)?;
        ensure_ok(Request::SetType, status)?;

        self.state = FlashState::ModeVerified;
        let (status, id) = self.engine.get_type()?;
        ensure_ok(Request::GetType, status)?;
        if id != self.region.id() {
            return Err(Error::RegionMismatch {
                expected: self.region,
                actual: id,
            });
        }
        Ok(())
    }

    fn seek(&mut self, address: u16) -> Result<()> {
        let status = self.engine.set_address(address)?;
        ensure_ok(Request::SetAddress, status)?;

        let (status, actual) = self.engine.get_address()?;
        ensure_ok(Request::GetAddress, status)?;
        if actual != address {
            return Err(Error::AddressMismatch {
                region: self.region,
                expected: address,
                actual,
            });
        }
        Ok(())
    }

    fn write_pages(
        &mut self,
        image: &ProgramImage,
        progress: &mut dyn FnMut(Phase, usize, usize),
    ) -> Result<()> {
        let total = image.page_count();
        let written = image.pages().try_fold(0usize, |done, page| {
            check_interrupt()?;
            self.write_page(page)?;
            progress(Phase::Write, done + 1, total);
            Ok::<_, Error>(done + 1)
        })?;
        debug!("Wrote {written} pages");
        Ok(())
    }

    fn write_page(&mut self, page: Page<'_>) -> Result<()> {
        self.state = FlashState::Writing { page: page.index };
        debug!("Writing page {} at {:#06x}", page.index, page.address);

        let (status, echoed) = self.engine.write_page(page.data)?;
        if !status.is_ok() {
            return Err(Error::PageWrite {
                region: self.region,
                page: page.index,
                status,
            });
        }
        if echoed != page.address {
            return Err(Error::PageAddressMismatch {
                region: self.region,
                page: page.index,
                expected: page.address,
                actual: echoed,
            });
        }
        Ok(())
    }

    fn verify_pages(
        &mut self,
        image: &ProgramImage,
        progress: &mut dyn FnMut(Phase, usize, usize),
    ) -> Result<()> {
        let total = image.page_count();
        let verified = image.pages().try_fold(0usize, |done, page| {
            check_interrupt()?;
            self.verify_page(page)?;
            progress(Phase::Verify, done + 1, total);
            Ok::<_, Error>(done + 1)
        })?;
        debug!("Verified {verified} pages");
        Ok(())
    }

    fn verify_page(&mut self, page: Page<'_>) -> Result<()> {
        self.state = FlashState::Verifying { page: page.index };
        debug!("Verifying page {} at {:#06x}", page.index, page.address);

        let (status, data) = self.engine.read_page(self.region.page_size())?;
        let data = match data {
            Some(data) if status.is_ok() => data,
            _ => {
                return Err(Error::PageRead {
                    region: self.region,
                    page: page.index,
                    status,
                });
            },
        };

        if data.len() != page.data.len() {
            return Err(Error::PageLengthMismatch {
                region: self.region,
                page: page.index,
                expected: page.data.len(),
                actual: data.len(),
            });
        }
        if let Some((offset, (expected, actual))) = page
            .data
            .iter()
            .zip(&data)
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(Error::PageDataMismatch {
                region: self.region,
                page: page.index,
                offset,
                expected: *expected,
                actual: *actual,
            });
        }
        Ok(())
    }
}

fn ensure_ok(request: Request, status: StatusCode) -> Result<()> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(Error::Protocol { request, status })
    }
}

fn check_interrupt() -> Result<()> {
    if crate::is_interrupted_requested() {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

// Native-specific convenience functions
#[cfg(feature = "native")]
mod native_impl {
    use super::{MemoryRegion, PagedFlasher, Result};
    use crate::device::{self, DiscoveryConfig};
    use crate::transport::{UsbConfig, UsbTransport};

    impl PagedFlasher<UsbTransport> {
        /// Wait for the bootloader, open it and create a flasher for `region`.
        pub fn open(
            usb: &UsbConfig,
            discovery: &DiscoveryConfig,
            region: MemoryRegion,
        ) -> Result<Self> {
            let transport = device::open(usb, discovery)?;
            Ok(Self::new(transport, region))
        }
    }
}
