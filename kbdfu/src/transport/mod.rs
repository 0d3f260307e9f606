//! Transport abstraction for the bootloader's USB interface.
//!
//! The protocol engine only needs four primitives: vendor control transfers
//! in both directions and bulk transfers on the page endpoints. Keeping them
//! behind a trait lets the engine and the flasher run against a simulated
//! device in tests.
//!
//! ```text
//! +------------------+
//! |  PagedFlasher    |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  ProtocolEngine  |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  Transport trait |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  UsbTransport    |
//! |     (rusb)       |
//! +------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod sim;

use std::time::Duration;

use crate::device::{DEFAULT_PID, DEFAULT_VID};
use crate::error::Result;

/// Default timeout for a single USB transfer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// USB connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbConfig {
    /// USB vendor ID of the bootloader.
    pub vid: u16,
    /// USB product ID of the bootloader.
    pub pid: u16,
    /// Timeout applied to every transfer.
    pub timeout: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vid: DEFAULT_VID,
            pid: DEFAULT_PID,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl UsbConfig {
    /// Create a configuration for the given VID/PID pair.
    pub fn new(vid: u16, pid: u16) -> Self {
        Self {
            vid,
            pid,
            ..Default::default()
        }
    }

    /// Set the transfer timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Blocking access to the bootloader interface.
///
/// Each call issues exactly one transfer and returns once it completes.
pub trait Transport {
    /// Issue a device-to-host vendor request and return up to `len` reply bytes.
    fn control_in(&mut self, request: u8, len: usize) -> Result<Vec<u8>>;

    /// Issue a host-to-device vendor request carrying `data`.
    fn control_out(&mut self, request: u8, data: &[u8]) -> Result<()>;

    /// Write to a bulk OUT endpoint, returning the number of bytes accepted.
    fn bulk_write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize>;

    /// Read up to `len` bytes from a bulk IN endpoint.
    fn bulk_read(&mut self, endpoint: u8, len: usize) -> Result<Vec<u8>>;

    /// Human-readable description of the connected device.
    fn name(&self) -> String;

    /// Release the device.
    ///
    /// After calling this method, the transport cannot be used for further I/O.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn control_in(&mut self, request: u8, len: usize) -> Result<Vec<u8>> {
        (**self).control_in(request, len)
    }

    fn control_out(&mut self, request: u8, data: &[u8]) -> Result<()> {
        (**self).control_out(request, data)
    }

    fn bulk_write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize> {
        (**self).bulk_write(endpoint, data)
    }

    fn bulk_read(&mut self, endpoint: u8, len: usize) -> Result<Vec<u8>> {
        (**self).bulk_read(endpoint, len)
    }

    fn name(&self) -> String {
        (**self).name()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

// Re-export the native implementation
#[cfg(feature = "native")]
pub use native::UsbTransport;
