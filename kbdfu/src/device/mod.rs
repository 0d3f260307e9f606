//! Bootloader device identity and discovery.
//!
//! After the user triggers the bootloader, the keyboard re-enumerates with
//! the DFU VID/PID. Discovery polls for it a bounded number of times.

use std::thread;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};

#[cfg(feature = "native")]
use {
    crate::transport::{Transport, UsbConfig, UsbTransport},
    log::info,
};

/// USB vendor ID of the bootloader.
pub const DEFAULT_VID: u16 = 0x01A1;

/// USB product ID of the bootloader.
pub const DEFAULT_PID: u16 = 0x07C8;

/// Default number of discovery attempts.
pub const DEFAULT_ATTEMPTS: usize = 10;

/// Default delay between discovery attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Discovery polling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Maximum number of lookups.
    pub attempts: usize,
    /// Delay between lookups.
    pub delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl DiscoveryConfig {
    /// Set the number of attempts.
    #[must_use]
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the delay between attempts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Poll `lookup` until it yields a device or the attempt budget runs out.
///
/// `lookup` returns `Ok(None)` while the device is absent; errors end the
/// search immediately. `vid`/`pid` are only used for the
/// [`Error::DeviceNotFound`] report.
pub fn wait_for<T, F>(config: &DiscoveryConfig, vid: u16, pid: u16, mut lookup: F) -> Result<T>
where
    F: FnMut() -> Result<Option<T>>,
{
    for attempt in 1..=config.attempts {
        if crate::is_interrupted_requested() {
            return Err(Error::Interrupted);
        }

        if let Some(device) = lookup()? {
            if attempt > 1 {
                debug!("Device found on attempt {attempt}");
            }
            return Ok(device);
        }

        debug!(
            "Device {vid:04x}:{pid:04x} not present (attempt {attempt}/{})",
            config.attempts
        );
        if attempt < config.attempts {
            thread::sleep(config.delay);
        }
    }

    Err(Error::DeviceNotFound {
        vid,
        pid,
        attempts: config.attempts,
    })
}

/// Wait for the bootloader to appear and open it.
#[cfg(feature = "native")]
pub fn open(usb: &UsbConfig, discovery: &DiscoveryConfig) -> Result<UsbTransport> {
    info!(
        "Waiting for device {:04x}:{:04x} to enter DFU mode...",
        usb.vid, usb.pid
    );
    let transport = wait_for(discovery, usb.vid, usb.pid, || UsbTransport::find(usb))?;
    info!("Connected to {}", transport.name());
    Ok(transport)
}
