//! Native USB transport using the `rusb` crate (libusb).

use {
    crate::{
        error::{Error, Result},
        protocol::{DFU_INTERFACE, REQUEST_TYPE_IN, REQUEST_TYPE_OUT},
        transport::{Transport, UsbConfig},
    },
    log::{debug, trace},
    rusb::{Context, DeviceHandle, UsbContext},
    std::time::Duration,
};

/// USB transport bound to one bootloader device.
pub struct UsbTransport {
    handle: Option<DeviceHandle<Context>>,
    name: String,
    timeout: Duration,
}

impl UsbTransport {
    /// Look for a device matching `config` and open it.
    ///
    /// Returns `Ok(None)` when no matching device is attached, so callers can
    /// poll while the keyboard reboots into its bootloader.
    pub fn find(config: &UsbConfig) -> Result<Option<Self>> {
        // A private context reports libusb init failures as errors.
        let context = Context::new()?;
        for device in context.devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    trace!("Skipping device without descriptor: {e}");
                    continue;
                },
            };

            if descriptor.vendor_id() != config.vid || descriptor.product_id() != config.pid {
                continue;
            }

            let name = format!(
                "{:04x}:{:04x} (bus {:03} device {:03})",
                config.vid,
                config.pid,
                device.bus_number(),
                device.address()
            );
            debug!("Opening {name}");

            let handle = device.open()?;
            return Self::claim(handle, name, config.timeout).map(Some);
        }

        Ok(None)
    }

    fn claim(
        mut handle: DeviceHandle<Context>,
        name: String,
        timeout: Duration,
    ) -> Result<Self> {
        // Not supported on every platform; claiming still works where it fails.
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            trace!("Kernel driver auto-detach unavailable: {e}");
        }
        handle.claim_interface(DFU_INTERFACE)?;

        Ok(Self {
            handle: Some(handle),
            name,
            timeout,
        })
    }

    fn handle(&self) -> Result<&DeviceHandle<Context>> {
        self.handle
            .as_ref()
            .ok_or(Error::Usb(rusb::Error::NoDevice))
    }
}

impl Transport for UsbTransport {
    fn control_in(&mut self, request: u8, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let n = self.handle()?.read_control(
            REQUEST_TYPE_IN,
            request,
            0,
            u16::from(DFU_INTERFACE),
            &mut buf,
            self.timeout,
        )?;
        buf.truncate(n);
        trace!("control in {request:#04x}: {buf:02x?}");
        Ok(buf)
    }

    fn control_out(&mut self, request: u8, data: &[u8]) -> Result<()> {
        trace!("control out {request:#04x}: {data:02x?}");
        self.handle()?.write_control(
            REQUEST_TYPE_OUT,
            request,
            0,
            u16::from(DFU_INTERFACE),
            data,
            self.timeout,
        )?;
        Ok(())
    }

    fn bulk_write(&mut self, endpoint: u8, data: &[u8]) -> Result<usize> {
        let n = self.handle()?.write_bulk(endpoint, data, self.timeout)?;
        trace!("bulk out {endpoint:#04x}: {n}/{} bytes", data.len());
        Ok(n)
    }

    fn bulk_read(&mut self, endpoint: u8, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let n = self.handle()?.read_bulk(endpoint, &mut buf, self.timeout)?;
        buf.truncate(n);
        trace!("bulk in {endpoint:#04x}: {n} bytes");
        Ok(buf)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        // The device drops off the bus after RESET.
        match handle.release_interface(DFU_INTERFACE) {
            Ok(()) | Err(rusb::Error::NoDevice) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
