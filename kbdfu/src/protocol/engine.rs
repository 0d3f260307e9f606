//! Typed bootloader operations over a [`Transport`].
//!
//! Each method issues the transfers for one command and decodes the reply.
//! Status bytes are returned to the caller undecided: the engine only fails
//! on transport errors and malformed replies, leaving the abort policy to
//! [`PagedFlasher`](crate::flasher::PagedFlasher).

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::command::{
    BULK_IN_ENDPOINT, BULK_OUT_ENDPOINT, MAX_BULK_CHUNK, MemoryRegion, Request, StatusCode,
};
use crate::transport::Transport;

/// Protocol engine bound to one transport.
pub struct ProtocolEngine<T: Transport> {
    transport: T,
}

impl<T: Transport> ProtocolEngine<T> {
    /// Create an engine on top of an opened transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the engine and return the underlying transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Issue an IN request and check the reply has its fixed length.
    fn request_in(&mut self, request: Request) -> Result<Vec<u8>> {
        let expected = request.reply_len();
        let reply = self.transport.control_in(request.code(), expected)?;
        trace!("{request} -> {reply:02x?}");
        if reply.len() < expected {
            return Err(Error::ShortResponse {
                request,
                expected,
                actual: reply.len(),
            });
        }
        Ok(reply)
    }

    /// Fetch the status of the last command (`NOP`).
    pub fn poll(&mut self) -> Result<StatusCode> {
        let reply = self.request_in(Request::Nop)?;
        Ok(StatusCode::from_byte(reply[0]))
    }

    /// Leave the bootloader (`RESET`).
    pub fn reset(&mut self) -> Result<StatusCode> {
        let reply = self.request_in(Request::Reset)?;
        Ok(StatusCode::from_byte(reply[0]))
    }

    /// Read the device's address cursor (`GET_ADDR`).
    pub fn get_address(&mut self) -> Result<(StatusCode, u16)> {
        let reply = self.request_in(Request::GetAddress)?;
        Ok((
            StatusCode::from_byte(reply[0]),
            LittleEndian::read_u16(&reply[1..3]),
        ))
    }

    /// Read the selected memory region identifier (`GET_TYPE`).
    pub fn get_type(&mut self) -> Result<(StatusCode, u8)> {
        let reply = self.request_in(Request::GetType)?;
        Ok((StatusCode::from_byte(reply[0]), reply[1]))
    }

    /// Move the address cursor (`SET_ADDR`), then poll for the result.
    pub fn set_address(&mut self, address: u16) -> Result<StatusCode> {
        let mut payload = [0u8; 2];
        LittleEndian::write_u16(&mut payload, address);
        debug!("Setting address to {address:#06x}");
        self.transport
            .control_out(Request::SetAddress.code(), &payload)?;
        self.poll()
    }

    /// Select a memory region (`SET_TYPE`), then poll for the result.
    pub fn set_type(&mut self, region: MemoryRegion) -> Result<StatusCode> {
        debug!("Setting memory region to {region} ({:#04x})", region.id());
        self.transport
            .control_out(Request::SetType.code(), &[region.id()])?;
        self.poll()
    }

    /// Read the page at the cursor (`READ_PAGE`).
    ///
    /// The control reply carries a status and a length; on success the page
    /// bytes follow on the bulk IN endpoint, read with a buffer of `len`
    /// bytes. On failure no bulk read is issued and `None` is returned.
    pub fn read_page(&mut self, len: usize) -> Result<(StatusCode, Option<Vec<u8>>)> {
        let reply = self.request_in(Request::ReadPage)?;
        let status = StatusCode::from_byte(reply[0]);
        if !status.is_ok() {
            return Ok((status, None));
        }

        let announced = LittleEndian::read_u16(&reply[1..3]);
        if usize::from(announced) != len {
            debug!("READ_PAGE announced {announced} bytes, reading {len}");
        }

        let data = self.transport.bulk_read(BULK_IN_ENDPOINT, len)?;
        Ok((status, Some(data)))
    }

    /// Write one page (`WRITE_PAGE`).
    ///
    /// The page is streamed over bulk OUT in chunks of at most
    /// [`MAX_BULK_CHUNK`] bytes until drained; the control transfer then
    /// commits it and returns the status and the address it was written to.
    pub fn write_page(&mut self, data: &[u8]) -> Result<(StatusCode, u16)> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let chunk = &remaining[..remaining.len().min(MAX_BULK_CHUNK)];
            let written = self.transport.bulk_write(BULK_OUT_ENDPOINT, chunk)?;
            if written == 0 {
                return Err(Error::StalledTransfer {
                    endpoint: BULK_OUT_ENDPOINT,
                });
            }
            remaining = &remaining[written.min(remaining.len())..];
        }

        let reply = self.request_in(Request::WritePage)?;
        Ok((
            StatusCode::from_byte(reply[0]),
            LittleEndian::read_u16(&reply[1..3]),
        ))
    }
}
