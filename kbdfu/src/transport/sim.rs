//! Simulated bootloader for unit tests.
//!
//! Implements the device side of the command set on top of in-memory flash
//! and EEPROM arrays, with hooks to inject faults.

use std::collections::HashMap;
use std::io;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::protocol::{MAX_BULK_CHUNK, MemoryRegion, Request, StatusCode};
use crate::transport::Transport;

const FLASH_SIZE: usize = 0x8000;
const EEPROM_SIZE: usize = 0x400;

/// One transfer observed by the simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Control(Request),
    BulkOut(usize),
    BulkIn(usize),
}

pub(crate) struct SimDevice {
    pub region: MemoryRegion,
    pub cursor: u16,
    pub flash: Vec<u8>,
    pub eeprom: Vec<u8>,
    pub events: Vec<Event>,
    /// Addresses committed by WRITE_PAGE, in order.
    pub written: Vec<u16>,
    /// Addresses staged by READ_PAGE, in order.
    pub read: Vec<u16>,
    pub reset: bool,
    /// Status reported for every occurrence of a request.
    pub forced_status: HashMap<Request, StatusCode>,
    /// Region id reported by GET_TYPE instead of the selected one.
    pub reported_region: Option<u8>,
    /// Address reported by the given GET_ADDR occurrence instead of the cursor.
    pub reported_address: Option<(usize, u16)>,
    /// Echo this address for the given write page index.
    pub wrong_echo: Option<(usize, u16)>,
    /// Flip a byte in the given read page index.
    pub corrupt_read: Option<(usize, usize)>,
    /// Largest number of bytes accepted per bulk write.
    pub bulk_accept: usize,
    last_status: StatusCode,
    pending: Vec<u8>,
    staged: Option<Vec<u8>>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self {
            region: MemoryRegion::Program,
            cursor: 0,
            flash: vec![0xFF; FLASH_SIZE],
            eeprom: vec![0xFF; EEPROM_SIZE],
            events: Vec::new(),
            written: Vec::new(),
            read: Vec::new(),
            reset: false,
            forced_status: HashMap::new(),
            reported_region: None,
            reported_address: None,
            wrong_echo: None,
            corrupt_read: None,
            bulk_accept: MAX_BULK_CHUNK,
            last_status: StatusCode::Ok,
            pending: Vec::new(),
            staged: None,
        }
    }

    pub fn control_requests(&self) -> Vec<Request> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Control(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, request: Request) -> usize {
        self.events
            .iter()
            .filter(|e| **e == Event::Control(request))
            .count()
    }

    pub fn memory(&self, region: MemoryRegion) -> &[u8] {
        match region {
            MemoryRegion::Program => &self.flash,
            MemoryRegion::Persistent => &self.eeprom,
        }
    }

    fn memory_mut(&mut self) -> &mut Vec<u8> {
        match self.region {
            MemoryRegion::Program => &mut self.flash,
            MemoryRegion::Persistent => &mut self.eeprom,
        }
    }

    fn status_for(&self, request: Request, natural: StatusCode) -> StatusCode {
        self.forced_status.get(&request).copied().unwrap_or(natural)
    }

    fn set_address(&mut self, data: &[u8]) -> StatusCode {
        if data.len() != 2 {
            return StatusCode::BadLength;
        }
        let addr = LittleEndian::read_u16(data);
        let page = self.region.page_size();
        if usize::from(addr) % page != 0 {
            StatusCode::Misaligned
        } else if usize::from(addr) >= self.memory(self.region).len() {
            StatusCode::BadAddress
        } else {
            self.cursor = addr;
            StatusCode::Ok
        }
    }

    fn set_type(&mut self, data: &[u8]) -> StatusCode {
        match data {
            [id] => match MemoryRegion::from_id(*id) {
                Some(region) => {
                    self.region = region;
                    self.cursor = 0;
                    StatusCode::Ok
                },
                None => StatusCode::BadType,
            },
            _ => StatusCode::BadLength,
        }
    }

    fn write_page(&mut self) -> Vec<u8> {
        let page = self.region.page_size();
        let start = usize::from(self.cursor);
        let data = std::mem::take(&mut self.pending);

        let natural = if data.len() != page {
            StatusCode::BadLength
        } else if start + page > self.memory(self.region).len() {
            StatusCode::Overflow
        } else {
            StatusCode::Ok
        };
        let status = self.status_for(Request::WritePage, natural);

        let index = self.written.len();
        let mut echoed = self.cursor;
        if status.is_ok() {
            self.memory_mut()[start..start + page].copy_from_slice(&data);
            self.written.push(self.cursor);
            if let Some((bad_index, addr)) = self.wrong_echo {
                if bad_index == index {
                    echoed = addr;
                }
            }
            self.cursor = self.cursor.wrapping_add(page as u16);
        }

        let mut reply = vec![status.as_byte(), 0, 0];
        LittleEndian::write_u16(&mut reply[1..], echoed);
        reply
    }

    fn read_page(&mut self) -> Vec<u8> {
        let page = self.region.page_size();
        let start = usize::from(self.cursor);

        let natural = if start + page > self.memory(self.region).len() {
            StatusCode::Overflow
        } else {
            StatusCode::Ok
        };
        let status = self.status_for(Request::ReadPage, natural);

        let mut reply = vec![status.as_byte(), 0, 0];
        if status.is_ok() {
            let mut data = self.memory(self.region)[start..start + page].to_vec();
            if let Some((bad_index, offset)) = self.corrupt_read {
                if bad_index == self.read.len() {
                    data[offset] ^= 0xFF;
                }
            }
            self.read.push(self.cursor);
            self.cursor = self.cursor.wrapping_add(page as u16);
            LittleEndian::write_u16(&mut reply[1..], page as u16);
            self.staged = Some(data);
        }
        reply
    }
}

impl Transport for SimDevice {
    fn control_in(&mut self, request: u8, len: usize) -> Result<Vec<u8>> {
        let request = Request::from_code(request).expect("unknown request code");
        self.events.push(Event::Control(request));

        let mut reply = match request {
            Request::Nop => vec![self.last_status.as_byte()],
            Request::Reset => {
                let status = self.status_for(request, StatusCode::Ok);
                self.reset = status.is_ok();
                vec![status.as_byte()]
            },
            Request::GetAddress => {
                let status = self.status_for(request, StatusCode::Ok);
                let mut reply = vec![status.as_byte(), 0, 0];
                let occurrence = self.count(request) - 1;
                let addr = match self.reported_address {
                    Some((index, addr)) if index == occurrence => addr,
                    _ => self.cursor,
                };
                LittleEndian::write_u16(&mut reply[1..], addr);
                reply
            },
            Request::GetType => {
                let status = self.status_for(request, StatusCode::Ok);
                let id = self.reported_region.unwrap_or(self.region.id());
                vec![status.as_byte(), id]
            },
            Request::ReadPage => self.read_page(),
            Request::WritePage => self.write_page(),
            Request::SetAddress | Request::SetType => {
                panic!("{request} is not an IN request")
            },
        };
        reply.truncate(len);
        Ok(reply)
    }

    fn control_out(&mut self, request: u8, data: &[u8]) -> Result<()> {
        let request = Request::from_code(request).expect("unknown request code");
        self.events.push(Event::Control(request));

        let natural = match request {
            Request::SetAddress => self.set_address(data),
            Request::SetType => self.set_type(data),
            _ => panic!("{request} is not an OUT request"),
        };
        self.last_status = self.status_for(request, natural);
        Ok(())
    }

    fn bulk_write(&mut self, _endpoint: u8, data: &[u8]) -> Result<usize> {
        self.events.push(Event::BulkOut(data.len()));
        let n = data.len().min(self.bulk_accept);
        self.pending.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn bulk_read(&mut self, _endpoint: u8, len: usize) -> Result<Vec<u8>> {
        self.events.push(Event::BulkIn(len));
        let mut data = self
            .staged
            .take()
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::TimedOut, "no data staged")))?;
        data.truncate(len);
        Ok(data)
    }

    fn name(&self) -> String {
        "simulated device".to_string()
    }
}
