//! Bootloader protocol implementation.

pub mod command;
pub mod engine;

// Re-export common types
pub use command::{
    BULK_IN_ENDPOINT, BULK_OUT_ENDPOINT, DFU_INTERFACE, Direction, MAX_BULK_CHUNK, MemoryRegion,
    REQUEST_TYPE_IN, REQUEST_TYPE_OUT, Request, StatusCode,
};
pub use engine::ProtocolEngine;
