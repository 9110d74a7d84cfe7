//! Structured error types for tracedrain
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::{BufferHandle, DeviceId, OffloadStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by a device handle or its Device Interface
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Insufficient device memory: requested {requested} bytes, {available} available")]
    InsufficientMemory { requested: u64, available: u64 },

    #[error("Unknown buffer {0}")]
    UnknownBuffer(BufferHandle),

    #[error("Debug IP layout unavailable: {0}")]
    LayoutUnavailable(String),

    #[error("No trace datamover for stream {0}")]
    NoSuchStream(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of an Offload Coordinator
#[derive(Error, Debug)]
pub enum OffloadError {
    #[error("Trace buffer of {total} bytes is too small for {streams} streams")]
    ZeroBufferSize { total: u64, streams: usize },

    #[error("Failed to allocate {size} byte trace buffer for stream {stream}: {source}")]
    AllocationFailed {
        stream: usize,
        size: u64,
        #[source]
        source: DeviceError,
    },

    #[error("Trace buffers have not been allocated")]
    NotAllocated,

    #[error("Failed to start offload thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Cannot {operation} while offload is {status}")]
    InvalidTransition { operation: &'static str, status: OffloadStatus },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Outcome of a device activation that did not produce a session
///
/// None of these are fatal: the device simply runs untraced.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Device {0} has no trace streams")]
    ZeroStreamsAvailable(DeviceId),

    #[error("Trace buffer allocation failed for device {device}: {source}")]
    BufferAllocationFailed {
        device: DeviceId,
        #[source]
        source: OffloadError,
    },

    #[error("Unable to read debug IP layout for device {device}: {source}")]
    DeviceInterface {
        device: DeviceId,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    Output(#[from] ExportError),
}

/// Failures writing trace output
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failures loading trace configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid buffer size: {0:?}")]
    InvalidSize(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
