//! Device-facing collaborators
//!
//! The offload core never touches hardware directly. It works through:
//!
//! - [`DeviceHandle`]: the host's handle to one physical device. Borrowed by
//!   the core for the duration of a call, never owned.
//! - [`DeviceInterface`]: low-level buffer primitives (allocate, read,
//!   release) for the trace datamovers of one device. Shared between the
//!   registry cache and the live session.
//! - [`DeviceRegistry`]: static device information keyed by [`DeviceId`].
//!
//! [`SimulatedDevice`] implements both traits in software for the binary and
//! the test suite.
//!
//! [`DeviceId`]: crate::domain::DeviceId

pub mod registry;
pub mod sim;

use std::sync::Arc;

use tracedrain_common::Ts2mmStatus;

use crate::domain::{BufferHandle, DeviceError};

pub use registry::DeviceRegistry;
pub use sim::{SimCounters, SimulatedDevice};

/// A fixed-capacity device memory bank
///
/// Only used to cap requested trace buffer sizes; never mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryResource {
    /// Bank name from the memory topology (e.g. `DDR[0]`)
    pub tag: String,
    /// Total capacity in bytes; `0` when the topology does not report it
    pub capacity: u64,
}

impl MemoryResource {
    #[must_use]
    pub fn new(tag: impl Into<String>, capacity: u64) -> Self {
        Self { tag: tag.into(), capacity }
    }
}

/// Static trace-related information about a loaded device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
    /// Human-readable device name
    pub name: String,
    /// Trace streams routed through programmable-fabric I/O (PLIO)
    pub direct_streams: usize,
    /// Trace streams landing in shared memory (GMIO)
    pub memory_mapped_streams: usize,
    /// Memory banks, indexed by bank number
    pub memory_banks: Vec<MemoryResource>,
    /// Processing-system memory available for trace buffers on embedded
    /// platforms; `0` when not applicable
    pub ps_memory_size: u64,
}

impl DeviceMetadata {
    /// Total number of trace streams across both flows
    #[must_use]
    pub fn trace_streams(&self) -> usize {
        self.direct_streams + self.memory_mapped_streams
    }

    /// Returns true if any direct-streaming trace path exists
    #[must_use]
    pub fn has_direct_streaming(&self) -> bool {
        self.direct_streams > 0
    }

    /// Memory bank by index
    #[must_use]
    pub fn memory(&self, bank: u8) -> Option<&MemoryResource> {
        self.memory_banks.get(usize::from(bank))
    }
}

/// Bytes drained from one trace buffer plus the datamover status observed
/// after the read
#[derive(Debug, Clone, Default)]
pub struct BufferRead {
    pub data: Vec<u8>,
    pub status: Ts2mmStatus,
}

/// Low-level trace buffer access for one device
///
/// Implementations must be safe to call from the background offload thread.
/// The core guarantees that reads of the same buffer never overlap.
pub trait DeviceInterface: Send + Sync {
    /// Memory bank backing the direct-streaming datamover of `stream`
    ///
    /// # Errors
    /// Returns an error if the device has no datamover for `stream`.
    fn stream_memory_bank(&self, stream: usize) -> Result<u8, DeviceError>;

    /// Reserve a trace buffer of `size` bytes in `bank`
    ///
    /// # Errors
    /// Returns an error if the device rejects the size (e.g. insufficient
    /// contiguous memory). Implementations must not retry with a smaller size.
    fn allocate_buffer(&self, bank: u8, size: u64) -> Result<BufferHandle, DeviceError>;

    /// Copy out the trace bytes produced since the previous read
    ///
    /// `final_read` is set once the device has stopped producing so any
    /// residual partial data can be flushed.
    ///
    /// # Errors
    /// Returns an error if the buffer is unknown or the transfer fails.
    fn read_buffer(&self, buffer: BufferHandle, final_read: bool)
        -> Result<BufferRead, DeviceError>;

    /// Release a buffer obtained from [`allocate_buffer`](Self::allocate_buffer)
    ///
    /// # Errors
    /// Returns an error if the buffer is unknown.
    fn release_buffer(&self, buffer: BufferHandle) -> Result<(), DeviceError>;
}

/// Host handle to a physical device
///
/// The core borrows handles only for the duration of a single call.
pub trait DeviceHandle {
    /// Path that stays stable for the lifetime of this device instance
    /// (e.g. the sysfs path of its debug IP layout)
    fn identity_path(&self) -> String;

    /// Read the device's static trace metadata
    ///
    /// # Errors
    /// Returns an error if the metadata cannot be read.
    fn metadata(&self) -> Result<DeviceMetadata, DeviceError>;

    /// Open the low-level interface used to drain trace buffers
    ///
    /// # Errors
    /// Returns an error if the debug IP layout cannot be read.
    fn open_interface(&self) -> Result<Arc<dyn DeviceInterface>, DeviceError>;
}
