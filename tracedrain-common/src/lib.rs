//! # Shared Hardware Definitions (Device ↔ Host)
//!
//! Constants and register layouts shared between the device-side trace
//! datamover (TS2MM, "trace stream to memory") and the host-side offload
//! code. All register snapshots use `#[repr(C)]` so the layout matches what
//! the datamover exposes over its control interface.
//!
//! ## Key Types
//!
//! - [`Ts2mmStatus`] - Snapshot of one datamover's progress and status bits
//!
//! ## Buffer Limits
//!
//! Trace buffers live in device memory banks that are small relative to the
//! trace data rate. The host clamps requested sizes into
//! [`TS2MM_MIN_BUF_SIZE`]..=[`TS2MM_MAX_BUF_SIZE`] and splits the total evenly
//! across streams, aligned down to [`TS2MM_BUF_ALIGN`].

#![no_std]

// ============================================================================
// Buffer Sizing
// ============================================================================

/// Size in bytes of one trace word written by the datamover
pub const TRACE_WORD_BYTES: u64 = 4;

/// Per-stream buffers are aligned down to this boundary (4 KiB page)
pub const TS2MM_BUF_ALIGN: u64 = 0x1000;

/// Smallest total trace buffer the host will request (8 KiB)
pub const TS2MM_MIN_BUF_SIZE: u64 = 8 * 1024;

/// Largest total trace buffer the host will request (4 GiB)
///
/// The datamover's address counter is 32 bits wide.
pub const TS2MM_MAX_BUF_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Default requested trace buffer size when nothing is configured (8 MiB)
pub const DEFAULT_TRACE_BUF_SIZE: u64 = 8 * 1024 * 1024;

/// Default delay between background drains, in microseconds
pub const DEFAULT_OFFLOAD_INTERVAL_US: u64 = 100;

/// Default delay between periodic file dumps, in seconds
pub const DEFAULT_FILE_DUMP_INTERVAL_S: u64 = 5;

/// Upper bound on the share of processing-system memory an embedded
/// platform hands to trace buffers, in percent
pub const PS_MEMORY_MAX_PERCENT: u64 = 80;

// ============================================================================
// Status Bits
// ============================================================================

/// The datamover hit the end of a non-circular buffer and dropped words
pub const TS2MM_STATUS_FULL: u32 = 1 << 0;

/// The datamover has been stopped and will write no further words
pub const TS2MM_STATUS_IDLE: u32 = 1 << 2;

// ============================================================================
// Register Snapshots
// ============================================================================

/// Progress and status of one trace datamover
///
/// Read by the host after every buffer read. `word_count` is the total number
/// of words the datamover has written since the buffer was attached.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ts2mmStatus {
    /// Words written since the buffer was attached
    pub word_count: u64,

    /// Bitwise OR of `TS2MM_STATUS_*` flags
    pub flags: u32,

    /// Padding for 8-byte alignment
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,
}

impl Ts2mmStatus {
    /// Build a snapshot from a word count and status flags
    #[must_use]
    pub const fn new(word_count: u64, flags: u32) -> Self {
        Self { word_count, flags, _padding: 0 }
    }

    /// Returns true if the datamover reported a full buffer
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.flags & TS2MM_STATUS_FULL != 0
    }

    /// Returns true if the datamover has stopped producing
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.flags & TS2MM_STATUS_IDLE != 0
    }

    /// Bytes written since the buffer was attached
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.word_count * TRACE_WORD_BYTES
    }
}
