//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers keep device identities, buffer handles and byte
//! counts from being mixed up in the offload and session code.

use std::fmt;
use std::str::FromStr;

use super::errors::ConfigError;

/// Device identity
///
/// Stable key for the lifetime of one physical device instance. Assigned by
/// the [`DeviceRegistry`](crate::device::DeviceRegistry) from the device's
/// identity path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a buffer allocated through a
/// [`DeviceInterface`](crate::device::DeviceInterface)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BO:{}", self.0)
    }
}

/// Hardware trace path of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Trace streams through programmable-fabric I/O into a DMA buffer.
    /// Supports continuous background offload.
    DirectStreaming,
    /// Trace lands in a shared memory region and is read on demand only.
    MemoryMapped,
}

impl FlowKind {
    /// Returns true if continuous offload is permitted for this flow
    #[must_use]
    pub fn supports_continuous(self) -> bool {
        matches!(self, FlowKind::DirectStreaming)
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::DirectStreaming => write!(f, "PLIO"),
            FlowKind::MemoryMapped => write!(f, "GMIO"),
        }
    }
}

/// Offload coordinator status
///
/// `Idle --start_offload--> Running --stop_offload--> Stopped`.
/// `Stopped` is terminal for a coordinator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffloadStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for OffloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffloadStatus::Idle => write!(f, "idle"),
            OffloadStatus::Running => write!(f, "running"),
            OffloadStatus::Stopped => write!(f, "stopped"),
        }
    }
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Size in bytes
///
/// Parses the `8M` / `512K` / `1G` notation used in trace configuration.
/// Suffixes are case-insensitive powers of 1024; a bare number is bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    /// Parse a size string such as `"64M"`
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidSize`] if the value is empty, has an
    /// unknown suffix, or overflows `u64`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        let invalid = || ConfigError::InvalidSize(input.to_string());

        let split = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(trimmed.len());
        let (digits, suffix) = trimmed.split_at(split);
        if digits.is_empty() {
            return Err(invalid());
        }

        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let multiplier = match suffix.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" => KIB,
            "M" | "MB" => MIB,
            "G" | "GB" => GIB,
            _ => return Err(invalid()),
        };

        value.checked_mul(multiplier).map(ByteSize).ok_or_else(invalid)
    }

    /// Size in mebibytes
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_mib(self) -> f64 {
        self.0 as f64 / MIB as f64
    }

    #[must_use]
    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ByteSize::parse(s)
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        ByteSize(bytes)
    }
}

impl fmt::Display for ByteSize {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes >= GIB {
            write!(f, "{:.2}GB", bytes as f64 / GIB as f64)
        } else if bytes >= MIB {
            write!(f, "{:.2}MB", bytes as f64 / MIB as f64)
        } else if bytes >= KIB {
            write!(f, "{:.2}KB", bytes as f64 / KIB as f64)
        } else {
            write!(f, "{bytes}B")
        }
    }
}
