//! Trace sink: where drained trace bytes go
//!
//! The offload core hands every non-empty buffer read to a [`TraceSink`] as a
//! [`TracePacket`]. Sinks are shared (`Arc`) and outlive the coordinators
//! that feed them; they know nothing about hardware buffer layout.

use std::sync::{Mutex, PoisonError};

use crate::domain::DeviceId;

/// Bytes drained from one trace stream of one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePacket {
    pub device: DeviceId,
    pub stream: usize,
    pub data: Vec<u8>,
}

impl TracePacket {
    /// Iterate the packet as little-endian 32-bit trace words.
    /// A trailing partial word is ignored.
    pub fn words(&self) -> impl Iterator<Item = u32> + '_ {
        self.data
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }
}

/// Consumer of drained trace data
///
/// Called from the background offload thread as well as from the caller's
/// thread, so implementations synchronise internally.
pub trait TraceSink: Send + Sync {
    fn emit(&self, packet: TracePacket);
}

/// Sink that keeps every packet in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    packets: Mutex<Vec<TracePacket>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the packets received so far
    #[must_use]
    pub fn packets(&self) -> Vec<TracePacket> {
        self.packets.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Total bytes received for `device`
    #[must_use]
    pub fn bytes_for(&self, device: DeviceId) -> usize {
        self.packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.device == device)
            .map(|p| p.data.len())
            .sum()
    }
}

impl TraceSink for MemorySink {
    fn emit(&self, packet: TracePacket) {
        self.packets.lock().unwrap_or_else(PoisonError::into_inner).push(packet);
    }
}
