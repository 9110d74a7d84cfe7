//! Session Manager: per-device trace session lifecycle
//!
//! ```text
//!  on_device_activated ──▶ size buffer ──▶ OffloadCoordinator ──▶ [start_offload]
//!          │                                                              │
//!  on_flush ─────────────────────── read_trace(final) ◀───────────────────┤
//!          │                                                              │
//!  on_finish / on_shutdown ──▶ stop ──▶ wait Stopped ──▶ final drain ──▶ release
//! ```
//!
//! At most one [`DeviceSession`] exists per device id. Re-activation replaces
//! the previous session without draining it.

pub mod diagnostics;
pub mod manager;
pub mod sizing;

pub use diagnostics::Diagnostic;
pub use manager::SessionManager;

use std::time::Duration;

use crate::domain::{DeviceId, FlowKind, OffloadStatus};
use crate::offload::OffloadCoordinator;

/// One activated device and the coordinator that owns its trace buffers
pub struct DeviceSession {
    id: DeviceId,
    stream_count: usize,
    flow: FlowKind,
    buffer_size: u64,
    offload_interval: Duration,
    coordinator: OffloadCoordinator,
}

impl DeviceSession {
    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.stream_count
    }

    #[must_use]
    pub fn flow(&self) -> FlowKind {
        self.flow
    }

    /// Total buffer size across all streams, after every cap
    #[must_use]
    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    /// Whether a background offload thread was started
    #[must_use]
    pub fn continuous(&self) -> bool {
        self.coordinator.continuous_trace()
    }

    #[must_use]
    pub fn offload_interval(&self) -> Duration {
        self.offload_interval
    }

    #[must_use]
    pub fn status(&self) -> OffloadStatus {
        self.coordinator.status()
    }

    #[must_use]
    pub fn coordinator(&self) -> &OffloadCoordinator {
        &self.coordinator
    }
}
