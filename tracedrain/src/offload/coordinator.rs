//! Per-device Offload Coordinator
//!
//! Owns the trace buffers of one activated device and the optional
//! background thread that drains them continuously.
//!
//! ## Lifecycle
//!
//! ```text
//! new ─▶ allocate_buffers ─▶ [start_offload ─▶ Running ─▶ stop_offload ─▶ Stopped]
//!                                   │                                        │
//!                                   └──────────── read_trace(final) ◀────────┘
//!                                                        │
//!                                                 end_read_trace
//! ```
//!
//! `Stopped` is terminal; a new activation always builds a new coordinator.
//! Dropping a coordinator stops its thread and releases its buffers without
//! a final drain.

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use tracedrain_common::{DEFAULT_OFFLOAD_INTERVAL_US, TS2MM_BUF_ALIGN};

use super::drain::{release_all, Drain, DrainStats, StreamBuffer};
use super::worker::{OffloadWorker, StatusCell};
use crate::device::DeviceInterface;
use crate::domain::{DeviceId, FlowKind, OffloadError, OffloadStatus};
use crate::sink::TraceSink;

pub struct OffloadCoordinator {
    device: DeviceId,
    flow: FlowKind,
    buffer_size: u64,
    stream_count: usize,
    continuous: bool,
    offload_interval: Duration,
    drain: Arc<Drain>,
    status: Arc<StatusCell>,
    worker: Option<OffloadWorker>,
}

impl OffloadCoordinator {
    /// Create a coordinator in the `Idle` state with no buffers allocated
    #[must_use]
    pub fn new(
        device: DeviceId,
        interface: Arc<dyn DeviceInterface>,
        sink: Arc<dyn TraceSink>,
        flow: FlowKind,
        buffer_size: u64,
        stream_count: usize,
    ) -> Self {
        Self {
            device,
            flow,
            buffer_size,
            stream_count,
            continuous: false,
            offload_interval: Duration::from_micros(DEFAULT_OFFLOAD_INTERVAL_US),
            drain: Arc::new(Drain::new(device, interface, sink)),
            status: Arc::new(StatusCell::default()),
            worker: None,
        }
    }

    /// Enable continuous offload. Must be called before
    /// [`allocate_buffers`](Self::allocate_buffers).
    pub fn set_continuous_trace(&mut self) {
        self.continuous = true;
    }

    pub fn set_offload_interval(&mut self, interval: Duration) {
        self.offload_interval = interval;
    }

    #[must_use]
    pub fn continuous_trace(&self) -> bool {
        self.continuous
    }

    #[must_use]
    pub fn offload_interval(&self) -> Duration {
        self.offload_interval
    }

    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    #[must_use]
    pub fn flow(&self) -> FlowKind {
        self.flow
    }

    /// Total trace buffer size across all streams
    #[must_use]
    pub fn buffer_size(&self) -> u64 {
        self.buffer_size
    }

    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.stream_count
    }

    /// Size of each per-stream buffer: an even share of the total, aligned
    /// down to the datamover's page size
    #[must_use]
    pub fn stream_buffer_size(&self) -> u64 {
        if self.stream_count == 0 {
            return 0;
        }
        (self.buffer_size / self.stream_count as u64) & !(TS2MM_BUF_ALIGN - 1)
    }

    #[must_use]
    pub fn status(&self) -> OffloadStatus {
        self.status.get()
    }

    #[must_use]
    pub fn stats(&self) -> DrainStats {
        self.drain.stats()
    }

    /// Reserve one buffer per stream through the Device Interface.
    ///
    /// Does not retry with smaller sizes; the caller pre-caps the total.
    /// Calling again once allocated is a no-op.
    ///
    /// # Errors
    /// Returns [`OffloadError::ZeroBufferSize`] if the per-stream share is
    /// zero, or [`OffloadError::AllocationFailed`] if the device rejects any
    /// buffer. Buffers obtained before the failure are released first.
    pub fn allocate_buffers(&mut self) -> Result<(), OffloadError> {
        if self.drain.is_allocated() {
            return Ok(());
        }

        let size = self.stream_buffer_size();
        if size == 0 {
            return Err(OffloadError::ZeroBufferSize { total: self.buffer_size, streams: self.stream_count });
        }

        let interface = self.drain.interface();
        let mut buffers = Vec::with_capacity(self.stream_count);
        for stream in 0..self.stream_count {
            // Memory-mapped flow always lands in bank 0
            let bank = match self.flow {
                FlowKind::DirectStreaming => interface.stream_memory_bank(stream),
                FlowKind::MemoryMapped => Ok(0),
            };
            let allocated = bank.and_then(|bank| interface.allocate_buffer(bank, size));

            match allocated {
                Ok(handle) => buffers.push(StreamBuffer { stream, handle, size }),
                Err(source) => {
                    // Best effort: the allocation error is what the caller needs to see
                    let _ = release_all(self.device, interface, &buffers);
                    return Err(OffloadError::AllocationFailed { stream, size, source });
                }
            }
        }

        debug!(
            "Allocated {} trace buffers of {size} bytes for device {} ({})",
            buffers.len(),
            self.device,
            self.flow
        );
        self.drain.install(buffers);
        Ok(())
    }

    /// Start the background drain thread.
    ///
    /// A no-op if already `Running`. If the thread cannot be spawned the
    /// coordinator falls back to non-continuous offload.
    ///
    /// # Errors
    /// Returns [`OffloadError::InvalidTransition`] once `Stopped`,
    /// [`OffloadError::NotAllocated`] before buffers exist, or
    /// [`OffloadError::WorkerSpawn`] if the thread cannot be created.
    pub fn start_offload(&mut self) -> Result<(), OffloadError> {
        match self.status.get() {
            OffloadStatus::Running => return Ok(()),
            OffloadStatus::Stopped => {
                return Err(OffloadError::InvalidTransition {
                    operation: "start offload",
                    status: OffloadStatus::Stopped,
                })
            }
            OffloadStatus::Idle => {}
        }
        if !self.drain.is_allocated() {
            return Err(OffloadError::NotAllocated);
        }

        self.status.set(OffloadStatus::Running);
        match OffloadWorker::spawn(
            self.device,
            Arc::clone(&self.drain),
            Arc::clone(&self.status),
            self.offload_interval,
        ) {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                // Trace is then only offloaded by the caller's final drain
                self.continuous = false;
                self.status.set(OffloadStatus::Idle);
                Err(OffloadError::WorkerSpawn(e))
            }
        }
    }

    /// Signal the background thread to exit after its current iteration.
    ///
    /// Returns immediately; the status stays `Running` until the thread has
    /// left its loop. Use [`wait_until_stopped`](Self::wait_until_stopped)
    /// before treating the buffers as quiescent.
    pub fn stop_offload(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            worker.signal_stop();
        }
    }

    /// Block until the background thread has reached `Stopped` and been
    /// joined. Returns immediately if offload was never started.
    pub fn wait_until_stopped(&mut self) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        self.status.wait_while_running();
        worker.join();
    }

    /// Drain currently available trace data into the sink.
    ///
    /// `final_read` additionally flushes residual data once the device has
    /// stopped producing. Safe to call in any status: drains are serialized
    /// with the background thread's.
    ///
    /// # Errors
    /// Returns the first Device Interface error of the pass.
    pub fn read_trace(&self, final_read: bool) -> Result<u64, OffloadError> {
        self.drain.read_trace(final_read)
    }

    /// Whether any datamover has reported a full buffer during this
    /// coordinator's lifetime. Draining does not reset it.
    #[must_use]
    pub fn is_trace_buffer_full(&self) -> bool {
        self.drain.is_full()
    }

    /// Release the trace buffers. Idempotent.
    ///
    /// # Errors
    /// Returns [`OffloadError::InvalidTransition`] while `Running`, or the
    /// first release failure reported by the device.
    pub fn end_read_trace(&mut self) -> Result<(), OffloadError> {
        let status = self.status.get();
        if status == OffloadStatus::Running {
            return Err(OffloadError::InvalidTransition { operation: "release trace buffers", status });
        }
        self.drain.release()
    }
}

impl Drop for OffloadCoordinator {
    fn drop(&mut self) {
        self.stop_offload();
        self.wait_until_stopped();
        if let Err(e) = self.end_read_trace() {
            warn!("Failed to release trace buffers for device {}: {e}", self.device);
        }
    }
}
