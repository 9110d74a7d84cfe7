//! Background offload thread
//!
//! The thread sleeps on the stop channel for one offload interval, drains,
//! and repeats. Dropping the stop sender disconnects the channel, which wakes
//! the sleep immediately; an in-flight drain always completes first because
//! the channel is only checked between drains.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, warn};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use super::drain::Drain;
use crate::domain::{DeviceId, OffloadStatus};

/// Offload status published to waiters
#[derive(Debug, Default)]
pub(crate) struct StatusCell {
    status: Mutex<OffloadStatus>,
    changed: Condvar,
}

impl StatusCell {
    fn lock(&self) -> MutexGuard<'_, OffloadStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> OffloadStatus {
        *self.lock()
    }

    pub fn set(&self, status: OffloadStatus) {
        *self.lock() = status;
        self.changed.notify_all();
    }

    /// Block until the status is no longer `Running`
    pub fn wait_while_running(&self) {
        let guard = self.lock();
        let _guard = self
            .changed
            .wait_while(guard, |status| *status == OffloadStatus::Running)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Marks the status `Stopped` when the thread leaves its loop, including by
/// panic, so waiters are always released
struct StoppedOnExit(Arc<StatusCell>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.set(OffloadStatus::Stopped);
    }
}

pub(crate) struct OffloadWorker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl OffloadWorker {
    /// Spawn the offload thread. The caller must already have published
    /// `Running`.
    pub fn spawn(
        device: DeviceId,
        drain: Arc<Drain>,
        status: Arc<StatusCell>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name(format!("trace-offload-{device}"))
            .spawn(move || {
                let _stopped = StoppedOnExit(status);
                debug!("Continuous trace offload started for device {device} ({interval:?} interval)");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(e) = drain.read_trace(false) {
                                warn!("Continuous trace offload for device {device} failed: {e}");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Continuous trace offload stopped for device {device}");
            })?;

        Ok(Self { stop_tx: Some(stop_tx), handle: Some(handle) })
    }

    /// Ask the thread to exit after its current iteration
    pub fn signal_stop(&mut self) {
        self.stop_tx.take();
    }

    /// Reap the thread. Only call once the status is `Stopped`.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Trace offload thread panicked");
            }
        }
    }
}
