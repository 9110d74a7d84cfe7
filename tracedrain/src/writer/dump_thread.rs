//! Periodic flush of trace files while offload is running

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, warn};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::OutputDirectory;

pub struct DumpThread {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DumpThread {
    /// Flush every writer of `output` each `interval` until stopped
    ///
    /// # Errors
    /// Returns the spawn error if the thread cannot be created.
    pub fn spawn(output: Arc<OutputDirectory>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new().name("trace-file-dump".to_string()).spawn(move || {
            debug!("Trace file dump every {interval:?}");
            while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(interval) {
                if let Err(e) = output.flush_all() {
                    warn!("Periodic trace file dump failed: {e}");
                }
            }
        })?;
        Ok(Self { stop_tx: Some(stop_tx), handle: Some(handle) })
    }

    /// Stop and join the thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Trace file dump thread panicked");
            }
        }
    }
}

impl Drop for DumpThread {
    fn drop(&mut self) {
        self.stop();
    }
}
