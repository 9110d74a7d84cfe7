//! Buffer drain shared by the caller and the background offload thread
//!
//! All access to the allocated stream buffers goes through one mutex, so two
//! drains of the same coordinator can never overlap no matter which thread
//! issues them.

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::device::DeviceInterface;
use crate::domain::{BufferHandle, DeviceId, OffloadError};
use crate::sink::{TracePacket, TraceSink};

/// One allocated per-stream trace buffer
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamBuffer {
    pub stream: usize,
    pub handle: BufferHandle,
    pub size: u64,
}

/// Running totals for one coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Completed drain passes (every stream read once per pass)
    pub drains: u64,
    /// Bytes handed to the sink
    pub bytes: u64,
}

pub(crate) struct Drain {
    device: DeviceId,
    interface: Arc<dyn DeviceInterface>,
    sink: Arc<dyn TraceSink>,
    buffers: Mutex<Vec<StreamBuffer>>,
    buffer_full: AtomicBool,
    drains: AtomicU64,
    bytes: AtomicU64,
}

impl Drain {
    pub fn new(device: DeviceId, interface: Arc<dyn DeviceInterface>, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            device,
            interface,
            sink,
            buffers: Mutex::new(Vec::new()),
            buffer_full: AtomicBool::new(false),
            drains: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StreamBuffer>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interface(&self) -> &dyn DeviceInterface {
        self.interface.as_ref()
    }

    pub fn install(&self, buffers: Vec<StreamBuffer>) {
        *self.lock() = buffers;
    }

    pub fn is_allocated(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer_full.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> DrainStats {
        DrainStats { drains: self.drains.load(Ordering::SeqCst), bytes: self.bytes.load(Ordering::SeqCst) }
    }

    /// Read every stream buffer once and forward the bytes to the sink.
    ///
    /// A failing stream does not stop the others from being drained; the
    /// first error is returned after the pass completes.
    pub fn read_trace(&self, final_read: bool) -> Result<u64, OffloadError> {
        let buffers = self.lock();
        let mut total = 0u64;
        let mut first_error = None;

        for buffer in buffers.iter() {
            let read = match self.interface.read_buffer(buffer.handle, final_read) {
                Ok(read) => read,
                Err(e) => {
                    first_error.get_or_insert(OffloadError::Device(e));
                    continue;
                }
            };

            if read.status.is_full() && !self.buffer_full.swap(true, Ordering::SeqCst) {
                debug!("Trace buffer for device {} stream {} reached capacity", self.device, buffer.stream);
            }
            if read.data.is_empty() {
                continue;
            }

            total += read.data.len() as u64;
            self.sink.emit(TracePacket { device: self.device, stream: buffer.stream, data: read.data });
        }
        drop(buffers);

        self.drains.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(total, Ordering::SeqCst);

        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    /// Release every buffer. Later calls find nothing to release.
    pub fn release(&self) -> Result<(), OffloadError> {
        let buffers = std::mem::take(&mut *self.lock());
        release_all(self.device, self.interface.as_ref(), &buffers)
    }
}

/// Release `buffers`, continuing past failures and reporting the first one
pub(crate) fn release_all(
    device: DeviceId,
    interface: &dyn DeviceInterface,
    buffers: &[StreamBuffer],
) -> Result<(), OffloadError> {
    let mut first_error = None;
    for buffer in buffers {
        if let Err(e) = interface.release_buffer(buffer.handle) {
            warn!("Failed to release trace buffer {} of device {device}: {e}", buffer.handle);
            first_error.get_or_insert(OffloadError::Device(e));
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
