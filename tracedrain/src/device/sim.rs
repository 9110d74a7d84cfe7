//! Software model of a trace-producing device
//!
//! Each allocated buffer behaves like a non-circular datamover: words are
//! produced either at a fixed byte rate (driven by wall-clock time and
//! materialised lazily on every read) or explicitly via
//! [`SimulatedDevice::inject`]. When production outruns the space left in the
//! buffer the excess words are dropped and the full flag latches, just as
//! hardware reports a buffer overflow.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracedrain_common::{
    Ts2mmStatus, TRACE_WORD_BYTES, TS2MM_STATUS_FULL, TS2MM_STATUS_IDLE,
};

use super::{BufferRead, DeviceHandle, DeviceInterface, DeviceMetadata, MemoryResource};
use crate::domain::{BufferHandle, DeviceError};

/// Call counters of a simulated device, shared with its interface
#[derive(Debug, Default)]
pub struct SimCounters {
    allocations: AtomicUsize,
    releases: AtomicUsize,
    reads: AtomicUsize,
    final_reads: AtomicUsize,
    interfaces_opened: AtomicUsize,
}

impl SimCounters {
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Reads issued with `final_read = true`
    #[must_use]
    pub fn final_reads(&self) -> usize {
        self.final_reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn interfaces_opened(&self) -> usize {
        self.interfaces_opened.load(Ordering::SeqCst)
    }
}

struct SimBuffer {
    /// Distinguishes words of different buffers in the generated pattern
    tag: u32,
    bank: u8,
    capacity: u64,
    pending: VecDeque<u32>,
    word_count: u64,
    generated: u64,
    full: bool,
    allocated_at: Instant,
}

impl SimBuffer {
    fn push_words(&mut self, count: u64) {
        let capacity_words = self.capacity / TRACE_WORD_BYTES;
        for _ in 0..count {
            let seq = self.generated;
            self.generated += 1;
            if self.pending.len() as u64 >= capacity_words {
                self.full = true;
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            self.pending.push_back((self.tag << 24) | (seq as u32 & 0x00FF_FFFF));
            self.word_count += 1;
        }
    }

    /// Materialise the words a rate-driven producer would have written by now
    fn catch_up(&mut self, bytes_per_sec: u64) {
        if bytes_per_sec == 0 {
            return;
        }
        let elapsed_ns = self.allocated_at.elapsed().as_nanos();
        let expected = elapsed_ns * u128::from(bytes_per_sec)
            / 1_000_000_000
            / u128::from(TRACE_WORD_BYTES);
        let expected = u64::try_from(expected).unwrap_or(u64::MAX);
        if expected > self.generated {
            self.push_words(expected - self.generated);
        }
    }

    fn status(&self, final_read: bool) -> Ts2mmStatus {
        let mut flags = 0;
        if self.full {
            flags |= TS2MM_STATUS_FULL;
        }
        if final_read {
            flags |= TS2MM_STATUS_IDLE;
        }
        Ts2mmStatus::new(self.word_count, flags)
    }
}

/// Reads that fail with an I/O error: every buffer, or only `buffer`
struct ReadFailure {
    buffer: Option<BufferHandle>,
    reason: String,
}

struct SimInner {
    next_handle: u64,
    buffers: HashMap<BufferHandle, SimBuffer>,
    bank_usage: HashMap<u8, u64>,
    production_rate: u64,
    allocation_limit: Option<u64>,
    stream_bank: u8,
    read_failure: Option<ReadFailure>,
}

struct SimState {
    streams: usize,
    banks: Vec<MemoryResource>,
    counters: SimCounters,
    inner: Mutex<SimInner>,
}

impl SimState {
    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A simulated device: both the [`DeviceHandle`] and, once opened, the
/// [`DeviceInterface`] share the same state
pub struct SimulatedDevice {
    path: String,
    metadata: DeviceMetadata,
    layout_error: Option<String>,
    state: Arc<SimState>,
}

impl SimulatedDevice {
    /// Create a device with no automatic production
    #[must_use]
    pub fn new(path: impl Into<String>, metadata: DeviceMetadata) -> Self {
        let state = SimState {
            streams: metadata.trace_streams(),
            banks: metadata.memory_banks.clone(),
            counters: SimCounters::default(),
            inner: Mutex::new(SimInner {
                next_handle: 1,
                buffers: HashMap::new(),
                bank_usage: HashMap::new(),
                production_rate: 0,
                allocation_limit: None,
                stream_bank: 0,
                read_failure: None,
            }),
        };
        Self { path: path.into(), metadata, layout_error: None, state: Arc::new(state) }
    }

    /// Produce trace at `bytes_per_sec` into every live buffer
    #[must_use]
    pub fn with_production_rate(self, bytes_per_sec: u64) -> Self {
        self.state.lock().production_rate = bytes_per_sec;
        self
    }

    /// Reject any single allocation larger than `bytes`, modelling a
    /// contiguous-memory limit the topology does not report
    #[must_use]
    pub fn with_allocation_limit(self, bytes: u64) -> Self {
        self.state.lock().allocation_limit = Some(bytes);
        self
    }

    /// Memory bank reported for every direct-streaming datamover
    #[must_use]
    pub fn with_stream_bank(self, bank: u8) -> Self {
        self.state.lock().stream_bank = bank;
        self
    }

    /// Make every buffer read fail with an I/O error carrying `reason`
    #[must_use]
    pub fn with_read_failure(self, reason: impl Into<String>) -> Self {
        self.state.lock().read_failure = Some(ReadFailure { buffer: None, reason: reason.into() });
        self
    }

    /// Make reads of `buffer` alone fail with an I/O error carrying `reason`.
    /// Handles are numbered from 1 in allocation order.
    #[must_use]
    pub fn with_read_failure_on(self, buffer: BufferHandle, reason: impl Into<String>) -> Self {
        self.state.lock().read_failure = Some(ReadFailure { buffer: Some(buffer), reason: reason.into() });
        self
    }

    /// Make [`DeviceHandle::open_interface`] fail with `reason`
    #[must_use]
    pub fn with_broken_layout(mut self, reason: impl Into<String>) -> Self {
        self.layout_error = Some(reason.into());
        self
    }

    /// Write `words` trace words into every live buffer
    pub fn inject(&self, words: u64) {
        let mut inner = self.state.lock();
        for buffer in inner.buffers.values_mut() {
            buffer.push_words(words);
        }
    }

    /// Buffers currently allocated and not yet released
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Sizes of the live buffers, smallest first
    #[must_use]
    pub fn live_buffer_sizes(&self) -> Vec<u64> {
        let mut sizes: Vec<u64> = self.state.lock().buffers.values().map(|b| b.capacity).collect();
        sizes.sort_unstable();
        sizes
    }

    #[must_use]
    pub fn counters(&self) -> &SimCounters {
        &self.state.counters
    }
}

impl DeviceHandle for SimulatedDevice {
    fn identity_path(&self) -> String {
        self.path.clone()
    }

    fn metadata(&self) -> Result<DeviceMetadata, DeviceError> {
        Ok(self.metadata.clone())
    }

    fn open_interface(&self) -> Result<Arc<dyn DeviceInterface>, DeviceError> {
        if let Some(reason) = &self.layout_error {
            return Err(DeviceError::LayoutUnavailable(reason.clone()));
        }
        self.state.counters.interfaces_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SimInterface { state: Arc::clone(&self.state) }))
    }
}

struct SimInterface {
    state: Arc<SimState>,
}

impl DeviceInterface for SimInterface {
    fn stream_memory_bank(&self, stream: usize) -> Result<u8, DeviceError> {
        if stream >= self.state.streams {
            return Err(DeviceError::NoSuchStream(stream));
        }
        Ok(self.state.lock().stream_bank)
    }

    fn allocate_buffer(&self, bank: u8, size: u64) -> Result<BufferHandle, DeviceError> {
        let mut inner = self.state.lock();

        if let Some(limit) = inner.allocation_limit {
            if size > limit {
                return Err(DeviceError::InsufficientMemory { requested: size, available: limit });
            }
        }

        let used = inner.bank_usage.get(&bank).copied().unwrap_or(0);
        if let Some(resource) = self.state.banks.get(usize::from(bank)) {
            if resource.capacity > 0 && used + size > resource.capacity {
                return Err(DeviceError::InsufficientMemory {
                    requested: size,
                    available: resource.capacity.saturating_sub(used),
                });
            }
        }

        let handle = BufferHandle(inner.next_handle);
        inner.next_handle += 1;
        *inner.bank_usage.entry(bank).or_insert(0) += size;

        #[allow(clippy::cast_possible_truncation)]
        let tag = (handle.0 & 0xFF) as u32;
        inner.buffers.insert(
            handle,
            SimBuffer {
                tag,
                bank,
                capacity: size,
                pending: VecDeque::new(),
                word_count: 0,
                generated: 0,
                full: false,
                allocated_at: Instant::now(),
            },
        );
        self.state.counters.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    fn read_buffer(
        &self,
        buffer: BufferHandle,
        final_read: bool,
    ) -> Result<BufferRead, DeviceError> {
        let mut inner = self.state.lock();
        let rate = inner.production_rate;
        if let Some(failure) = &inner.read_failure {
            if failure.buffer.is_none() || failure.buffer == Some(buffer) {
                return Err(std::io::Error::other(failure.reason.clone()).into());
            }
        }
        let buf = inner.buffers.get_mut(&buffer).ok_or(DeviceError::UnknownBuffer(buffer))?;

        buf.catch_up(rate);
        let data: Vec<u8> = buf.pending.drain(..).flat_map(u32::to_le_bytes).collect();
        let status = buf.status(final_read);

        self.state.counters.reads.fetch_add(1, Ordering::SeqCst);
        if final_read {
            self.state.counters.final_reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(BufferRead { data, status })
    }

    fn release_buffer(&self, buffer: BufferHandle) -> Result<(), DeviceError> {
        let mut inner = self.state.lock();
        let buf = inner.buffers.remove(&buffer).ok_or(DeviceError::UnknownBuffer(buffer))?;
        if let Some(used) = inner.bank_usage.get_mut(&buf.bank) {
            *used = used.saturating_sub(buf.capacity);
        }
        self.state.counters.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(
            "/dev/sim0",
            DeviceMetadata {
                name: "sim".to_string(),
                direct_streams: 2,
                memory_mapped_streams: 0,
                memory_banks: vec![MemoryResource::new("DDR[0]", 64 * 1024)],
                ps_memory_size: 0,
            },
        )
    }

    #[test]
    fn test_inject_then_read_drains_everything() {
        let dev = device();
        let intf = dev.open_interface().unwrap();
        let handle = intf.allocate_buffer(0, 4096).unwrap();

        dev.inject(10);
        let read = intf.read_buffer(handle, false).unwrap();
        assert_eq!(read.data.len(), 40);
        assert_eq!(read.status.word_count, 10);
        assert!(!read.status.is_full());

        let again = intf.read_buffer(handle, true).unwrap();
        assert!(again.data.is_empty());
        assert!(again.status.is_idle());
        assert_eq!(dev.counters().reads(), 2);
        assert_eq!(dev.counters().final_reads(), 1);
    }

    #[test]
    fn test_overflow_latches_full_flag() {
        let dev = device();
        let intf = dev.open_interface().unwrap();
        let handle = intf.allocate_buffer(0, 16).unwrap();

        dev.inject(10); // 4 words fit
        let read = intf.read_buffer(handle, false).unwrap();
        assert_eq!(read.data.len(), 16);
        assert!(read.status.is_full());

        // Hardware flag stays set after draining
        let read = intf.read_buffer(handle, false).unwrap();
        assert!(read.status.is_full());
    }

    #[test]
    fn test_bank_capacity_enforced() {
        let dev = device();
        let intf = dev.open_interface().unwrap();
        let first = intf.allocate_buffer(0, 48 * 1024).unwrap();
        let err = intf.allocate_buffer(0, 32 * 1024).unwrap_err();
        assert!(matches!(err, DeviceError::InsufficientMemory { available, .. } if available == 16 * 1024));

        intf.release_buffer(first).unwrap();
        assert!(intf.allocate_buffer(0, 32 * 1024).is_ok());
    }

    #[test]
    fn test_allocation_limit() {
        let dev = device().with_allocation_limit(1024);
        let intf = dev.open_interface().unwrap();
        assert!(intf.allocate_buffer(0, 2048).is_err());
        assert!(intf.allocate_buffer(0, 1024).is_ok());
    }

    #[test]
    fn test_release_unknown_buffer() {
        let dev = device();
        let intf = dev.open_interface().unwrap();
        let handle = intf.allocate_buffer(0, 1024).unwrap();
        intf.release_buffer(handle).unwrap();
        assert!(matches!(intf.release_buffer(handle), Err(DeviceError::UnknownBuffer(_))));
        assert_eq!(dev.counters().releases(), 1);
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn test_stream_bank_bounds() {
        let dev = device().with_stream_bank(1);
        let intf = dev.open_interface().unwrap();
        assert_eq!(intf.stream_memory_bank(1).unwrap(), 1);
        assert!(intf.stream_memory_bank(2).is_err());
    }

    #[test]
    fn test_read_failure_on_one_buffer() {
        let dev = device().with_read_failure_on(BufferHandle(2), "AXI read timed out");
        let intf = dev.open_interface().expect("Failed to open interface");
        let healthy = intf.allocate_buffer(0, 1024).expect("Failed to allocate buffer");
        let broken = intf.allocate_buffer(0, 1024).expect("Failed to allocate buffer");
        assert_eq!(broken, BufferHandle(2));

        dev.inject(2);
        let err = intf.read_buffer(broken, true).expect_err("Read of broken buffer succeeded");
        assert!(matches!(err, DeviceError::Io(_)));
        assert!(err.to_string().contains("AXI read timed out"));
        assert_eq!(intf.read_buffer(healthy, true).expect("Failed to read buffer").data.len(), 8);

        // Failed reads are not counted
        assert_eq!(dev.counters().reads(), 1);
        assert_eq!(dev.counters().final_reads(), 1);

        // Release still works
        intf.release_buffer(broken).expect("Failed to release buffer");
        assert_eq!(dev.live_buffers(), 1);
    }

    #[test]
    fn test_read_failure_on_every_buffer() {
        let dev = device().with_read_failure("device removed");
        let intf = dev.open_interface().expect("Failed to open interface");
        let handle = intf.allocate_buffer(0, 1024).expect("Failed to allocate buffer");
        assert!(matches!(intf.read_buffer(handle, false), Err(DeviceError::Io(_))));
    }

    #[test]
    fn test_rate_driven_production() {
        let dev = device().with_production_rate(4_000_000);
        let intf = dev.open_interface().unwrap();
        let handle = intf.allocate_buffer(0, 64 * 1024).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let read = intf.read_buffer(handle, false).unwrap();
        assert!(!read.data.is_empty());
        assert_eq!(read.data.len() % 4, 0);
    }
}
