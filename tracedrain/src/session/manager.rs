//! Session Manager
//!
//! Reacts to the host's device events:
//!
//! - `on_device_activated`: size the trace buffer, create writers, build and
//!   allocate an [`OffloadCoordinator`], start continuous offload if allowed
//! - `on_flush`: drain the device's buffers without stopping its thread
//! - `on_finish`: stop, drain one last time, release, forget the session
//! - `on_shutdown`: `on_finish` for every remaining session, then write the
//!   output summary
//!
//! Failures of one device never affect another. The manager owns every
//! session; dropping it performs the shutdown sequence.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracedrain_common::{DEFAULT_TRACE_BUF_SIZE, PS_MEMORY_MAX_PERCENT};

use super::{sizing, DeviceSession, Diagnostic};
use crate::config::TraceConfig;
use crate::device::{DeviceHandle, DeviceRegistry};
use crate::domain::{ByteSize, DeviceError, DeviceId, ExportError, FlowKind, SessionError};
use crate::offload::OffloadCoordinator;
use crate::platform::{self, PlatformAccess};
use crate::sink::TraceSink;
use crate::writer::{DumpThread, OutputDirectory, RuntimeConfig};

pub struct SessionManager {
    platform: Box<dyn PlatformAccess>,
    registry: DeviceRegistry,
    output: Arc<OutputDirectory>,
    /// Configured request after bounding, before any per-device cap
    requested_size: u64,
    file_dump_interval: Duration,
    dump_thread: Option<DumpThread>,
    sessions: HashMap<DeviceId, DeviceSession>,
    diagnostics: Vec<Diagnostic>,
    shut_down: bool,
}

impl SessionManager {
    /// Build a manager with the platform variant and output directory named
    /// by `config`
    ///
    /// # Errors
    /// Returns an [`ExportError`] if the output directory cannot be created.
    pub fn new(config: &TraceConfig) -> Result<Self, ExportError> {
        let output = Arc::new(OutputDirectory::new(config.output_dir.clone())?);
        Ok(Self::with_parts(config, platform::from_config(config), output))
    }

    #[must_use]
    pub fn with_parts(
        config: &TraceConfig,
        platform: Box<dyn PlatformAccess>,
        output: Arc<OutputDirectory>,
    ) -> Self {
        let requested = config.requested_buffer_size().unwrap_or_else(|e| {
            warn!("{e}. Using default AIE trace buffer size of {}.", ByteSize(DEFAULT_TRACE_BUF_SIZE));
            ByteSize(DEFAULT_TRACE_BUF_SIZE)
        });

        let mut manager = Self {
            platform,
            registry: DeviceRegistry::new(),
            output,
            requested_size: 0,
            file_dump_interval: config.file_dump_interval(),
            dump_thread: None,
            sessions: HashMap::new(),
            diagnostics: Vec::new(),
            shut_down: false,
        };

        let (requested_size, diagnostic) = sizing::bound_request(requested);
        manager.requested_size = requested_size;
        if let Some(diagnostic) = diagnostic {
            manager.report(diagnostic);
        }
        manager
    }

    /// Set up tracing for a newly loaded device.
    ///
    /// An existing session for the same device is discarded first, without
    /// a final drain.
    ///
    /// # Errors
    /// Returns a [`SessionError`] when the device ends up untraced. The
    /// matching [`Diagnostic`] has already been reported.
    pub fn on_device_activated(&mut self, handle: &dyn DeviceHandle) -> Result<DeviceId, SessionError> {
        let id = self.registry.device_id(handle);

        if let Some(previous) = self.sessions.remove(&id) {
            debug!("Device {id} re-activated, discarding its previous AIE trace session");
            drop(previous);
        }

        let metadata = match self.registry.update_device(id, handle) {
            Ok(metadata) => metadata.clone(),
            Err(source) => return Err(self.interface_failure(id, source)),
        };
        self.platform.update_device(id, &metadata);

        let stream_count = self.platform.num_streams(&metadata);
        if stream_count == 0 {
            self.report(Diagnostic::ZeroStreams { device: id });
            return Err(SessionError::ZeroStreamsAvailable(id));
        }

        let interface = self
            .registry
            .interface_or_open(id, handle)
            .map_err(|source| self.interface_failure(id, source))?;

        let flow = if metadata.has_direct_streaming() {
            FlowKind::DirectStreaming
        } else {
            FlowKind::MemoryMapped
        };

        // Direct streaming buffers live in the bank of the first datamover,
        // memory-mapped ones in bank 0
        let bank = match flow {
            FlowKind::DirectStreaming => {
                interface.stream_memory_bank(0).map_err(|source| self.interface_failure(id, source))?
            }
            FlowKind::MemoryMapped => 0,
        };
        let (capped, clamp) = sizing::cap_to_memory(id, self.requested_size, metadata.memory(bank));
        if let Some(diagnostic) = clamp {
            self.report(diagnostic);
        }
        let buffer_size = self.platform.check_trace_buf_size(capped, &metadata);
        if buffer_size < capped {
            self.report(Diagnostic::PlatformCapped {
                device: id,
                requested: capped,
                max_percent: PS_MEMORY_MAX_PERCENT,
                limit: buffer_size,
            });
        }

        let continuous_requested = self.platform.continuous_trace();
        let continuous = continuous_requested && flow.supports_continuous();
        if continuous_requested && !continuous {
            self.report(Diagnostic::ContinuousUnsupported { device: id, flow });
        }
        let offload_interval = self.platform.offload_interval();

        if self.platform.is_runtime_metrics() {
            let runtime_config = RuntimeConfig {
                device: id.0,
                device_name: metadata.name.clone(),
                metric_set: self.platform.metric_set(id).to_string(),
                flow: flow.to_string(),
                streams: stream_count,
                buffer_size,
                continuous,
                offload_interval_us: u64::try_from(offload_interval.as_micros()).unwrap_or(u64::MAX),
            };
            self.output.create_config_writer(&runtime_config).map_err(|e| self.output_failure(id, e))?;
        }
        for stream in 0..stream_count {
            self.output.create_trace_writer(id, stream).map_err(|e| self.output_failure(id, e))?;
        }

        let sink: Arc<dyn TraceSink> = Arc::clone(&self.output) as Arc<dyn TraceSink>;
        let mut coordinator = OffloadCoordinator::new(id, interface, sink, flow, buffer_size, stream_count);
        if continuous {
            coordinator.set_continuous_trace();
            coordinator.set_offload_interval(offload_interval);
        }

        if let Err(source) = coordinator.allocate_buffers() {
            self.report(Diagnostic::AllocationFailed { device: id, reason: source.to_string() });
            return Err(SessionError::BufferAllocationFailed { device: id, source });
        }
        debug!(
            "Total size of {:.3} MB is used for AIE trace buffer for {stream_count} {flow} streams.",
            ByteSize(buffer_size).as_mib()
        );

        if continuous {
            match coordinator.start_offload() {
                Ok(()) => self.start_file_dump(),
                Err(e) => {
                    warn!(
                        "Unable to start continuous AIE trace offload for device {id}: {e}. \
                         Trace will be offloaded at the end of application."
                    );
                }
            }
        }

        let offload_interval = coordinator.offload_interval();
        info!("AIE trace enabled for device {id} ({}): {stream_count} {flow} streams", metadata.name);
        self.sessions.insert(
            id,
            DeviceSession {
                id,
                stream_count,
                flow,
                buffer_size,
                offload_interval,
                coordinator,
            },
        );
        self.shut_down = false;
        Ok(id)
    }

    /// Drain whatever trace data the device has produced so far. A running
    /// background thread keeps running. No-op without a session.
    pub fn on_flush(&mut self, handle: &dyn DeviceHandle) {
        let Some(id) = self.registry.lookup(handle) else {
            return;
        };
        let Some(session) = self.sessions.get(&id) else {
            return;
        };

        if let Err(e) = session.coordinator.read_trace(true) {
            warn!("Failed to flush AIE trace for device {id}: {e}");
        }
        self.platform.flush_device(id);
        if let Err(e) = self.output.flush_all() {
            warn!("{e}");
        }
    }

    /// Finish tracing a device and forget its session. No-op without a
    /// session.
    pub fn on_finish(&mut self, handle: &dyn DeviceHandle) {
        let Some(id) = self.registry.lookup(handle) else {
            return;
        };
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };

        self.finish_session(session);
        self.platform.finish_flush_device(id);
        if let Err(e) = self.output.flush_all() {
            warn!("{e}");
        }
    }

    /// Finish every remaining session, stop the file dump thread and write
    /// the output summary. Errors are logged and skipped so every session
    /// is still released.
    pub fn on_shutdown(&mut self) {
        let mut ids: Vec<DeviceId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(session) = self.sessions.remove(&id) {
                self.finish_session(session);
                self.platform.finish_flush_device(id);
            }
        }

        if let Some(mut dump) = self.dump_thread.take() {
            dump.stop();
        }
        match self.output.write_summary() {
            Ok(path) => debug!("AIE trace summary written to {}", path.display()),
            Err(e) => warn!("Unable to write AIE trace summary: {e}"),
        }
        self.shut_down = true;
    }

    fn finish_session(&mut self, mut session: DeviceSession) {
        let id = session.id;
        let coordinator = &mut session.coordinator;

        // The final drain must not overlap the background thread
        coordinator.stop_offload();
        coordinator.wait_until_stopped();

        if let Err(e) = coordinator.read_trace(true) {
            warn!("Final AIE trace offload for device {id} failed: {e}");
        }
        if coordinator.is_trace_buffer_full() {
            self.report(Diagnostic::BufferFull { device: id });
        }
        if let Err(e) = coordinator.end_read_trace() {
            warn!("Failed to release AIE trace buffers for device {id}: {e}");
        }

        let stats = coordinator.stats();
        debug!("Device {id}: {} bytes of AIE trace offloaded in {} drains", stats.bytes, stats.drains);
    }

    fn start_file_dump(&mut self) {
        if self.dump_thread.is_some() || self.file_dump_interval.is_zero() {
            return;
        }
        match DumpThread::spawn(Arc::clone(&self.output), self.file_dump_interval) {
            Ok(dump) => self.dump_thread = Some(dump),
            Err(e) => warn!("Unable to start periodic AIE trace file dump: {e}"),
        }
    }

    fn interface_failure(&mut self, device: DeviceId, source: DeviceError) -> SessionError {
        self.report(Diagnostic::DeviceInterfaceUnavailable { device, reason: source.to_string() });
        SessionError::DeviceInterface { device, source }
    }

    fn output_failure(&mut self, device: DeviceId, source: ExportError) -> SessionError {
        self.report(Diagnostic::OutputUnavailable { device, reason: source.to_string() });
        SessionError::Output(source)
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        diagnostic.report();
        self.diagnostics.push(diagnostic);
    }

    #[must_use]
    pub fn session(&self, id: DeviceId) -> Option<&DeviceSession> {
        self.sessions.get(&id)
    }

    /// Session of the device behind `handle`, if it is being traced
    #[must_use]
    pub fn session_for(&self, handle: &dyn DeviceHandle) -> Option<&DeviceSession> {
        self.session(self.registry.lookup(handle)?)
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Every diagnostic reported so far, oldest first
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn output(&self) -> &Arc<OutputDirectory> {
        &self.output
    }

    #[must_use]
    pub fn platform(&self) -> &dyn PlatformAccess {
        self.platform.as_ref()
    }

    /// Configured total buffer size after bounding to the supported range
    #[must_use]
    pub fn requested_buffer_size(&self) -> u64 {
        self.requested_size
    }

    #[must_use]
    pub fn file_dump_running(&self) -> bool {
        self.dump_thread.is_some()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if !self.shut_down {
            self.on_shutdown();
        }
    }
}
