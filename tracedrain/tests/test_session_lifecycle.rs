use std::path::Path;
use std::time::{Duration, Instant};

use tracedrain::config::{PlatformKind, TraceConfig};
use tracedrain::device::{DeviceMetadata, MemoryResource, SimulatedDevice};
use tracedrain::domain::{DeviceId, FlowKind, OffloadStatus, SessionError};
use tracedrain::session::{Diagnostic, SessionManager};

const MIB: u64 = 1024 * 1024;

fn config(dir: &Path, buffer_size: &str) -> TraceConfig {
    TraceConfig {
        buffer_size: buffer_size.to_string(),
        buffer_offload_interval_us: 1000,
        output_dir: dir.to_path_buf(),
        ..TraceConfig::default()
    }
}

fn device(path: &str, direct_streams: usize, memory_mapped_streams: usize, bank_capacity: u64) -> SimulatedDevice {
    SimulatedDevice::new(
        path,
        DeviceMetadata {
            name: path.trim_start_matches("/dev/").to_string(),
            direct_streams,
            memory_mapped_streams,
            memory_banks: vec![MemoryResource::new("DDR[0]", bank_capacity)],
            ps_memory_size: 0,
        },
    )
}

fn count(manager: &SessionManager, pred: impl Fn(&Diagnostic) -> bool) -> usize {
    manager.diagnostics().iter().filter(|d| pred(d)).count()
}

#[test]
fn test_plio_device_clamped_to_bank_and_offloaded_continuously() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "64M")).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 4, 0, 32 * MIB);

    let id = manager.on_device_activated(&dev).expect("Failed to activate device");
    let session = manager.session_for(&dev).expect("Session missing");
    assert_eq!(session.id(), id);
    assert_eq!(session.flow(), FlowKind::DirectStreaming);
    assert_eq!(session.buffer_size(), 32 * MIB);
    assert!(session.continuous());
    assert!(session.coordinator().continuous_trace());
    assert_eq!(session.status(), OffloadStatus::Running);
    assert_eq!(dev.live_buffer_sizes(), vec![8 * MIB; 4]);
    assert_eq!(
        count(&manager, |d| matches!(d, Diagnostic::BufferClamped { limit, .. } if *limit == 32 * MIB)),
        1
    );

    dev.inject(256);
    manager.on_finish(&dev);

    assert!(manager.session(id).is_none());
    assert!(manager.session_for(&dev).is_none());
    assert_eq!(dev.live_buffers(), 0);
    // One final pass over the four stream buffers
    assert_eq!(dev.counters().final_reads(), 4);
    assert_eq!(dev.counters().releases(), 4);
    for stream in 0..4 {
        assert_eq!(manager.output().words_written(id, stream), Some(256));
    }
}

#[test]
fn test_device_without_trace_streams_gets_no_session() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "8M")).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 0, 0, 32 * MIB);

    let err = manager.on_device_activated(&dev).expect_err("Activation succeeded");
    assert!(matches!(err, SessionError::ZeroStreamsAvailable(DeviceId(0))));
    assert_eq!(manager.session_count(), 0);
    assert!(manager.output().opened_files().is_empty());
    assert_eq!(dev.counters().interfaces_opened(), 0);
    assert_eq!(dev.counters().allocations(), 0);
    assert_eq!(count(&manager, |d| matches!(d, Diagnostic::ZeroStreams { .. })), 1);
}

#[test]
fn test_memory_mapped_flow_never_continuous() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "8M")).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 0, 2, 32 * MIB);

    let id = manager.on_device_activated(&dev).expect("Failed to activate device");
    let session = manager.session(id).expect("Session missing");
    assert_eq!(session.flow(), FlowKind::MemoryMapped);
    assert!(!session.continuous());
    assert!(!session.coordinator().continuous_trace());
    assert_eq!(session.status(), OffloadStatus::Idle);
    assert!(!manager.file_dump_running());
    assert_eq!(
        count(&manager, |d| matches!(d, Diagnostic::ContinuousUnsupported { flow: FlowKind::MemoryMapped, .. })),
        1
    );

    // Only explicit drains read the buffers
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(dev.counters().reads(), 0);
}

#[test]
fn test_flush_after_finish_is_noop() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "1M")).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 1, 0, 0);

    manager.on_device_activated(&dev).expect("Failed to activate device");
    manager.on_finish(&dev);
    let reads = dev.counters().reads();

    manager.on_flush(&dev);
    manager.on_finish(&dev);
    assert_eq!(dev.counters().reads(), reads);
    assert_eq!(manager.session_count(), 0);
}

#[test]
fn test_flush_drains_without_stopping_thread() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut cfg = config(dir.path(), "1M");
    cfg.buffer_offload_interval_us = 3_600_000_000;
    let mut manager = SessionManager::new(&cfg).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 2, 0, 0);

    let id = manager.on_device_activated(&dev).expect("Failed to activate device");
    dev.inject(10);
    manager.on_flush(&dev);

    assert_eq!(manager.output().words_written(id, 0), Some(10));
    assert_eq!(manager.output().words_written(id, 1), Some(10));
    assert_eq!(manager.session(id).expect("Session missing").status(), OffloadStatus::Running);
}

#[test]
fn test_reactivation_releases_previous_buffers_once() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "1M")).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 4, 0, 0);

    let first = manager.on_device_activated(&dev).expect("Failed to activate device");
    let second = manager.on_device_activated(&dev).expect("Failed to activate device");
    assert_eq!(first, second);
    assert_eq!(manager.session_count(), 1);
    assert_eq!(dev.counters().releases(), 4);
    assert_eq!(dev.live_buffers(), 4);
    // The superseded session is not drained
    assert_eq!(dev.counters().final_reads(), 0);
    // Interface is opened once and reused
    assert_eq!(dev.counters().interfaces_opened(), 1);

    manager.on_finish(&dev);
    assert_eq!(dev.counters().releases(), 8);
    assert_eq!(dev.live_buffers(), 0);
}

#[test]
fn test_device_interface_failure_only_affects_that_device() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "1M")).expect("Failed to create session manager");
    let broken = device("/dev/sim0", 2, 0, 0).with_broken_layout("no debug_ip_layout");
    let healthy = device("/dev/sim1", 2, 0, 0);

    let err = manager.on_device_activated(&broken).expect_err("Activation succeeded");
    assert!(matches!(err, SessionError::DeviceInterface { .. }));
    assert_eq!(count(&manager, |d| matches!(d, Diagnostic::DeviceInterfaceUnavailable { .. })), 1);

    let id = manager.on_device_activated(&healthy).expect("Failed to activate device");
    assert_eq!(id, DeviceId(1));
    assert_eq!(manager.session_count(), 1);
}

#[test]
fn test_allocation_failure_leaves_device_untraced() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "8M")).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 2, 0, 0).with_allocation_limit(MIB);

    let err = manager.on_device_activated(&dev).expect_err("Activation succeeded");
    assert!(matches!(err, SessionError::BufferAllocationFailed { .. }));
    assert_eq!(manager.session_count(), 0);
    assert_eq!(dev.live_buffers(), 0);
    assert_eq!(count(&manager, |d| matches!(d, Diagnostic::AllocationFailed { .. })), 1);
}

#[test]
fn test_buffer_full_reported_at_finish() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut cfg = config(dir.path(), "8K");
    cfg.periodic_offload = false;
    let mut manager = SessionManager::new(&cfg).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 1, 0, 0);

    manager.on_device_activated(&dev).expect("Failed to activate device");
    dev.inject(4096);
    manager.on_finish(&dev);

    assert_eq!(count(&manager, |d| matches!(d, Diagnostic::BufferFull { device: DeviceId(0) })), 1);
}

#[test]
fn test_edge_platform_caps_to_ps_memory() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut cfg = config(dir.path(), "64M");
    cfg.platform = PlatformKind::Edge;
    let mut manager = SessionManager::new(&cfg).expect("Failed to create session manager");
    let mut metadata = DeviceMetadata {
        name: "edge".to_string(),
        direct_streams: 1,
        memory_mapped_streams: 0,
        memory_banks: vec![MemoryResource::new("DDR[0]", 0)],
        ps_memory_size: 16 * MIB,
    };
    let dev = SimulatedDevice::new("/dev/edge0", metadata.clone());

    let id = manager.on_device_activated(&dev).expect("Failed to activate device");
    let limit = 16 * MIB * 80 / 100;
    assert_eq!(manager.session(id).expect("Session missing").buffer_size(), limit);
    let capped: Vec<String> = manager
        .diagnostics()
        .iter()
        .filter(|d| matches!(d, Diagnostic::PlatformCapped { .. }))
        .map(ToString::to_string)
        .collect();
    assert_eq!(capped.len(), 1);
    assert!(capped[0].contains("80%"));
    assert!(capped[0].ends_with(&format!("Limiting to {limit}.")));

    // Below the threshold the request is untouched
    metadata.ps_memory_size = 1024 * MIB;
    let roomy = SimulatedDevice::new("/dev/edge1", metadata);
    let id = manager.on_device_activated(&roomy).expect("Failed to activate device");
    assert_eq!(manager.session(id).expect("Session missing").buffer_size(), 64 * MIB);
}

#[test]
fn test_shutdown_finishes_every_session() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "1M")).expect("Failed to create session manager");
    let devices: Vec<SimulatedDevice> =
        (0..3).map(|n| device(&format!("/dev/sim{n}"), 2, 0, 0).with_production_rate(MIB)).collect();
    for dev in &devices {
        manager.on_device_activated(dev).expect("Failed to activate device");
    }
    assert!(manager.file_dump_running());

    std::thread::sleep(Duration::from_millis(20));
    manager.on_shutdown();
    manager.on_shutdown();

    assert_eq!(manager.session_count(), 0);
    assert!(!manager.file_dump_running());
    for dev in &devices {
        assert_eq!(dev.live_buffers(), 0);
        assert_eq!(dev.counters().releases(), 2);
        assert_eq!(dev.counters().final_reads(), 2);
    }
    assert!(dir.path().join("trace_summary.json").exists());
}

#[test]
fn test_continuous_offload_reaches_files_while_running() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "1M")).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 1, 0, 0);
    let id = manager.on_device_activated(&dev).expect("Failed to activate device");

    dev.inject(100);
    let deadline = Instant::now() + Duration::from_secs(5);
    while manager.output().words_written(id, 0) != Some(100) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(manager.output().words_written(id, 0), Some(100));
    assert_eq!(dev.counters().final_reads(), 0);
}

#[test]
fn test_reactivation_starts_trace_file_fresh() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "1M")).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 1, 0, 0);
    let id = manager.on_device_activated(&dev).expect("Failed to activate device");

    dev.inject(100);
    manager.on_flush(&dev);

    // Drained by the background thread and still buffered in the writer
    dev.inject(5);
    let deadline = Instant::now() + Duration::from_secs(5);
    while manager.output().words_written(id, 0) != Some(105) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(manager.output().words_written(id, 0), Some(105));

    manager.on_device_activated(&dev).expect("Failed to re-activate device");
    manager.on_flush(&dev);

    let bytes = std::fs::read(dir.path().join("aie_trace_0_0.txt")).expect("Failed to read trace file");
    assert!(!bytes.contains(&0), "trace file contains NUL bytes");
    let text = String::from_utf8(bytes).expect("Trace file is not UTF-8");
    assert_eq!(text.matches("# AIE trace").count(), 1);
    assert!(!text.contains("0x"), "stale words from the previous session: {text}");
    assert_eq!(manager.output().words_written(id, 0), Some(0));
}

#[test]
fn test_shutdown_releases_devices_whose_drain_fails() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut manager = SessionManager::new(&config(dir.path(), "1M")).expect("Failed to create session manager");
    let failing = device("/dev/sim0", 2, 0, 0).with_read_failure("device removed");
    let healthy = device("/dev/sim1", 2, 0, 0);
    manager.on_device_activated(&failing).expect("Failed to activate device");
    let healthy_id = manager.on_device_activated(&healthy).expect("Failed to activate device");

    healthy.inject(16);
    manager.on_shutdown();

    assert_eq!(manager.session_count(), 0);
    assert_eq!(failing.live_buffers(), 0);
    assert_eq!(failing.counters().releases(), 2);
    assert_eq!(failing.counters().final_reads(), 0);

    assert_eq!(healthy.live_buffers(), 0);
    assert_eq!(healthy.counters().releases(), 2);
    assert_eq!(healthy.counters().final_reads(), 2);
    assert_eq!(manager.output().words_written(healthy_id, 0), Some(16));
    assert!(dir.path().join("trace_summary.json").exists());
}

#[test]
fn test_finish_releases_buffers_after_failed_final_drain() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut cfg = config(dir.path(), "1M");
    cfg.periodic_offload = false;
    let mut manager = SessionManager::new(&cfg).expect("Failed to create session manager");
    let dev = device("/dev/sim0", 3, 0, 0).with_read_failure("device removed");
    manager.on_device_activated(&dev).expect("Failed to activate device");

    // Flush failures are logged, the session survives
    manager.on_flush(&dev);
    assert_eq!(manager.session_count(), 1);

    manager.on_finish(&dev);
    assert_eq!(manager.session_count(), 0);
    assert_eq!(dev.live_buffers(), 0);
    assert_eq!(dev.counters().releases(), 3);
    assert_eq!(dev.counters().reads(), 0);
}
