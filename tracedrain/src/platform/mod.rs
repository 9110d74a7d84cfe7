//! Platform capability layer
//!
//! Trace offload behaves slightly differently depending on where the
//! accelerator lives. [`PlatformAccess`] is the capability interface the
//! Session Manager talks to; the concrete variant is chosen once, from
//! configuration, by [`from_config`]:
//!
//! - [`HostPlatform`]: PCIe card driven from an x86 host
//! - [`EdgePlatform`]: embedded SoC, trace buffers carved out of
//!   processing-system memory
//!
//! Settings common to both (continuous mode, offload interval, metric set
//! resolution) live in [`PlatformSettings`] and are exposed through default
//! trait methods.

pub mod edge;
pub mod host;

use log::warn;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{PlatformKind, TraceConfig};
use crate::device::DeviceMetadata;
use crate::domain::DeviceId;

pub use edge::EdgePlatform;
pub use host::HostPlatform;

/// Metric sets the trace configuration understands
pub const KNOWN_METRIC_SETS: [&str; 4] =
    ["functions", "functions_partial_stalls", "functions_all_stalls", "all"];

/// Metric set used when none is configured or the configured one is unknown
pub const DEFAULT_METRIC_SET: &str = "functions";

/// Configuration-derived settings shared by every platform variant
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    continuous_trace: bool,
    offload_interval: Duration,
    requested_metric_set: Option<String>,
    device_metric_sets: HashMap<DeviceId, String>,
}

impl PlatformSettings {
    #[must_use]
    pub fn from_config(config: &TraceConfig) -> Self {
        Self {
            continuous_trace: config.periodic_offload,
            offload_interval: config.offload_interval(),
            requested_metric_set: config.metric_set.clone(),
            device_metric_sets: HashMap::new(),
        }
    }

    /// Resolve the configured metric set for `device`, falling back to
    /// [`DEFAULT_METRIC_SET`] with a warning if it is not recognised
    fn resolve_metric_set(&mut self, device: DeviceId) -> &str {
        let resolved = match self.requested_metric_set.as_deref() {
            Some(set) if KNOWN_METRIC_SETS.contains(&set) => set.to_string(),
            Some(set) => {
                warn!(
                    "Unable to find AIE trace metric set {set}. Using default of {DEFAULT_METRIC_SET}."
                );
                DEFAULT_METRIC_SET.to_string()
            }
            None => DEFAULT_METRIC_SET.to_string(),
        };
        self.device_metric_sets.insert(device, resolved);
        self.device_metric_sets.get(&device).map_or(DEFAULT_METRIC_SET, String::as_str)
    }
}

/// Platform capability interface
pub trait PlatformAccess: Send {
    fn settings(&self) -> &PlatformSettings;

    fn settings_mut(&mut self) -> &mut PlatformSettings;

    /// Returns true on embedded platforms
    fn is_edge(&self) -> bool;

    /// Apply the platform-specific cap to a requested trace buffer size.
    /// Returns the size to use, never more than `requested`.
    fn check_trace_buf_size(&self, requested: u64, metadata: &DeviceMetadata) -> u64;

    /// Number of trace streams to offload for a device
    fn num_streams(&self, metadata: &DeviceMetadata) -> usize {
        metadata.trace_streams()
    }

    /// Returns true if trace metrics are configured at runtime, in which
    /// case the configuration is dumped alongside the trace
    fn is_runtime_metrics(&self) -> bool {
        self.settings().requested_metric_set.is_some()
    }

    /// Metric set in effect for `device`
    fn metric_set(&self, device: DeviceId) -> &str {
        self.settings().device_metric_sets.get(&device).map_or(DEFAULT_METRIC_SET, String::as_str)
    }

    /// Returns true if continuous offload was requested
    fn continuous_trace(&self) -> bool {
        self.settings().continuous_trace
    }

    /// Delay between background drains
    fn offload_interval(&self) -> Duration {
        self.settings().offload_interval
    }

    /// Prepare the platform for a newly activated device
    fn update_device(&mut self, device: DeviceId, metadata: &DeviceMetadata) {
        let set = self.settings_mut().resolve_metric_set(device).to_string();
        log::debug!("Device {device} ({}): AIE trace metric set {set}", metadata.name);
    }

    /// Hook run after a device's trace has been flushed
    fn flush_device(&mut self, device: DeviceId) {
        log::debug!("Flushed AIE trace for device {device}");
    }

    /// Hook run after a device's session has been finished
    fn finish_flush_device(&mut self, device: DeviceId) {
        self.settings_mut().device_metric_sets.remove(&device);
        log::debug!("Finished AIE trace for device {device}");
    }
}

/// Construct the platform variant named by the configuration
#[must_use]
pub fn from_config(config: &TraceConfig) -> Box<dyn PlatformAccess> {
    let settings = PlatformSettings::from_config(config);
    match config.platform {
        PlatformKind::Host => Box::new(HostPlatform::new(settings)),
        PlatformKind::Edge => Box::new(EdgePlatform::new(settings)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_metrics(set: Option<&str>) -> TraceConfig {
        TraceConfig { metric_set: set.map(str::to_string), ..TraceConfig::default() }
    }

    #[test]
    fn test_from_config_selects_variant() {
        let host = from_config(&TraceConfig::default());
        assert!(!host.is_edge());

        let edge = from_config(&TraceConfig { platform: PlatformKind::Edge, ..TraceConfig::default() });
        assert!(edge.is_edge());
    }

    #[test]
    fn test_known_metric_set_kept() {
        let mut platform = from_config(&config_with_metrics(Some("functions_all_stalls")));
        assert!(platform.is_runtime_metrics());
        platform.update_device(DeviceId(0), &DeviceMetadata::default());
        assert_eq!(platform.metric_set(DeviceId(0)), "functions_all_stalls");
    }

    #[test]
    fn test_unknown_metric_set_falls_back() {
        let mut platform = from_config(&config_with_metrics(Some("everything")));
        platform.update_device(DeviceId(1), &DeviceMetadata::default());
        assert_eq!(platform.metric_set(DeviceId(1)), DEFAULT_METRIC_SET);
    }

    #[test]
    fn test_compile_time_metrics() {
        let platform = from_config(&config_with_metrics(None));
        assert!(!platform.is_runtime_metrics());
        assert_eq!(platform.metric_set(DeviceId(0)), DEFAULT_METRIC_SET);
    }

    #[test]
    fn test_settings_from_config() {
        let config = TraceConfig {
            periodic_offload: false,
            buffer_offload_interval_us: 500,
            ..TraceConfig::default()
        };
        let platform = from_config(&config);
        assert!(!platform.continuous_trace());
        assert_eq!(platform.offload_interval(), Duration::from_micros(500));
    }
}
