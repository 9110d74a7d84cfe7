//! Command-line interface of the `tracedrain` binary
//!
//! Turns [`Args`] into a [`TraceConfig`] and a set of simulated devices.

pub mod args;

pub use args::Args;

use crate::config::{PlatformKind, TraceConfig};
use crate::device::{DeviceMetadata, MemoryResource, SimulatedDevice};
use crate::domain::{ByteSize, ConfigError};

/// Apply command-line overrides on top of `config`
///
/// # Errors
/// Returns [`ConfigError::InvalidSize`] if `--buffer-size` does not parse.
pub fn apply_overrides(args: &Args, mut config: TraceConfig) -> Result<TraceConfig, ConfigError> {
    if let Some(size) = &args.buffer_size {
        ByteSize::parse(size)?;
        config.buffer_size.clone_from(size);
    }
    if let Some(dir) = &args.output {
        config.output_dir.clone_from(dir);
    }
    match args.platform.as_deref() {
        Some("edge") => config.platform = PlatformKind::Edge,
        Some(_) => config.platform = PlatformKind::Host,
        None => {}
    }
    if args.no_continuous {
        config.periodic_offload = false;
    }
    Ok(config)
}

/// Build the simulated devices described by `args`
///
/// # Errors
/// Returns [`ConfigError::InvalidSize`] if a size argument does not parse.
pub fn simulated_devices(args: &Args) -> Result<Vec<SimulatedDevice>, ConfigError> {
    let bank_capacity = ByteSize::parse(&args.bank_capacity)?.bytes();
    let ps_memory_size = ByteSize::parse(&args.ps_memory)?.bytes();
    let rate = ByteSize::parse(&args.rate)?.bytes();

    let (direct_streams, memory_mapped_streams) =
        if args.memory_mapped { (0, args.streams) } else { (args.streams, 0) };

    Ok((0..args.devices)
        .map(|n| {
            SimulatedDevice::new(
                format!("/dev/sim{n}"),
                DeviceMetadata {
                    name: format!("sim{n}"),
                    direct_streams,
                    memory_mapped_streams,
                    memory_banks: vec![MemoryResource::new("DDR[0]", bank_capacity)],
                    ps_memory_size,
                },
            )
            .with_production_rate(rate)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use crate::device::DeviceHandle;

    fn args(extra: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("tracedrain").chain(extra.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_leave_config_untouched() {
        let config = apply_overrides(&args(&[]), TraceConfig::default()).unwrap();
        assert_eq!(config.buffer_size, TraceConfig::default().buffer_size);
        assert!(config.periodic_offload);
        assert_eq!(config.platform, PlatformKind::Host);
    }

    #[test]
    fn test_overrides() {
        let a = args(&["--buffer-size", "64M", "--platform", "edge", "--no-continuous", "-o", "out"]);
        let config = apply_overrides(&a, TraceConfig::default()).unwrap();
        assert_eq!(config.buffer_size, "64M");
        assert_eq!(config.platform, PlatformKind::Edge);
        assert!(!config.periodic_offload);
        assert_eq!(config.output_dir, std::path::PathBuf::from("out"));
    }

    #[test]
    fn test_bad_buffer_size_rejected() {
        assert!(apply_overrides(&args(&["--buffer-size", "big"]), TraceConfig::default()).is_err());
    }

    #[test]
    fn test_unknown_platform_rejected() {
        assert!(Args::try_parse_from(["tracedrain", "--platform", "arm"]).is_err());
    }

    #[test]
    fn test_simulated_devices() {
        let devices = simulated_devices(&args(&["--devices", "2", "--memory-mapped", "--streams", "3"])).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].identity_path(), "/dev/sim1");
        let metadata = devices[0].metadata().unwrap();
        assert_eq!(metadata.memory_mapped_streams, 3);
        assert!(!metadata.has_direct_streaming());
    }
}
