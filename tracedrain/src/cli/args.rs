//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tracedrain",
    about = "Offload AIE trace from simulated devices into trace files",
    after_help = "\
EXAMPLES:
    tracedrain --duration 5                            4 PLIO streams, continuous offload
    tracedrain --memory-mapped --streams 2             GMIO flow, offloaded at finish
    tracedrain --buffer-size 64M --bank-capacity 32M   Buffer clamped to the memory bank
    tracedrain --config trace.toml --output out/       Settings from a TOML file"
)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of simulated devices
    #[arg(long, default_value = "1")]
    pub devices: usize,

    /// Trace streams per device (0 = device without trace infrastructure)
    #[arg(long, default_value = "4")]
    pub streams: usize,

    /// Use the memory-mapped (GMIO) flow instead of direct streaming (PLIO)
    #[arg(long)]
    pub memory_mapped: bool,

    /// Capacity of the memory bank backing the trace buffers (0 = unknown)
    #[arg(long, value_name = "SIZE", default_value = "64M")]
    pub bank_capacity: String,

    /// Processing-system memory of each device, used on edge platforms
    #[arg(long, value_name = "SIZE", default_value = "0")]
    pub ps_memory: String,

    /// Requested total trace buffer size (overrides the config file)
    #[arg(long, value_name = "SIZE")]
    pub buffer_size: Option<String>,

    /// Trace data produced per stream per second
    #[arg(long, value_name = "SIZE", default_value = "1M")]
    pub rate: String,

    /// Platform variant (overrides the config file)
    #[arg(long, value_parser = ["host", "edge"])]
    pub platform: Option<String>,

    /// Stop after N seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "2")]
    pub duration: u64,

    /// Flush every device this often in milliseconds (0 = never)
    #[arg(long, default_value = "0")]
    pub flush_interval_ms: u64,

    /// Output directory (overrides the config file)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Disable continuous offload
    #[arg(long)]
    pub no_continuous: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
