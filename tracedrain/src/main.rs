//! # tracedrain - Main Entry Point
//!
//! Activates a set of simulated devices, lets them produce trace for
//! `--duration` seconds (or until Ctrl+C) while their buffers are offloaded,
//! then finishes every device and shuts the Session Manager down.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::time::{Duration, Instant};

use tracedrain::cli::{self, Args};
use tracedrain::config::TraceConfig;
use tracedrain::device::{DeviceHandle, SimulatedDevice};
use tracedrain::domain::{ByteSize, ConfigError};
use tracedrain::session::SessionManager;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<ConfigError>()) {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn load_config(args: &Args) -> Result<TraceConfig> {
    let config = match &args.config {
        Some(path) => TraceConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TraceConfig::default(),
    };
    Ok(cli::apply_overrides(args, config)?)
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    let config = load_config(&args)?;
    let devices = cli::simulated_devices(&args)?;
    let mut manager = SessionManager::new(&config).context("Failed to prepare output directory")?;

    if !quiet {
        println!("tracedrain v{}", env!("CARGO_PKG_VERSION"));
        println!("output: {}", config.output_dir.display());
        println!("buffer: {}", ByteSize(manager.requested_buffer_size()));
    }

    for device in &devices {
        match manager.on_device_activated(device) {
            Ok(id) => {
                if let Some(session) = manager.session_for(device) {
                    if !quiet {
                        println!(
                            "device {id}: {} {} streams, {} buffer, {}",
                            session.stream_count(),
                            session.flow(),
                            ByteSize(session.buffer_size()),
                            if session.continuous() { "continuous" } else { "offload at finish" }
                        );
                    }
                }
            }
            Err(e) => info!("{} runs untraced: {e}", device.identity_path()),
        }
    }

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let start = Instant::now();
    let duration_limit = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let flush_interval = (args.flush_interval_ms > 0).then(|| Duration::from_millis(args.flush_interval_ms));
    let mut last_flush = Instant::now();
    let mut exit_reason = "interrupted";

    loop {
        if duration_limit.is_some_and(|limit| start.elapsed() >= limit) {
            exit_reason = "duration limit reached";
            break;
        }

        if flush_interval.is_some_and(|interval| last_flush.elapsed() >= interval) {
            for device in &devices {
                manager.on_flush(device);
            }
            last_flush = Instant::now();
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(50)) => {}
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    for device in &devices {
        manager.on_finish(device);
    }
    manager.on_shutdown();

    if !quiet {
        print_summary(&manager, &devices, exit_reason, start.elapsed());
    }
    Ok(())
}

fn print_summary(manager: &SessionManager, devices: &[SimulatedDevice], exit_reason: &str, elapsed: Duration) {
    let output = manager.output();
    eprintln!("\n{exit_reason}: {:.1}s", elapsed.as_secs_f64());

    for device in devices {
        let Some(id) = manager.registry().lookup(device) else {
            continue;
        };
        let streams = manager.registry().metadata(id).map_or(0, |m| manager.platform().num_streams(m));
        let words: u64 = (0..streams).filter_map(|stream| output.words_written(id, stream)).sum();
        let counters = device.counters();
        println!(
            "device {id}: {words} trace words, {} reads ({} final), {} buffers allocated, {} released",
            counters.reads(),
            counters.final_reads(),
            counters.allocations(),
            counters.releases()
        );
    }

    let diagnostics = manager.diagnostics();
    if !diagnostics.is_empty() {
        println!("{} warnings:", diagnostics.len());
        for diagnostic in diagnostics {
            println!("  {diagnostic}");
        }
    }
    println!("saved: {} files in {}", output.opened_files().len(), output.dir().display());
}
