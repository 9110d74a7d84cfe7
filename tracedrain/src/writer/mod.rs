//! Trace output: writers, file registry and periodic dump
//!
//! [`OutputDirectory`] is the [`TraceSink`] used by the binary. It owns one
//! [`TraceWriter`] per (device, stream), keeps a registry of every file it
//! opened together with its category, and writes `trace_summary.json` listing
//! them when the run ends.

pub mod config_writer;
pub mod dump_thread;
pub mod trace_writer;

pub use config_writer::{write_runtime_config, RuntimeConfig};
pub use dump_thread::DumpThread;
pub use trace_writer::TraceWriter;

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{DeviceId, ExportError};
use crate::sink::{TracePacket, TraceSink};

pub const TRACE_FILE_CATEGORY: &str = "AIE_EVENT_TRACE";
pub const CONFIG_FILE_CATEGORY: &str = "AIE_EVENT_RUNTIME_CONFIG";
pub const SUMMARY_FILE_NAME: &str = "trace_summary.json";

/// A file recorded in the output registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenedFile {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Serialize)]
struct StreamSummary {
    device: u64,
    stream: usize,
    file: String,
    words: u64,
}

#[derive(Debug, Serialize)]
struct TraceSummary<'a> {
    files: &'a [OpenedFile],
    streams: Vec<StreamSummary>,
}

#[must_use]
pub fn trace_file_name(device: DeviceId, stream: usize) -> String {
    format!("aie_trace_{device}_{stream}.txt")
}

#[must_use]
pub fn config_file_name(device: DeviceId) -> String {
    format!("aie_event_runtime_config_{device}.json")
}

pub struct OutputDirectory {
    dir: PathBuf,
    writers: Mutex<BTreeMap<(DeviceId, usize), TraceWriter>>,
    opened: Mutex<Vec<OpenedFile>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OutputDirectory {
    /// Use `dir` for output, creating it if needed
    ///
    /// # Errors
    /// Returns [`ExportError::WriteFailed`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| ExportError::WriteFailed { path: dir.clone(), source })?;
        Ok(Self { dir, writers: Mutex::new(BTreeMap::new()), opened: Mutex::new(Vec::new()) })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open the trace file for one stream, replacing any earlier writer for
    /// the same stream, and register it
    ///
    /// # Errors
    /// Returns [`ExportError::WriteFailed`] if the file cannot be created.
    pub fn create_trace_writer(&self, device: DeviceId, stream: usize) -> Result<PathBuf, ExportError> {
        let name = trace_file_name(device, stream);
        info!("Creating AIE trace file {name} for device {device}");

        let path = self.dir.join(&name);
        let mut writers = lock(&self.writers);
        // The replaced writer must be done with the file before it is truncated
        if let Some(mut old) = writers.remove(&(device, stream)) {
            if let Err(e) = old.flush() {
                warn!("{e}");
            }
        }
        writers.insert((device, stream), TraceWriter::create(&path, device, stream)?);
        drop(writers);

        self.register_opened_file(&name, TRACE_FILE_CATEGORY);
        Ok(path)
    }

    /// Dump the runtime trace configuration of a device and register it
    ///
    /// # Errors
    /// Returns an [`ExportError`] if the file cannot be written.
    pub fn create_config_writer(&self, config: &RuntimeConfig) -> Result<PathBuf, ExportError> {
        let name = config_file_name(DeviceId(config.device));
        let path = self.dir.join(&name);
        write_runtime_config(&path, config)?;
        self.register_opened_file(&name, CONFIG_FILE_CATEGORY);
        Ok(path)
    }

    /// Record an output file. Re-registering the same name is a no-op.
    pub fn register_opened_file(&self, name: &str, category: &str) {
        let mut opened = lock(&self.opened);
        if !opened.iter().any(|f| f.name == name) {
            opened.push(OpenedFile { name: name.to_string(), category: category.to_string() });
        }
    }

    #[must_use]
    pub fn opened_files(&self) -> Vec<OpenedFile> {
        lock(&self.opened).clone()
    }

    /// Words written so far to the trace file of one stream
    #[must_use]
    pub fn words_written(&self, device: DeviceId, stream: usize) -> Option<u64> {
        lock(&self.writers).get(&(device, stream)).map(TraceWriter::words)
    }

    /// Flush every trace writer, continuing past failures
    ///
    /// # Errors
    /// Returns the first flush failure.
    pub fn flush_all(&self) -> Result<(), ExportError> {
        let mut first_error = None;
        for writer in lock(&self.writers).values_mut() {
            if let Err(e) = writer.flush() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Flush all writers and write `trace_summary.json`
    ///
    /// # Errors
    /// Returns an [`ExportError`] if flushing or writing the summary fails.
    pub fn write_summary(&self) -> Result<PathBuf, ExportError> {
        self.flush_all()?;

        let streams = lock(&self.writers)
            .iter()
            .map(|(&(device, stream), writer)| StreamSummary {
                device: device.0,
                stream,
                file: trace_file_name(device, stream),
                words: writer.words(),
            })
            .collect();
        let opened = self.opened_files();
        let summary = TraceSummary { files: &opened, streams };

        let path = self.dir.join(SUMMARY_FILE_NAME);
        let file = File::create(&path).map_err(|source| ExportError::WriteFailed { path: path.clone(), source })?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &summary)?;
        out.write_all(b"\n")?;
        out.flush()?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}

impl TraceSink for OutputDirectory {
    fn emit(&self, packet: TracePacket) {
        let mut writers = lock(&self.writers);
        match writers.get_mut(&(packet.device, packet.stream)) {
            Some(writer) => {
                if let Err(e) = writer.write_packet(&packet) {
                    warn!("{e}");
                }
            }
            None => debug!(
                "No trace writer for device {} stream {}, dropping {} bytes",
                packet.device,
                packet.stream,
                packet.data.len()
            ),
        }
    }
}
