//! Runtime trace configuration dump

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::ExportError;

/// Trace configuration in effect for one activated device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeConfig {
    pub device: u64,
    pub device_name: String,
    pub metric_set: String,
    pub flow: String,
    pub streams: usize,
    pub buffer_size: u64,
    pub continuous: bool,
    pub offload_interval_us: u64,
}

/// Write `config` as pretty-printed JSON to `path`
///
/// # Errors
/// Returns an [`ExportError`] if the file cannot be created or written.
pub fn write_runtime_config(path: &Path, config: &RuntimeConfig) -> Result<(), ExportError> {
    let file = File::create(path).map_err(|source| ExportError::WriteFailed { path: path.to_path_buf(), source })?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, config)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
