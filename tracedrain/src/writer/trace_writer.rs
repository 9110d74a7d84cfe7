//! Per-stream trace text file
//!
//! ```text
//! # AIE trace
//! # device: 0
//! # stream: 2
//! 0x01000000
//! 0x01000001
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::{DeviceId, ExportError};
use crate::sink::TracePacket;

pub struct TraceWriter {
    path: PathBuf,
    out: BufWriter<File>,
    words: u64,
}

impl TraceWriter {
    /// Create (truncating) the file and write its header
    ///
    /// # Errors
    /// Returns [`ExportError::WriteFailed`] if the file cannot be created.
    pub fn create(path: &Path, device: DeviceId, stream: usize) -> Result<Self, ExportError> {
        let file = File::create(path).map_err(|source| ExportError::WriteFailed { path: path.to_path_buf(), source })?;
        let mut writer = Self { path: path.to_path_buf(), out: BufWriter::new(file), words: 0 };
        writer
            .write_all(format!("# AIE trace\n# device: {device}\n# stream: {stream}\n").as_bytes())?;
        Ok(writer)
    }

    /// Append every whole word of `packet`, one per line
    ///
    /// # Errors
    /// Returns [`ExportError::WriteFailed`] on I/O failure.
    pub fn write_packet(&mut self, packet: &TracePacket) -> Result<(), ExportError> {
        for word in packet.words() {
            writeln!(self.out, "0x{word:08x}").map_err(|source| self.failed(source))?;
            self.words += 1;
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`ExportError::WriteFailed`] on I/O failure.
    pub fn flush(&mut self) -> Result<(), ExportError> {
        self.out.flush().map_err(|source| self.failed(source))
    }

    /// Words written so far
    #[must_use]
    pub fn words(&self) -> u64 {
        self.words
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ExportError> {
        self.out.write_all(bytes).map_err(|source| self.failed(source))
    }

    fn failed(&self, source: std::io::Error) -> ExportError {
        ExportError::WriteFailed { path: self.path.clone(), source }
    }
}
