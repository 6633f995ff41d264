//! Captured-state export
//!
//! Serializes session state to the persistence collaborator: captured
//! sector keys as a small text format, the transaction journal as CSV.
//! Every export overwrites its target wholesale, so re-exporting an
//! unchanged session is byte-identical. Failures surface to the operator
//! as [`ExportError`]; the session itself is never affected.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::card::storage::default_storage_dir;
use crate::session::journal::LogEntry;
use crate::session::keys::CapturedKey;

/// Errors reported to the operator when an export target fails.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create export directory {dir:?}: {source}")]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write export file {file:?}: {source}")]
    WriteFile {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn write_export(file: &Path, contents: &str) -> Result<(), ExportError> {
    if let Some(dir) = file.parent() {
        fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
            dir: dir.to_path_buf(),
            source,
        })?;
    }
    fs::write(file, contents).map_err(|source| ExportError::WriteFile {
        file: file.to_path_buf(),
        source,
    })
}

/// Writes captured keys as one text line per credential.
pub struct KeyExporter {
    export_file: PathBuf,
}

impl KeyExporter {
    const DEFAULT_KEY_FILE: &'static str = "captured_keys.txt";

    /// Create an exporter writing to `path`, or to the default file under
    /// the storage directory when `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        let export_file =
            path.unwrap_or_else(|| default_storage_dir().join(Self::DEFAULT_KEY_FILE));
        Self { export_file }
    }

    /// Path of the export file.
    pub fn path(&self) -> &Path {
        &self.export_file
    }

    /// Write all captured keys, overwriting any previous export.
    ///
    /// Format: a two-line comment header, then `S<sector>:Key<A|B>:<12 hex
    /// chars>` per key in first-seen order. An empty store is a success
    /// no-op and touches nothing on disk. Returns the number of keys
    /// written.
    pub fn write_keys(&self, keys: &[CapturedKey]) -> Result<usize, ExportError> {
        if keys.is_empty() {
            info!("no keys to save");
            return Ok(0);
        }

        let mut out = String::from("# captured sector keys\n# S<sector>:Key<A|B>:<key hex>\n");
        for key in keys {
            out.push_str(&format!(
                "S{}:Key{}:{}\n",
                key.sector,
                key.kind.label(),
                key.key.hex()
            ));
        }

        match write_export(&self.export_file, &out) {
            Ok(()) => {
                info!("saved {} keys to {:?}", keys.len(), self.export_file);
                Ok(keys.len())
            }
            Err(e) => {
                warn!("key export failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Writes the transaction journal as CSV.
pub struct LogExporter {
    export_file: PathBuf,
}

impl LogExporter {
    const DEFAULT_LOG_FILE: &'static str = "transactions.csv";

    /// Create an exporter writing to `path`, or to the default file under
    /// the storage directory when `None`.
    pub fn new(path: Option<PathBuf>) -> Self {
        let export_file =
            path.unwrap_or_else(|| default_storage_dir().join(Self::DEFAULT_LOG_FILE));
        Self { export_file }
    }

    /// Path of the export file.
    pub fn path(&self) -> &Path {
        &self.export_file
    }

    /// Write all journal entries as CSV, overwriting any previous export.
    ///
    /// An empty journal is a success no-op. Returns the number of entries
    /// written.
    pub fn write_log(&self, entries: &[LogEntry]) -> Result<usize, ExportError> {
        if entries.is_empty() {
            info!("no journal entries to save");
            return Ok(0);
        }

        let mut out = String::from("tick_ms,operation,block,data\n");
        for entry in entries {
            let data: String = entry.data.iter().map(|b| format!("{:02X}", b)).collect();
            out.push_str(&format!(
                "{},{},{},{}\n",
                entry.tick_ms,
                entry.operation.label(),
                entry.block,
                data
            ));
        }

        match write_export(&self.export_file, &out) {
            Ok(()) => {
                info!(
                    "saved {} journal entries to {:?}",
                    entries.len(),
                    self.export_file
                );
                Ok(entries.len())
            }
            Err(e) => {
                warn!("journal export failed: {}", e);
                Err(e)
            }
        }
    }
}
