//! Rotating JSONL writer for received messages
//!
//! Files are named `messages_<UTC timestamp>_<sequence>.jsonl` so that name
//! order is creation order. Once a file holds `max_records_per_file` records
//! a new one is started and the oldest files beyond `max_files_to_keep` are
//! removed.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::types::MessageRecord;
use crate::error::Result;

const FILE_PREFIX: &str = "messages_";
const FILE_SUFFIX: &str = ".jsonl";

/// Appends message records to rotating files in one directory
pub struct MessageLog {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    sequence: u32,
}

impl MessageLog {
    /// Create the log directory if needed; no file is opened until the first
    /// record
    pub fn new<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Logging received messages to {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            sequence: 0,
        })
    }

    /// File currently being written
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Append one record as a JSON line
    pub fn append(&mut self, record: &MessageRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, record).map_err(io::Error::from)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let name = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%dT%H%M%S"),
            self.sequence,
            FILE_SUFFIX
        );
        self.sequence = self.sequence.wrapping_add(1);

        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened message log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;
        self.prune()
    }

    /// Log files in the directory, oldest first
    fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn prune(&self) -> Result<()> {
        let files = self.log_files()?;
        let excess = files.len().saturating_sub(self.max_files_to_keep);
        for path in &files[..excess] {
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove old message log {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

impl Drop for MessageLog {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}
