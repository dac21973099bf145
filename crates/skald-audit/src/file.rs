//! Append-only file sink with rotation and periodic signing.
//!
//! One `FileSink` owns one topic's current log file. Writes, rotation
//! and signing all run under the same mutex, so the file only ever has a
//! single writer and the signature chain always sees a consistent
//! snapshot of the unsigned span. Files are never rewritten in place:
//! they are appended to, or renamed away by rotation.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use skald_core::FileRotationConfig;
use tokio::sync::Mutex;

use crate::batch::Batch;
use crate::error::AuditError;
use crate::format::RecordFormat;
use crate::sign::{ChainSigner, Signer};

struct FileState {
    writer: BufWriter<File>,
    size: u64,
    last_signed_offset: u64,
    rotation_seq: u64,
    chain: Option<ChainSigner>,
}

/// File sink for one topic.
pub struct FileSink {
    topic: String,
    path: PathBuf,
    format: RecordFormat,
    rotation: FileRotationConfig,
    state: Mutex<FileState>,
}

impl FileSink {
    /// Open (or create) the topic's current log file.
    ///
    /// If the file already holds signed content, the chain resumes from
    /// its last signature record so the first new signature covers only
    /// the bytes appended since.
    pub fn open(
        topic: &str,
        directory: &Path,
        format: RecordFormat,
        rotation: FileRotationConfig,
        signer: Option<Arc<dyn Signer>>,
    ) -> Result<Self, AuditError> {
        let path = directory.join(format!("{topic}.audit.{}", format.extension()));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();

        let mut chain = signer.map(ChainSigner::new);
        let mut last_signed_offset = 0;
        if chain.is_some() && size > 0 {
            if let Some((prev, offset)) = last_signature(&path, format)? {
                if let Some(chain) = chain.as_mut() {
                    chain.resume(prev);
                }
                last_signed_offset = offset;
            }
        }

        Ok(Self {
            topic: topic.to_string(),
            path,
            format,
            rotation,
            state: Mutex::new(FileState {
                writer: BufWriter::new(file),
                size,
                last_signed_offset,
                rotation_seq: 0,
                chain,
            }),
        })
    }

    /// Path of the topic's current file. Stable across rotation: only
    /// the archived copy gets a new name.
    pub fn current_path(&self) -> &Path {
        &self.path
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Append one batch, rotating first if the size policy requires it.
    pub async fn write_batch(&self, batch: &Batch) -> Result<(), AuditError> {
        let mut state = self.state.lock().await;
        if self.rotation.enabled
            && self.rotation.max_file_size > 0
            && state.size > 0
            && state.size + batch.byte_len() > self.rotation.max_file_size
        {
            self.rotate_locked(&mut state)?;
        }
        state.writer.write_all(batch.payload.as_bytes())?;
        state.writer.flush()?;
        state.size += batch.byte_len();
        Ok(())
    }

    /// Force a rotation, returning the archive path. Errors when
    /// rotation is disabled.
    pub async fn rotate(&self) -> Result<PathBuf, AuditError> {
        if !self.rotation.enabled {
            return Err(AuditError::UnsupportedOperation(format!(
                "rotation not enabled for topic '{}'",
                self.topic
            )));
        }
        let mut state = self.state.lock().await;
        self.rotate_locked(&mut state)
    }

    /// Append a signature covering the bytes written since the previous
    /// signature point. Returns `false` when there is nothing to sign.
    pub async fn sign_now(&self) -> Result<bool, AuditError> {
        let mut state = self.state.lock().await;
        self.sign_locked(&mut state)
    }

    /// Flush the file buffer through to the OS and to disk.
    pub async fn flush(&self) -> Result<(), AuditError> {
        let mut state = self.state.lock().await;
        state.writer.flush()?;
        state.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Final flush and closing signature, called at shutdown.
    pub async fn close(&self) -> Result<(), AuditError> {
        let mut state = self.state.lock().await;
        self.sign_locked(&mut state)?;
        state.writer.flush()?;
        state.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn rotate_locked(&self, state: &mut FileState) -> Result<PathBuf, AuditError> {
        // close the chain before the file is archived
        self.sign_locked(state)?;
        state.writer.flush()?;

        state.rotation_seq += 1;
        let archive = self.path.with_file_name(format!(
            "{}.{}.{}",
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            state.rotation_seq,
        ));
        std::fs::rename(&self.path, &archive)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        state.writer = BufWriter::new(file);
        state.size = 0;
        state.last_signed_offset = 0;
        if let Some(chain) = state.chain.as_mut() {
            chain.reset();
        }
        tracing::info!(topic = %self.topic, archive = %archive.display(), "Rotated audit log");
        Ok(archive)
    }

    fn sign_locked(&self, state: &mut FileState) -> Result<bool, AuditError> {
        let Some(chain) = state.chain.as_mut() else {
            return Ok(false);
        };
        if state.size == state.last_signed_offset {
            return Ok(false);
        }
        state.writer.flush()?;

        // read the unsigned span back from disk for a consistent snapshot
        let mut span = Vec::with_capacity((state.size - state.last_signed_offset) as usize);
        let mut reader = File::open(&self.path)?;
        reader.seek(SeekFrom::Start(state.last_signed_offset))?;
        reader
            .take(state.size - state.last_signed_offset)
            .read_to_end(&mut span)?;

        let record = chain.sign_span(&span);
        let line = self.format.render_signature(&record);
        state.writer.write_all(line.as_bytes())?;
        state.writer.write_all(b"\n")?;
        state.writer.flush()?;
        state.size += line.len() as u64 + 1;
        state.last_signed_offset = state.size;
        tracing::debug!(topic = %self.topic, covers = record.covers, "Appended signature record");
        Ok(true)
    }
}

/// Find the last signature record in an existing file, returning its
/// signature and the byte offset just past its line.
fn last_signature(
    path: &Path,
    format: RecordFormat,
) -> Result<Option<(String, u64)>, AuditError> {
    let bytes = std::fs::read(path)?;
    let mut found = None;
    let mut line_start = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'\n' {
            continue;
        }
        if let Ok(line) = std::str::from_utf8(&bytes[line_start..i]) {
            if let Some(record) = format.parse_signature(line) {
                found = Some((record.signature, (i + 1) as u64));
            }
        }
        line_start = i + 1;
    }
    Ok(found)
}
