//! Testing utilities for pipelines.
//!
//! - [`MemorySinkFactory`]: captures every chunk in memory, with optional
//!   failure injection on open, write or flush.
//! - [`RecordingLog`]: a log sink that keeps every message.
//! - [`FailingSource`]: yields some rows, then an error.
//! - [`TempChunkDir`]: a temporary directory for file-backed chunks, with
//!   helpers to read them back.
//! - [`rows`]: build `Vec<Row>` literals from string slices.
//!
//! # Example
//! ```
//! use csvchunk::testing::*;
//! use csvchunk::{Pipeline, VecRowSource};
//!
//! # fn main() -> anyhow::Result<()> {
//! let sinks = MemorySinkFactory::new();
//! Pipeline::builder()
//!     .source(VecRowSource::new(rows(&[&["h"], &["1"]])))
//!     .sink_factory(sinks.clone())
//!     .chunk_capacity(10)
//!     .build()?
//!     .run()?;
//! assert_eq!(sinks.chunks(), vec![rows(&[&["h"], &["1"]])]);
//! # Ok(())
//! # }
//! ```

use crate::logging::{LogSink, SharedLog};
use crate::row::Row;
use crate::sink::{ChunkSinkFactory, ChunkWriter};
use crate::source::RowSource;
use anyhow::{Context, Result, anyhow, bail};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

/// Build rows from nested string slices.
#[must_use]
pub fn rows(data: &[&[&str]]) -> Vec<Row> {
    data.iter()
        .map(|r| r.iter().map(|f| (*f).to_string()).collect())
        .collect()
}

/// One captured chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedChunk {
    pub ordinal: u64,
    pub rows: Vec<Row>,
    pub flushes: usize,
    pub closed: bool,
}

#[derive(Default)]
struct MemoryState {
    chunks: Vec<CapturedChunk>,
    fail_open: Option<u64>,
    fail_write: Option<u64>,
    fail_flush: Option<u64>,
}

/// Chunk factory that keeps everything in memory.
///
/// Clones share the same storage, so keep one clone for assertions and hand
/// the other to the pipeline.
#[derive(Clone, Default)]
pub struct MemorySinkFactory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySinkFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make opening chunk `ordinal` fail.
    #[must_use]
    pub fn fail_open(self, ordinal: u64) -> Self {
        self.lock().fail_open = Some(ordinal);
        self
    }

    /// Make every row write into chunk `ordinal` fail.
    #[must_use]
    pub fn fail_write(self, ordinal: u64) -> Self {
        self.lock().fail_write = Some(ordinal);
        self
    }

    /// Make flushing chunk `ordinal` fail.
    #[must_use]
    pub fn fail_flush(self, ordinal: u64) -> Self {
        self.lock().fail_flush = Some(ordinal);
        self
    }

    /// Rows of every chunk, ordered by ordinal.
    #[must_use]
    pub fn chunks(&self) -> Vec<Vec<Row>> {
        self.lock().chunks.iter().map(|c| c.rows.clone()).collect()
    }

    /// Full capture records, including flush and close bookkeeping.
    #[must_use]
    pub fn captured(&self) -> Vec<CapturedChunk> {
        self.lock().chunks.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test already panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ChunkSinkFactory for MemorySinkFactory {
    fn open(&mut self, chunk_ordinal: u64) -> Result<Box<dyn ChunkWriter>> {
        let mut state = self.lock();
        if state.fail_open == Some(chunk_ordinal) {
            bail!("injected open failure for chunk {chunk_ordinal}");
        }
        state.chunks.push(CapturedChunk {
            ordinal: chunk_ordinal,
            ..CapturedChunk::default()
        });
        let index = state.chunks.len() - 1;
        Ok(Box::new(MemoryChunkWriter {
            factory: self.clone(),
            index,
            ordinal: chunk_ordinal,
        }))
    }
}

struct MemoryChunkWriter {
    factory: MemorySinkFactory,
    index: usize,
    ordinal: u64,
}

impl MemoryChunkWriter {
    fn with_chunk<T>(&self, f: impl FnOnce(&mut MemoryState, usize) -> Result<T>) -> Result<T> {
        let mut state = self.factory.lock();
        f(&mut *state, self.index)
    }
}

impl ChunkWriter for MemoryChunkWriter {
    fn write_row(&mut self, row: &[String]) -> Result<()> {
        let ordinal = self.ordinal;
        self.with_chunk(|state, i| {
            if state.fail_write == Some(ordinal) {
                bail!("injected write failure for chunk {ordinal}");
            }
            let chunk = &mut state.chunks[i];
            if chunk.closed {
                bail!("write to closed chunk {ordinal}");
            }
            chunk.rows.push(row.to_vec());
            Ok(())
        })
    }

    fn flush(&mut self) -> Result<()> {
        let ordinal = self.ordinal;
        self.with_chunk(|state, i| {
            state.chunks[i].flushes += 1;
            if state.fail_flush == Some(ordinal) {
                bail!("injected flush failure for chunk {ordinal}");
            }
            Ok(())
        })
    }

    fn close(&mut self) -> Result<()> {
        self.with_chunk(|state, i| {
            state.chunks[i].closed = true;
            Ok(())
        })
    }
}

/// Log sink that records every message.
#[derive(Clone, Default)]
pub struct RecordingLog {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether any message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }

    /// A shared handle writing into the same record.
    #[must_use]
    pub fn shared(&self) -> SharedLog {
        Arc::new(self.clone())
    }
}

impl LogSink for RecordingLog {
    fn log(&self, args: fmt::Arguments<'_>) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(args.to_string());
    }
}

/// Yields the given rows, then fails with `message`.
pub struct FailingSource {
    rows: VecDeque<Row>,
    message: String,
}

impl FailingSource {
    pub fn new(rows: Vec<Row>, message: impl Into<String>) -> Self {
        Self {
            rows: rows.into(),
            message: message.into(),
        }
    }
}

impl RowSource for FailingSource {
    fn read_row(&mut self) -> Result<Option<Row>> {
        match self.rows.pop_front() {
            Some(row) => Ok(Some(row)),
            None => Err(anyhow!(self.message.clone())),
        }
    }
}

/// A temporary directory for chunk files, deleted on drop.
pub struct TempChunkDir {
    dir: TempDir,
}

impl TempChunkDir {
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `name` inside the directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// A naming template for files inside the directory, e.g.
    /// `template("part_%d.csv")`.
    #[must_use]
    pub fn template(&self, pattern: &str) -> String {
        self.file_path(pattern).to_string_lossy().into_owned()
    }

    /// Regular files in the directory, sorted by name.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(self.path())
            .with_context(|| format!("list {}", self.path().display()))?
        {
            let path = entry?.path();
            if path.is_file() {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Parse a chunk file back into rows, without header handling and with
/// transparent decompression.
///
/// # Errors
/// Returns an error if the file cannot be opened or parsed.
pub fn read_chunk_rows(path: impl AsRef<Path>) -> Result<Vec<Row>> {
    let path = path.as_ref();
    let reader = crate::compression::open_reader(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut out = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("parse CSV record #{}", i + 1))?;
        out.push(rec.iter().map(str::to_owned).collect());
    }
    Ok(out)
}
