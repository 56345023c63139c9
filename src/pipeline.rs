//! The chunking engine.
//!
//! A [`Pipeline`] pulls rows from its source one at a time and writes them,
//! transformed, into a sequence of chunks. Each chunk holds at most
//! `chunk_capacity` data rows and, unless headers are disabled, begins with
//! the header: the first row ever read, re-transformed with
//! [`RowContext::is_header`] set.
//!
//! Per row the engine moves through four states:
//!
//! | state            | meaning                                                   |
//! |------------------|-----------------------------------------------------------|
//! | `AwaitingChunk`  | no open chunk; the pending row opens the next one         |
//! | `AwaitingHeader` | chunk open, header not yet written into it                |
//! | `Streaming`      | chunk open and ready for data rows                        |
//! | `Closed`         | source exhausted, last chunk flushed and closed           |
//!
//! The very first row supplies the header and is not written as data. For
//! every later chunk the memoized header is written first and the row that
//! triggered the rollover follows as ordinary data. A chunk is only ever
//! opened once a row for it exists, so there are no empty trailing chunks and
//! an empty source yields no chunks at all.
//!
//! Exactly one chunk is open at a time; it is flushed then closed before the
//! next is requested from the factory. On a fatal error the open chunk is
//! still flushed and closed, best-effort, and the error is returned. The same
//! cleanup runs when a panic from an unwrapped transformer unwinds out of
//! [`Pipeline::run`].
//!
//! # Example
//! ```
//! use csvchunk::testing::MemorySinkFactory;
//! use csvchunk::{Pipeline, VecRowSource};
//!
//! # fn main() -> anyhow::Result<()> {
//! let sinks = MemorySinkFactory::new();
//! let summary = Pipeline::builder()
//!     .source(VecRowSource::new([["id"], ["1"], ["2"], ["3"]]))
//!     .sink_factory(sinks.clone())
//!     .chunk_capacity(2)
//!     .build()?
//!     .run()?;
//!
//! assert_eq!(summary.total_rows, 3);
//! assert_eq!(sinks.chunks(), vec![
//!     vec![vec!["id"], vec!["1"], vec!["2"]],
//!     vec![vec!["id"], vec!["3"]],
//! ]);
//! # Ok(())
//! # }
//! ```

use crate::config::PipelineBuilder;
use crate::emit;
use crate::logging::SharedLog;
use crate::row::{Row, RowContext};
use crate::sink::{ChunkSinkFactory, ChunkWriter};
use crate::source::RowSource;
use crate::transform::SharedTransformer;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether chunks start with the header row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// The first input row is the header and opens every chunk.
    #[default]
    EmitPerChunk,
    /// Every input row is data; no chunk gets a header.
    Never,
}

/// What one chunk received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    /// 1-based chunk ordinal.
    pub ordinal: u64,
    /// Data rows written, header excluded.
    pub rows: u64,
    /// Whether a header row was written.
    pub header_written: bool,
}

/// Outcome of a successful run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Data rows processed across all chunks.
    pub total_rows: u64,
    /// One entry per chunk, in ordinal order.
    pub chunks: Vec<ChunkSummary>,
}

impl RunSummary {
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Data rows per chunk, in ordinal order.
    #[must_use]
    pub fn rows_per_chunk(&self) -> Vec<u64> {
        self.chunks.iter().map(|c| c.rows).collect()
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// A validated, ready-to-run pipeline. Build one with [`Pipeline::builder`].
pub struct Pipeline {
    pub(crate) source: Box<dyn RowSource>,
    pub(crate) sinks: Box<dyn ChunkSinkFactory>,
    pub(crate) transformer: SharedTransformer,
    pub(crate) chunk_capacity: u64,
    pub(crate) header_policy: HeaderPolicy,
    pub(crate) log: SharedLog,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("chunk_capacity", &self.chunk_capacity)
            .field("header_policy", &self.header_policy)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Start configuring a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Maximum data rows per chunk.
    #[must_use]
    pub fn chunk_capacity(&self) -> u64 {
        self.chunk_capacity
    }

    #[must_use]
    pub fn header_policy(&self) -> HeaderPolicy {
        self.header_policy
    }

    /// Stream the whole source into chunks.
    ///
    /// # Errors
    /// Returns the first source, sink, or transformer error. Chunks closed
    /// before the failure are left as written.
    ///
    /// # Panics
    /// A panic raised by the transformer propagates after the open chunk has
    /// been flushed and closed. Wrap the transformer in
    /// [`FaultIsolated`](crate::wrapper::FaultIsolated) to recover instead.
    pub fn run(self) -> Result<RunSummary> {
        let mut run = Run::new(self);
        match run.drive() {
            Ok(()) => Ok(run.summary()),
            Err(e) => {
                run.abort();
                Err(e)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    AwaitingChunk,
    AwaitingHeader,
    Streaming,
    Closed,
}

struct OpenChunk {
    ordinal: u64,
    writer: Box<dyn ChunkWriter>,
    rows: u64,
    header_written: bool,
}

struct Run {
    pipeline: Pipeline,
    state: State,
    header: Option<Row>,
    chunk: Option<OpenChunk>,
    last_ordinal: u64,
    data_rows: u64,
    closed: Vec<ChunkSummary>,
}

impl Run {
    fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            state: State::AwaitingChunk,
            header: None,
            chunk: None,
            last_ordinal: 0,
            data_rows: 0,
            closed: Vec::new(),
        }
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            let next = self
                .pipeline
                .source
                .read_row()
                .with_context(|| format!("read input after {} data rows", self.data_rows))?;
            let Some(row) = next else { break };
            self.step(row)?;
        }
        self.close_chunk()?;
        emit!(self.pipeline.log, "{} total rows processed", self.data_rows);
        self.state = State::Closed;
        Ok(())
    }

    fn step(&mut self, row: Row) -> Result<()> {
        if self.state == State::AwaitingChunk {
            self.open_next_chunk()?;
        }
        let row = if self.state == State::AwaitingHeader {
            match self.write_header(row)? {
                Some(row) => row,
                // The row was the header itself.
                None => return Ok(()),
            }
        } else {
            row
        };
        self.write_data(row)
    }

    fn open_next_chunk(&mut self) -> Result<()> {
        self.close_chunk()?;
        let ordinal = self.last_ordinal + 1;
        let writer = self
            .pipeline
            .sinks
            .open(ordinal)
            .with_context(|| format!("open chunk {ordinal}"))?;
        self.last_ordinal = ordinal;
        self.chunk = Some(OpenChunk {
            ordinal,
            writer,
            rows: 0,
            header_written: false,
        });
        self.state = match self.pipeline.header_policy {
            HeaderPolicy::EmitPerChunk => State::AwaitingHeader,
            HeaderPolicy::Never => State::Streaming,
        };
        Ok(())
    }

    /// Writes the header into the open chunk. Returns the row back when it
    /// still has to be written as data.
    fn write_header(&mut self, row: Row) -> Result<Option<Row>> {
        let (header, pending) = match self.header.clone() {
            Some(h) => (h, Some(row)),
            None => {
                self.header = Some(row.clone());
                (row, None)
            }
        };
        let chunk = self.chunk.as_mut().context("no open chunk for header")?;
        let ordinal = chunk.ordinal;
        let ctx = RowContext::header(ordinal, self.pipeline.chunk_capacity);
        let out = self
            .pipeline
            .transformer
            .transform(&ctx, header)
            .with_context(|| format!("transform header for chunk {ordinal}"))?;
        chunk
            .writer
            .write_row(&out)
            .with_context(|| format!("write header to chunk {ordinal}"))?;
        chunk.header_written = true;
        self.state = State::Streaming;
        Ok(pending)
    }

    fn write_data(&mut self, row: Row) -> Result<()> {
        let chunk = self.chunk.as_mut().context("no open chunk for row")?;
        let ordinal = chunk.ordinal;
        let row_ordinal = self.data_rows + 1;
        let ctx = RowContext::data(ordinal, row_ordinal, self.pipeline.chunk_capacity);
        let out = self
            .pipeline
            .transformer
            .transform(&ctx, row)
            .with_context(|| format!("transform row {row_ordinal}"))?;
        chunk
            .writer
            .write_row(&out)
            .with_context(|| format!("write row {row_ordinal} to chunk {ordinal}"))?;
        chunk.rows += 1;
        self.data_rows = row_ordinal;
        if row_ordinal % self.pipeline.chunk_capacity == 0 {
            self.state = State::AwaitingChunk;
        }
        Ok(())
    }

    /// Flush and close the open chunk, if any. Close runs even when the
    /// flush fails; the first error wins.
    fn close_chunk(&mut self) -> Result<()> {
        let Some(mut chunk) = self.chunk.take() else {
            return Ok(());
        };
        let ordinal = chunk.ordinal;
        emit!(self.pipeline.log, "chunk {ordinal}: {} rows processed", chunk.rows);
        self.closed.push(ChunkSummary {
            ordinal,
            rows: chunk.rows,
            header_written: chunk.header_written,
        });
        let flushed = chunk
            .writer
            .flush()
            .with_context(|| format!("flush chunk {ordinal}"));
        let closed = chunk
            .writer
            .close()
            .with_context(|| format!("close chunk {ordinal}"));
        flushed.and(closed)
    }

    /// Best-effort cleanup after a fatal error.
    fn abort(&mut self) {
        if let Some(mut chunk) = self.chunk.take() {
            let ordinal = chunk.ordinal;
            if let Err(e) = chunk.writer.flush() {
                emit!(self.pipeline.log, "flush chunk {ordinal} during abort: {e:#}");
            }
            if let Err(e) = chunk.writer.close() {
                emit!(self.pipeline.log, "close chunk {ordinal} during abort: {e:#}");
            }
        }
        self.state = State::Closed;
    }

    fn summary(&self) -> RunSummary {
        debug_assert_eq!(self.state, State::Closed);
        RunSummary {
            total_rows: self.data_rows,
            chunks: self.closed.clone(),
        }
    }
}

impl Drop for Run {
    /// A chunk still open here means a transformer panic is unwinding
    /// through the run.
    fn drop(&mut self) {
        if self.chunk.is_some() {
            self.abort();
        }
    }
}
