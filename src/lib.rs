//! # csvchunk
//!
//! A **chunked CSV row pipeline**: stream rows from a source, run each one
//! through a composable transformer, and write the results into a sequence of
//! bounded output chunks that each start with the header.
//!
//! ## Key Features
//!
//! - **Bounded chunks** - at most `chunk_capacity` data rows per chunk, rolled
//!   over strictly by row count
//! - **Header replication** - the first input row is memoized and, transformed,
//!   opens every chunk
//! - **Composable transformers** - row numbers, chunk-relative row numbers,
//!   value replacement, constant columns, closures, and chains of these
//! - **Fault isolation and tracing** - wrap any transformer to log and skip its
//!   failures, or to log rows before and after it runs
//! - **Pluggable I/O** - CSV readers, in-memory rows, writer closures, or file
//!   naming templates such as `out/part_%03d.csv`
//! - **Transparent compression** - `.gz` and `.zst` inputs and chunk files
//!   (optional via feature flags)
//! - **Read-ahead** - optional bounded prefetch of input rows on a background
//!   thread
//!
//! ## Quick Start
//!
//! ```no_run
//! use csvchunk::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let summary = Pipeline::builder()
//!     .input_file("customers.csv")
//!     .output_template("out/customers_%03d.csv")
//!     .chunk_capacity(10_000)
//!     .transformer(RowNumber::new("S.no").then(ChunkRowNumber::new("chunk_row").at(1)))
//!     .build()?
//!     .run()?;
//!
//! println!("{} rows in {} chunks", summary.total_rows, summary.chunk_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Pipeline
//!
//! A [`Pipeline`] owns one source, one chunk factory, one transformer and a
//! log sink. [`Pipeline::run`] consumes it and drives the source to
//! exhaustion, returning a [`RunSummary`]. The first fatal error aborts the
//! run after the open chunk is flushed and closed.
//!
//! ### Configuration
//!
//! [`PipelineBuilder`] validates everything up front and reports problems as
//! [`ConfigError`]. [`Pipeline::from_file`] and [`Pipeline::from_buffer`]
//! cover the two common setups.
//!
//! ### Transformers
//!
//! A [`RowTransformer`] sees a [`RowContext`] (chunk ordinal, row ordinal,
//! capacity, whether it is a header) and returns the output row. Combine them
//! with [`RowTransformerExt::then`] or [`Chain`].
//!
//! ### Sources and sinks
//!
//! [`RowSource`] yields rows; [`ChunkSinkFactory`] opens one [`ChunkWriter`]
//! per chunk. See the [`source`] and [`sink`] modules for the provided
//! implementations.
//!
//! ## Feature Flags
//!
//! - `compression-gzip` - gzip via `flate2` (default)
//! - `compression-zstd` - zstd via `zstd` (default)
//!
//! ## Testing
//!
//! The [`testing`] module provides in-memory sinks, a recording log sink and
//! temporary chunk directories for exercising pipelines in tests.

pub mod compression;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod row;
pub mod sink;
pub mod source;
pub mod testing;
pub mod transform;
pub mod wrapper;

pub use config::{ConfigError, PipelineBuilder};
pub use logging::{LogFacade, LogSink, NoopLog, SharedLog};
pub use pipeline::{ChunkSummary, HeaderPolicy, Pipeline, RunSummary};
pub use row::{HEADER_ROW_ORDINAL, Row, RowContext};
pub use sink::{
    ChunkSinkFactory, ChunkWriter, CsvChunkWriter, FileTemplateFactory, WriterFactory,
    render_chunk_name,
};
pub use source::{
    CsvRowSource, DEFAULT_PREFETCH_CAPACITY, MAX_PREFETCH_CAPACITY, PrefetchSource, RowSource,
    VecRowSource,
};
pub use transform::{
    Chain, ChunkRowNumber, ConstantColumn, Identity, ReplaceValues, RowNumber, RowTransformer,
    RowTransformerExt, SharedTransformer, from_fn, map_rows,
};
pub use wrapper::{FaultIsolated, Traced, isolate_faults, traced};
