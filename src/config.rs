//! Assembling and validating a [`Pipeline`].
//!
//! [`PipelineBuilder`] collects the named settings, then [`build`] validates
//! them once. An invalid configuration is rejected before any input is read,
//! any thread is spawned or any chunk is created.
//!
//! | setting | builder method(s) | default |
//! |---|---|---|
//! | row source | [`source`], [`csv_reader`], [`input_file`] | required |
//! | chunk sinks | [`sink_factory`], [`writer_generator`], [`output_template`] | required |
//! | transformer | [`transformer`] | [`Identity`] |
//! | chunk capacity | [`chunk_capacity`] | required, must be > 0 |
//! | header policy | [`header_policy`], [`skip_headers`] | [`HeaderPolicy::EmitPerChunk`] |
//! | logging sink | [`logger`], [`shared_logger`] | [`LogFacade`](crate::logging::LogFacade) |
//! | buffer sizes | [`write_buffer_size`], [`read_buffer_size`] | 10 MiB each |
//! | prefetch queue | [`prefetch`] | off |
//!
//! [`build`]: PipelineBuilder::build
//! [`source`]: PipelineBuilder::source
//! [`csv_reader`]: PipelineBuilder::csv_reader
//! [`input_file`]: PipelineBuilder::input_file
//! [`sink_factory`]: PipelineBuilder::sink_factory
//! [`writer_generator`]: PipelineBuilder::writer_generator
//! [`output_template`]: PipelineBuilder::output_template
//! [`transformer`]: PipelineBuilder::transformer
//! [`chunk_capacity`]: PipelineBuilder::chunk_capacity
//! [`header_policy`]: PipelineBuilder::header_policy
//! [`skip_headers`]: PipelineBuilder::skip_headers
//! [`logger`]: PipelineBuilder::logger
//! [`shared_logger`]: PipelineBuilder::shared_logger
//! [`write_buffer_size`]: PipelineBuilder::write_buffer_size
//! [`read_buffer_size`]: PipelineBuilder::read_buffer_size
//! [`prefetch`]: PipelineBuilder::prefetch

use crate::compression::open_reader;
use crate::emit;
use crate::logging::{LogSink, SharedLog, default_log};
use crate::pipeline::{HeaderPolicy, Pipeline};
use crate::sink::{ChunkSinkFactory, DEFAULT_WRITE_BUFFER_SIZE, FileTemplateFactory, WriterFactory};
use crate::source::{CsvRowSource, DEFAULT_READ_BUFFER_SIZE, PrefetchSource, RowSource};
use crate::transform::{Identity, RowTransformer, SharedTransformer};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Why a configuration was rejected.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no row source configured")]
    MissingSource,

    #[error("no chunk sink configured: set a sink factory, a writer generator or an output template")]
    MissingSink,

    #[error("chunk capacity must be > 0, got {0}; use i64::MAX to disable splitting")]
    InvalidChunkCapacity(i64),

    #[error("open input file {}", .path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("spawn prefetch thread")]
    Prefetch(#[source] io::Error),
}

type WriterGenerator = Box<dyn FnMut(u64) -> io::Result<Box<dyn Write>>>;

enum SourceKind {
    Rows(Box<dyn RowSource + Send>),
    Reader(Box<dyn Read + Send>),
    File(PathBuf),
}

enum SinkKind {
    Factory(Box<dyn ChunkSinkFactory>),
    Writers(WriterGenerator),
    Template(String),
}

/// Collects pipeline settings; see the [module docs](self).
pub struct PipelineBuilder {
    source: Option<SourceKind>,
    sink: Option<SinkKind>,
    transformer: SharedTransformer,
    chunk_capacity: i64,
    header_policy: HeaderPolicy,
    log: SharedLog,
    write_buffer_size: usize,
    read_buffer_size: usize,
    prefetch: Option<usize>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            sink: None,
            transformer: Arc::new(Identity),
            chunk_capacity: 0,
            header_policy: HeaderPolicy::default(),
            log: default_log(),
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            prefetch: None,
        }
    }

    /// Read rows from `source`.
    #[must_use]
    pub fn source<S: RowSource + Send + 'static>(mut self, source: S) -> Self {
        self.source = Some(SourceKind::Rows(Box::new(source)));
        self
    }

    /// Parse CSV from `reader` with a [`CsvRowSource`] using the configured
    /// read buffer size.
    #[must_use]
    pub fn csv_reader<R: Read + Send + 'static>(mut self, reader: R) -> Self {
        self.source = Some(SourceKind::Reader(Box::new(reader)));
        self
    }

    /// Parse CSV from the file at `path`, decompressing `.gz` / `.zst`
    /// input. The file is opened by [`build`](Self::build).
    #[must_use]
    pub fn input_file(mut self, path: impl AsRef<Path>) -> Self {
        self.source = Some(SourceKind::File(path.as_ref().to_path_buf()));
        self
    }

    /// Obtain chunk writers from `factory`.
    #[must_use]
    pub fn sink_factory<F: ChunkSinkFactory + 'static>(mut self, factory: F) -> Self {
        self.sink = Some(SinkKind::Factory(Box::new(factory)));
        self
    }

    /// Serialize each chunk as CSV into the writer `open` returns for its
    /// ordinal.
    #[must_use]
    pub fn writer_generator<F, W>(mut self, mut open: F) -> Self
    where
        F: FnMut(u64) -> io::Result<W> + 'static,
        W: Write + 'static,
    {
        let generator: WriterGenerator =
            Box::new(move |n| open(n).map(|w| Box::new(w) as Box<dyn Write>));
        self.sink = Some(SinkKind::Writers(generator));
        self
    }

    /// Write chunk files named by `template`, e.g. `"out/part_%03d.csv"`.
    /// See [`sink`](crate::sink) for the template rules.
    #[must_use]
    pub fn output_template(mut self, template: impl Into<String>) -> Self {
        self.sink = Some(SinkKind::Template(template.into()));
        self
    }

    /// Apply `transformer` to every header emission and data row.
    #[must_use]
    pub fn transformer<T: RowTransformer + 'static>(mut self, transformer: T) -> Self {
        self.transformer = Arc::new(transformer);
        self
    }

    /// Maximum data rows per chunk. Must be positive; any value at least the
    /// number of input rows produces a single chunk.
    #[must_use]
    pub fn chunk_capacity(mut self, capacity: i64) -> Self {
        self.chunk_capacity = capacity;
        self
    }

    #[must_use]
    pub fn header_policy(mut self, policy: HeaderPolicy) -> Self {
        self.header_policy = policy;
        self
    }

    /// `true` treats every row as data and writes no headers.
    #[must_use]
    pub fn skip_headers(self, skip: bool) -> Self {
        self.header_policy(if skip {
            HeaderPolicy::Never
        } else {
            HeaderPolicy::EmitPerChunk
        })
    }

    #[must_use]
    pub fn logger<L: LogSink + 'static>(mut self, log: L) -> Self {
        self.log = Arc::new(log);
        self
    }

    /// Use a sink that is also shared with transformer wrappers.
    #[must_use]
    pub fn shared_logger(mut self, log: SharedLog) -> Self {
        self.log = log;
        self
    }

    /// Write buffer of CSV chunk writers created by this builder.
    #[must_use]
    pub fn write_buffer_size(mut self, bytes: usize) -> Self {
        self.write_buffer_size = bytes;
        self
    }

    /// Read buffer of CSV sources created by this builder.
    #[must_use]
    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes;
        self
    }

    /// Read ahead on a background thread, buffering up to `capacity` rows.
    /// The queue length is clamped to
    /// `1..=`[`MAX_PREFETCH_CAPACITY`](crate::source::MAX_PREFETCH_CAPACITY);
    /// [`DEFAULT_PREFETCH_CAPACITY`](crate::source::DEFAULT_PREFETCH_CAPACITY)
    /// is a good choice.
    #[must_use]
    pub fn prefetch(mut self, capacity: usize) -> Self {
        self.prefetch = Some(capacity);
        self
    }

    /// Validate the settings and assemble the pipeline.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingSource`], [`ConfigError::MissingSink`] or
    /// [`ConfigError::InvalidChunkCapacity`] (checked in that order) before
    /// any I/O, then [`ConfigError::OpenInput`] or [`ConfigError::Prefetch`]
    /// while resolving the source.
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        let source = self.source.ok_or(ConfigError::MissingSource)?;
        let sink = self.sink.ok_or(ConfigError::MissingSink)?;
        let chunk_capacity = u64::try_from(self.chunk_capacity)
            .ok()
            .filter(|&c| c > 0)
            .ok_or(ConfigError::InvalidChunkCapacity(self.chunk_capacity))?;

        let sinks: Box<dyn ChunkSinkFactory> = match sink {
            SinkKind::Factory(f) => f,
            SinkKind::Writers(open) => Box::new(WriterFactory::new(open, self.write_buffer_size)),
            SinkKind::Template(template) => {
                let factory = FileTemplateFactory::new(template, self.write_buffer_size);
                if !factory.has_placeholder() && self.chunk_capacity != i64::MAX {
                    emit!(
                        self.log,
                        "output template {:?} has no chunk placeholder; every chunk goes to the same file",
                        factory.path_for(1)
                    );
                }
                Box::new(factory)
            }
        };

        let source: Box<dyn RowSource + Send> = match source {
            SourceKind::Rows(rows) => rows,
            SourceKind::Reader(reader) => {
                Box::new(CsvRowSource::with_capacity(reader, self.read_buffer_size))
            }
            SourceKind::File(path) => {
                let reader = open_reader(&path)
                    .map_err(|source| ConfigError::OpenInput { path, source })?;
                Box::new(CsvRowSource::with_capacity(reader, self.read_buffer_size))
            }
        };
        let source: Box<dyn RowSource> = match self.prefetch {
            Some(capacity) => Box::new(
                PrefetchSource::spawn(source, capacity).map_err(ConfigError::Prefetch)?,
            ),
            None => source,
        };

        Ok(Pipeline {
            source,
            sinks,
            transformer: self.transformer,
            chunk_capacity,
            header_policy: self.header_policy,
            log: self.log,
        })
    }
}

impl Pipeline {
    /// Split the CSV file `input` into files named by `template`, applying
    /// `transformer` to every row.
    ///
    /// # Errors
    /// See [`PipelineBuilder::build`].
    pub fn from_file<T: RowTransformer + 'static>(
        input: impl AsRef<Path>,
        chunk_capacity: i64,
        template: impl Into<String>,
        transformer: T,
    ) -> Result<Pipeline, ConfigError> {
        PipelineBuilder::new()
            .input_file(input)
            .output_template(template)
            .transformer(transformer)
            .chunk_capacity(chunk_capacity)
            .build()
    }

    /// Copy CSV from `input` to `output` in a single chunk.
    ///
    /// # Errors
    /// See [`PipelineBuilder::build`].
    pub fn from_buffer<R, W>(input: R, output: W) -> Result<Pipeline, ConfigError>
    where
        R: Read + Send + 'static,
        W: Write + 'static,
    {
        let mut output = Some(output);
        PipelineBuilder::new()
            .csv_reader(input)
            .writer_generator(move |_| {
                output
                    .take()
                    .ok_or_else(|| io::Error::other("buffer output already handed out"))
            })
            .chunk_capacity(i64::MAX)
            .build()
    }
}
