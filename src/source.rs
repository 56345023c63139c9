//! Row sources: where the pipeline pulls its input from.
//!
//! - [`CsvRowSource`] reads delimited text with the `csv` crate, without
//!   treating the first record specially and without enforcing a field count.
//! - [`VecRowSource`] replays rows already in memory.
//! - [`PrefetchSource`] moves any `Send` source onto a background thread
//!   behind a small bounded queue, so reading overlaps with transformation
//!   and writing. Rows still arrive strictly in input order.

use crate::row::Row;
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, bounded};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::thread::{self, JoinHandle};

/// Default read buffer capacity of [`CsvRowSource`] (10 MiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Default queue length of [`PrefetchSource`].
pub const DEFAULT_PREFETCH_CAPACITY: usize = 10;

/// Longest queue [`PrefetchSource`] will allocate; larger requests are
/// clamped.
pub const MAX_PREFETCH_CAPACITY: usize = 64;

/// Produces rows one at a time.
pub trait RowSource {
    /// Next row, or `Ok(None)` once the input is exhausted.
    ///
    /// # Errors
    /// Any error is fatal to the pipeline and is returned from its run.
    fn read_row(&mut self) -> Result<Option<Row>>;
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn read_row(&mut self) -> Result<Option<Row>> {
        (**self).read_row()
    }
}

/// Reads CSV records as rows of strings.
pub struct CsvRowSource<R> {
    reader: csv::Reader<R>,
    record: csv::StringRecord,
}

impl<R: Read> CsvRowSource<R> {
    /// Read from `reader` with the default buffer capacity.
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, DEFAULT_READ_BUFFER_SIZE)
    }

    /// Read from `reader` with a read buffer of `capacity` bytes.
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(capacity.max(1))
            .from_reader(reader);
        Self::from_csv(reader)
    }

    /// Use a reader configured elsewhere (delimiter, quoting, ...).
    ///
    /// The reader should be built with `has_headers(false)`; otherwise the
    /// first record is swallowed by the `csv` crate and the pipeline will take
    /// the second record as its header.
    pub fn from_csv(reader: csv::Reader<R>) -> Self {
        Self {
            reader,
            record: csv::StringRecord::new(),
        }
    }
}

impl<R: Read> RowSource for CsvRowSource<R> {
    fn read_row(&mut self) -> Result<Option<Row>> {
        let more = self.reader.read_record(&mut self.record).with_context(|| {
            let line = self.reader.position().line();
            format!("parse CSV record at line {line}")
        })?;
        if !more {
            return Ok(None);
        }
        Ok(Some(self.record.iter().map(str::to_owned).collect()))
    }
}

/// Replays rows held in memory.
#[derive(Clone, Debug, Default)]
pub struct VecRowSource {
    rows: VecDeque<Row>,
}

impl VecRowSource {
    pub fn new<I, R, F>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(Into::into).collect())
                .collect(),
        }
    }
}

impl RowSource for VecRowSource {
    fn read_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

/// Reads from an inner source on a background thread.
///
/// At most `capacity` rows are buffered. The first error from the inner
/// source is delivered in order, after the rows that preceded it, and ends
/// the stream.
pub struct PrefetchSource {
    rx: Receiver<Result<Row>>,
    producer: Option<JoinHandle<()>>,
    done: bool,
}

impl PrefetchSource {
    /// Start prefetching from `source` with a queue of `capacity` rows,
    /// clamped to `1..=MAX_PREFETCH_CAPACITY`.
    ///
    /// # Errors
    /// Returns an error if the producer thread cannot be spawned.
    pub fn spawn<S>(mut source: S, capacity: usize) -> io::Result<Self>
    where
        S: RowSource + Send + 'static,
    {
        let (tx, rx) = bounded::<Result<Row>>(capacity.clamp(1, MAX_PREFETCH_CAPACITY));
        let producer = thread::Builder::new()
            .name("csvchunk-prefetch".into())
            .spawn(move || {
                loop {
                    let item = match source.read_row() {
                        Ok(Some(row)) => Ok(row),
                        Ok(None) => break,
                        Err(e) => Err(e),
                    };
                    let failed = item.is_err();
                    // A closed channel means the consumer is gone.
                    if tx.send(item).is_err() || failed {
                        break;
                    }
                }
            })?;
        Ok(Self {
            rx,
            producer: Some(producer),
            done: false,
        })
    }

    /// Length of the hand-off queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    fn join_producer(&mut self) -> Result<()> {
        if let Some(handle) = self.producer.take() {
            handle
                .join()
                .map_err(|_| anyhow!("prefetch thread panicked while reading rows"))?;
        }
        Ok(())
    }
}

impl RowSource for PrefetchSource {
    fn read_row(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        match self.rx.recv() {
            Ok(Ok(row)) => Ok(Some(row)),
            Ok(Err(e)) => {
                self.done = true;
                self.join_producer()?;
                Err(e)
            }
            Err(_) => {
                // Sender dropped: clean end of stream, or the producer died.
                self.done = true;
                self.join_producer()?;
                Ok(None)
            }
        }
    }
}
