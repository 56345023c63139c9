//! Chunk destinations and the factories that open them.
//!
//! The pipeline asks a [`ChunkSinkFactory`] for a fresh [`ChunkWriter`] each
//! time a chunk starts, writes rows into it, and flushes then closes it before
//! the next one is opened. Provided implementations:
//! - [`CsvChunkWriter`]: serializes rows with the `csv` crate into any
//!   [`Write`].
//! - [`WriterFactory`]: wraps a closure returning a byte writer per chunk.
//! - [`FileTemplateFactory`]: derives a file name per chunk from a
//!   printf-style template such as `out/part_%03d.csv`.
//!
//! # Naming templates
//! The first integer verb is replaced with the chunk ordinal, printf style:
//! - verbs `%d` / `%v` (decimal), `%x` / `%X` (hex), `%o` (octal), `%b`
//!   (binary)
//! - flags `0` (zero padding), `-` (left-justify, wins over `0`), `+` (always
//!   print the sign), space (leave room for a sign)
//! - an optional width: `%04d` → `0007`, `%-3d` → `7  `
//!
//! `%%` is a literal `%`. Any other verb (`%s`, `%q`, ...), precision, a
//! second placeholder, or a dangling `%` yields the literal text written
//! *before* the problem, so `"out_%s.csv"` names every chunk `out_`. Without
//! a placeholder every chunk maps to the same file and, since files are
//! opened in append mode, later chunks are appended to it.

use crate::compression::EncodedFile;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

/// Default write buffer capacity of [`CsvChunkWriter`] (10 MiB).
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// A destination for the rows of one chunk.
///
/// The pipeline calls [`flush`](ChunkWriter::flush) and then
/// [`close`](ChunkWriter::close) exactly once per opened writer, including
/// when a run is aborted.
pub trait ChunkWriter {
    /// Buffer one row for serialization.
    ///
    /// # Errors
    /// Any error aborts the pipeline.
    fn write_row(&mut self, row: &[String]) -> Result<()>;

    /// Push buffered rows to the underlying destination.
    ///
    /// # Errors
    /// Any error aborts the pipeline.
    fn flush(&mut self) -> Result<()>;

    /// Release the destination. Writing after close is an error.
    ///
    /// # Errors
    /// Any error aborts the pipeline.
    fn close(&mut self) -> Result<()>;
}

impl<W: ChunkWriter + ?Sized> ChunkWriter for Box<W> {
    fn write_row(&mut self, row: &[String]) -> Result<()> {
        (**self).write_row(row)
    }
    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Opens one destination per chunk ordinal (1-based, increasing, no gaps).
pub trait ChunkSinkFactory {
    /// Open the destination for chunk `chunk_ordinal`.
    ///
    /// # Errors
    /// Any error aborts the pipeline before the chunk receives rows.
    fn open(&mut self, chunk_ordinal: u64) -> Result<Box<dyn ChunkWriter>>;
}

impl<F: ChunkSinkFactory + ?Sized> ChunkSinkFactory for Box<F> {
    fn open(&mut self, chunk_ordinal: u64) -> Result<Box<dyn ChunkWriter>> {
        (**self).open(chunk_ordinal)
    }
}

/// Serializes rows as CSV into a byte destination.
///
/// `finish` receives the destination after the final flush (during
/// [`close`](ChunkWriter::close)) and is where codecs write trailers or files
/// get synced. [`CsvChunkWriter::new`] simply drops it.
pub struct CsvChunkWriter<W: Write> {
    writer: Option<csv::Writer<W>>,
    finish: fn(W) -> io::Result<()>,
}

impl<W: Write> CsvChunkWriter<W> {
    /// Serialize into `dest` with a write buffer of `buffer_size` bytes.
    pub fn new(dest: W, buffer_size: usize) -> Self {
        Self::with_finish(dest, buffer_size, |w| {
            drop(w);
            Ok(())
        })
    }

    /// Like [`new`](Self::new), calling `finish` on the destination at close.
    pub fn with_finish(dest: W, buffer_size: usize, finish: fn(W) -> io::Result<()>) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(buffer_size.max(1))
            .from_writer(dest);
        Self {
            writer: Some(writer),
            finish,
        }
    }

    fn writer_mut(&mut self) -> Result<&mut csv::Writer<W>> {
        self.writer
            .as_mut()
            .context("chunk writer used after close")
    }
}

impl<W: Write> ChunkWriter for CsvChunkWriter<W> {
    fn write_row(&mut self, row: &[String]) -> Result<()> {
        self.writer_mut()?
            .write_record(row)
            .context("serialize CSV row")
    }

    fn flush(&mut self) -> Result<()> {
        self.writer_mut()?.flush().context("flush chunk")
    }

    fn close(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let dest = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .context("flush chunk before close")?;
        (self.finish)(dest).context("close chunk")
    }
}

/// Builds a [`CsvChunkWriter`] around whatever the closure returns for each
/// chunk ordinal.
pub struct WriterFactory<F> {
    open: F,
    buffer_size: usize,
}

impl<F, W> WriterFactory<F>
where
    F: FnMut(u64) -> io::Result<W>,
    W: Write + 'static,
{
    pub fn new(open: F, buffer_size: usize) -> Self {
        Self { open, buffer_size }
    }
}

impl<F, W> ChunkSinkFactory for WriterFactory<F>
where
    F: FnMut(u64) -> io::Result<W>,
    W: Write + 'static,
{
    fn open(&mut self, chunk_ordinal: u64) -> Result<Box<dyn ChunkWriter>> {
        let dest = (self.open)(chunk_ordinal)
            .with_context(|| format!("open destination for chunk {chunk_ordinal}"))?;
        Ok(Box::new(CsvChunkWriter::new(dest, self.buffer_size)))
    }
}

/// Opens files named by rendering a template with the chunk ordinal.
///
/// Files are created if missing and opened in append mode (mode `0o644` on
/// unix). Parent directories must already exist. Names ending in `.gz` or
/// `.zst` are compressed when the matching feature is enabled.
#[derive(Clone, Debug)]
pub struct FileTemplateFactory {
    template: String,
    buffer_size: usize,
}

impl FileTemplateFactory {
    pub fn new(template: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            template: template.into(),
            buffer_size,
        }
    }

    /// The path chunk `chunk_ordinal` is written to.
    #[must_use]
    pub fn path_for(&self, chunk_ordinal: u64) -> PathBuf {
        PathBuf::from(render_chunk_name(&self.template, chunk_ordinal))
    }

    /// Whether the template varies with the chunk ordinal.
    #[must_use]
    pub fn has_placeholder(&self) -> bool {
        self.path_for(1) != self.path_for(2)
    }
}

impl ChunkSinkFactory for FileTemplateFactory {
    fn open(&mut self, chunk_ordinal: u64) -> Result<Box<dyn ChunkWriter>> {
        let path = self.path_for(chunk_ordinal);
        let file = open_append(&path).with_context(|| format!("open {}", path.display()))?;
        let dest = EncodedFile::new(file, &path)
            .with_context(|| format!("setup compression for {}", path.display()))?;
        Ok(Box::new(CsvChunkWriter::with_finish(
            dest,
            self.buffer_size,
            EncodedFile::finish,
        )))
    }
}

fn open_append(path: &std::path::Path) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.append(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o644);
    }
    opts.open(path)
}

/// Render a naming template for `chunk_ordinal`; see the module docs.
#[must_use]
pub fn render_chunk_name(template: &str, chunk_ordinal: u64) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut substituted = false;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut int_verb = IntVerb::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => int_verb.left = true,
                '+' => int_verb.plus = true,
                ' ' => int_verb.space = true,
                '0' => int_verb.zero = true,
                _ => break,
            }
            chars.next();
        }
        while let Some(&d) = chars.peek() {
            let Some(v) = d.to_digit(10) else { break };
            int_verb.width = int_verb.width.saturating_mul(10).saturating_add(v as usize);
            chars.next();
        }

        match chars.next() {
            Some(verb @ ('d' | 'v' | 'x' | 'X' | 'o' | 'b')) if !substituted => {
                substituted = true;
                int_verb.render(verb, chunk_ordinal, &mut out);
            }
            // Bad verb, dangling '%', or a placeholder with no value left.
            _ => return out,
        }
    }

    out
}

/// Flags and width of one integer verb.
#[derive(Default)]
struct IntVerb {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    width: usize,
}

impl IntVerb {
    fn render(&self, verb: char, n: u64, out: &mut String) {
        let digits = match verb {
            'x' => format!("{n:x}"),
            'X' => format!("{n:X}"),
            'o' => format!("{n:o}"),
            'b' => format!("{n:b}"),
            _ => n.to_string(),
        };
        let sign = if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        };
        let pad = self.width.saturating_sub(sign.len() + digits.len());
        if self.left {
            out.push_str(sign);
            out.push_str(&digits);
            out.extend(std::iter::repeat_n(' ', pad));
        } else if self.zero {
            out.push_str(sign);
            out.extend(std::iter::repeat_n('0', pad));
            out.push_str(&digits);
        } else {
            out.extend(std::iter::repeat_n(' ', pad));
            out.push_str(sign);
            out.push_str(&digits);
        }
    }
}
