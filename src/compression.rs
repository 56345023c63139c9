//! Transparent compression for input files and chunk files.
//!
//! Chunk files whose name ends in a known extension are compressed on the fly,
//! and input files are decompressed when their extension *or* their leading
//! magic bytes match a codec. Codecs are feature-gated:
//! - **Gzip** (`.gz`, `.gzip`) via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`, `.zstd`) via `zstd` (feature: `compression-zstd`)
//!
//! Extensions are checked first; magic bytes are only consulted for readers,
//! since a writer has nothing to peek at yet.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

/// A supported compression format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    #[cfg(feature = "compression-gzip")]
    Gzip,
    #[cfg(feature = "compression-zstd")]
    Zstd,
}

impl Codec {
    /// Every codec compiled into this build.
    pub const ALL: &'static [Codec] = &[
        #[cfg(feature = "compression-gzip")]
        Codec::Gzip,
        #[cfg(feature = "compression-zstd")]
        Codec::Zstd,
    ];

    /// Human-readable codec name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            #[cfg(feature = "compression-gzip")]
            Codec::Gzip => "gzip",
            #[cfg(feature = "compression-zstd")]
            Codec::Zstd => "zstd",
        }
    }

    /// Lowercase file extensions, with the leading dot.
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "compression-gzip")]
            Codec::Gzip => &[".gz", ".gzip"],
            #[cfg(feature = "compression-zstd")]
            Codec::Zstd => &[".zst", ".zstd"],
        }
    }

    fn magic_bytes(self) -> &'static [u8] {
        match self {
            #[cfg(feature = "compression-gzip")]
            Codec::Gzip => &[0x1f, 0x8b],
            #[cfg(feature = "compression-zstd")]
            Codec::Zstd => &[0x28, 0xb5, 0x2f, 0xfd],
        }
    }

    /// Codec matching the extension of `path`, case-insensitively.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Codec> {
        let name = path.as_ref().to_string_lossy().to_lowercase();
        Codec::ALL
            .iter()
            .copied()
            .find(|c| c.extensions().iter().any(|ext| name.ends_with(ext)))
    }

    fn from_magic<R: BufRead>(reader: &mut R) -> Option<Codec> {
        let buf = reader.fill_buf().ok()?;
        Codec::ALL
            .iter()
            .copied()
            .find(|c| buf.starts_with(c.magic_bytes()))
    }
}

/// Open `path` for reading, decompressing when a codec is detected.
///
/// # Errors
/// Returns an error if the file cannot be opened or the decoder cannot be
/// initialised.
pub fn open_reader(path: impl AsRef<Path>) -> io::Result<Box<dyn Read + Send>> {
    let path = path.as_ref();
    let mut buffered = BufReader::new(File::open(path)?);
    let codec = match Codec::from_path(path) {
        Some(c) => Some(c),
        None => Codec::from_magic(&mut buffered),
    };
    match codec {
        Some(c) => wrap_reader(c, buffered),
        None => Ok(Box::new(buffered)),
    }
}

#[allow(unused_variables)]
fn wrap_reader(codec: Codec, reader: BufReader<File>) -> io::Result<Box<dyn Read + Send>> {
    match codec {
        #[cfg(feature = "compression-gzip")]
        Codec::Gzip => Ok(Box::new(flate2::bufread::MultiGzDecoder::new(reader))),
        #[cfg(feature = "compression-zstd")]
        Codec::Zstd => Ok(Box::new(zstd::stream::read::Decoder::with_buffer(reader)?)),
    }
}

/// A chunk file, possibly behind a compressing encoder.
///
/// Call [`EncodedFile::finish`] to write any codec trailer; dropping the value
/// without finishing may leave a truncated stream.
pub enum EncodedFile {
    Plain(File),
    #[cfg(feature = "compression-gzip")]
    Gzip(flate2::write::GzEncoder<File>),
    #[cfg(feature = "compression-zstd")]
    Zstd(zstd::stream::write::Encoder<'static, File>),
}

impl EncodedFile {
    /// Wrap `file` with the codec implied by `path`, if any.
    ///
    /// # Errors
    /// Returns an error if the encoder cannot be initialised.
    pub fn new(file: File, path: impl AsRef<Path>) -> io::Result<Self> {
        match Codec::from_path(path) {
            None => Ok(EncodedFile::Plain(file)),
            #[cfg(feature = "compression-gzip")]
            Some(Codec::Gzip) => Ok(EncodedFile::Gzip(flate2::write::GzEncoder::new(
                file,
                flate2::Compression::default(),
            ))),
            #[cfg(feature = "compression-zstd")]
            Some(Codec::Zstd) => Ok(EncodedFile::Zstd(zstd::stream::write::Encoder::new(
                file, 3,
            )?)),
        }
    }

    /// Flush everything, write the codec trailer and close the file.
    ///
    /// # Errors
    /// Returns the first I/O error encountered.
    pub fn finish(self) -> io::Result<()> {
        let file = match self {
            EncodedFile::Plain(mut f) => {
                f.flush()?;
                f
            }
            #[cfg(feature = "compression-gzip")]
            EncodedFile::Gzip(enc) => enc.finish()?,
            #[cfg(feature = "compression-zstd")]
            EncodedFile::Zstd(enc) => enc.finish()?,
        };
        drop(file);
        Ok(())
    }
}

impl Write for EncodedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EncodedFile::Plain(f) => f.write(buf),
            #[cfg(feature = "compression-gzip")]
            EncodedFile::Gzip(enc) => enc.write(buf),
            #[cfg(feature = "compression-zstd")]
            EncodedFile::Zstd(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EncodedFile::Plain(f) => f.flush(),
            #[cfg(feature = "compression-gzip")]
            EncodedFile::Gzip(enc) => enc.flush(),
            #[cfg(feature = "compression-zstd")]
            EncodedFile::Zstd(enc) => enc.flush(),
        }
    }
}
