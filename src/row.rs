//! Rows and the per-row context handed to transformers.

use serde::{Deserialize, Serialize};

/// One record: an ordered sequence of fields.
///
/// No arity is enforced; consecutive rows may have different lengths.
pub type Row = Vec<String>;

/// Row ordinal reported to transformers while a header is being emitted.
pub const HEADER_ROW_ORDINAL: i64 = -1;

/// Facts about the row currently being transformed.
///
/// A fresh context is built by the pipeline for every data row and every
/// header emission. It is `Copy` and handed out by shared reference, so a
/// transformer cannot alter what the next transformer in a chain observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowContext {
    /// 1-based ordinal of the chunk being written.
    pub chunk_ordinal: u64,
    /// 1-based position among data rows seen so far, or
    /// [`HEADER_ROW_ORDINAL`] for headers.
    pub row_ordinal: i64,
    /// Configured maximum number of data rows per chunk.
    pub chunk_capacity: u64,
    /// Whether the row being transformed is the header.
    pub is_header: bool,
}

impl RowContext {
    /// Context for the `row_ordinal`-th data row (1-based).
    #[must_use]
    pub fn data(chunk_ordinal: u64, row_ordinal: u64, chunk_capacity: u64) -> Self {
        Self {
            chunk_ordinal,
            row_ordinal: i64::try_from(row_ordinal).unwrap_or(i64::MAX),
            chunk_capacity,
            is_header: false,
        }
    }

    /// Context for a header emitted into chunk `chunk_ordinal`.
    #[must_use]
    pub fn header(chunk_ordinal: u64, chunk_capacity: u64) -> Self {
        Self {
            chunk_ordinal,
            row_ordinal: HEADER_ROW_ORDINAL,
            chunk_capacity,
            is_header: true,
        }
    }

    /// The data row ordinal, or `None` for header rows.
    #[must_use]
    pub fn data_ordinal(&self) -> Option<u64> {
        if self.is_header {
            None
        } else {
            u64::try_from(self.row_ordinal).ok()
        }
    }

    /// 1-based position of this row within its chunk, or `None` for headers.
    ///
    /// The last row of a full chunk reports `chunk_capacity`, never 0.
    #[must_use]
    pub fn chunk_row_ordinal(&self) -> Option<u64> {
        let r = self.data_ordinal()?;
        if r == 0 || self.chunk_capacity == 0 {
            return Some(r);
        }
        Some((r - 1) % self.chunk_capacity + 1)
    }
}
