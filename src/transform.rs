//! Row transformers: the per-row functions the pipeline applies before writing.
//!
//! A [`RowTransformer`] maps `(context, row)` to an output row. The output may
//! differ in length, content, and field order. Transformers are called for
//! header emissions too ([`RowContext::is_header`] is `true` there), so a
//! transformer that adds a column should also add the column's label.
//!
//! Built-ins:
//! - [`Identity`] passes rows through.
//! - [`RowNumber`] inserts the overall data-row ordinal.
//! - [`ChunkRowNumber`] inserts the 1-based position within the current chunk.
//! - [`ReplaceValues`] swaps whole field values through a lookup table.
//! - [`ConstantColumn`] inserts a literal column.
//! - [`Chain`] runs several transformers in order.
//!
//! Custom logic can be plugged in with [`from_fn`] (fallible) or
//! [`map_rows`] (infallible), or by implementing the trait directly.
//!
//! # Example
//! ```
//! use csvchunk::transform::*;
//! use csvchunk::RowContext;
//!
//! # fn main() -> anyhow::Result<()> {
//! let t = RowNumber::new("S.no").then(ConstantColumn::new("source", "crm", 1));
//!
//! let header = t.transform(&RowContext::header(1, 100), vec!["name".into()])?;
//! assert_eq!(header, vec!["S.no", "source", "name"]);
//!
//! let row = t.transform(&RowContext::data(1, 7, 100), vec!["alice".into()])?;
//! assert_eq!(row, vec!["7", "crm", "alice"]);
//! # Ok(())
//! # }
//! ```

use crate::row::{Row, RowContext};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// A function from `(context, row)` to an output row.
///
/// Implementations must not keep state between calls beyond what the
/// context provides; the pipeline may call them any number of times and
/// calls the same instance for headers and data rows.
pub trait RowTransformer: Send + Sync {
    /// Transform one row.
    ///
    /// # Errors
    /// A returned error aborts the pipeline unless the transformer is wrapped
    /// in [`FaultIsolated`](crate::wrapper::FaultIsolated).
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row>;
}

/// Type-erased transformer as stored in the pipeline.
pub type SharedTransformer = Arc<dyn RowTransformer>;

impl<T: RowTransformer + ?Sized> RowTransformer for Arc<T> {
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        (**self).transform(ctx, row)
    }
}

impl<T: RowTransformer + ?Sized> RowTransformer for Box<T> {
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        (**self).transform(ctx, row)
    }
}

/// Combinators available on every transformer.
pub trait RowTransformerExt: RowTransformer + Sized + 'static {
    /// Run `self`, then feed its output to `next`.
    fn then<N: RowTransformer + 'static>(self, next: N) -> Chain {
        Chain::new(vec![Arc::new(self) as SharedTransformer, Arc::new(next)])
    }

    /// Erase the concrete type.
    fn shared(self) -> SharedTransformer {
        Arc::new(self)
    }
}

impl<T: RowTransformer + Sized + 'static> RowTransformerExt for T {}

/// Adapter returned by [`from_fn`].
pub struct FnTransformer<F>(F);

impl<F> RowTransformer for FnTransformer<F>
where
    F: Fn(&RowContext, Row) -> Result<Row> + Send + Sync,
{
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        (self.0)(ctx, row)
    }
}

/// Build a transformer from a fallible closure.
pub fn from_fn<F>(f: F) -> FnTransformer<F>
where
    F: Fn(&RowContext, Row) -> Result<Row> + Send + Sync,
{
    FnTransformer(f)
}

/// Adapter returned by [`map_rows`].
pub struct MapRows<F>(F);

impl<F> RowTransformer for MapRows<F>
where
    F: Fn(&RowContext, Row) -> Row + Send + Sync,
{
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        Ok((self.0)(ctx, row))
    }
}

/// Build a transformer from an infallible closure.
pub fn map_rows<F>(f: F) -> MapRows<F>
where
    F: Fn(&RowContext, Row) -> Row + Send + Sync,
{
    MapRows(f)
}

/// Leaves every row untouched. The default transformer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl RowTransformer for Identity {
    fn transform(&self, _ctx: &RowContext, row: Row) -> Result<Row> {
        Ok(row)
    }
}

/// Inserts the overall data-row ordinal at `index`.
///
/// Header rows receive `column_name` at the same index instead.
#[derive(Clone, Debug)]
pub struct RowNumber {
    column_name: String,
    index: usize,
}

impl RowNumber {
    /// Insert as the first column.
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            index: 0,
        }
    }

    /// Insert at `index` instead (clamped to the row length).
    #[must_use]
    pub fn at(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

impl RowTransformer for RowNumber {
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        let value = if ctx.is_header {
            self.column_name.clone()
        } else {
            ctx.row_ordinal.to_string()
        };
        Ok(insert_at(row, value, self.index))
    }
}

/// Inserts the 1-based position of the row within its chunk at `index`.
///
/// For overall ordinal `r` and capacity `k` the value is `((r - 1) % k) + 1`,
/// so the last row of a full chunk reports `k`. Header rows receive
/// `column_name`.
#[derive(Clone, Debug)]
pub struct ChunkRowNumber {
    column_name: String,
    index: usize,
}

impl ChunkRowNumber {
    /// Insert as the first column.
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            index: 0,
        }
    }

    /// Insert at `index` instead (clamped to the row length).
    #[must_use]
    pub fn at(mut self, index: usize) -> Self {
        self.index = index;
        self
    }
}

impl RowTransformer for ChunkRowNumber {
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        let value = match ctx.chunk_row_ordinal() {
            Some(n) => n.to_string(),
            None => self.column_name.clone(),
        };
        Ok(insert_at(row, value, self.index))
    }
}

/// Replaces fields whose whole value matches a key of the table.
///
/// Unmatched fields pass through. Header rows are never rewritten.
#[derive(Clone, Debug, Default)]
pub struct ReplaceValues {
    replacements: HashMap<String, String>,
}

impl ReplaceValues {
    /// Build from `(from, to)` pairs.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            replacements: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl RowTransformer for ReplaceValues {
    fn transform(&self, ctx: &RowContext, mut row: Row) -> Result<Row> {
        if ctx.is_header {
            return Ok(row);
        }
        for field in &mut row {
            if let Some(to) = self.replacements.get(field.as_str()) {
                field.clone_from(to);
            }
        }
        Ok(row)
    }
}

/// Inserts a constant `value` at `index`; header rows get `column_name`.
#[derive(Clone, Debug)]
pub struct ConstantColumn {
    column_name: String,
    value: String,
    index: usize,
}

impl ConstantColumn {
    pub fn new(column_name: impl Into<String>, value: impl Into<String>, index: usize) -> Self {
        Self {
            column_name: column_name.into(),
            value: value.into(),
            index,
        }
    }
}

impl RowTransformer for ConstantColumn {
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        let value = if ctx.is_header {
            &self.column_name
        } else {
            &self.value
        };
        Ok(insert_at(row, value.clone(), self.index))
    }
}

/// Runs transformers in order, each consuming the previous one's output.
///
/// Every stage sees the same context. An error from any stage stops the
/// chain and is returned as is.
#[derive(Clone, Default)]
pub struct Chain {
    stages: Vec<SharedTransformer>,
}

impl Chain {
    pub fn new(stages: Vec<SharedTransformer>) -> Self {
        Self { stages }
    }

    /// Append a stage.
    #[must_use]
    pub fn push<T: RowTransformer + 'static>(mut self, stage: T) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl RowTransformer for Chain {
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        self.stages
            .iter()
            .try_fold(row, |row, stage| stage.transform(ctx, row))
    }
}

/// Insert `value` before position `index`, appending when `index` is past
/// the end.
fn insert_at(mut row: Row, value: String, index: usize) -> Row {
    let index = index.min(row.len());
    row.insert(index, value);
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Row {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn insert_at_front_middle_and_past_end() {
        assert_eq!(insert_at(row(&["a", "b"]), "x".into(), 0), row(&["x", "a", "b"]));
        assert_eq!(insert_at(row(&["a", "b"]), "x".into(), 1), row(&["a", "x", "b"]));
        assert_eq!(insert_at(row(&["a", "b"]), "x".into(), 2), row(&["a", "b", "x"]));
        assert_eq!(insert_at(row(&["a", "b"]), "x".into(), 9), row(&["a", "b", "x"]));
        assert_eq!(insert_at(Row::new(), "x".into(), 3), row(&["x"]));
    }

    #[test]
    fn empty_chain_is_identity() -> Result<()> {
        let chain = Chain::default();
        assert!(chain.is_empty());
        let out = chain.transform(&RowContext::data(1, 1, 10), row(&["a"]))?;
        assert_eq!(out, row(&["a"]));
        Ok(())
    }
}
