//! Cross-cutting wrappers around a [`RowTransformer`].
//!
//! - [`FaultIsolated`] turns transformer failures (returned errors *and*
//!   panics) into a logged pass-through of the input row.
//! - [`Traced`] logs each row before and after the inner transformer runs.
//!
//! Both only ever observe the transformer call; source and sink failures
//! travel through the pipeline untouched.

use crate::emit;
use crate::logging::SharedLog;
use crate::row::{Row, RowContext};
use crate::transform::RowTransformer;
use anyhow::Result;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Isolates faults of the inner transformer to the row that caused them.
///
/// On failure the fault is logged and the untransformed input row is
/// returned, so the pipeline keeps going and row counts are unaffected.
pub struct FaultIsolated<T> {
    inner: T,
    log: SharedLog,
}

impl<T: RowTransformer> FaultIsolated<T> {
    pub fn new(inner: T, log: SharedLog) -> Self {
        Self { inner, log }
    }
}

impl<T: RowTransformer> RowTransformer for FaultIsolated<T> {
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        let input = row.clone();
        // The inner transformer owns no state we read back after a panic.
        let outcome = catch_unwind(AssertUnwindSafe(|| self.inner.transform(ctx, row)));
        match outcome {
            Ok(Ok(out)) => Ok(out),
            Ok(Err(err)) => {
                emit!(self.log, "recovered from fault in transformer: {err:#}");
                Ok(input)
            }
            Err(payload) => {
                emit!(
                    self.log,
                    "recovered from fault in transformer: {}",
                    panic_message(payload.as_ref())
                );
                Ok(input)
            }
        }
    }
}

/// Logs the row before and after the inner transformer.
pub struct Traced<T> {
    inner: T,
    log: SharedLog,
}

impl<T: RowTransformer> Traced<T> {
    pub fn new(inner: T, log: SharedLog) -> Self {
        Self { inner, log }
    }
}

impl<T: RowTransformer> RowTransformer for Traced<T> {
    fn transform(&self, ctx: &RowContext, row: Row) -> Result<Row> {
        emit!(self.log, "before transformation: {row:?}");
        let out = self.inner.transform(ctx, row)?;
        emit!(self.log, "after transformation: {out:?}");
        Ok(out)
    }
}

/// Wrap `inner` in a [`FaultIsolated`].
pub fn isolate_faults<T: RowTransformer>(inner: T, log: SharedLog) -> FaultIsolated<T> {
    FaultIsolated::new(inner, log)
}

/// Wrap `inner` in a [`Traced`].
pub fn traced<T: RowTransformer>(inner: T, log: SharedLog) -> Traced<T> {
    Traced::new(inner, log)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
