//! Logging sinks used by the pipeline and the transformer wrappers.
//!
//! A sink is a formatting callback: it receives pre-built
//! [`fmt::Arguments`] and decides where they go. Three flavours ship with the
//! crate:
//! - [`LogFacade`] (the default) forwards to the [`log`] crate under target
//!   `csvchunk`; with no logger installed it is silent.
//! - [`NoopLog`] drops everything.
//! - Any `Fn(fmt::Arguments<'_>) + Send + Sync` closure.
//!
//! Use the [`emit!`](crate::emit) macro to log through a sink with
//! `format!`-style arguments.

use std::fmt;
use std::sync::Arc;

/// Destination for diagnostic messages.
pub trait LogSink: Send + Sync {
    /// Record one formatted message.
    fn log(&self, args: fmt::Arguments<'_>);
}

/// Shared, type-erased sink as stored in the pipeline.
pub type SharedLog = Arc<dyn LogSink>;

/// Forwards messages to the `log` facade at `info` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogFacade;

impl LogSink for LogFacade {
    fn log(&self, args: fmt::Arguments<'_>) {
        log::info!(target: "csvchunk", "{args}");
    }
}

/// Discards all messages.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLog;

impl LogSink for NoopLog {
    fn log(&self, _args: fmt::Arguments<'_>) {}
}

impl<F> LogSink for F
where
    F: Fn(fmt::Arguments<'_>) + Send + Sync,
{
    fn log(&self, args: fmt::Arguments<'_>) {
        self(args)
    }
}

/// The sink used when none is configured.
#[must_use]
pub fn default_log() -> SharedLog {
    Arc::new(LogFacade)
}

/// Log through a [`LogSink`] with `format!`-style arguments.
///
/// ```
/// use csvchunk::{emit, logging::NoopLog};
///
/// let sink = NoopLog;
/// emit!(sink, "{} rows processed", 10);
/// ```
#[macro_export]
macro_rules! emit {
    ($sink:expr, $($arg:tt)+) => {{
        use $crate::logging::LogSink as _;
        $sink.log(::std::format_args!($($arg)+))
    }};
}
