//! Record sinks and the decorators that compose them.
//!
//! A [`Backend`] accepts records through [`Backend::commit`]. Delivery
//! failures never reach the caller; they go to the
//! [failure hook](crate::failure). Leaf sinks ([`writer::Writer`],
//! [`logfmt::Logfmt`], [`forward::TracingSink`], [`store_sink::StoreSink`])
//! render and persist; decorators
//! ([`filter::Filter`], [`buffer::Buffered`], [`multi::Multi`]) route.

use std::io;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::{
    failure,
    format::{FormatError, Formatter},
    record::Record,
    rule::{Rule, RuleError},
    store::StoreError,
};

/// Asynchronous FIFO decorator.
pub mod buffer;
/// Rule-gated decorator.
pub mod filter;
/// Sink re-emitting records as `tracing` events.
pub mod forward;
/// Sink writing logfmt lines.
pub mod logfmt;
/// Fan-out to several backends.
pub mod multi;
/// Byte-stream to record bridge.
pub mod outer;
/// Sink persisting into an ordered store.
pub mod store_sink;
/// Sink writing rendered lines to an `io::Write`.
pub mod writer;

/// Backend failures.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The sink needs a formatter and has none.
    #[error("formatter not set")]
    FormatterMissing,
    /// Delivery failed for a reason with no dedicated variant.
    #[error("commit failed: {0}")]
    CommitFailure(String),
    /// A rule could not be evaluated.
    #[error(transparent)]
    Rule(#[from] RuleError),
    /// The store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The formatter failed.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// Writing to the output failed.
    #[error("io: {0}")]
    Io(#[from] io::Error),
    /// Encoding or decoding a stored record failed.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// A stored record has an unknown envelope version.
    #[error("unsupported stored record format version {0}")]
    UnsupportedFormat(u16),
    /// The backend no longer accepts records.
    #[error("backend closed")]
    Closed,
    /// Close was called on a backend that is not running.
    #[error("already closed")]
    AlreadyClosed,
    /// A worker went away without answering.
    #[error("worker channel closed")]
    ChannelClosed,
}

/// A record sink.
#[async_trait]
pub trait Backend<R: Record>: Send + Sync {
    /// Delivers `record`. Failures go to the failure hook.
    async fn commit(&self, record: Arc<R>);

    /// Formatter used to render records, if any.
    fn formatter(&self) -> Option<Arc<dyn Formatter<R>>>;

    /// Replaces the formatter.
    fn set_formatter(&self, formatter: Arc<dyn Formatter<R>>);

    /// Replaces the rule this backend applies before delivery. Decorators
    /// whose rule is fixed, like [`filter::Filter`], pass it on to the
    /// backend they wrap.
    fn set_filter(&self, rule: Rule);

    /// Stops the backend and releases its resources.
    async fn close(&self) -> Result<(), BackendError>;
}

#[async_trait]
impl<R: Record, B: Backend<R> + ?Sized> Backend<R> for Arc<B> {
    async fn commit(&self, record: Arc<R>) {
        (**self).commit(record).await
    }

    fn formatter(&self) -> Option<Arc<dyn Formatter<R>>> {
        (**self).formatter()
    }

    fn set_formatter(&self, formatter: Arc<dyn Formatter<R>>) {
        (**self).set_formatter(formatter)
    }

    fn set_filter(&self, rule: Rule) {
        (**self).set_filter(rule)
    }

    async fn close(&self) -> Result<(), BackendError> {
        (**self).close().await
    }
}

#[async_trait]
impl<R: Record, B: Backend<R> + ?Sized> Backend<R> for Box<B> {
    async fn commit(&self, record: Arc<R>) {
        (**self).commit(record).await
    }

    fn formatter(&self) -> Option<Arc<dyn Formatter<R>>> {
        (**self).formatter()
    }

    fn set_formatter(&self, formatter: Arc<dyn Formatter<R>>) {
        (**self).set_formatter(formatter)
    }

    fn set_filter(&self, rule: Rule) {
        (**self).set_filter(rule)
    }

    async fn close(&self) -> Result<(), BackendError> {
        (**self).close().await
    }
}

/// True when `rule` is absent or holds for `record`.
///
/// An evaluation failure rejects the record and is reported.
pub fn admits<R: Record>(rule: Option<&Rule>, record: &R) -> bool {
    let Some(rule) = rule else {
        return true;
    };
    match rule.evaluate(record) {
        Ok(pass) => pass,
        Err(err) => {
            failure::report(&BackendError::Rule(err), record);
            false
        }
    }
}

/// Formatter and filter slots of a sink.
pub(crate) struct SinkSettings<R: Record> {
    formatter: RwLock<Option<Arc<dyn Formatter<R>>>>,
    filter: RwLock<Option<Arc<Rule>>>,
}

impl<R: Record> Default for SinkSettings<R> {
    fn default() -> Self {
        Self {
            formatter: RwLock::new(None),
            filter: RwLock::new(None),
        }
    }
}

impl<R: Record> SinkSettings<R> {
    pub(crate) fn formatter(&self) -> Option<Arc<dyn Formatter<R>>> {
        self.formatter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_formatter(&self, formatter: Arc<dyn Formatter<R>>) {
        *self.formatter.write().unwrap_or_else(PoisonError::into_inner) = Some(formatter);
    }

    pub(crate) fn set_filter(&self, rule: Rule) {
        *self.filter.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(rule));
    }

    pub(crate) fn admits(&self, record: &R) -> bool {
        let rule = self.filter.read().unwrap_or_else(PoisonError::into_inner).clone();
        admits(rule.as_deref(), record)
    }
}
