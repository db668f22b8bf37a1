use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    failure,
    format::{Formatter, render},
    record::Record,
    rule::Rule,
    types::Level,
};

use super::{Backend, BackendError, SinkSettings};

/// Re-emits each admitted record as a `tracing` event carrying the rendered
/// line, so records reach whatever subscriber the host process installed.
///
/// | record level | event level |
/// |---|---|
/// | `Protocol` | `TRACE` |
/// | `Debug` | `DEBUG` |
/// | `Info`, `NoPriority` | `INFO` |
/// | `Warn` | `WARN` |
/// | `Error`, `Fatal`, `Panic` | `ERROR` |
pub struct TracingSink<R: Record> {
    settings: SinkSettings<R>,
}

impl<R: Record> Default for TracingSink<R> {
    fn default() -> Self {
        Self {
            settings: SinkSettings::default(),
        }
    }
}

impl<R: Record> TracingSink<R> {
    /// Sink with no formatter yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink rendering with `formatter`.
    pub fn with_formatter(formatter: Arc<dyn Formatter<R>>) -> Self {
        let sink = Self::new();
        sink.settings.set_formatter(formatter);
        sink
    }
}

/// `tracing` level records at `level` are emitted at.
pub fn event_level(level: Level) -> tracing::Level {
    match level {
        Level::Protocol => tracing::Level::TRACE,
        Level::Debug => tracing::Level::DEBUG,
        Level::Info | Level::NoPriority => tracing::Level::INFO,
        Level::Warn => tracing::Level::WARN,
        Level::Error | Level::Fatal | Level::Panic => tracing::Level::ERROR,
    }
}

fn emit<R: Record>(record: &R, line: &str) {
    let domain = record.domain();
    let level = event_level(record.level());
    if level == tracing::Level::TRACE {
        tracing::trace!(domain, "{line}");
    } else if level == tracing::Level::DEBUG {
        tracing::debug!(domain, "{line}");
    } else if level == tracing::Level::INFO {
        tracing::info!(domain, "{line}");
    } else if level == tracing::Level::WARN {
        tracing::warn!(domain, "{line}");
    } else {
        tracing::error!(domain, "{line}");
    }
}

#[async_trait]
impl<R: Record> Backend<R> for TracingSink<R> {
    async fn commit(&self, record: Arc<R>) {
        let Some(formatter) = self.settings.formatter() else {
            failure::report(&BackendError::FormatterMissing, record.as_ref());
            return;
        };
        if !self.settings.admits(record.as_ref()) {
            return;
        }
        let rendered = render(formatter.as_ref(), record.as_ref());
        emit(record.as_ref(), String::from_utf8_lossy(&rendered).trim_end());
    }

    fn formatter(&self) -> Option<Arc<dyn Formatter<R>>> {
        self.settings.formatter()
    }

    fn set_formatter(&self, formatter: Arc<dyn Formatter<R>>) {
        self.settings.set_formatter(formatter);
    }

    fn set_filter(&self, rule: Rule) {
        self.settings.set_filter(rule);
    }

    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
