use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::{
    failure,
    format::{Formatter, render},
    record::Record,
    rule::Rule,
};

use super::{Backend, BackendError, SinkSettings};

/// Writes each admitted record, rendered and newline-terminated, to `W`.
pub struct Writer<W, R: Record> {
    out: Mutex<W>,
    settings: SinkSettings<R>,
}

impl<W: Write + Send + 'static, R: Record> Writer<W, R> {
    /// Sink over `out` with no formatter yet.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            settings: SinkSettings::default(),
        }
    }

    /// Sink over `out` rendering with `formatter`.
    pub fn with_formatter(out: W, formatter: Arc<dyn Formatter<R>>) -> Self {
        let sink = Self::new(out);
        sink.settings.set_formatter(formatter);
        sink
    }

    /// Swaps the output, returning the previous one.
    pub fn replace_output(&self, out: W) -> W {
        let mut guard = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, out)
    }

    fn write_line(&self, record: &R) -> Result<(), BackendError> {
        let formatter = self.settings.formatter().ok_or(BackendError::FormatterMissing)?;
        let mut line = render(formatter.as_ref(), record);
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(&line)?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send + 'static, R: Record> Backend<R> for Writer<W, R> {
    async fn commit(&self, record: Arc<R>) {
        if !self.settings.admits(record.as_ref()) {
            return;
        }
        if let Err(err) = self.write_line(record.as_ref()) {
            failure::report(&err, record.as_ref());
        }
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
        self.out.lock().unwrap_or_else(PoisonError::into_inner).flush()?;
        Ok(())
    }
}
