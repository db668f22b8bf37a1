use std::sync::Arc;

use async_trait::async_trait;

use crate::{format::Formatter, record::Record, rule::Rule};

use super::{Backend, BackendError, admits};

/// Forwards a record to the wrapped backend only when the rule holds.
///
/// The rule is fixed at construction. Formatter access, `set_filter` and
/// `close` pass straight through, so a filter installed later (for example
/// by [`Logger::set_level`](crate::logger::Logger::set_level)) is ANDed with
/// this one instead of replacing it. Stacking filters ANDs their rules too.
pub struct Filter<R: Record> {
    inner: Box<dyn Backend<R>>,
    rule: Rule,
}

impl<R: Record> Filter<R> {
    /// Wraps `inner` behind `rule`.
    pub fn new(inner: impl Backend<R> + 'static, rule: Rule) -> Self {
        Self {
            inner: Box::new(inner),
            rule,
        }
    }

    /// The decorator's rule.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }
}

#[async_trait]
impl<R: Record> Backend<R> for Filter<R> {
    async fn commit(&self, record: Arc<R>) {
        if admits(Some(&self.rule), record.as_ref()) {
            self.inner.commit(record).await;
        }
    }

    fn formatter(&self) -> Option<Arc<dyn Formatter<R>>> {
        self.inner.formatter()
    }

    fn set_formatter(&self, formatter: Arc<dyn Formatter<R>>) {
        self.inner.set_formatter(formatter);
    }

    /// Installs `rule` on the wrapped backend.
    fn set_filter(&self, rule: Rule) {
        self.inner.set_filter(rule);
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.inner.close().await
    }
}
