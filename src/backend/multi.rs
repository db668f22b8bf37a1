use std::sync::Arc;

use async_trait::async_trait;

use crate::{format::Formatter, record::Record, rule::Rule};

use super::{Backend, BackendError, SinkSettings};

/// Copies every admitted record to each child backend, in order.
pub struct Multi<R: Record> {
    children: Vec<Box<dyn Backend<R>>>,
    settings: SinkSettings<R>,
}

impl<R: Record> Multi<R> {
    /// Fans out to `children`, giving each one its formatter.
    pub fn new(children: Vec<(Box<dyn Backend<R>>, Arc<dyn Formatter<R>>)>) -> Self {
        let children = children
            .into_iter()
            .map(|(backend, formatter)| {
                backend.set_formatter(formatter);
                backend
            })
            .collect();
        Self {
            children,
            settings: SinkSettings::default(),
        }
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// True when there are no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl<R: Record> Backend<R> for Multi<R> {
    async fn commit(&self, record: Arc<R>) {
        if !self.settings.admits(record.as_ref()) {
            return;
        }
        for child in &self.children {
            child.commit(Arc::clone(&record)).await;
        }
    }

    /// The first child's formatter.
    fn formatter(&self) -> Option<Arc<dyn Formatter<R>>> {
        self.children.first().and_then(|child| child.formatter())
    }

    /// Gives every child `formatter`.
    fn set_formatter(&self, formatter: Arc<dyn Formatter<R>>) {
        for child in &self.children {
            child.set_formatter(Arc::clone(&formatter));
        }
    }

    fn set_filter(&self, rule: Rule) {
        self.settings.set_filter(rule);
    }

    /// Closes every child and returns the first error.
    async fn close(&self) -> Result<(), BackendError> {
        let mut first_err = None;
        for child in &self.children {
            if let Err(err) = child.close().await {
                tracing::warn!(error = %err, "multi child failed to close");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
