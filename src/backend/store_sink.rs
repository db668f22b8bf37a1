use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    failure,
    format::{Formatter, render},
    record::Record,
    rule::Rule,
    store::{Storer, StorerExt},
};

use super::{Backend, BackendError, SinkSettings};

/// Envelope version written by [`StoreSink`].
pub const STORED_FORMAT_VERSION: u16 = 1;

/// A record as persisted by [`StoreSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord<R> {
    /// Envelope version.
    pub format_version: u16,
    /// Formatter output at commit time.
    pub rendered: String,
    /// The record itself.
    pub record: R,
}

#[derive(Serialize)]
struct StoredRecordRef<'a, R> {
    format_version: u16,
    rendered: &'a str,
    record: &'a R,
}

/// Store key for a record dated `date`.
///
/// RFC 3339 in UTC with nanoseconds and a `Z` suffix. Every key has the same
/// width, so key order is chronological. Records with the same instant share
/// a key and the later write wins.
pub fn timestamp_key(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decodes a value written by [`StoreSink`].
pub fn decode_stored<R: DeserializeOwned>(bytes: &[u8]) -> Result<StoredRecord<R>, BackendError> {
    let stored: StoredRecord<R> = serde_json::from_slice(bytes)?;
    if stored.format_version != STORED_FORMAT_VERSION {
        return Err(BackendError::UnsupportedFormat(stored.format_version));
    }
    Ok(stored)
}

/// Persists each admitted record under its [`timestamp_key`].
pub struct StoreSink<R: Record> {
    store: Arc<dyn Storer>,
    settings: SinkSettings<R>,
}

impl<R: Record + Serialize> StoreSink<R> {
    /// Sink writing into `store`.
    pub fn new(store: Arc<dyn Storer>) -> Self {
        Self {
            store,
            settings: SinkSettings::default(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Storer> {
        &self.store
    }

    async fn persist(&self, record: &R) -> Result<(), BackendError> {
        let formatter = self.settings.formatter().ok_or(BackendError::FormatterMissing)?;
        let rendered = render(formatter.as_ref(), record);
        let value = serde_json::to_vec(&StoredRecordRef {
            format_version: STORED_FORMAT_VERSION,
            rendered: &String::from_utf8_lossy(&rendered),
            record,
        })?;
        let key = timestamp_key(record.date());
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.update(|tx| tx.put(&key, &value)))
            .await
            .map_err(|e| BackendError::CommitFailure(format!("join error: {e}")))??;
        Ok(())
    }
}

#[async_trait]
impl<R: Record + Serialize> Backend<R> for StoreSink<R> {
    async fn commit(&self, record: Arc<R>) {
        if !self.settings.admits(record.as_ref()) {
            return;
        }
        if let Err(err) = self.persist(record.as_ref()).await {
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
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.close())
            .await
            .map_err(|e| BackendError::CommitFailure(format!("join error: {e}")))??;
        Ok(())
    }
}
