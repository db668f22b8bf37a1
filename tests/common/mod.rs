#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;

use fieldlog::{
    backend::{Backend, BackendError, admits},
    format::Formatter,
    record::{Entry, Record},
    rule::Rule,
};

/// Backend that remembers every record it receives.
#[derive(Default)]
pub struct Collector {
    seen: Mutex<Vec<Entry>>,
    formatter: Mutex<Option<Arc<dyn Formatter<Entry>>>>,
    filter: Mutex<Option<Rule>>,
    delay: Option<Duration>,
    closes: AtomicUsize,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Collector that sleeps before recording each commit.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.seen
            .lock()
            .expect("lock")
            .iter()
            .map(|e| e.message().to_string())
            .collect()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.seen.lock().expect("lock").clone()
    }

    /// True once some rule was installed through `set_filter`.
    pub fn has_filter(&self) -> bool {
        self.filter.lock().expect("lock").is_some()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend<Entry> for Collector {
    async fn commit(&self, record: Arc<Entry>) {
        let rule = self.filter.lock().expect("lock").clone();
        if !admits(rule.as_ref(), record.as_ref()) {
            return;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.seen.lock().expect("lock").push((*record).clone());
    }

    fn formatter(&self) -> Option<Arc<dyn Formatter<Entry>>> {
        self.formatter.lock().expect("lock").clone()
    }

    fn set_formatter(&self, formatter: Arc<dyn Formatter<Entry>>) {
        *self.formatter.lock().expect("lock") = Some(formatter);
    }

    fn set_filter(&self, rule: Rule) {
        *self.filter.lock().expect("lock") = Some(rule);
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn entry(level: fieldlog::types::Level, msg: &str) -> Arc<Entry> {
    Arc::new(Entry::new(level, msg))
}
