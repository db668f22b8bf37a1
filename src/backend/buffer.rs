use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::{failure, format::Formatter, record::Record, rule::Rule};

use super::{Backend, BackendError, SinkSettings};

/// Queue settings for [`Buffered`].
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Records held before `commit` starts waiting.
    pub capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

enum Msg<R> {
    Record(Arc<R>),
    Close { resp: oneshot::Sender<()> },
}

/// Hands records to a worker task that forwards them, in order, to the
/// wrapped backend.
///
/// `commit` waits while the queue is full. `close` drains every record
/// accepted before it and then stops the worker; the wrapped backend is left
/// open.
pub struct Buffered<R: Record> {
    inner: Arc<dyn Backend<R>>,
    settings: SinkSettings<R>,
    tx: Mutex<Option<mpsc::Sender<Msg<R>>>>,
}

impl<R: Record> Buffered<R> {
    /// Starts the worker. Must be called inside a tokio runtime.
    pub fn spawn(inner: impl Backend<R> + 'static, config: BufferConfig) -> Self {
        let inner: Arc<dyn Backend<R>> = Arc::new(inner);
        let (tx, rx) = mpsc::channel::<Msg<R>>(config.capacity.max(1));
        tokio::spawn(run_worker(Arc::clone(&inner), rx));
        tracing::debug!(capacity = config.capacity, "buffer worker started");
        Self {
            inner,
            settings: SinkSettings::default(),
            tx: Mutex::new(Some(tx)),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Msg<R>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

async fn run_worker<R: Record>(inner: Arc<dyn Backend<R>>, mut rx: mpsc::Receiver<Msg<R>>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            Msg::Record(record) => inner.commit(record).await,
            Msg::Close { resp } => {
                rx.close();
                let mut drained = 0usize;
                while let Some(msg) = rx.recv().await {
                    match msg {
                        Msg::Record(record) => {
                            inner.commit(record).await;
                            drained += 1;
                        }
                        Msg::Close { resp } => {
                            let _ = resp.send(());
                        }
                    }
                }
                tracing::debug!(drained, "buffer worker drained");
                let _ = resp.send(());
                break;
            }
        }
    }
    tracing::debug!("buffer worker stopped");
}

#[async_trait]
impl<R: Record> Backend<R> for Buffered<R> {
    async fn commit(&self, record: Arc<R>) {
        if !self.settings.admits(record.as_ref()) {
            return;
        }
        let Some(tx) = self.sender() else {
            tracing::warn!("commit on closed buffer");
            failure::report(&BackendError::Closed, record.as_ref());
            return;
        };
        if let Err(mpsc::error::SendError(msg)) = tx.send(Msg::Record(record)).await {
            tracing::warn!("commit raced buffer close");
            if let Msg::Record(record) = msg {
                failure::report(&BackendError::Closed, record.as_ref());
            }
        }
    }

    fn formatter(&self) -> Option<Arc<dyn Formatter<R>>> {
        self.inner.formatter()
    }

    fn set_formatter(&self, formatter: Arc<dyn Formatter<R>>) {
        self.inner.set_formatter(formatter);
    }

    fn set_filter(&self, rule: Rule) {
        self.settings.set_filter(rule);
    }

    async fn close(&self) -> Result<(), BackendError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(tx) = tx else {
            return Ok(());
        };
        let (resp, ack) = oneshot::channel();
        tx.send(Msg::Close { resp })
            .await
            .map_err(|_| BackendError::ChannelClosed)?;
        drop(tx);
        ack.await.map_err(|_| BackendError::ChannelClosed)
    }
}
