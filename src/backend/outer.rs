use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, oneshot};

use crate::{
    record::Record,
    types::{Level, Tags},
};

use super::{Backend, BackendError};

/// Tag put on every record produced by the bridge.
pub const OUTER_TAG: &str = "outer";

enum BridgeMsg {
    Line(String),
    Close { resp: oneshot::Sender<()> },
}

enum BridgeState {
    Idle,
    Running(mpsc::UnboundedSender<BridgeMsg>),
    Closed,
}

/// Turns lines written by third-party code into records.
///
/// Every line written through an [`OuterWriter`] becomes one record with the
/// bridge's level and the tags `outer` plus the bridge tag, committed to the
/// backend in write order.
pub struct OuterLog<R: Record> {
    backend: Arc<dyn Backend<R>>,
    level: Level,
    tag: String,
    state: Mutex<BridgeState>,
}

impl<R: Record> OuterLog<R> {
    /// Bridge into `backend`. Nothing runs until the first [`OuterLog::writer`].
    pub fn new(backend: Arc<dyn Backend<R>>, level: Level, tag: impl Into<String>) -> Self {
        Self {
            backend,
            level,
            tag: tag.into(),
            state: Mutex::new(BridgeState::Idle),
        }
    }

    /// A new line buffer feeding the bridge. The first call starts the
    /// bridge task and must happen inside a tokio runtime.
    pub fn writer(&self) -> OuterWriter {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, BridgeState::Idle) {
            let (tx, rx) = mpsc::unbounded_channel();
            let tags: Tags = [OUTER_TAG, self.tag.as_str()].into_iter().collect();
            tokio::spawn(run_bridge(Arc::clone(&self.backend), rx, self.level, tags));
            tracing::debug!(tag = %self.tag, level = %self.level, "outer log bridge started");
            *state = BridgeState::Running(tx);
        }
        let tx = match &*state {
            BridgeState::Running(tx) => Some(tx.clone()),
            BridgeState::Idle | BridgeState::Closed => None,
        };
        OuterWriter {
            tx,
            buf: Vec::new(),
        }
    }

    /// Commits every line accepted so far, then stops the bridge.
    pub async fn close(&self) -> Result<(), BackendError> {
        let tx = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *state, BridgeState::Closed) {
                BridgeState::Running(tx) => tx,
                idle_or_closed => {
                    *state = idle_or_closed;
                    return Err(BackendError::AlreadyClosed);
                }
            }
        };
        let (resp, ack) = oneshot::channel();
        tx.send(BridgeMsg::Close { resp })
            .map_err(|_| BackendError::ChannelClosed)?;
        ack.await.map_err(|_| BackendError::ChannelClosed)
    }
}

async fn run_bridge<R: Record>(
    backend: Arc<dyn Backend<R>>,
    mut rx: mpsc::UnboundedReceiver<BridgeMsg>,
    level: Level,
    tags: Tags,
) {
    let mut ack = None;
    while let Some(msg) = rx.recv().await {
        match msg {
            BridgeMsg::Line(line) => {
                let record = match backend.formatter() {
                    Some(formatter) => formatter.new_entry(level, tags.clone(), line),
                    None => R::from_line(level, tags.clone(), line),
                };
                backend.commit(Arc::new(record)).await;
            }
            BridgeMsg::Close { resp } => {
                rx.close();
                ack = Some(resp);
            }
        }
    }
    tracing::debug!("outer log bridge stopped");
    if let Some(resp) = ack {
        let _ = resp.send(());
    }
}

/// `io::Write` end of an [`OuterLog`]. Bytes after the last newline stay
/// buffered until a newline arrives; they are dropped with the writer.
pub struct OuterWriter {
    tx: Option<mpsc::UnboundedSender<BridgeMsg>>,
    buf: Vec<u8>,
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "outer log closed")
}

impl io::Write for OuterWriter {
    /// Queues every complete line in `data`. Returns `Err` only when nothing
    /// from this call was taken; if the bridge closes halfway, the call
    /// still succeeds and the next one fails.
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let Some(tx) = self.tx.as_ref().filter(|tx| !tx.is_closed()) else {
            return Err(closed());
        };
        let start = self.buf.len();
        self.buf.extend_from_slice(data);
        let mut sent = 0usize;
        while let Some(end) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf[..end].strip_suffix(b"\r").unwrap_or(&self.buf[..end]);
            let line = String::from_utf8_lossy(line).into_owned();
            if tx.send(BridgeMsg::Line(line)).is_err() {
                if sent == 0 {
                    self.buf.truncate(start);
                    return Err(closed());
                }
                break;
            }
            self.buf.drain(..=end);
            sent += 1;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn writer() -> (OuterWriter, mpsc::UnboundedReceiver<BridgeMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            OuterWriter {
                tx: Some(tx),
                buf: Vec::new(),
            },
            rx,
        )
    }

    fn line(msg: Option<BridgeMsg>) -> Option<String> {
        match msg {
            Some(BridgeMsg::Line(line)) => Some(line),
            _ => None,
        }
    }

    #[test]
    fn failed_write_consumes_nothing() {
        let (mut w, rx) = writer();
        assert_eq!(w.write(b"partial").expect("buffered"), 7);
        drop(rx);

        let err = w.write(b" tail\nmore").expect_err("bridge gone");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(w.buf, b"partial");
    }

    #[test]
    fn lines_are_split_and_carriage_returns_dropped() {
        let (mut w, mut rx) = writer();
        assert_eq!(w.write(b"one\r\ntwo\nthr").expect("write"), 13);
        assert_eq!(line(rx.try_recv().ok()).as_deref(), Some("one"));
        assert_eq!(line(rx.try_recv().ok()).as_deref(), Some("two"));
        assert!(rx.try_recv().is_err());
        assert_eq!(w.buf, b"thr");
    }

    #[test]
    fn writer_without_bridge_is_closed() {
        let mut w = OuterWriter {
            tx: None,
            buf: Vec::new(),
        };
        assert_eq!(w.write(b"x\n").expect_err("no bridge").kind(), io::ErrorKind::BrokenPipe);
    }
}
