//! SQLite-backed [`Storer`] with real commit and rollback.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::{Cursor, KeyValue, StoreError, StoreResult, Storer, Transaction, TxBody};

/// Connection settings for [`SqliteStore`].
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Use the write-ahead log journal.
    pub wal: bool,
    /// Value of `PRAGMA synchronous`.
    pub synchronous: &'static str,
    /// How long a writer waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            wal: true,
            synchronous: "NORMAL",
            busy_timeout_ms: 5_000,
        }
    }
}

/// Ordered store persisted in one SQLite table.
///
/// Write transactions run as `BEGIN IMMEDIATE` and commit only when the body
/// returns `Ok`.
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Opens or creates a store at `path`.
    pub fn open(path: impl AsRef<Path>, cfg: SqliteStoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn, &cfg)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn, &SqliteStoreConfig::default())
    }

    fn init_connection(conn: Connection, cfg: &SqliteStoreConfig) -> StoreResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        if cfg.wal {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.pragma_update(None, "synchronous", cfg.synchronous)?;
        conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        f(conn)
    }
}

impl Storer for SqliteStore {
    fn supports_tx(&self) -> bool {
        true
    }

    fn tx(&self, write: bool, body: TxBody<'_>) -> StoreResult<()> {
        self.with_conn(|conn| {
            let behavior = if write {
                TransactionBehavior::Immediate
            } else {
                TransactionBehavior::Deferred
            };
            let sql_tx = conn.transaction_with_behavior(behavior)?;
            let result = body(&mut SqliteTx {
                conn: &sql_tx,
                writable: write,
            });
            match result {
                Ok(()) if write => Ok(sql_tx.commit()?),
                Ok(()) => Ok(sql_tx.rollback()?),
                Err(err) => Err(after_rollback(err, sql_tx.rollback())),
            }
        })
    }

    fn len(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn drop_all(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM entries", [])?;
            Ok(())
        })
    }

    fn close(&self) -> StoreResult<()> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(StoreError::Closed)?;
        conn.close().map_err(|(_, err)| StoreError::Sqlite(err))
    }
}

/// The body's error wins over a failed rollback, which is only logged.
fn after_rollback(body_err: StoreError, rollback: rusqlite::Result<()>) -> StoreError {
    if let Err(err) = rollback {
        tracing::warn!(error = %err, body_error = %body_err, "sqlite rollback failed");
    }
    body_err
}

struct SqliteTx<'c> {
    conn: &'c Connection,
    writable: bool,
}

impl SqliteTx<'_> {
    fn ensure_writable(&self) -> StoreResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::ReadOnly)
        }
    }
}

impl Transaction for SqliteTx<'_> {
    fn is_writable(&self) -> bool {
        self.writable
    }

    fn put(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.ensure_writable()?;
        if key.is_empty() {
            return Err(StoreError::InvalidKey);
        }
        self.conn
            .prepare_cached(
                "INSERT INTO entries(key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?
            .execute(params![key, value])?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.conn
            .prepare_cached("SELECT value FROM entries WHERE key = ?1")?
            .query_row(params![key], |row| row.get(0))
            .optional()?
            .ok_or(StoreError::KeyNotFound)
    }

    fn del(&mut self, key: &str) -> StoreResult<()> {
        self.ensure_writable()?;
        remove(self.conn, key)
    }

    fn cursor(&mut self) -> Box<dyn Cursor + '_> {
        Box::new(SqliteCursor {
            conn: self.conn,
            writable: self.writable,
            pos: Pos::Start,
        })
    }
}

fn remove(conn: &Connection, key: &str) -> StoreResult<()> {
    let removed = conn
        .prepare_cached("DELETE FROM entries WHERE key = ?1")?
        .execute(params![key])?;
    if removed == 0 {
        return Err(StoreError::KeyNotFound);
    }
    Ok(())
}

fn key_value(row: &rusqlite::Row<'_>) -> rusqlite::Result<KeyValue> {
    Ok((row.get(0)?, row.get(1)?))
}

/// Keyset position. `Gap(k)` remembers a key removed through the cursor.
#[derive(Debug, Clone)]
enum Pos {
    Start,
    At(String),
    Gap(String),
    End,
}

struct SqliteCursor<'c> {
    conn: &'c Connection,
    writable: bool,
    pos: Pos,
}

impl SqliteCursor<'_> {
    fn fetch(&self, sql: &str, bound: Option<&str>) -> StoreResult<Option<KeyValue>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let found = match bound {
            Some(key) => stmt.query_row(params![key], key_value),
            None => stmt.query_row([], key_value),
        };
        Ok(found.optional()?)
    }

    /// Lands on `found`, or parks at `empty` when there is nothing there.
    fn settle(&mut self, found: Option<KeyValue>, empty: Pos) -> Option<KeyValue> {
        self.pos = match &found {
            Some((key, _)) => Pos::At(key.clone()),
            None => empty,
        };
        found
    }

    fn first_row(&mut self) -> StoreResult<Option<KeyValue>> {
        let found = self.fetch("SELECT key, value FROM entries ORDER BY key ASC LIMIT 1", None)?;
        Ok(self.settle(found, Pos::End))
    }

    fn last_row(&mut self) -> StoreResult<Option<KeyValue>> {
        let found = self.fetch("SELECT key, value FROM entries ORDER BY key DESC LIMIT 1", None)?;
        Ok(self.settle(found, Pos::Start))
    }
}

impl Cursor for SqliteCursor<'_> {
    fn first(&mut self) -> StoreResult<Option<KeyValue>> {
        self.first_row()
    }

    fn last(&mut self) -> StoreResult<Option<KeyValue>> {
        self.last_row()
    }

    fn seek(&mut self, wanted: &str) -> StoreResult<Option<KeyValue>> {
        let found = self.fetch(
            "SELECT key, value FROM entries WHERE key >= ?1 ORDER BY key ASC LIMIT 1",
            Some(wanted),
        )?;
        Ok(self.settle(found, Pos::End))
    }

    fn next(&mut self) -> StoreResult<Option<KeyValue>> {
        match self.pos.clone() {
            Pos::Start => self.first_row(),
            Pos::End => Ok(None),
            Pos::At(key) | Pos::Gap(key) => {
                let found = self.fetch(
                    "SELECT key, value FROM entries WHERE key > ?1 ORDER BY key ASC LIMIT 1",
                    Some(key.as_str()),
                )?;
                Ok(self.settle(found, Pos::End))
            }
        }
    }

    fn prev(&mut self) -> StoreResult<Option<KeyValue>> {
        match self.pos.clone() {
            Pos::Start => Ok(None),
            Pos::End => self.last_row(),
            Pos::At(key) | Pos::Gap(key) => {
                let found = self.fetch(
                    "SELECT key, value FROM entries WHERE key < ?1 ORDER BY key DESC LIMIT 1",
                    Some(key.as_str()),
                )?;
                Ok(self.settle(found, Pos::Start))
            }
        }
    }

    fn del(&mut self) -> StoreResult<()> {
        if !self.writable {
            return Err(StoreError::ReadOnly);
        }
        let Pos::At(key) = self.pos.clone() else {
            return Err(StoreError::KeyNotFound);
        };
        remove(self.conn, &key)?;
        self.pos = Pos::Gap(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StorerExt;

    #[test]
    fn failed_write_body_rolls_back() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.update(|tx| tx.put("keep", b"1")).expect("seed");

        let err = store
            .update(|tx| {
                tx.put("lost", b"2")?;
                tx.del("keep")?;
                Err::<(), _>(StoreError::Backend("abort".to_string()))
            })
            .expect_err("body fails");
        assert!(matches!(err, StoreError::Backend(_)));

        assert_eq!(store.len().expect("len"), 1);
        assert_eq!(store.view(|tx| tx.get("keep")).expect("get"), b"1");
        assert!(matches!(store.view(|tx| tx.get("lost")), Err(StoreError::KeyNotFound)));
    }

    #[test]
    #[tracing_test::traced_test]
    fn rollback_failure_keeps_body_error() {
        let err = after_rollback(StoreError::KeyNotFound, Err(rusqlite::Error::QueryReturnedNoRows));
        assert!(matches!(err, StoreError::KeyNotFound));
        assert!(logs_contain("sqlite rollback failed"));

        let err = after_rollback(StoreError::ReadOnly, Ok(()));
        assert!(matches!(err, StoreError::ReadOnly));
    }

    #[test]
    fn closed_store_rejects_everything() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.close().expect("close");
        assert!(matches!(store.len(), Err(StoreError::Closed)));
        assert!(matches!(store.update(|tx| tx.put("a", b"b")), Err(StoreError::Closed)));
        assert!(matches!(store.close(), Err(StoreError::Closed)));
    }

    #[test]
    fn keys_order_bytewise() {
        let store = SqliteStore::open_in_memory().expect("open");
        store
            .update(|tx| {
                for key in ["b", "B", "a", "ä"] {
                    tx.put(key, b"")?;
                }
                Ok(())
            })
            .expect("seed");
        let seen = store
            .view(|tx| {
                let mut cur = tx.cursor();
                let mut out = Vec::new();
                while let Some((key, _)) = cur.next()? {
                    out.push(key);
                }
                Ok(out)
            })
            .expect("walk");
        let mut want = vec!["b", "B", "a", "ä"];
        want.sort();
        assert_eq!(seen, want);
    }
}
