//! Ordered, transactional key-value stores.
//!
//! Keys are non-empty strings ordered byte-lexicographically; values are
//! opaque bytes. Every adapter reports the same [`StoreError`] variants so
//! callers stay engine-agnostic.
//!
//! ```
//! use fieldlog::store::{memory::MapStore, StorerExt};
//!
//! let store = MapStore::new();
//! store.update(|tx| {
//!     tx.put("3", b"x")?;
//!     tx.put("1", b"y")?;
//!     tx.put("2", b"z")
//! }).unwrap();
//!
//! let keys = store.view(|tx| {
//!     let mut cur = tx.cursor();
//!     let mut keys = Vec::new();
//!     let mut next = cur.first()?;
//!     while let Some((key, _)) = next {
//!         keys.push(key);
//!         next = cur.next()?;
//!     }
//!     Ok(keys)
//! }).unwrap();
//! assert_eq!(keys, ["1", "2", "3"]);
//! ```

/// In-memory sorted-index store.
pub mod memory;
/// SQLite-backed store.
pub mod sqlite;

/// Store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No value under the key, or the cursor is not on an element.
    #[error("key not found")]
    KeyNotFound,
    /// Mutation attempted in a read-only transaction.
    #[error("read only transaction")]
    ReadOnly,
    /// Empty key.
    #[error("invalid key")]
    InvalidKey,
    /// The store was closed.
    #[error("store closed")]
    Closed,
    /// SQLite engine failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Any other engine failure.
    #[error("store backend: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One key and its value.
pub type KeyValue = (String, Vec<u8>);

/// Body run inside [`Storer::tx`].
pub type TxBody<'f> = &'f mut dyn FnMut(&mut dyn Transaction) -> StoreResult<()>;

/// A store owning one ordered key space.
pub trait Storer: Send + Sync {
    /// True when a failed body rolls back its writes.
    fn supports_tx(&self) -> bool;

    /// Runs `body` in a read-write (`write = true`) or read-only transaction
    /// and returns its error unchanged.
    fn tx(&self, write: bool, body: TxBody<'_>) -> StoreResult<()>;

    /// Number of keys.
    fn len(&self) -> StoreResult<usize>;

    /// True when the store holds no keys.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes every key.
    fn drop_all(&self) -> StoreResult<()>;

    /// Releases engine resources. Later calls fail with [`StoreError::Closed`].
    fn close(&self) -> StoreResult<()>;
}

/// Operations available inside one transaction.
pub trait Transaction {
    /// False for read-only transactions.
    fn is_writable(&self) -> bool;

    /// Inserts or overwrites `key`.
    fn put(&mut self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Reads `key`.
    fn get(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Removes `key`.
    fn del(&mut self, key: &str) -> StoreResult<()>;

    /// Cursor positioned before the first key.
    fn cursor(&mut self) -> Box<dyn Cursor + '_>;
}

/// Ordered iteration handle. `Ok(None)` is the past-the-end sentinel.
///
/// After [`Cursor::del`], `next` yields the successor and `prev` the
/// predecessor of the removed key.
pub trait Cursor {
    /// Moves to the smallest key.
    fn first(&mut self) -> StoreResult<Option<KeyValue>>;

    /// Moves to the largest key.
    fn last(&mut self) -> StoreResult<Option<KeyValue>>;

    /// Moves to the smallest key `>= wanted`.
    fn seek(&mut self, wanted: &str) -> StoreResult<Option<KeyValue>>;

    /// Moves forward one key.
    fn next(&mut self) -> StoreResult<Option<KeyValue>>;

    /// Moves back one key.
    fn prev(&mut self) -> StoreResult<Option<KeyValue>>;

    /// Removes the key under the cursor.
    fn del(&mut self) -> StoreResult<()>;
}

/// Closure-friendly wrappers over [`Storer::tx`].
pub trait StorerExt: Storer {
    /// Runs `f` in a read-only transaction and returns its value.
    fn view<T>(&self, f: impl FnOnce(&mut dyn Transaction) -> StoreResult<T>) -> StoreResult<T> {
        run(self, false, f)
    }

    /// Runs `f` in a read-write transaction and returns its value.
    fn update<T>(&self, f: impl FnOnce(&mut dyn Transaction) -> StoreResult<T>) -> StoreResult<T> {
        run(self, true, f)
    }
}

impl<S: Storer + ?Sized> StorerExt for S {}

fn run<S, T>(
    store: &S,
    write: bool,
    f: impl FnOnce(&mut dyn Transaction) -> StoreResult<T>,
) -> StoreResult<T>
where
    S: Storer + ?Sized,
{
    let mut f = Some(f);
    let mut out = None;
    store.tx(write, &mut |tx: &mut dyn Transaction| {
        let f = f
            .take()
            .ok_or_else(|| StoreError::Backend("transaction body invoked twice".to_string()))?;
        out = Some(f(tx)?);
        Ok(())
    })?;
    out.ok_or_else(|| StoreError::Backend("transaction body did not run".to_string()))
}
