use std::sync::{PoisonError, RwLock};

use hashbrown::HashMap;

use super::{Cursor, KeyValue, StoreError, StoreResult, Storer, Transaction, TxBody};

#[derive(Debug, Default)]
struct MapState {
    map: HashMap<String, Vec<u8>>,
    idx: Vec<String>,
}

impl MapState {
    fn put(&mut self, key: &str, value: &[u8]) {
        if self.map.insert(key.to_string(), value.to_vec()).is_none() {
            let pos = self.idx.partition_point(|k| k.as_str() < key);
            self.idx.insert(pos, key.to_string());
        }
    }

    fn del(&mut self, key: &str) -> StoreResult<()> {
        let pos = self
            .idx
            .binary_search_by(|k| k.as_str().cmp(key))
            .map_err(|_| StoreError::KeyNotFound)?;
        self.remove_at(pos);
        Ok(())
    }

    fn remove_at(&mut self, pos: usize) {
        let key = self.idx.remove(pos);
        self.map.remove(&key);
    }

    fn item(&self, pos: usize) -> KeyValue {
        let key = self.idx[pos].clone();
        let value = self.map.get(&key).cloned().unwrap_or_default();
        (key, value)
    }
}

/// In-memory store: a hash map for lookups plus a sorted key index.
///
/// Read-only transactions share a read lock; read-write transactions hold
/// the write lock for the whole body. Writes are applied in place, so a
/// failing body does not roll back what it already wrote.
#[derive(Debug, Default)]
pub struct MapStore {
    state: RwLock<MapState>,
}

impl MapStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(MapState {
                map: HashMap::with_capacity(capacity),
                idx: Vec::with_capacity(capacity),
            }),
        }
    }
}

impl Storer for MapStore {
    fn supports_tx(&self) -> bool {
        false
    }

    fn tx(&self, write: bool, body: TxBody<'_>) -> StoreResult<()> {
        if write {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let mut tx = MapTx {
                slot: Slot::Write(&mut guard),
            };
            body(&mut tx)
        } else {
            let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
            let mut tx = MapTx {
                slot: Slot::Read(&guard),
            };
            body(&mut tx)
        }
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.state.read().unwrap_or_else(PoisonError::into_inner).idx.len())
    }

    fn drop_all(&self) -> StoreResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.map.clear();
        state.idx.clear();
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

enum Slot<'a> {
    Read(&'a MapState),
    Write(&'a mut MapState),
}

impl Slot<'_> {
    fn state(&self) -> &MapState {
        match self {
            Slot::Read(s) => s,
            Slot::Write(s) => &**s,
        }
    }

    fn state_mut(&mut self) -> StoreResult<&mut MapState> {
        match self {
            Slot::Read(_) => Err(StoreError::ReadOnly),
            Slot::Write(s) => Ok(&mut **s),
        }
    }
}

struct MapTx<'a> {
    slot: Slot<'a>,
}

impl Transaction for MapTx<'_> {
    fn is_writable(&self) -> bool {
        matches!(self.slot, Slot::Write(_))
    }

    fn put(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        let state = self.slot.state_mut()?;
        if key.is_empty() {
            return Err(StoreError::InvalidKey);
        }
        state.put(key, value);
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.slot
            .state()
            .map
            .get(key)
            .cloned()
            .ok_or(StoreError::KeyNotFound)
    }

    fn del(&mut self, key: &str) -> StoreResult<()> {
        self.slot.state_mut()?.del(key)
    }

    fn cursor(&mut self) -> Box<dyn Cursor + '_> {
        Box::new(MapCursor {
            slot: &mut self.slot,
            pos: Pos::Gap(0),
        })
    }
}

/// `Gap(i)` sits just before index `i`; `At(i)` is on index `i`.
#[derive(Debug, Clone, Copy)]
enum Pos {
    Gap(usize),
    At(usize),
}

struct MapCursor<'t, 'a> {
    slot: &'t mut Slot<'a>,
    pos: Pos,
}

impl MapCursor<'_, '_> {
    fn land(&mut self, pos: usize) -> Option<KeyValue> {
        self.pos = Pos::At(pos);
        Some(self.slot.state().item(pos))
    }
}

impl Cursor for MapCursor<'_, '_> {
    fn first(&mut self) -> StoreResult<Option<KeyValue>> {
        if self.slot.state().idx.is_empty() {
            self.pos = Pos::Gap(0);
            return Ok(None);
        }
        Ok(self.land(0))
    }

    fn last(&mut self) -> StoreResult<Option<KeyValue>> {
        let len = self.slot.state().idx.len();
        if len == 0 {
            self.pos = Pos::Gap(0);
            return Ok(None);
        }
        Ok(self.land(len - 1))
    }

    fn seek(&mut self, wanted: &str) -> StoreResult<Option<KeyValue>> {
        let idx = &self.slot.state().idx;
        let len = idx.len();
        let pos = idx.partition_point(|k| k.as_str() < wanted);
        if pos >= len {
            self.pos = Pos::Gap(len);
            return Ok(None);
        }
        Ok(self.land(pos))
    }

    fn next(&mut self) -> StoreResult<Option<KeyValue>> {
        let len = self.slot.state().idx.len();
        let target = match self.pos {
            Pos::At(i) => i + 1,
            Pos::Gap(i) => i,
        };
        if target >= len {
            self.pos = Pos::Gap(len);
            return Ok(None);
        }
        Ok(self.land(target))
    }

    fn prev(&mut self) -> StoreResult<Option<KeyValue>> {
        let len = self.slot.state().idx.len();
        let here = match self.pos {
            Pos::At(i) | Pos::Gap(i) => i.min(len),
        };
        match here.checked_sub(1) {
            Some(target) => Ok(self.land(target)),
            None => {
                self.pos = Pos::Gap(0);
                Ok(None)
            }
        }
    }

    fn del(&mut self) -> StoreResult<()> {
        let state = self.slot.state_mut()?;
        match self.pos {
            Pos::At(i) if i < state.idx.len() => {
                state.remove_at(i);
                self.pos = Pos::Gap(i);
                Ok(())
            }
            _ => Err(StoreError::KeyNotFound),
        }
    }
}
