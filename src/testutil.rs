//! In-memory [KvStore] used only by this crate's own test suite, so the
//! dn/attr-index/search/modify tests don't need a real lmdb environment on
//! disk. Mirrors the same `KvTxn` contract the real `LmdbStore` satisfies,
//! including commit/abort transactional semantics.
#![cfg(test)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::kv::{KvCursor, KvStore, KvTxn};
use crate::{err_at, Error, Result};

enum Op {
    Put(String, Vec<u8>, Vec<u8>),
    Delete(String, Vec<u8>),
}

pub struct MemStore {
    tables: Mutex<BTreeMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore {
            tables: Mutex::new(BTreeMap::new()),
        }
    }
}

impl KvStore for MemStore {
    fn begin_ro(&self) -> Result<Box<dyn KvTxn + '_>> {
        Ok(Box::new(MemTxn {
            store: self,
            pending: None,
        }))
    }

    fn begin_rw(&self) -> Result<Box<dyn KvTxn + '_>> {
        Ok(Box::new(MemTxn {
            store: self,
            pending: Some(Vec::new()),
        }))
    }
}

struct MemTxn<'a> {
    store: &'a MemStore,
    pending: Option<Vec<Op>>,
}

impl<'a> KvTxn for MemTxn<'a> {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(pending) = &self.pending {
            for op in pending.iter().rev() {
                match op {
                    Op::Put(t, k, v) if t == table && k == key => return Ok(Some(v.clone())),
                    Op::Delete(t, k) if t == table && k == key => return Ok(None),
                    _ => (),
                }
            }
        }
        let tables = self.store.tables.lock().unwrap();
        Ok(tables.get(table).and_then(|m| m.get(key)).cloned())
    }

    fn put(&mut self, table: &str, key: &[u8], val: &[u8], no_overwrite: bool) -> Result<()> {
        if no_overwrite && self.get(table, key)?.is_some() {
            return err_at!(KeyExist, msg: "key already present: {:?}", key);
        }
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| Error::Invalid("put on a read-only transaction".to_string()))?;
        pending.push(Op::Put(table.to_string(), key.to_vec(), val.to_vec()));
        Ok(())
    }

    fn delete(&mut self, table: &str, key: &[u8]) -> Result<()> {
        if self.get(table, key)?.is_none() {
            return err_at!(KeyNotFound, msg: "key not present: {:?}", key);
        }
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| Error::Invalid("delete on a read-only transaction".to_string()))?;
        pending.push(Op::Delete(table.to_string(), key.to_vec()));
        Ok(())
    }

    fn cursor(&self, table: &str) -> Result<Box<dyn KvCursor + '_>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .store
            .tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default();
        if let Some(pending) = &self.pending {
            for op in pending {
                match op {
                    Op::Put(t, k, v) if t == table => {
                        merged.insert(k.clone(), v.clone());
                    }
                    Op::Delete(t, k) if t == table => {
                        merged.remove(k);
                    }
                    _ => (),
                }
            }
        }
        let items: Vec<(Vec<u8>, Vec<u8>)> = merged.into_iter().collect();
        Ok(Box::new(MemCursor { items, pos: 0 }))
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let mut tables = self.store.tables.lock().unwrap();
        for op in self.pending.unwrap_or_default() {
            match op {
                Op::Put(t, k, v) => {
                    tables.entry(t).or_default().insert(k, v);
                }
                Op::Delete(t, k) => {
                    tables.entry(t).or_default().remove(&k);
                }
            }
        }
        Ok(())
    }

    fn abort(self: Box<Self>) {}
}

struct MemCursor {
    items: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
}

impl KvCursor for MemCursor {
    fn seek(&mut self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.pos = self.items.partition_point(|(k, _)| k.as_slice() < key);
        let item = self.items.get(self.pos).cloned();
        self.pos += 1;
        Ok(item)
    }

    fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let item = self.items.get(self.pos).cloned();
        self.pos += 1;
        Ok(item)
    }
}
