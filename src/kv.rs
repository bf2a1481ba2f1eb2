//! Ordered key/value store adapter (spec.md §4.1, §6 "Persisted database
//! layout"). A thin contract — `get`/`put(flags)`/`del`/`cursor`, nested
//! transactions with `commit`/`abort` — so the DN index, attribute index,
//! and search/modify drivers above it are composable with alternate
//! backends (a SQL-mapped overlay, a remote-directory rewriter) without
//! this crate specifying their glue (spec.md §1).
//!
//! The concrete implementation is `lmdb`, used the same way
//! `rdms-perf/lmdb.rs` drives it: one `Environment`, one named `Database`
//! per logical table, `WriteFlags::NO_OVERWRITE` for uniqueness, cursors
//! scoped to their owning transaction.

use fs2::FileExt;
use lmdb::{Cursor, Transaction, WriteFlags};
use serde::{de::DeserializeOwned, Serialize};

use std::{collections::HashMap, fs, path::Path, sync::RwLock};

use crate::{err_at, Error, Result};

/// Serialize a value with `cbordata`'s Cborize-derived encoding.
pub fn cbor_encode<T: Serialize>(val: &T) -> Result<Vec<u8>> {
    err_at!(EncodeFail, cbordata::to_vec(val))
}

/// Deserialize a value with `cbordata`'s Cborize-derived decoding.
pub fn cbor_decode<T: DeserializeOwned>(buf: &[u8]) -> Result<T> {
    err_at!(DecodeFail, cbordata::from_slice(buf))
}

/// A cursor scoped to the transaction it was obtained from. Iteration order
/// follows key byte-ordering (spec.md §4.1).
pub trait KvCursor {
    fn seek(&mut self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>>;
    fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>>;
}

/// One KV transaction. Read-only transactions reject writes with
/// `Error::Invalid`; this mirrors lmdb's own `RoTransaction`/`RwTransaction`
/// split while presenting a single trait to callers that mostly read.
pub trait KvTxn {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, table: &str, key: &[u8], val: &[u8], no_overwrite: bool) -> Result<()>;

    fn delete(&mut self, table: &str, key: &[u8]) -> Result<()>;

    fn cursor(&self, table: &str) -> Result<Box<dyn KvCursor + '_>>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn abort(self: Box<Self>);
}

/// The store handle: opens (or creates) named tables on demand and hands
/// out transactions.
pub trait KvStore: Send + Sync {
    fn begin_ro(&self) -> Result<Box<dyn KvTxn + '_>>;

    fn begin_rw(&self) -> Result<Box<dyn KvTxn + '_>>;
}

pub struct LmdbStore {
    env: lmdb::Environment,
    dbs: RwLock<HashMap<String, lmdb::Database>>,
    // Held for the store's lifetime; dropping it releases the flock.
    // Mirrors `robt.rs`'s `try_lock_exclusive`/`unlock` use of `fs2::FileExt`,
    // here guarding against two processes opening the same environment.
    _lockfile: fs::File,
}

impl LmdbStore {
    /// Open (creating if absent) an LMDB environment at `dir`, with room
    /// for `max_dbs` named tables: `dn_index`, `id2entry`, and one
    /// `attr_<name>` per indexed attribute (spec.md §3 "Stored tables").
    pub fn open<P: AsRef<Path>>(dir: P, max_dbs: u32) -> Result<LmdbStore> {
        let dir = dir.as_ref();
        err_at!(IOError, fs::create_dir_all(dir))?;

        let lockfile = err_at!(IOError, fs::File::create(dir.join("LOCK")))?;
        match lockfile.try_lock_exclusive() {
            Ok(()) => (),
            Err(_) => return err_at!(IOError, msg: "backend {:?} already locked by another process", dir),
        }

        let env = err_at!(
            IOError,
            lmdb::Environment::new()
                .set_max_dbs(max_dbs)
                .set_map_size(1 << 34)
                .open(dir)
        )?;
        Ok(LmdbStore {
            env,
            dbs: RwLock::new(HashMap::new()),
            _lockfile: lockfile,
        })
    }

    fn database(&self, name: &str) -> Result<lmdb::Database> {
        if let Some(db) = self.dbs.read().unwrap().get(name) {
            return Ok(*db);
        }
        let db = err_at!(IOError, self.env.create_db(Some(name), lmdb::DatabaseFlags::empty()))?;
        self.dbs.write().unwrap().insert(name.to_string(), db);
        Ok(db)
    }
}

impl KvStore for LmdbStore {
    fn begin_ro(&self) -> Result<Box<dyn KvTxn + '_>> {
        let txn = err_at!(IOError, self.env.begin_ro_txn())?;
        Ok(Box::new(LmdbRoTxn { store: self, txn }))
    }

    fn begin_rw(&self) -> Result<Box<dyn KvTxn + '_>> {
        let txn = err_at!(IOError, self.env.begin_rw_txn())?;
        Ok(Box::new(LmdbRwTxn { store: self, txn }))
    }
}

struct LmdbRoTxn<'a> {
    store: &'a LmdbStore,
    txn: lmdb::RoTransaction<'a>,
}

impl<'a> KvTxn for LmdbRoTxn<'a> {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        get_txn(&self.txn, self.store.database(table)?, key)
    }

    fn put(&mut self, _table: &str, _key: &[u8], _val: &[u8], _no_overwrite: bool) -> Result<()> {
        err_at!(Invalid, msg: "put on a read-only transaction")
    }

    fn delete(&mut self, _table: &str, _key: &[u8]) -> Result<()> {
        err_at!(Invalid, msg: "delete on a read-only transaction")
    }

    fn cursor(&self, table: &str) -> Result<Box<dyn KvCursor + '_>> {
        let db = self.store.database(table)?;
        let cursor = err_at!(IOError, self.txn.open_ro_cursor(db))?;
        Ok(Box::new(LmdbCursor { cursor, started: false }))
    }

    fn commit(self: Box<Self>) -> Result<()> {
        err_at!(IOError, self.txn.commit())
    }

    fn abort(self: Box<Self>) {
        self.txn.abort();
    }
}

struct LmdbRwTxn<'a> {
    store: &'a LmdbStore,
    txn: lmdb::RwTransaction<'a>,
}

impl<'a> KvTxn for LmdbRwTxn<'a> {
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        get_txn(&self.txn, self.store.database(table)?, key)
    }

    fn put(&mut self, table: &str, key: &[u8], val: &[u8], no_overwrite: bool) -> Result<()> {
        let db = self.store.database(table)?;
        let flags = if no_overwrite {
            WriteFlags::NO_OVERWRITE
        } else {
            WriteFlags::empty()
        };
        match self.txn.put(db, &key, &val, flags) {
            Ok(()) => Ok(()),
            Err(lmdb::Error::KeyExist) => err_at!(KeyExist, msg: "key already present"),
            Err(err) => err_at!(IOError, Err(err)),
        }
    }

    fn delete(&mut self, table: &str, key: &[u8]) -> Result<()> {
        let db = self.store.database(table)?;
        match self.txn.del(db, &key, None) {
            Ok(()) => Ok(()),
            Err(lmdb::Error::NotFound) => err_at!(KeyNotFound, msg: "key not present"),
            Err(err) => err_at!(IOError, Err(err)),
        }
    }

    fn cursor(&self, table: &str) -> Result<Box<dyn KvCursor + '_>> {
        let db = self.store.database(table)?;
        let cursor = err_at!(IOError, self.txn.open_ro_cursor(db))?;
        Ok(Box::new(LmdbCursor { cursor, started: false }))
    }

    fn commit(self: Box<Self>) -> Result<()> {
        err_at!(IOError, self.txn.commit())
    }

    fn abort(self: Box<Self>) {
        self.txn.abort();
    }
}

fn get_txn<T: Transaction>(txn: &T, db: lmdb::Database, key: &[u8]) -> Result<Option<Vec<u8>>> {
    match txn.get(db, &key) {
        Ok(val) => Ok(Some(val.to_vec())),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(err) => err_at!(IOError, Err(err)),
    }
}

struct LmdbCursor<'txn> {
    cursor: lmdb::RoCursor<'txn>,
    started: bool,
}

impl<'txn> KvCursor for LmdbCursor<'txn> {
    fn seek(&mut self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.started = true;
        match self.cursor.iter_from(key).next() {
            Some(Ok((k, v))) => Ok(Some((k.to_vec(), v.to_vec()))),
            Some(Err(err)) => err_at!(IOError, Err(err)),
            None => Ok(None),
        }
    }

    fn next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let iter = if self.started {
            self.cursor.iter()
        } else {
            self.started = true;
            self.cursor.iter_start()
        };
        match iter.take(1).next() {
            Some(Ok((k, v))) => Ok(Some((k.to_vec(), v.to_vec()))),
            Some(Err(err)) => err_at!(IOError, Err(err)),
            None => Ok(None),
        }
    }
}
