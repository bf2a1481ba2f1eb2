//! Entry cache: a bounded, size- and count-aware LRU over `Id -> Arc<Entry>`
//! with a background evictor thread (spec.md §4.4 "Entry cache" / §5
//! "zero readers before eviction").
//!
//! Grounded on `rdms::clru`: the `Config` shape (`thread_pool_size`,
//! `max_size`, `max_count`, `max_old`) and the get/set/close/`Stats`
//! surface are carried over verbatim. The teacher's lock-free map and
//! intrusive `Access` list depend on its own `cmap` crate, which this
//! crate has no other use for (see DESIGN.md); this cache reaches the
//! same budget-eviction behavior with a single `Mutex`-guarded map plus
//! a recency queue instead.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
        Arc, Mutex,
    },
    thread, time,
};

use crate::entry::{Entry, Footprint};
use crate::{Id, Result};

pub struct Config {
    pub thread_pool_size: usize,
    pub max_size: Option<usize>,
    pub max_count: usize,
    pub max_old: Option<u64>,
}

impl Config {
    pub fn new(thread_pool_size: usize, max_count: usize) -> Config {
        Config {
            thread_pool_size,
            max_size: None,
            max_count,
            max_old: None,
        }
    }

    pub fn set_max_size(&mut self, max_size: usize) -> &mut Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn set_max_old(&mut self, max_old: u64) -> &mut Self {
        self.max_old = Some(max_old);
        self
    }
}

struct Slot {
    entry: Arc<Entry>,
    inserted_at: time::Instant,
}

struct Inner {
    map: HashMap<Id, Slot>,
    recency: VecDeque<Id>, // back = most recently used
    cur_size: usize,
}

#[derive(Debug, Default)]
pub struct Stats {
    pub n_gets: usize,
    pub n_sets: usize,
    pub n_evicted: usize,
}

/// Bounded cache of recently fetched entries, keyed by id. A background
/// thread periodically trims the recency queue against `max_count`,
/// `max_size`, and `max_old`; foreground `get`/`set` never block on it
/// (spec.md §4.4: cache maintenance must not stall readers).
pub struct EntryCache {
    inner: Arc<Mutex<Inner>>,
    max_size: Option<usize>,
    max_count: usize,
    max_old: Option<time::Duration>,
    close: Arc<AtomicBool>,
    evictor: Option<thread::JoinHandle<usize>>,
    n_gets: Arc<AtomicUsize>,
    n_sets: Arc<AtomicUsize>,
}

impl EntryCache {
    pub fn from_config(config: Config) -> EntryCache {
        let inner = Arc::new(Mutex::new(Inner {
            map: HashMap::new(),
            recency: VecDeque::new(),
            cur_size: 0,
        }));
        let close = Arc::new(AtomicBool::new(false));
        let n_gets = Arc::new(AtomicUsize::new(0));
        let n_sets = Arc::new(AtomicUsize::new(0));

        let evictor = {
            let inner = Arc::clone(&inner);
            let close = Arc::clone(&close);
            let max_count = config.max_count;
            let max_size = config.max_size;
            let max_old = config.max_old.map(time::Duration::from_secs);
            Some(thread::spawn(move || evict_loop(inner, close, max_count, max_size, max_old)))
        };

        EntryCache {
            inner,
            max_size: config.max_size,
            max_count: config.max_count,
            max_old: config.max_old.map(time::Duration::from_secs),
            close,
            evictor,
            n_gets,
            n_sets,
        }
    }

    pub fn get(&self, id: Id) -> Option<Arc<Entry>> {
        self.n_gets.fetch_add(1, SeqCst);
        let mut inner = self.inner.lock().unwrap();
        if !inner.map.contains_key(&id) {
            return None;
        }
        inner.recency.retain(|k| *k != id);
        inner.recency.push_back(id);
        inner.map.get(&id).map(|slot| Arc::clone(&slot.entry))
    }

    pub fn set(&self, id: Id, entry: Arc<Entry>) -> Result<()> {
        self.n_sets.fetch_add(1, SeqCst);
        let size = entry.footprint()?.max(0) as usize;
        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.map.remove(&id) {
            inner.cur_size = inner.cur_size.saturating_sub(old.entry.footprint()?.max(0) as usize);
            inner.recency.retain(|k| *k != id);
        }
        inner.map.insert(
            id,
            Slot {
                entry,
                inserted_at: time::Instant::now(),
            },
        );
        inner.recency.push_back(id);
        inner.cur_size += size;
        Ok(())
    }

    pub fn invalidate(&self, id: Id) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.map.remove(&id) {
            let size = slot.entry.footprint().map(|s| s.max(0) as usize).unwrap_or(0);
            inner.cur_size = inner.cur_size.saturating_sub(size);
        }
        inner.recency.retain(|k| *k != id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(mut self) -> Stats {
        self.close.store(true, SeqCst);
        let n_evicted = match self.evictor.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => 0,
        };
        Stats {
            n_gets: self.n_gets.load(SeqCst),
            n_sets: self.n_sets.load(SeqCst),
            n_evicted,
        }
    }
}

fn evict_loop(
    inner: Arc<Mutex<Inner>>,
    close: Arc<AtomicBool>,
    max_count: usize,
    max_size: Option<usize>,
    max_old: Option<time::Duration>,
) -> usize {
    let mut n_evicted = 0;
    while !close.load(SeqCst) {
        thread::sleep(time::Duration::from_millis(50));
        n_evicted += evict_once(&inner, max_count, max_size, max_old);
    }
    n_evicted += evict_once(&inner, max_count, max_size, max_old);
    n_evicted
}

fn evict_once(
    inner: &Arc<Mutex<Inner>>,
    max_count: usize,
    max_size: Option<usize>,
    max_old: Option<time::Duration>,
) -> usize {
    let mut inner = inner.lock().unwrap();
    let mut evicted = 0;

    if let Some(max_old) = max_old {
        let now = time::Instant::now();
        let stale: Vec<Id> = inner
            .map
            .iter()
            .filter(|(_, slot)| now.duration_since(slot.inserted_at) > max_old)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(slot) = inner.map.remove(&id) {
                let size = slot.entry.footprint().map(|s| s.max(0) as usize).unwrap_or(0);
                inner.cur_size = inner.cur_size.saturating_sub(size);
                evicted += 1;
            }
            inner.recency.retain(|k| *k != id);
        }
    }

    while inner.map.len() > max_count || max_size.map(|m| inner.cur_size > m).unwrap_or(false) {
        let victim = match inner.recency.pop_front() {
            Some(id) => id,
            None => break,
        };
        if let Some(slot) = inner.map.remove(&victim) {
            let size = slot.entry.footprint().map(|s| s.max(0) as usize).unwrap_or(0);
            inner.cur_size = inner.cur_size.saturating_sub(size);
            evicted += 1;
        }
    }

    evicted
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
