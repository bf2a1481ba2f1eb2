//! Backend configuration (SPEC_FULL.md §2.3): the root DN, per-attribute
//! index masks, cache sizing, and the default/hard size and time limits a
//! search or modify operation is clamped to.
//!
//! Shaped like `robt::Config`/`clru::lru::Config` elsewhere in this
//! crate's lineage: plain data, a `fn new(..)` constructor, and
//! `fn set_*(&mut self, ..) -> &mut Self` builder methods.

use std::collections::HashMap;

use crate::schema::IndexMask;

/// Per-backend configuration. One instance is built at startup and shared
/// (read-only) by the search and modify drivers.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root DN of this backend, normalized. Subtree ancestor derivation
    /// stops here (spec.md §4.3); a subtree search whose base equals the
    /// suffix short-circuits its candidate set to `Idl::All`.
    pub suffix: String,
    /// Canonical-name -> mask, seeded independently of [crate::schema::Schema]
    /// registration so a deployment can reconfigure indexing without
    /// touching the attribute-type table.
    index_masks: HashMap<String, IndexMask>,
    /// Entry cache sizing (spec.md §4.4).
    pub cache_thread_pool_size: usize,
    pub cache_max_count: usize,
    pub cache_max_size: Option<usize>,
    /// Backend-wide hard ceilings; a non-root request asking for more is
    /// clamped down to these (SPEC_FULL.md §3 "Per-backend hard caps").
    pub be_sizelimit: Option<usize>,
    pub be_timelimit: Option<u64>,
    /// Identities exempted from size/time limits when they ask for the
    /// unlimited default (SPEC_FULL.md §3 "root-DN bypass").
    root_dns: Vec<String>,
}

impl Config {
    pub fn new(suffix: &str) -> Config {
        Config {
            suffix: crate::dn::normalize_dn(suffix),
            index_masks: HashMap::new(),
            // Mirrors `util::thread`'s `pool_size: num_cpus::get()` default.
            cache_thread_pool_size: num_cpus::get(),
            cache_max_count: 4096,
            cache_max_size: None,
            be_sizelimit: None,
            be_timelimit: None,
            root_dns: Vec::new(),
        }
    }

    pub fn set_index_mask(&mut self, canonical_name: &str, mask: IndexMask) -> &mut Self {
        self.index_masks.insert(canonical_name.to_lowercase(), mask);
        self
    }

    pub fn set_cache_sizing(&mut self, thread_pool_size: usize, max_count: usize) -> &mut Self {
        self.cache_thread_pool_size = thread_pool_size;
        self.cache_max_count = max_count;
        self
    }

    pub fn set_cache_max_size(&mut self, max_size: usize) -> &mut Self {
        self.cache_max_size = Some(max_size);
        self
    }

    pub fn set_hard_limits(&mut self, sizelimit: Option<usize>, timelimit: Option<u64>) -> &mut Self {
        self.be_sizelimit = sizelimit;
        self.be_timelimit = timelimit;
        self
    }

    pub fn add_root_dn(&mut self, ndn: &str) -> &mut Self {
        self.root_dns.push(crate::dn::normalize_dn(ndn));
        self
    }

    pub fn is_root(&self, ndn: &str) -> bool {
        self.root_dns.iter().any(|r| r == ndn)
    }

    /// Build the [Schema][crate::schema::Schema]-independent mask table
    /// into a fresh schema's mask slots. Kept separate from
    /// [crate::schema::Schema] registration (type/supertype/matching-rule
    /// wiring) since a deployment reconfigures indexing far more often
    /// than it changes attribute-type definitions.
    pub fn apply_masks(&self, schema: &mut crate::schema::Schema) {
        for (name, mask) in &self.index_masks {
            schema.set_mask(name, *mask);
        }
    }

    pub fn cache_config(&self) -> crate::cache::Config {
        let mut c = crate::cache::Config::new(self.cache_thread_pool_size, self.cache_max_count);
        if let Some(max_size) = self.cache_max_size {
            c.set_max_size(max_size);
        }
        c
    }

    /// Resolve the effective size/time limits for one operation, honoring
    /// the root-DN bypass and backend hard caps (SPEC_FULL.md §3, mirroring
    /// `ldbm_back_search`'s `be_isroot`/`be_sizelimit`/`be_timelimit`
    /// clamping).
    pub fn effective_limits(
        &self,
        is_root: bool,
        requested_size: Option<usize>,
        requested_time: Option<u64>,
    ) -> (Option<usize>, Option<u64>) {
        let size = match requested_size {
            None if is_root => None,
            None => self.be_sizelimit,
            Some(n) => match self.be_sizelimit {
                Some(cap) if !is_root && n > cap => Some(cap),
                _ => Some(n),
            },
        };
        let time = match requested_time {
            None if is_root => None,
            None => self.be_timelimit,
            Some(n) => match self.be_timelimit {
                Some(cap) if !is_root && n > cap => Some(cap),
                _ => Some(n),
            },
        };
        (size, time)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
