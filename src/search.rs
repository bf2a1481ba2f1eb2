//! Search driver: base resolution, scope enforcement, filter re-test,
//! aliasing, referral emission, and abandon/time/size limits (spec.md
//! §4.7). Grounded on `back-ldbm/search.c`'s per-candidate loop.

use std::{
    sync::{atomic::AtomicBool, atomic::Ordering::SeqCst, Arc},
    thread, time,
};

use crate::cache::EntryCache;
use crate::dn::{self, DnPrefix};
use crate::entry::{self, Entry};
use crate::filter::{self, Filter};
use crate::idl::Idl;
use crate::kv::KvTxn;
use crate::result_code::{Outcome, ResultCode};
use crate::schema::Schema;
use crate::{Error, Id, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Base,
    One,
    Subtree,
}

/// Bitset of when to dereference alias entries, mirroring the standard
/// `ldap_deref` values (spec.md §4.7 step 1 and step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerefMode(pub u32);

impl DerefMode {
    pub const NEVER: DerefMode = DerefMode(0);
    pub const SEARCHING: DerefMode = DerefMode(1 << 0);
    pub const FINDING: DerefMode = DerefMode(1 << 1);
    pub const ALWAYS: DerefMode = DerefMode(Self::SEARCHING.0 | Self::FINDING.0);

    pub fn has(self, bit: DerefMode) -> bool {
        self.0 & bit.0 != 0
    }
}

const ALIAS_ATTR: &str = "aliasedobjectname";
const REF_ATTR: &str = "ref";

/// Bound on alias hops followed while resolving the base object, so a
/// cyclic chain of aliases can't loop the search driver forever.
const MAX_ALIAS_HOPS: usize = 16;

pub struct SearchRequest {
    pub suffix: String,
    pub base: String,
    pub scope: Scope,
    pub deref: DerefMode,
    pub size_limit: Option<usize>,
    pub time_limit: Option<time::Duration>,
    pub filter: Filter,
}

/// Per-operation cancellation and pacing state, shared with whatever
/// external listener thread owns the abandon signal (spec.md §5).
pub struct OpContext {
    pub abandon: Arc<AtomicBool>,
    deadline: Option<time::Instant>,
    size_remaining: Option<usize>,
}

impl OpContext {
    pub fn new(abandon: Arc<AtomicBool>, time_limit: Option<time::Duration>, size_limit: Option<usize>) -> OpContext {
        OpContext {
            abandon,
            deadline: time_limit.map(|d| time::Instant::now() + d),
            size_remaining: size_limit,
        }
    }

    fn is_abandoned(&self) -> bool {
        self.abandon.load(SeqCst)
    }

    fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(d) if time::Instant::now() >= d)
    }

    /// Returns `false` once the size budget is exhausted.
    fn consume_one(&mut self) -> bool {
        match &mut self.size_remaining {
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
            None => true,
        }
    }
}

/// Outcome of driving a search loop to completion. `Abandoned` and
/// `Aborted` carry no result code: per spec.md §5, nothing is emitted
/// once the op is cancelled or the transport is gone.
pub enum Completion {
    Done(Outcome),
    Abandoned,
    Aborted,
}

fn fetch_entry(txn: &dyn KvTxn, cache: Option<&EntryCache>, id: Id) -> Result<Option<Arc<Entry>>> {
    if let Some(cache) = cache {
        if let Some(hit) = cache.get(id) {
            return Ok(Some(hit));
        }
    }
    match entry::id2entry_get(txn, id)? {
        Some(e) => {
            let e = Arc::new(e);
            if let Some(cache) = cache {
                cache.set(id, Arc::clone(&e))?;
            }
            Ok(Some(e))
        }
        None => Ok(None),
    }
}

fn scope_holds(scope: Scope, base: &str, entry: &Entry) -> bool {
    match scope {
        Scope::Base => entry.ndn == base,
        Scope::One => dn::parent(&entry.ndn).as_deref() == Some(base),
        Scope::Subtree => entry.ndn == base || entry.ndn.ends_with(&format!(",{}", base)),
    }
}

fn alias_target(entry: &Entry) -> Option<String> {
    entry.get(ALIAS_ATTR).and_then(|a| a.values.first()).map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

/// Candidate ids for every referral entry in the backend, widening the
/// subtree scan the same way `subtree_candidates` ORs `(objectClass=referral)`
/// into the filter (SPEC_FULL.md §4.7): grounded in this crate's own
/// referral discriminator (a `ref` attribute, [Entry::is_referral]) rather
/// than a literal `objectClass` equality, since that's what `step` actually
/// tests. Without this, a referral entry whose own attributes don't satisfy
/// the requested filter's index never enters the candidate set and its
/// `ref` URI is silently dropped.
fn referral_candidates(txn: &dyn KvTxn, schema: &Schema) -> Result<Idl> {
    filter::candidates(txn, schema, &Filter::Present(crate::entry::AttributeDescription::new(REF_ATTR)))
}

/// Resolve alias hops along the path to the base object (spec.md §4.7 step
/// 1: `DEREF_FINDING`/`DEREF_ALWAYS`). Distinct from the per-candidate
/// `DEREF_SEARCHING` dereference in [step]: this one runs once, before
/// scope resolution, and walks as many hops as the base entry chains
/// through, up to [MAX_ALIAS_HOPS]. A dangling or unresolvable alias stops
/// the walk at the last entry successfully resolved, per spec.md §4.7 step
/// 4's "on failure skip".
fn resolve_base_alias(
    txn: &dyn KvTxn,
    cache: Option<&EntryCache>,
    deref: DerefMode,
    mut ndn: String,
    mut id: Id,
) -> Result<(String, Id)> {
    if !deref.has(DerefMode::FINDING) {
        return Ok((ndn, id));
    }
    for _ in 0..MAX_ALIAS_HOPS {
        let entry = match fetch_entry(txn, cache, id)? {
            Some(e) => e,
            None => break,
        };
        let target_ndn = match alias_target(&entry) {
            Some(t) => dn::normalize_dn(&t),
            None => break,
        };
        match dn::dn2id(txn, &target_ndn) {
            Ok(target_id) => {
                ndn = target_ndn;
                id = target_id;
            }
            Err(_) => break,
        }
    }
    Ok((ndn, id))
}

/// Drives one search operation to completion, calling `sink` for every
/// entry that ultimately matches. `sink` returning `false` models a
/// dropped transport: the loop stops immediately with no further result
/// (spec.md §4.7 step 4 "on transport failure abort silently").
pub fn search(
    txn: &dyn KvTxn,
    schema: &Schema,
    cache: Option<&EntryCache>,
    req: &SearchRequest,
    ctx: &mut OpContext,
    mut sink: impl FnMut(&Entry) -> bool,
) -> Result<Completion> {
    log::trace!("search: enter base={} scope={:?}", req.base, req.scope);
    let base = dn::normalize_dn(&req.base);

    let base_id = match dn::dn2id(txn, &base) {
        Ok(id) => id,
        Err(Error::NoSuchObject(_)) => {
            let (_, matched) = dn::dn2id_matched(txn, &base)?;
            return Ok(Completion::Done(Outcome::no_such_object(matched)));
        }
        Err(err) => return Err(err),
    };
    let (base, base_id) = resolve_base_alias(txn, cache, req.deref, base, base_id)?;

    let scope_idl = match req.scope {
        Scope::Base => Idl::from_one(base_id),
        Scope::One | Scope::Subtree => {
            let prefix = if req.scope == Scope::One { DnPrefix::One } else { DnPrefix::Subtree };
            dn::dn2idl(txn, &req.suffix, &base, prefix)?
        }
    };

    let mut filter_idl = filter::candidates(txn, schema, &req.filter)?;
    if req.scope == Scope::Subtree {
        filter_idl = filter_idl.union(&referral_candidates(txn, schema)?);
    }
    let candidates = filter_idl.intersect(&scope_idl);

    let mut referrals = Vec::new();
    let mut n_matched = 0usize;

    if candidates.is_all() {
        for entry in entry::id2entry_scan(txn)? {
            let id = entry.id;
            if let Some(completion) = step(txn, schema, cache, req, &base, ctx, &id, Some(entry), &mut sink, &mut referrals, &mut n_matched)? {
                return Ok(completion);
            }
        }
    } else {
        for id in candidates.iter() {
            if let Some(completion) = step(txn, schema, cache, req, &base, ctx, &id, None, &mut sink, &mut referrals, &mut n_matched)? {
                return Ok(completion);
            }
        }
    }

    let outcome = if n_matched == 0 && !referrals.is_empty() {
        Outcome::referral(referrals)
    } else {
        let mut o = Outcome::success();
        o.referrals = referrals;
        o
    };
    Ok(Completion::Done(outcome))
}

#[allow(clippy::too_many_arguments)]
fn step(
    txn: &dyn KvTxn,
    schema: &Schema,
    cache: Option<&EntryCache>,
    req: &SearchRequest,
    base: &str,
    ctx: &mut OpContext,
    id: &Id,
    preloaded: Option<Entry>,
    sink: &mut impl FnMut(&Entry) -> bool,
    referrals: &mut Vec<String>,
    n_matched: &mut usize,
) -> Result<Option<Completion>> {
    if ctx.is_abandoned() {
        log::debug!("search: abandoned at id={}", id);
        return Ok(Some(Completion::Abandoned));
    }
    if ctx.is_expired() {
        log::warn!("search: timelimit exceeded at id={}", id);
        let mut o = Outcome::from_code(ResultCode::TIMELIMIT_EXCEEDED);
        o.referrals = std::mem::take(referrals);
        return Ok(Some(Completion::Done(o)));
    }

    let entry = match preloaded {
        Some(e) => Arc::new(e),
        None => match fetch_entry(txn, cache, *id)? {
            Some(e) => e,
            None => return Ok(None),
        },
    };

    if entry.is_referral() && req.scope == Scope::Subtree {
        log::trace!("search: referral at ndn={}", entry.ndn);
        if let Some(attr) = entry.get("ref") {
            for v in &attr.values {
                referrals.push(String::from_utf8_lossy(v.as_bytes()).into_owned());
            }
        }
        thread::yield_now();
        return Ok(None);
    }

    if !filter::matches(schema, &req.filter, &entry) {
        thread::yield_now();
        return Ok(None);
    }
    if !scope_holds(req.scope, base, &entry) {
        thread::yield_now();
        return Ok(None);
    }

    let emitted = if let Some(target_ndn) = alias_target(&entry) {
        if req.deref.has(DerefMode::SEARCHING) {
            match dn::dn2id(txn, &target_ndn).and_then(|tid| fetch_entry(txn, cache, tid)) {
                Ok(Some(target)) => Some(target),
                _ => None, // deref failure: skip, per spec.md §4.7 step 4.
            }
        } else {
            Some(Arc::clone(&entry))
        }
    } else {
        Some(Arc::clone(&entry))
    };

    let emitted = match emitted {
        Some(e) => e,
        None => {
            thread::yield_now();
            return Ok(None);
        }
    };

    if !ctx.consume_one() {
        log::warn!("search: sizelimit exceeded at id={}", id);
        let mut o = Outcome::from_code(ResultCode::SIZELIMIT_EXCEEDED);
        o.referrals = std::mem::take(referrals);
        return Ok(Some(Completion::Done(o)));
    }

    *n_matched += 1;
    if !sink(&emitted) {
        return Ok(Some(Completion::Aborted));
    }
    thread::yield_now();
    Ok(None)
}

#[cfg(test)]
#[path = "search_test.rs"]
mod search_test;
