//! Write-path operation drivers: `add`, `delete`, `modify`, `modrdn`,
//! `compare` (spec.md §4.8 "Modify pipeline" and §4.9, the lifecycle
//! operations named in spec.md §3/§6 but not otherwise given their own
//! component section).
//!
//! Grounded on `back-sql/modify.c` for the overall transaction shape
//! (resolve -> assertion check -> apply mods -> delta-reindex changed
//! attributes only -> write -> commit/rollback), generalized from the
//! SQL-rewriter backend's mapped-attribute version back to the native
//! attribute-index version spec.md §4.8 specifies, and on `back-bdb/dn2id.c`
//! for the DN-subtree rewrite `modrdn` performs.

use crate::attr_index::{self, IndexOp};
use crate::dn;
use crate::entry::{self, AttributeDescription, Entry, Value};
use crate::filter::Filter;
use crate::kv::KvTxn;
use crate::result_code::{Outcome, ResultCode};
use crate::schema::Schema;
use crate::{err_at, Error, Id, Result};

/// A single LDAP modification: replace, add to, or delete from the value
/// set of one attribute. `Delete` with an empty `values` removes the whole
/// attribute; with non-empty `values` removes only those values.
#[derive(Debug, Clone)]
pub enum Mod {
    Replace(AttributeDescription, Vec<Value>),
    Add(AttributeDescription, Vec<Value>),
    Delete(AttributeDescription, Vec<Value>),
}

/// `add(entry)` (spec.md §4.9): normalize the DN, resolve the parent,
/// reject a duplicate `ndn` via the KV store's `NO_OVERWRITE` put, allocate
/// the id, and index/write/commit atomically.
pub fn add(txn: &mut dyn KvTxn, schema: &Schema, suffix: &str, next_id: Id, mut entry: Entry) -> Result<Outcome> {
    entry.ndn = dn::normalize_dn(&entry.ndn);
    let parent_ndn = dn::parent(&entry.ndn);

    if let Some(pdn) = &parent_ndn {
        if dn::dn2id(txn, pdn).is_err() {
            let (_, matched) = dn::dn2id_matched(txn, pdn)?;
            return Ok(Outcome::no_such_object(matched));
        }
    }

    entry.id = next_id;
    match entry::id2entry_put(txn, &entry, true) {
        Ok(()) => (),
        Err(Error::KeyExist(_)) => return Ok(Outcome::from_code(ResultCode::ALREADY_EXISTS)),
        Err(err) => return Err(err),
    }

    match dn::dn2id_add(txn, suffix, parent_ndn.as_deref(), &entry.ndn, next_id) {
        Ok(()) => (),
        Err(Error::KeyExist(_)) => return Ok(Outcome::from_code(ResultCode::ALREADY_EXISTS)),
        Err(err) => return Err(err),
    }

    if let Some(pdn) = &parent_ndn {
        let parent_id = dn::dn2id(txn, pdn)?;
        attr_index::id2children_insert(txn, parent_id, next_id)?;
    }

    attr_index::index_entry(txn, schema, &entry, IndexOp::Insert)?;

    Ok(Outcome::success())
}

/// `delete(dn)` (spec.md §4.9, scenario 1 in §8): refuse when the entry
/// still has children (`NOT_ALLOWED_ON_NONLEAF`), otherwise de-index every
/// attribute and remove the DN-index and `id2entry` rows.
pub fn delete(txn: &mut dyn KvTxn, schema: &Schema, suffix: &str, ndn: &str) -> Result<Outcome> {
    let ndn = dn::normalize_dn(ndn);
    let id = match dn::dn2id(txn, &ndn) {
        Ok(id) => id,
        Err(Error::NoSuchObject(_)) => {
            let (_, matched) = dn::dn2id_matched(txn, &ndn)?;
            return Ok(Outcome::no_such_object(matched));
        }
        Err(err) => return Err(err),
    };

    if dn::dn2id_children(txn, &ndn)? {
        return Ok(Outcome::from_code(ResultCode::NOT_ALLOWED_ON_NONLEAF));
    }

    let entry = match entry::id2entry_get(txn, id)? {
        Some(e) => e,
        None => return err_at!(Fatal, msg: "dn2id points at {} but id2entry is missing it", id),
    };

    let parent_ndn = dn::parent(&ndn);
    attr_index::index_entry(txn, schema, &entry, IndexOp::Delete)?;
    if let Some(pdn) = &parent_ndn {
        let parent_id = dn::dn2id(txn, pdn)?;
        attr_index::id2children_delete(txn, parent_id, id)?;
    }
    dn::dn2id_delete(txn, suffix, parent_ndn.as_deref(), &ndn, id)?;
    entry::id2entry_delete(txn, id)?;

    Ok(Outcome::success())
}

fn apply_mod(entry: &mut Entry, m: &Mod) {
    match m {
        Mod::Replace(desc, values) => {
            if values.is_empty() {
                entry.remove(desc);
            } else {
                entry.set(desc.clone(), values.clone());
            }
        }
        Mod::Add(desc, values) => {
            let mut cur = entry.get_desc(desc).map(|a| a.values.clone()).unwrap_or_default();
            for v in values {
                if !cur.contains(v) {
                    cur.push(v.clone());
                }
            }
            entry.set(desc.clone(), cur);
        }
        Mod::Delete(desc, values) => {
            if values.is_empty() {
                entry.remove(desc);
            } else {
                let mut cur = entry.get_desc(desc).map(|a| a.values.clone()).unwrap_or_default();
                cur.retain(|v| !values.contains(v));
                if cur.is_empty() {
                    entry.remove(desc);
                } else {
                    entry.set(desc.clone(), cur);
                }
            }
        }
    }
}

/// `modify(dn, modlist, assertion?, noop?)` (spec.md §4.8): resolve the
/// entry, apply an optional assertion control, apply the modification
/// list, re-index only the attributes that actually changed (delta
/// indexing — SPEC_FULL.md §4.8), write the new entry, and commit. `noop`
/// forces a rollback even when everything up to that point succeeded.
pub fn modify(
    txn: &mut dyn KvTxn,
    schema: &Schema,
    ndn: &str,
    mods: &[Mod],
    assertion: Option<&Filter>,
    noop: bool,
) -> Result<Outcome> {
    let ndn = dn::normalize_dn(ndn);
    let id = match dn::dn2id(txn, &ndn) {
        Ok(id) => id,
        Err(Error::NoSuchObject(_)) => {
            let (_, matched) = dn::dn2id_matched(txn, &ndn)?;
            return Ok(Outcome::no_such_object(matched));
        }
        Err(err) => return Err(err),
    };

    let old_entry = match entry::id2entry_get(txn, id)? {
        Some(e) => e,
        None => return err_at!(Fatal, msg: "dn2id points at {} but id2entry is missing it", id),
    };

    if let Some(f) = assertion {
        if !crate::filter::matches(schema, f, &old_entry) {
            return Ok(Outcome::from_code(ResultCode::ASSERTION_FAILED));
        }
    }

    let mut new_entry = old_entry.clone();
    for m in mods {
        apply_mod(&mut new_entry, m);
    }

    let touched: Vec<&AttributeDescription> = mods
        .iter()
        .map(|m| match m {
            Mod::Replace(d, _) | Mod::Add(d, _) | Mod::Delete(d, _) => d,
        })
        .collect();

    for desc in touched {
        let old_vals = old_entry.get_desc(desc).map(|a| a.values.as_slice()).unwrap_or(&[]);
        let new_vals = new_entry.get_desc(desc).map(|a| a.values.as_slice()).unwrap_or(&[]);
        attr_index::index_delta(txn, schema, desc, old_vals, new_vals, id)?;
    }

    entry::id2entry_put(txn, &new_entry, false)?;

    if noop {
        return err_at!(Invalid, msg: "noop control requested: rolling back modify on {}", ndn);
    }

    Ok(Outcome::success())
}

/// `modrdn(dn, newrdn, deleteoldrdn, newsup?)` (spec.md §4.9): rewrite the
/// DN subtree indexes from the old DN to the new one, optionally moving the
/// entry under `newsup`, and optionally stripping the old RDN's attribute
/// values (re-indexing the delta) when `deleteoldrdn` is set.
pub fn modrdn(
    txn: &mut dyn KvTxn,
    schema: &Schema,
    suffix: &str,
    ndn: &str,
    newrdn: &str,
    deleteoldrdn: bool,
    newsup: Option<&str>,
) -> Result<Outcome> {
    let ndn = dn::normalize_dn(ndn);
    let id = match dn::dn2id(txn, &ndn) {
        Ok(id) => id,
        Err(Error::NoSuchObject(_)) => {
            let (_, matched) = dn::dn2id_matched(txn, &ndn)?;
            return Ok(Outcome::no_such_object(matched));
        }
        Err(err) => return Err(err),
    };

    if dn::dn2id_children(txn, &ndn)? {
        return Ok(Outcome::from_code(ResultCode::NOT_ALLOWED_ON_NONLEAF));
    }

    let mut entry = match entry::id2entry_get(txn, id)? {
        Some(e) => e,
        None => return err_at!(Fatal, msg: "dn2id points at {} but id2entry is missing it", id),
    };

    let old_parent = dn::parent(&ndn);
    let new_parent = match newsup {
        Some(sup) => Some(dn::normalize_dn(sup)),
        None => old_parent.clone(),
    };
    if let Some(np) = &new_parent {
        if dn::dn2id(txn, np).is_err() {
            let (_, matched) = dn::dn2id_matched(txn, np)?;
            return Ok(Outcome::no_such_object(matched));
        }
    }

    let new_rdn_norm = dn::normalize_dn(newrdn);
    let new_ndn = match &new_parent {
        Some(np) => format!("{},{}", new_rdn_norm, np),
        None => new_rdn_norm.clone(),
    };

    match dn::dn2id(txn, &new_ndn) {
        Ok(_) => return Ok(Outcome::from_code(ResultCode::ALREADY_EXISTS)),
        Err(Error::NoSuchObject(_)) => (),
        Err(err) => return Err(err),
    }

    attr_index::index_entry(txn, schema, &entry, IndexOp::Delete)?;
    if let Some(pdn) = &old_parent {
        let pid = dn::dn2id(txn, pdn)?;
        attr_index::id2children_delete(txn, pid, id)?;
    }
    dn::dn2id_delete(txn, suffix, old_parent.as_deref(), &ndn, id)?;

    if deleteoldrdn {
        for desc in rdn_descriptions(&ndn) {
            entry.remove(&desc);
        }
    }
    entry.ndn = new_ndn.clone();
    entry.dn = new_ndn.clone();

    dn::dn2id_add(txn, suffix, new_parent.as_deref(), &new_ndn, id)?;
    if let Some(pdn) = &new_parent {
        let pid = dn::dn2id(txn, pdn)?;
        attr_index::id2children_insert(txn, pid, id)?;
    }
    attr_index::index_entry(txn, schema, &entry, IndexOp::Insert)?;

    entry::id2entry_put(txn, &entry, false)?;

    Ok(Outcome::success())
}

/// Attribute descriptions named by each `attr=value` component of an RDN's
/// leftmost (only) segment, used by `modrdn`'s `deleteoldrdn` handling.
fn rdn_descriptions(ndn: &str) -> Vec<AttributeDescription> {
    let rdn = match dn::parent(ndn) {
        Some(p) => ndn[..ndn.len() - p.len() - 1].to_string(),
        None => ndn.to_string(),
    };
    rdn.split('+')
        .filter_map(|ava| ava.split('=').next())
        .map(|t| AttributeDescription::new(t.trim()))
        .collect()
}

/// `compare(dn, ava)` (spec.md §4.9): direct attribute-value test against
/// the stored entry, no index involvement — a thin read-only helper.
pub fn compare(txn: &dyn KvTxn, ndn: &str, desc: &AttributeDescription, value: &Value) -> Result<bool> {
    let ndn = dn::normalize_dn(ndn);
    let id = dn::dn2id(txn, &ndn)?;
    let entry = match entry::id2entry_get(txn, id)? {
        Some(e) => e,
        None => return err_at!(Fatal, msg: "dn2id points at {} but id2entry is missing it", id),
    };
    Ok(entry
        .get_desc(desc)
        .map(|a| a.values.iter().any(|v| v.to_lowercase_bytes() == value.to_lowercase_bytes()))
        .unwrap_or(false))
}

#[cfg(test)]
#[path = "modify_test.rs"]
mod modify_test;
