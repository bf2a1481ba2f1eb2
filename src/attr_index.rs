//! Attribute value indexing: resolving which index kinds apply to an
//! attribute description, deriving index keys, and maintaining the
//! per-attribute IDL tables as entries are added, changed, and removed
//! (spec.md §3 "Stored tables" / §4.5 "Attribute index").
//!
//! Grounded on `back-ldbm/index.c`: `index_mask` (here `resolve_index`),
//! `index_param`, `indexer`/`index_at_values`/`index_values` (collapsed
//! into [index_entry]), and `key_change`.

use crate::entry::{Attribute, AttributeDescription, Entry, Value};
use crate::idl::Idl;
use crate::kv::KvTxn;
use crate::schema::{self, IndexMask, Rule, Schema};
use crate::{err_at, Error, Id, Result};

/// Which operation is driving `index_entry`: present at commit time so
/// `key_change` knows whether to insert or delete the id at each key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOp {
    Insert,
    Delete,
}

fn table_name(type_name: &str) -> String {
    format!("attr_{}", type_name)
}

/// Which table an attribute's index keys live under, plus the mask that
/// applies. Normally the attribute's own canonical name, but when the
/// mask was found by walking up the supertype chain (spec.md §4.5 step 3)
/// the table stays on the ancestor's canonical name rather than the
/// subtype's own — callers must key every lookup/write off `table`, never
/// off the attribute description they started from.
#[derive(Debug, Clone)]
pub struct IndexTarget {
    pub table: String,
    pub mask: IndexMask,
}

/// Walk from the attribute's own type up its supertype chain looking for
/// a configured mask, honoring `NOSUBTYPES`/`AUTO_SUBTYPES` the way
/// `index_mask` does: a type that marks itself `NOSUBTYPES` is never
/// reached through a subtype walk. Per spec.md §4.5 step 3, an ancestor's
/// mask applies to every subtype by default — `AUTO_SUBTYPES` only makes
/// this explicit; the absence of `NOSUBTYPES` is what actually gates
/// inheritance, so a subtype of a plainly-configured ancestor is indexed
/// too, not just subtypes of an `AUTO_SUBTYPES` ancestor.
pub fn resolve_index(schema: &Schema, desc: &AttributeDescription) -> Option<IndexTarget> {
    if desc.is_lang_variant() {
        if let Some(mask) = schema.mask_of(&desc.canonical_name()) {
            return Some(IndexTarget { table: desc.canonical_name(), mask });
        }
        // NOLANG on the base type means the language-tagged variant is
        // never separately indexed; fall through to the base mask so a
        // NOLANG-exempt base index still applies to the tagged value.
        let base_mask = schema.mask_of(&desc.type_name);
        return match base_mask {
            Some(mask) if mask.has(IndexMask::NOLANG) => None,
            Some(mask) => Some(IndexTarget { table: desc.type_name.clone(), mask }),
            None => None,
        };
    }

    if let Some(mask) = schema.mask_of(&desc.type_name) {
        return Some(IndexTarget { table: desc.type_name.clone(), mask });
    }

    let type_id = schema.type_id(&desc.type_name)?;
    for ancestor in schema.sup_chain(type_id).into_iter().skip(1) {
        let ancestor_name = &schema.get(ancestor).name;
        if let Some(mask) = schema.mask_of(ancestor_name) {
            if mask.has(IndexMask::NOSUBTYPES) {
                return None;
            }
            // Either AUTO_SUBTYPES (explicitly extends to every subtype)
            // or a plain mask (implicitly inherited, since NOSUBTYPES
            // isn't set) — both keep the table on the ancestor's
            // canonical name.
            return Some(IndexTarget { table: ancestor_name.clone(), mask });
        }
    }
    None
}

/// Resolve the matching rule bound to `mask_bit` for `type_name`, or
/// `InappropriateMatching` when the type has no such rule — mirrors
/// `index_param`'s rejection of a filter that can't be turned into an
/// index probe.
pub fn index_param(schema: &Schema, type_name: &str, mask_bit: IndexMask) -> Result<Rule> {
    let type_id = schema.type_id(type_name).ok_or_else(|| {
        Error::UndefinedType(format!("no such attribute type: {}", type_name))
    })?;
    let at = schema.get(type_id);

    let rule = if mask_bit.has(IndexMask::EQUALITY) {
        at.equality
    } else if mask_bit.has(IndexMask::APPROX) {
        // Approx without its own rule falls back to equality, same as
        // `index_param`'s `MRLOOKUP` fallback.
        match at.approx {
            Rule::None => at.equality,
            r => r,
        }
    } else if mask_bit.has(IndexMask::SUBSTR) {
        at.substr
    } else {
        Rule::None
    };

    if let Rule::None = rule {
        return err_at!(
            InappropriateMatching,
            msg: "no matching rule for {} on {}",
            type_name,
            mask_bit.0
        );
    }
    Ok(rule)
}

fn read_idl(txn: &dyn KvTxn, table: &str, key: &[u8]) -> Result<Idl> {
    match txn.get(table, key)? {
        Some(buf) => Idl::decode(&buf),
        None => Ok(Idl::empty()),
    }
}

fn write_idl(txn: &mut dyn KvTxn, table: &str, key: &[u8], idl: &Idl) -> Result<()> {
    if idl.is_empty() {
        match txn.delete(table, key) {
            Ok(()) | Err(Error::KeyNotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    } else {
        let mut buf = Vec::new();
        idl.encode(&mut buf)?;
        txn.put(table, key, &buf, false)
    }
}

/// Insert or delete `id` at `key` in `table`, per `op` (`key_change`).
pub fn key_change(txn: &mut dyn KvTxn, table: &str, key: &[u8], id: Id, op: IndexOp) -> Result<()> {
    let mut idl = read_idl(txn, table, key)?;
    match op {
        IndexOp::Insert => idl.insert(id),
        IndexOp::Delete => idl.delete(id),
    }
    write_idl(txn, table, key, &idl)
}

/// Look up the IDL at `key` in the named attribute's table. Returns an
/// empty IDL when the attribute isn't indexed or the key is absent.
pub fn lookup(txn: &dyn KvTxn, type_name: &str, key: &[u8]) -> Result<Idl> {
    read_idl(txn, &table_name(type_name), key)
}

fn keys_for_mask(schema: &Schema, desc: &AttributeDescription, mask: IndexMask, values: &[Value]) -> Result<Vec<(&'static str, Vec<Vec<u8>>)>> {
    let mut out = Vec::new();
    if mask.has(IndexMask::PRESENT) {
        let keys = if values.is_empty() {
            Vec::new()
        } else {
            vec![schema::PRESENCE_KEY.to_vec()]
        };
        out.push(("present", keys));
    }
    if mask.has(IndexMask::EQUALITY) {
        let rule = index_param(schema, &desc.type_name, IndexMask::EQUALITY)?;
        out.push(("equality", schema::equality_keys(rule, values)));
    }
    if mask.has(IndexMask::APPROX) {
        index_param(schema, &desc.type_name, IndexMask::APPROX)?;
        out.push(("approx", schema::approx_keys(values)));
    }
    if mask.has(IndexMask::SUBSTR) {
        index_param(schema, &desc.type_name, IndexMask::SUBSTR)?;
        out.push(("substr", schema::substr_index_keys(values)));
    }
    Ok(out)
}

/// Index (or de-index, per `op`) every attribute of `entry` that resolves
/// to a non-empty mask. One table per attribute type; a language-tagged
/// value additionally fans out into the tagged attribute's own table
/// when the tag is itself separately indexed (spec.md §4.5 "language
/// tag fan-out").
pub fn index_entry(txn: &mut dyn KvTxn, schema: &Schema, entry: &Entry, op: IndexOp) -> Result<()> {
    for attr in &entry.attrs {
        index_attribute(txn, schema, attr, entry.id, op)?;
    }
    Ok(())
}

fn index_attribute(txn: &mut dyn KvTxn, schema: &Schema, attr: &Attribute, id: Id, op: IndexOp) -> Result<()> {
    let target = match resolve_index(schema, &attr.desc) {
        Some(t) if t.mask.is_set() => t,
        _ => return Ok(()),
    };

    let table = table_name(&target.table);
    for (kind, keys) in keys_for_mask(schema, &attr.desc, target.mask, &attr.values)? {
        log::debug!("index {}: {} {} keys, op={:?}", table, kind, keys.len(), op);
        for key in keys {
            key_change(txn, &table, &key, id, op)?;
        }
    }
    Ok(())
}

/// Index-entry delta between an old and a new attribute value set,
/// issuing only the key changes that actually differ (spec.md §4.8
/// "modify indexes the delta, not the whole entry").
pub fn index_delta(
    txn: &mut dyn KvTxn,
    schema: &Schema,
    desc: &AttributeDescription,
    old: &[Value],
    new: &[Value],
    id: Id,
) -> Result<()> {
    let target = match resolve_index(schema, desc) {
        Some(t) if t.mask.is_set() => t,
        _ => return Ok(()),
    };

    let old_keyed = keys_for_mask(schema, desc, target.mask, old)?;
    let new_keyed = keys_for_mask(schema, desc, target.mask, new)?;
    let table = table_name(&target.table);

    for ((_, old_keys), (_, new_keys)) in old_keyed.into_iter().zip(new_keyed.into_iter()) {
        for key in &old_keys {
            if !new_keys.contains(key) {
                key_change(txn, &table, key, id, IndexOp::Delete)?;
            }
        }
        for key in &new_keys {
            if !old_keys.contains(key) {
                key_change(txn, &table, key, id, IndexOp::Insert)?;
            }
        }
    }
    Ok(())
}

/// Pseudo-attribute type backing one-level search (spec.md §3 item 4):
/// each child is indexed under its parent id, encoded as decimal text, as
/// though it were an ordinary equality-indexed attribute. Maintained
/// alongside the DN one-level index by `add`/`delete`/`modrdn`.
pub const ID2CHILDREN_TYPE: &str = "id2children";

pub fn id2children_key(parent_id: Id) -> Vec<u8> {
    parent_id.to_string().into_bytes()
}

pub fn id2children_insert(txn: &mut dyn KvTxn, parent_id: Id, child_id: Id) -> Result<()> {
    key_change(txn, &table_name(ID2CHILDREN_TYPE), &id2children_key(parent_id), child_id, IndexOp::Insert)
}

pub fn id2children_delete(txn: &mut dyn KvTxn, parent_id: Id, child_id: Id) -> Result<()> {
    key_change(txn, &table_name(ID2CHILDREN_TYPE), &id2children_key(parent_id), child_id, IndexOp::Delete)
}

pub fn id2children_lookup(txn: &dyn KvTxn, parent_id: Id) -> Result<Idl> {
    lookup(txn, ID2CHILDREN_TYPE, &id2children_key(parent_id))
}

#[cfg(test)]
#[path = "attr_index_test.rs"]
mod attr_index_test;
