//! Filter AST and candidate-IDL generation (spec.md §4.6 "Filter candidate
//! generation"). Candidate generation over-approximates: the final
//! decision always comes from re-testing [matches] against the retrieved
//! entry, never from the index path alone.

use crate::attr_index;
use crate::entry::{AttributeDescription, Entry, Value};
use crate::idl::Idl;
use crate::kv::KvTxn;
use crate::schema::{self, IndexMask, Rule, Schema};
use crate::Result;

#[derive(Debug, Clone)]
pub enum Filter {
    Equality(AttributeDescription, Value),
    Substring(AttributeDescription, Option<String>, Vec<String>, Option<String>),
    Present(AttributeDescription),
    Approx(AttributeDescription, Value),
    Ge(AttributeDescription, Value),
    Le(AttributeDescription, Value),
    Ext(AttributeDescription, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

fn equality_candidates(txn: &dyn KvTxn, schema: &Schema, desc: &AttributeDescription, v: &Value) -> Result<Idl> {
    let target = match attr_index::resolve_index(schema, desc) {
        Some(t) if t.mask.has(IndexMask::EQUALITY) => t,
        _ => return Ok(Idl::All),
    };
    let rule = match attr_index::index_param(schema, &desc.type_name, IndexMask::EQUALITY) {
        Ok(r) => r,
        Err(_) => return Ok(Idl::All),
    };
    let key = &schema::equality_keys(rule, std::slice::from_ref(v))[0];
    attr_index::lookup(txn, &target.table, key)
}

fn approx_candidates(txn: &dyn KvTxn, schema: &Schema, desc: &AttributeDescription, v: &Value) -> Result<Idl> {
    let target = match attr_index::resolve_index(schema, desc) {
        Some(t) if t.mask.has(IndexMask::APPROX) => t,
        _ => return Ok(Idl::All),
    };
    if attr_index::index_param(schema, &desc.type_name, IndexMask::APPROX).is_err() {
        return Ok(Idl::All);
    }
    let key = &schema::approx_keys(std::slice::from_ref(v))[0];
    attr_index::lookup(txn, &target.table, key)
}

fn present_candidates(txn: &dyn KvTxn, schema: &Schema, desc: &AttributeDescription) -> Result<Idl> {
    let target = match attr_index::resolve_index(schema, desc) {
        Some(t) if t.mask.has(IndexMask::PRESENT) => t,
        _ => return Ok(Idl::All),
    };
    attr_index::lookup(txn, &target.table, schema::PRESENCE_KEY)
}

fn substring_candidates(
    txn: &dyn KvTxn,
    schema: &Schema,
    desc: &AttributeDescription,
    init: &Option<String>,
    any: &[String],
    fin: &Option<String>,
) -> Result<Idl> {
    let target = match attr_index::resolve_index(schema, desc) {
        Some(t) if t.mask.has(IndexMask::SUBSTR) => t,
        _ => return Ok(Idl::All),
    };
    if attr_index::index_param(schema, &desc.type_name, IndexMask::SUBSTR).is_err() {
        return Ok(Idl::All);
    }

    let keys = schema::substr_filter_keys(init.as_deref(), any, fin.as_deref());
    if keys.is_empty() {
        return Ok(Idl::All);
    }

    let mut acc = Idl::All;
    for key in &keys {
        let idl = attr_index::lookup(txn, &target.table, key)?;
        acc = acc.intersect(&idl);
        if acc.is_empty() {
            break;
        }
    }
    Ok(acc)
}

/// Compile `filter` into a candidate IDL: a sound superset of the true
/// match set (spec.md §8 "candidate soundness upper bound").
pub fn candidates(txn: &dyn KvTxn, schema: &Schema, filter: &Filter) -> Result<Idl> {
    match filter {
        Filter::Equality(desc, v) => equality_candidates(txn, schema, desc, v),
        Filter::Approx(desc, v) => approx_candidates(txn, schema, desc, v),
        Filter::Present(desc) => present_candidates(txn, schema, desc),
        Filter::Substring(desc, init, any, fin) => substring_candidates(txn, schema, desc, init, any, fin),
        Filter::Ge(_, _) | Filter::Le(_, _) | Filter::Ext(_, _) => Ok(Idl::All),
        Filter::Not(_) => Ok(Idl::All),
        Filter::And(children) => {
            let mut acc = Idl::All;
            for child in children {
                let c = candidates(txn, schema, child)?;
                acc = acc.intersect(&c);
                if acc.is_empty() {
                    break;
                }
            }
            Ok(acc)
        }
        Filter::Or(children) => {
            let mut acc = Idl::empty();
            for child in children {
                let c = candidates(txn, schema, child)?;
                acc = acc.union(&c);
                if acc.is_all() {
                    break;
                }
            }
            Ok(acc)
        }
    }
}

fn attr_values<'a>(entry: &'a Entry, desc: &AttributeDescription) -> &'a [Value] {
    entry.get_desc(desc).map(|a| a.values.as_slice()).unwrap_or(&[])
}

fn equality_rule(schema: &Schema, desc: &AttributeDescription) -> Rule {
    schema
        .type_id(&desc.type_name)
        .map(|id| schema.get(id).equality)
        .unwrap_or(Rule::CaseIgnore)
}

fn values_equal(schema: &Schema, desc: &AttributeDescription, a: &Value, b: &Value) -> bool {
    match equality_rule(schema, desc) {
        Rule::CaseExact => a.as_bytes() == b.as_bytes(),
        _ => a.to_lowercase_bytes() == b.to_lowercase_bytes(),
    }
}

fn approx_equal(a: &Value, b: &Value) -> bool {
    schema::soundex(&a.to_lowercase_bytes()) == schema::soundex(&b.to_lowercase_bytes())
}

fn substring_match(value: &Value, init: &Option<String>, any: &[String], fin: &Option<String>) -> bool {
    let hay = String::from_utf8_lossy(&value.to_lowercase_bytes()).into_owned();
    let mut pos = 0;

    if let Some(s) = init {
        let s = s.to_lowercase();
        if !hay[pos..].starts_with(&s) {
            return false;
        }
        pos += s.len();
    }
    for a in any {
        let a = a.to_lowercase();
        match hay[pos..].find(&a) {
            Some(i) => pos += i + a.len(),
            None => return false,
        }
    }
    if let Some(s) = fin {
        let s = s.to_lowercase();
        if !hay[pos..].ends_with(&s) {
            return false;
        }
    }
    true
}

/// Authoritative filter evaluation against a retrieved entry. Always the
/// final word; the candidate IDL is only ever a narrowing heuristic.
pub fn matches(schema: &Schema, filter: &Filter, entry: &Entry) -> bool {
    match filter {
        Filter::Equality(desc, v) => attr_values(entry, desc).iter().any(|av| values_equal(schema, desc, av, v)),
        Filter::Approx(desc, v) => attr_values(entry, desc).iter().any(|av| approx_equal(av, v)),
        Filter::Present(desc) => !attr_values(entry, desc).is_empty(),
        Filter::Substring(desc, init, any, fin) => attr_values(entry, desc)
            .iter()
            .any(|av| substring_match(av, init, any, fin)),
        Filter::Ge(desc, v) => attr_values(entry, desc)
            .iter()
            .any(|av| av.to_lowercase_bytes() >= v.to_lowercase_bytes()),
        Filter::Le(desc, v) => attr_values(entry, desc)
            .iter()
            .any(|av| av.to_lowercase_bytes() <= v.to_lowercase_bytes()),
        Filter::Ext(desc, v) => attr_values(entry, desc).iter().any(|av| values_equal(schema, desc, av, v)),
        Filter::And(children) => children.iter().all(|c| matches(schema, c, entry)),
        Filter::Or(children) => children.iter().any(|c| matches(schema, c, entry)),
        Filter::Not(f) => !matches(schema, f, entry),
    }
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod filter_test;
