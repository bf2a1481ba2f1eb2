//! DN→ID index: base (DN→ID), one-level (parent-DN→IDL), and subtree
//! (ancestor-DN→IDL) views over the normalized DN (spec.md §3, §4.3).
//!
//! Grounded line-for-line on `back-bdb/dn2id.c`. Resolves two of the open
//! questions in spec.md §9:
//!  1. the key is written as exactly `prefix ‖ ndn`, never `prefix ‖ ndn ‖
//!     <uninitialized byte>` — the original's `strlen(ndn) + 2` allocation
//!     with only `strlen(ndn) + 1` bytes copied in is not reproduced.
//!  2. one-level scope comparison is always by string equality; there is no
//!     pointer identity to special-case in safe Rust.

use std::convert::TryInto;

use crate::{err_at, idl::Idl, kv::KvTxn, Error, Id, Result};

pub const DN_TABLE: &str = "dn_index";

const DN_BASE_PREFIX: u8 = 0x01;
const DN_ONE_PREFIX: u8 = 0x02;
const DN_SUBTREE_PREFIX: u8 = 0x03;

/// Which DN-index view a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnPrefix {
    Base,
    One,
    Subtree,
}

impl DnPrefix {
    fn byte(self) -> u8 {
        match self {
            DnPrefix::Base => DN_BASE_PREFIX,
            DnPrefix::One => DN_ONE_PREFIX,
            DnPrefix::Subtree => DN_SUBTREE_PREFIX,
        }
    }
}

fn dn_key(prefix: DnPrefix, ndn: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(ndn.len() + 1);
    key.push(prefix.byte());
    key.extend_from_slice(ndn.as_bytes());
    key
}

fn encode_id(id: Id) -> [u8; 4] {
    id.to_be_bytes()
}

fn decode_id(buf: &[u8]) -> Result<Id> {
    if buf.len() != 4 {
        return err_at!(DecodeFail, msg: "dn2id value must be 4 bytes, got {}", buf.len());
    }
    Ok(u32::from_be_bytes(buf.try_into().unwrap()))
}

/// Find the first unescaped (not preceded by `\`) occurrence of `needle`.
fn find_unescaped(s: &str, needle: u8) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == needle {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Case-fold and whitespace-canonicalize a DN. A real deployment typically
/// normalizes upstream against full schema-aware matching rules (spec.md
/// §4.3 assumes this); this is the minimal, self-contained normalizer this
/// crate needs to be testable standalone.
pub fn normalize_dn(dn: &str) -> String {
    split_rdns(dn.trim())
        .iter()
        .map(|rdn| normalize_rdn(rdn))
        .collect::<Vec<_>>()
        .join(",")
}

fn split_rdns(dn: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = dn;
    loop {
        match find_unescaped(rest, b',') {
            Some(i) => {
                out.push(rest[..i].trim().to_string());
                rest = rest[i + 1..].trim_start();
            }
            None => {
                if !rest.is_empty() {
                    out.push(rest.trim().to_string());
                }
                break;
            }
        }
    }
    out
}

fn normalize_rdn(rdn: &str) -> String {
    rdn.split('+')
        .map(|ava| match find_unescaped(ava, b'=') {
            Some(i) => format!(
                "{}={}",
                ava[..i].trim().to_lowercase(),
                ava[i + 1..].trim()
            ),
            None => ava.trim().to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join("+")
}

/// Strip the leftmost RDN, returning the parent's normalized DN, or `None`
/// if `ndn` is already a single RDN (has no parent within this DN string).
pub fn parent(ndn: &str) -> Option<String> {
    find_unescaped(ndn, b',').map(|i| ndn[i + 1..].trim_start().to_string())
}

/// Strict ancestors of `ndn`, innermost first, stopping at (and including)
/// `suffix`. Returns an empty list when `ndn` is itself the suffix. An empty
/// `suffix` means "walk to the true root" (spec.md §4.3).
pub fn ancestors(ndn: &str, suffix: &str) -> Vec<String> {
    if ndn == suffix {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut cur = ndn.to_string();
    loop {
        match parent(&cur) {
            Some(p) => {
                let reached_suffix = p == suffix;
                out.push(p.clone());
                if reached_suffix {
                    break;
                }
                cur = p;
            }
            None => break,
        }
    }
    out
}

fn read_idl(txn: &dyn KvTxn, key: &[u8]) -> Result<Idl> {
    match txn.get(DN_TABLE, key)? {
        Some(buf) => Idl::decode(&buf),
        None => Ok(Idl::empty()),
    }
}

fn write_idl(txn: &mut dyn KvTxn, key: &[u8], idl: &Idl) -> Result<()> {
    if idl.is_empty() {
        match txn.delete(DN_TABLE, key) {
            Ok(()) | Err(Error::KeyNotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    } else {
        let mut buf = Vec::new();
        idl.encode(&mut buf)?;
        txn.put(DN_TABLE, key, &buf, false)
    }
}

fn idl_insert_key(txn: &mut dyn KvTxn, key: &[u8], id: Id) -> Result<()> {
    let mut idl = read_idl(txn, key)?;
    idl.insert(id);
    write_idl(txn, key, &idl)
}

fn idl_delete_key(txn: &mut dyn KvTxn, key: &[u8], id: Id) -> Result<()> {
    let mut idl = read_idl(txn, key)?;
    idl.delete(id);
    write_idl(txn, key, &idl)
}

/// `dn2id(ndn) -> ID`, mapping a missing entry to `NO_SUCH_OBJECT`.
pub fn dn2id(txn: &dyn KvTxn, ndn: &str) -> Result<Id> {
    let key = dn_key(DnPrefix::Base, ndn);
    match txn.get(DN_TABLE, &key)? {
        Some(buf) => decode_id(&buf),
        None => err_at!(NoSuchObject, msg: "no such object: {}", ndn),
    }
}

/// `dn2id_matched(ndn) -> (ID?, matched_dn?)`. Walks ancestors one RDN at a
/// time until one is found or the DN string is exhausted. If `ndn` itself
/// resolves, returns it with no matched-DN marker (spec.md §8 "matched DN
/// monotonicity").
pub fn dn2id_matched(txn: &dyn KvTxn, ndn: &str) -> Result<(Option<Id>, Option<String>)> {
    let mut cur = ndn.to_string();
    loop {
        let key = dn_key(DnPrefix::Base, &cur);
        match txn.get(DN_TABLE, &key)? {
            Some(buf) => {
                let id = decode_id(&buf)?;
                let matched = if cur == ndn { None } else { Some(cur) };
                return Ok((Some(id), matched));
            }
            None => match parent(&cur) {
                Some(p) => cur = p,
                None => return Ok((None, None)),
            },
        }
    }
}

/// `dn2id_add`: three writes — base (unique), one-level append, subtree
/// append for every ancestor — all issued against the same transaction so
/// the caller can commit them atomically with the `id2entry` write
/// (spec.md §3 invariant: index mutation and entry mutation share one
/// transaction).
pub fn dn2id_add(
    txn: &mut dyn KvTxn,
    suffix: &str,
    parent_ndn: Option<&str>,
    ndn: &str,
    id: Id,
) -> Result<()> {
    log::trace!("dn2id_add: enter ndn={} id={}", ndn, id);
    let base_key = dn_key(DnPrefix::Base, ndn);
    txn.put(DN_TABLE, &base_key, &encode_id(id), true)?;

    if let Some(pdn) = parent_ndn {
        let key = dn_key(DnPrefix::One, pdn);
        idl_insert_key(txn, &key, id)?;
    }

    for ancestor in ancestors(ndn, suffix) {
        let key = dn_key(DnPrefix::Subtree, &ancestor);
        idl_insert_key(txn, &key, id)?;
    }

    log::trace!("dn2id_add: exit ndn={} id={}", ndn, id);
    Ok(())
}

/// `dn2id_delete`: inverse of [dn2id_add].
pub fn dn2id_delete(
    txn: &mut dyn KvTxn,
    suffix: &str,
    parent_ndn: Option<&str>,
    ndn: &str,
    id: Id,
) -> Result<()> {
    log::trace!("dn2id_delete: enter ndn={} id={}", ndn, id);
    let base_key = dn_key(DnPrefix::Base, ndn);
    txn.delete(DN_TABLE, &base_key)?;

    if let Some(pdn) = parent_ndn {
        let key = dn_key(DnPrefix::One, pdn);
        idl_delete_key(txn, &key, id)?;
    }

    for ancestor in ancestors(ndn, suffix) {
        let key = dn_key(DnPrefix::Subtree, &ancestor);
        idl_delete_key(txn, &key, id)?;
    }

    log::trace!("dn2id_delete: exit ndn={} id={}", ndn, id);
    Ok(())
}

/// Cheap existence probe: does `ndn` have at least one direct child?
pub fn dn2id_children(txn: &dyn KvTxn, ndn: &str) -> Result<bool> {
    let key = dn_key(DnPrefix::One, ndn);
    Ok(txn.get(DN_TABLE, &key)?.is_some())
}

/// Read the IDL stored under `prefix` for `ndn`. When `prefix` is
/// [DnPrefix::Subtree] and `ndn` is the backend's suffix, short-circuits to
/// [Idl::All] — no need to enumerate the entire directory.
pub fn dn2idl(txn: &dyn KvTxn, suffix: &str, ndn: &str, prefix: DnPrefix) -> Result<Idl> {
    if prefix == DnPrefix::Subtree && ndn == suffix {
        return Ok(Idl::All);
    }
    let key = dn_key(prefix, ndn);
    read_idl(txn, &key)
}

#[cfg(test)]
#[path = "dn_test.rs"]
mod dn_test;
