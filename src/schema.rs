//! Attribute types, their supertype chain, matching rules, and the index
//! mask configuration (spec.md §3 "AttributeDescription" / "Index mask").
//!
//! The supertype DAG (`sat_sup` in the original) is modeled as owned
//! records with an index into a type table rather than C-style parent
//! pointers, per spec.md §9 "Inheritance-style attribute-type/supertype
//! chain"; walking it is iterative, not recursive.

use lazy_static::lazy_static;

use std::collections::HashMap;

use crate::entry::Value;

pub type TypeId = usize;

/// Bitset selecting which index kinds apply to an attribute, and how
/// subtypes/language variants are handled (spec.md §3). Plain bit
/// constants over a `u32`, matching the rest of this crate's preference
/// for small owned records over a bitflags-style macro the teacher
/// repository doesn't otherwise pull in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexMask(pub u32);

impl IndexMask {
    pub const NONE: IndexMask = IndexMask(0);
    pub const PRESENT: IndexMask = IndexMask(1 << 0);
    pub const EQUALITY: IndexMask = IndexMask(1 << 1);
    pub const APPROX: IndexMask = IndexMask(1 << 2);
    pub const SUBSTR: IndexMask = IndexMask(1 << 3);
    pub const NOSUBTYPES: IndexMask = IndexMask(1 << 4);
    pub const AUTO_SUBTYPES: IndexMask = IndexMask(1 << 5);
    pub const NOLANG: IndexMask = IndexMask(1 << 6);

    pub fn is_set(self) -> bool {
        self.0 != 0
    }

    pub fn has(self, bit: IndexMask) -> bool {
        self.0 & bit.0 != 0
    }
}

impl std::ops::BitOr for IndexMask {
    type Output = IndexMask;
    fn bitor(self, rhs: IndexMask) -> IndexMask {
        IndexMask(self.0 | rhs.0)
    }
}

/// Which matching rule a type binds for a given purpose (equality, approx,
/// substring). `None` means the type has no rule of that kind and filters
/// of that kind against it are never indexable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    None,
    CaseIgnore,
    CaseExact,
    Soundex,
    Ngram,
}

#[derive(Debug, Clone)]
pub struct AttributeType {
    pub name: String,
    pub sup: Option<TypeId>,
    pub equality: Rule,
    pub approx: Rule,
    pub substr: Rule,
}

/// Registry of attribute types and the configured index masks. One
/// instance is shared (read-mostly, built at startup) by the attribute
/// index engine.
#[derive(Debug, Default)]
pub struct Schema {
    types: Vec<AttributeType>,
    by_name: HashMap<String, TypeId>,
    /// Keyed by attribute-description canonical name (`type` or
    /// `type;lang-xx`), per spec.md §4.5 "Index selection".
    masks: HashMap<String, IndexMask>,
}

/// `(name, supertype name, equality, approx, substr)` for the handful of
/// core attribute types (`core.schema`'s `name`/`cn`/`sn`/`ou`/`dc`/`uid`/
/// `mail`/`objectclass`) a deployment almost always has. Built once and
/// shared read-only, the way `bubt_config::MARKER_BLOCK` precomputes a
/// fixed block rather than re-deriving it per `Config`.
lazy_static! {
    static ref STANDARD_TYPES: Vec<(&'static str, Option<&'static str>, Rule, Rule, Rule)> = vec![
        ("top", None, Rule::None, Rule::None, Rule::None),
        ("name", Some("top"), Rule::CaseIgnore, Rule::None, Rule::Ngram),
        ("cn", Some("name"), Rule::CaseIgnore, Rule::Soundex, Rule::Ngram),
        ("sn", Some("name"), Rule::CaseIgnore, Rule::Soundex, Rule::Ngram),
        ("ou", Some("name"), Rule::CaseIgnore, Rule::None, Rule::Ngram),
        ("dc", Some("name"), Rule::CaseIgnore, Rule::None, Rule::None),
        ("uid", None, Rule::CaseExact, Rule::None, Rule::None),
        ("mail", None, Rule::CaseIgnore, Rule::None, Rule::Ngram),
        ("objectclass", None, Rule::CaseIgnore, Rule::None, Rule::None),
    ];
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    /// A [Schema] pre-registered with [STANDARD_TYPES], for callers that
    /// don't load a schema from an external definition file (spec.md §1:
    /// the schema *loader* itself is out of scope).
    pub fn with_standard_types() -> Schema {
        let mut schema = Schema::new();
        for (name, sup, equality, approx, substr) in STANDARD_TYPES.iter() {
            schema.register(name, *sup, *equality, *approx, *substr);
        }
        schema
    }

    pub fn register(
        &mut self,
        name: &str,
        sup: Option<&str>,
        equality: Rule,
        approx: Rule,
        substr: Rule,
    ) -> TypeId {
        let name = name.to_lowercase();
        let sup_id = sup.and_then(|s| self.by_name.get(&s.to_lowercase()).copied());
        let id = self.types.len();
        self.types.push(AttributeType {
            name: name.clone(),
            sup: sup_id,
            equality,
            approx,
            substr,
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn get(&self, id: TypeId) -> &AttributeType {
        &self.types[id]
    }

    /// Iterative walk from `id` up through `sup` links, innermost first,
    /// including `id` itself.
    pub fn sup_chain(&self, id: TypeId) -> Vec<TypeId> {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(t) = cur {
            chain.push(t);
            cur = self.types[t].sup;
        }
        chain
    }

    pub fn set_mask(&mut self, desc_canonical_name: &str, mask: IndexMask) {
        self.masks.insert(desc_canonical_name.to_lowercase(), mask);
    }

    pub fn mask_of(&self, desc_canonical_name: &str) -> Option<IndexMask> {
        self.masks.get(&desc_canonical_name.to_lowercase()).copied()
    }
}

/// Length of each overlapping fragment used for substring indexing.
pub const NGRAM_LEN: usize = 3;
const INITIAL_MARKER: u8 = b'^';
const FINAL_MARKER: u8 = b'$';

fn normalized_bytes(rule: Rule, v: &Value) -> Vec<u8> {
    match rule {
        Rule::CaseExact => v.as_bytes().to_vec(),
        _ => v.to_lowercase_bytes(),
    }
}

/// Equality index keys: one normalized value per key.
pub fn equality_keys(rule: Rule, values: &[Value]) -> Vec<Vec<u8>> {
    values.iter().map(|v| normalized_bytes(rule, v)).collect()
}

/// Classic Soundex code: first letter, then up to three digits derived
/// from consonant classes, vowels and duplicates dropped.
pub fn soundex(word: &[u8]) -> Vec<u8> {
    fn code(c: u8) -> u8 {
        match c.to_ascii_uppercase() {
            b'B' | b'F' | b'P' | b'V' => b'1',
            b'C' | b'G' | b'J' | b'K' | b'Q' | b'S' | b'X' | b'Z' => b'2',
            b'D' | b'T' => b'3',
            b'L' => b'4',
            b'M' | b'N' => b'5',
            b'R' => b'6',
            _ => b'0',
        }
    }

    let letters: Vec<u8> = word.iter().copied().filter(|c| c.is_ascii_alphabetic()).collect();
    if letters.is_empty() {
        return Vec::new();
    }

    let mut out = vec![letters[0].to_ascii_uppercase()];
    let mut last = code(letters[0]);
    for &c in &letters[1..] {
        let cc = code(c);
        if cc != b'0' && cc != last {
            out.push(cc);
        }
        last = cc;
        if out.len() == 4 {
            break;
        }
    }
    while out.len() < 4 {
        out.push(b'0');
    }
    out
}

/// Approximate-match index keys (spec.md §4.5 "approx = Soundex-like
/// code").
pub fn approx_keys(values: &[Value]) -> Vec<Vec<u8>> {
    values
        .iter()
        .map(|v| soundex(&v.to_lowercase_bytes()))
        .collect()
}

/// Every overlapping `NGRAM_LEN`-byte fragment of `bytes`, plus
/// boundary-marked initial/final fragments when `bytes` is at least that
/// long (spec.md §4.5 "substring keys = overlapping n-grams").
pub fn ngram_keys(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    if bytes.len() < NGRAM_LEN {
        return keys;
    }
    for w in bytes.windows(NGRAM_LEN) {
        keys.push(w.to_vec());
    }
    let mut initial = vec![INITIAL_MARKER];
    initial.extend_from_slice(&bytes[..NGRAM_LEN]);
    keys.push(initial);

    let mut fin = vec![FINAL_MARKER];
    fin.extend_from_slice(&bytes[bytes.len() - NGRAM_LEN..]);
    keys.push(fin);
    keys
}

/// Index keys produced when indexing a value vector for the `SUBSTR` kind.
pub fn substr_index_keys(values: &[Value]) -> Vec<Vec<u8>> {
    values
        .iter()
        .flat_map(|v| ngram_keys(&v.to_lowercase_bytes()))
        .collect()
}

/// Candidate-generation keys for a parsed `(init?, any*, final?)` filter:
/// every fragment must independently be present (spec.md §4.6), so the
/// caller intersects the per-key IDLs.
pub fn substr_filter_keys(init: Option<&str>, any: &[String], fin: Option<&str>) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    if let Some(s) = init {
        let b = s.to_lowercase().into_bytes();
        if b.len() >= NGRAM_LEN {
            let mut k = vec![INITIAL_MARKER];
            k.extend_from_slice(&b[..NGRAM_LEN]);
            keys.push(k);
        }
        keys.extend(ngram_keys(&b).into_iter().filter(|k| k[0] != INITIAL_MARKER && k[0] != FINAL_MARKER));
    }
    for a in any {
        let b = a.to_lowercase().into_bytes();
        keys.extend(ngram_keys(&b).into_iter().filter(|k| k[0] != INITIAL_MARKER && k[0] != FINAL_MARKER));
    }
    if let Some(s) = fin {
        let b = s.to_lowercase().into_bytes();
        if b.len() >= NGRAM_LEN {
            let mut k = vec![FINAL_MARKER];
            k.extend_from_slice(&b[b.len() - NGRAM_LEN..]);
            keys.push(k);
        }
        keys.extend(ngram_keys(&b).into_iter().filter(|k| k[0] != INITIAL_MARKER && k[0] != FINAL_MARKER));
    }
    keys
}

pub const PRESENCE_KEY: &[u8] = b"*";

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
