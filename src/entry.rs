//! Entry, attribute, and value types (spec.md §3 "Entry" / "AttributeDescription").

use cbordata::Cborize;
use crc::{Crc, CRC_32_ISO_HDLC};
use serde::{Deserialize, Serialize};

use std::convert::TryInto;
use std::mem::size_of;

use crate::kv::KvTxn;
use crate::{err_at, Result};

/// Generalizes `rdms::bitmaps::croaring::CRoaring`'s crc32 digest (there
/// hashing bitmap members for a Bloom filter) into a plain integrity
/// checksum over an encoded entry.
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// 32-bit entry identifier. Monotonically allocated, never reused within a
/// database lifetime. Stored big-endian so cursors iterate in numeric order
/// (spec.md §6).
pub type Id = u32;

/// Sentinel for "no id" / "no parent resolved yet".
pub const NOID: Id = 0xFFFF_FFFF;

/// Reserved id for "root, no parent". Distinct from [NOID]: a real entry can
/// legitimately have `ROOT_ID` as its parent, but never `NOID`.
pub const ROOT_ID: Id = 0;

/// Approximate in-memory footprint, used by the entry cache to honor a
/// `max_size` budget (mirrors `rdms::db::Footprint`).
pub trait Footprint {
    fn footprint(&self) -> Result<isize>;
}

impl Footprint for String {
    fn footprint(&self) -> Result<isize> {
        Ok((size_of::<String>() + self.capacity()) as isize)
    }
}

impl<T: Footprint> Footprint for Vec<T> {
    fn footprint(&self) -> Result<isize> {
        let mut size = (size_of::<Vec<T>>() + self.capacity()) as isize;
        for item in self.iter() {
            size += item.footprint()?;
        }
        Ok(size)
    }
}

/// A value as stored on an attribute. Matching rules and index-key
/// derivation operate on the byte form; `Utf8` is kept distinct so
/// case-folding matching rules can normalize without a lossy round trip
/// through bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Cborize)]
pub enum Value {
    Utf8(String),
    Bytes(Vec<u8>),
}

const VALUE_VER: u32 = 0x0001_0001;

impl Value {
    const ID: u32 = VALUE_VER;

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Value::Utf8(s) => s.as_bytes(),
            Value::Bytes(b) => b,
        }
    }

    pub fn to_lowercase_bytes(&self) -> Vec<u8> {
        match self {
            Value::Utf8(s) => s.to_lowercase().into_bytes(),
            Value::Bytes(b) => b.to_ascii_lowercase(),
        }
    }
}

impl Footprint for Value {
    fn footprint(&self) -> Result<isize> {
        let inner = match self {
            Value::Utf8(s) => s.capacity(),
            Value::Bytes(b) => b.capacity(),
        };
        Ok((size_of::<Value>() + inner) as isize)
    }
}

/// A `(type, optional language tag, options)` triple. `options` beyond
/// language tags (e.g. `binary`) are kept opaque — they don't affect index
/// selection, only presentation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Cborize)]
pub struct AttributeDescription {
    pub type_name: String, // canonical, lower-cased
    pub lang: Option<String>,
    pub options: Vec<String>,
}

const ATTRIBUTE_DESCRIPTION_VER: u32 = 0x0001_0001;

impl AttributeDescription {
    const ID: u32 = ATTRIBUTE_DESCRIPTION_VER;

    pub fn new(type_name: &str) -> AttributeDescription {
        AttributeDescription {
            type_name: type_name.to_lowercase(),
            lang: None,
            options: Vec::new(),
        }
    }

    pub fn with_lang(type_name: &str, lang: &str) -> AttributeDescription {
        AttributeDescription {
            type_name: type_name.to_lowercase(),
            lang: Some(lang.to_lowercase()),
            options: Vec::new(),
        }
    }

    pub fn is_lang_variant(&self) -> bool {
        self.lang.is_some()
    }

    /// The base type description, stripped of language tag and options.
    pub fn base(&self) -> AttributeDescription {
        AttributeDescription::new(&self.type_name)
    }

    /// Canonical table/index name for this description: `type;lang-XX` when
    /// tagged, else just `type`.
    pub fn canonical_name(&self) -> String {
        match &self.lang {
            Some(lang) => format!("{};lang-{}", self.type_name, lang),
            None => self.type_name.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Cborize)]
pub struct Attribute {
    pub desc: AttributeDescription,
    pub values: Vec<Value>,
}

const ATTRIBUTE_VER: u32 = 0x0001_0001;

impl Attribute {
    const ID: u32 = ATTRIBUTE_VER;
}

impl Footprint for Attribute {
    fn footprint(&self) -> Result<isize> {
        let mut size = size_of::<Attribute>() as isize;
        for v in &self.values {
            size += v.footprint()?;
        }
        Ok(size)
    }
}

/// Marker prefix on a normalized DN identifying a referral entry
/// (spec.md §4.7 step 4).
pub const REFERRAL_PREFIX: &str = "ref=";

/// An LDAP entry: a 32-bit id, the presentation and normalized DNs, and an
/// ordered sequence of attributes. The parent-id is not a stored column —
/// it is materialized by the one-level index (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize, Cborize)]
pub struct Entry {
    pub id: Id,
    pub dn: String,
    pub ndn: String,
    pub attrs: Vec<Attribute>,
}

const ENTRY_VER: u32 = 0x0001_0001;

impl Entry {
    const ID: u32 = ENTRY_VER;

    pub fn new(id: Id, dn: String, ndn: String) -> Entry {
        Entry {
            id,
            dn,
            ndn,
            attrs: Vec::new(),
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&Attribute> {
        self.attrs
            .iter()
            .find(|a| a.desc.type_name == type_name.to_lowercase() && a.desc.lang.is_none())
    }

    pub fn get_desc(&self, desc: &AttributeDescription) -> Option<&Attribute> {
        self.attrs.iter().find(|a| &a.desc == desc)
    }

    pub fn set(&mut self, desc: AttributeDescription, values: Vec<Value>) {
        match self.attrs.iter_mut().find(|a| a.desc == desc) {
            Some(attr) => attr.values = values,
            None => self.attrs.push(Attribute { desc, values }),
        }
    }

    pub fn remove(&mut self, desc: &AttributeDescription) -> Option<Attribute> {
        let pos = self.attrs.iter().position(|a| &a.desc == desc)?;
        Some(self.attrs.remove(pos))
    }

    /// True when this entry's ndn carries the referral marker prefix and it
    /// carries a `ref` attribute (spec.md §4.7 step 4).
    pub fn is_referral(&self) -> bool {
        self.ndn.starts_with(REFERRAL_PREFIX) && self.get("ref").is_some()
    }

    /// Encode to cbor with a trailing crc32 checksum, so a corrupted
    /// `id2entry` page is caught at decode time instead of handed to the
    /// caller as a malformed entry (spec.md §7 "persistent IO/CORRUPT").
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = crate::kv::cbor_encode(self)?;
        let checksum = CRC32.checksum(&buf);
        buf.extend_from_slice(&checksum.to_be_bytes());
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Entry> {
        if buf.len() < 4 {
            return err_at!(DecodeFail, msg: "entry buffer too short: {}", buf.len());
        }
        let (body, tail) = buf.split_at(buf.len() - 4);
        let want = u32::from_be_bytes(tail.try_into().unwrap());
        let got = CRC32.checksum(body);
        if want != got {
            return err_at!(DecodeFail, msg: "entry checksum mismatch: want {:x} got {:x}", want, got);
        }
        crate::kv::cbor_decode(body)
    }
}

impl Footprint for Entry {
    fn footprint(&self) -> Result<isize> {
        let mut size = size_of::<Entry>() as isize;
        size += self.dn.footprint()?;
        size += self.ndn.footprint()?;
        for attr in &self.attrs {
            size += attr.footprint()?;
        }
        Ok(size)
    }
}

/// `id2entry`: big-endian `ID` key so cursors iterate in numeric order
/// (spec.md §3 item 2, §6 "Entry ID format").
pub const ID2ENTRY_TABLE: &str = "id2entry";

pub fn id2entry_get(txn: &dyn KvTxn, id: Id) -> Result<Option<Entry>> {
    match txn.get(ID2ENTRY_TABLE, &id.to_be_bytes())? {
        Some(buf) => Ok(Some(Entry::decode(&buf)?)),
        None => Ok(None),
    }
}

pub fn id2entry_put(txn: &mut dyn KvTxn, entry: &Entry, no_overwrite: bool) -> Result<()> {
    let buf = entry.encode()?;
    txn.put(ID2ENTRY_TABLE, &entry.id.to_be_bytes(), &buf, no_overwrite)
}

pub fn id2entry_delete(txn: &mut dyn KvTxn, id: Id) -> Result<()> {
    txn.delete(ID2ENTRY_TABLE, &id.to_be_bytes())
}

/// Cursor over every stored entry in ascending id order, for the
/// `ALL`-candidate streaming fallback (spec.md §4.2 "callers must not
/// assume ALL is exact").
pub fn id2entry_scan(txn: &dyn KvTxn) -> Result<Vec<Entry>> {
    let mut cursor = txn.cursor(ID2ENTRY_TABLE)?;
    let mut out = Vec::new();
    let mut item = cursor.next()?;
    while let Some((_, v)) = item {
        out.push(Entry::decode(&v)?);
        item = cursor.next()?;
    }
    Ok(out)
}

#[cfg(test)]
#[path = "entry_test.rs"]
mod entry_test;
