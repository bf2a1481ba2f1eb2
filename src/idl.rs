//! ID list (IDL) algebra: a compact set of 32-bit entry IDs with
//! union/intersect/difference and a dense "range" representation, plus the
//! "ALL" sentinel meaning "entire address space". Generalizes
//! [`bitmaps::croaring::CRoaring`][croaring-bloom]'s use of `croaring::Bitmap`
//! from a Bloom-filter digest set into the engine's native candidate-set
//! representation.
//!
//! [croaring-bloom]: https://docs.rs/croaring

use croaring::Bitmap;

use std::{
    cmp,
    convert::{TryFrom, TryInto},
};

use crate::{err_at, Error, Result};

/// Sentinel for "no entry", also used as the terminator value returned by
/// `first`/`next` iteration once a list is exhausted.
pub const NOID: u32 = 0xFFFF_FFFF;

/// Above this cardinality an exact list is promoted to a dense range,
/// trading exactness for a constant-size representation. Callers that
/// obtain a `Range` (or `All`) must re-test every candidate against the
/// original predicate before treating it as a match.
pub const RANGE_PROMOTE_THRESHOLD: usize = 1 << 16;

const RANGE_MARKER: u32 = 0x8000_0000;

/// A set of entry IDs, represented either exactly, as a dense inclusive
/// range (lossy above [RANGE_PROMOTE_THRESHOLD]), or as the distinguished
/// "entire address space" sentinel. This is a sum type rather than a magic
/// flag value so every algebra operation is total and checked (see
/// DESIGN.md's "ALL IDL sentinel" note).
#[derive(Debug)]
pub enum Idl {
    Exact(Bitmap),
    Range(u32, u32),
    All,
}

impl Clone for Idl {
    fn clone(&self) -> Self {
        match self {
            Idl::Exact(bm) => Idl::Exact(Bitmap::of(&to_vec(bm))),
            Idl::Range(a, b) => Idl::Range(*a, *b),
            Idl::All => Idl::All,
        }
    }
}

fn to_vec(bm: &Bitmap) -> Vec<u32> {
    bm.iter().collect()
}

impl Idl {
    pub fn empty() -> Idl {
        Idl::Exact(Bitmap::create())
    }

    pub fn from_one(id: u32) -> Idl {
        let mut bm = Bitmap::create();
        bm.add(id);
        Idl::Exact(bm)
    }

    pub fn from_sorted(ids: &[u32]) -> Idl {
        if ids.len() > RANGE_PROMOTE_THRESHOLD {
            Idl::Range(ids[0], ids[ids.len() - 1])
        } else {
            Idl::Exact(Bitmap::of(ids))
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Idl::All)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Idl::Exact(bm) => bm.cardinality() == 0,
            Idl::Range(a, b) => a > b,
            Idl::All => false,
        }
    }

    /// Approximate length: exact cardinality for [Idl::Exact], the span
    /// width for [Idl::Range] (an over-estimate, by construction), and
    /// `usize::MAX` for [Idl::All].
    pub fn len(&self) -> usize {
        match self {
            Idl::Exact(bm) => bm.cardinality() as usize,
            Idl::Range(a, b) if a <= b => (*b - *a) as usize + 1,
            Idl::Range(_, _) => 0,
            Idl::All => usize::MAX,
        }
    }

    pub fn insert(&mut self, id: u32) {
        match self {
            Idl::Exact(bm) => {
                bm.add(id);
                if bm.cardinality() as usize > RANGE_PROMOTE_THRESHOLD {
                    let (first, last) = (bm.minimum().unwrap_or(id), bm.maximum().unwrap_or(id));
                    *self = Idl::Range(first, last);
                }
            }
            Idl::Range(first, last) => {
                *first = cmp::min(*first, id);
                *last = cmp::max(*last, id);
            }
            Idl::All => (),
        }
    }

    /// Remove `id`. A no-op on [Idl::Range]/[Idl::All]: exactness was
    /// already given up at promotion time, so there is nothing precise to
    /// remove; the caller's downstream re-test still filters it out if it
    /// was never a true member.
    pub fn delete(&mut self, id: u32) {
        if let Idl::Exact(bm) = self {
            bm.remove(id);
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        match self {
            Idl::Exact(bm) => bm.contains(id),
            Idl::Range(a, b) => id >= *a && id <= *b,
            Idl::All => true,
        }
    }

    pub fn union(&self, other: &Idl) -> Idl {
        match (self, other) {
            (Idl::All, _) | (_, Idl::All) => Idl::All,
            (Idl::Exact(a), Idl::Exact(b)) => {
                let bm = a.or(b);
                if bm.cardinality() as usize > RANGE_PROMOTE_THRESHOLD {
                    let (first, last) = (bm.minimum().unwrap_or(0), bm.maximum().unwrap_or(0));
                    Idl::Range(first, last)
                } else {
                    Idl::Exact(bm)
                }
            }
            (Idl::Range(a0, a1), Idl::Range(b0, b1)) => {
                Idl::Range(cmp::min(*a0, *b0), cmp::max(*a1, *b1))
            }
            (Idl::Range(r0, r1), Idl::Exact(bm)) | (Idl::Exact(bm), Idl::Range(r0, r1)) => {
                let first = cmp::min(*r0, bm.minimum().unwrap_or(*r0));
                let last = cmp::max(*r1, bm.maximum().unwrap_or(*r1));
                Idl::Range(first, last)
            }
        }
    }

    pub fn intersect(&self, other: &Idl) -> Idl {
        match (self, other) {
            (Idl::All, x) | (x, Idl::All) => x.clone(),
            (Idl::Exact(a), Idl::Exact(b)) => Idl::Exact(a.and(b)),
            (Idl::Range(a0, a1), Idl::Range(b0, b1)) => {
                let (first, last) = (cmp::max(*a0, *b0), cmp::min(*a1, *b1));
                if first > last {
                    Idl::empty()
                } else {
                    Idl::Range(first, last)
                }
            }
            (Idl::Range(r0, r1), Idl::Exact(bm)) | (Idl::Exact(bm), Idl::Range(r0, r1)) => {
                let ids: Vec<u32> = to_vec(bm)
                    .into_iter()
                    .filter(|id| id >= r0 && id <= r1)
                    .collect();
                Idl::Exact(Bitmap::of(&ids))
            }
        }
    }

    /// Set difference. Sound (never removes a true member of the
    /// difference) only when both operands are [Idl::Exact]; once either
    /// side has lost exactness the safe fallback is to return `self`
    /// unchanged, since we cannot tell which uncertain members of `other`
    /// were never truly present.
    pub fn difference(&self, other: &Idl) -> Idl {
        match (self, other) {
            (Idl::Exact(a), Idl::Exact(b)) => Idl::Exact(a.andnot(b)),
            (Idl::All, Idl::Exact(_)) => Idl::All,
            (this, _) => this.clone(),
        }
    }

    /// Iterate candidate ids in ascending order. For [Idl::All] the caller
    /// is expected to fall back to a full `id2entry` cursor instead of
    /// calling this (see search driver step 4).
    pub fn iter(&self) -> IdlIter {
        match self {
            Idl::Exact(bm) => IdlIter::Exact(to_vec(bm), 0),
            Idl::Range(a, b) if a <= b => IdlIter::Range(Some(*a), *b),
            Idl::Range(_, _) => IdlIter::Range(None, 0),
            Idl::All => IdlIter::Exact(Vec::new(), 0),
        }
    }

    pub fn first(&self) -> u32 {
        self.iter().next().unwrap_or(NOID)
    }

    /// On-disk encode, per spec §6: length-prefixed sorted vector, or a
    /// range marker `(RANGE_MARKER, first, last)`. `Idl::All` is never
    /// written; encoding it is a programming error.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Idl::Exact(bm) => {
                let ids = to_vec(bm);
                let count = err_at!(FailConvert, u32::try_from(ids.len()))?;
                buf.extend_from_slice(&count.to_be_bytes());
                for id in ids {
                    buf.extend_from_slice(&id.to_be_bytes());
                }
                Ok(())
            }
            Idl::Range(first, last) => {
                buf.extend_from_slice(&RANGE_MARKER.to_be_bytes());
                buf.extend_from_slice(&first.to_be_bytes());
                buf.extend_from_slice(&last.to_be_bytes());
                Ok(())
            }
            Idl::All => err_at!(Invalid, msg: "ALL sentinel must never be persisted"),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Idl> {
        if buf.len() < 4 {
            return err_at!(DecodeFail, msg: "idl buffer too short: {}", buf.len());
        }
        let count = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        if count & RANGE_MARKER != 0 {
            if buf.len() < 12 {
                return err_at!(DecodeFail, msg: "idl range buffer too short: {}", buf.len());
            }
            let first = u32::from_be_bytes(buf[4..8].try_into().unwrap());
            let last = u32::from_be_bytes(buf[8..12].try_into().unwrap());
            return Ok(Idl::Range(first, last));
        }
        let want = 4 + (count as usize) * 4;
        if buf.len() < want {
            return err_at!(DecodeFail, msg: "idl buffer short: {}/{}", buf.len(), want);
        }
        let mut ids = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let off = 4 + i * 4;
            ids.push(u32::from_be_bytes(buf[off..off + 4].try_into().unwrap()));
        }
        Ok(Idl::Exact(Bitmap::of(&ids)))
    }
}

pub enum IdlIter {
    Exact(Vec<u32>, usize),
    Range(Option<u32>, u32),
}

impl Iterator for IdlIter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            IdlIter::Exact(ids, pos) => {
                let item = ids.get(*pos).copied();
                *pos += 1;
                item
            }
            IdlIter::Range(cur, last) => match *cur {
                None => None,
                Some(v) if v == *last => {
                    *cur = None;
                    Some(v)
                }
                Some(v) => {
                    *cur = Some(v + 1);
                    Some(v)
                }
            },
        }
    }
}

#[cfg(test)]
#[path = "idl_test.rs"]
mod idl_test;
