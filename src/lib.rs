//! `ldbe`: an embeddable storage engine for an LDAP directory server.
//!
//! This crate implements the hard engineering core behind a directory
//! server's search/modify path: mapping hierarchical distinguished names
//! onto an ordered key/value store ([kv]), maintaining secondary attribute
//! indexes ([attr_index], [schema]), resolving search scopes into
//! candidate id sets ([idl], [filter]), and streaming matching entries
//! back under concurrency/time/size/cancellation constraints ([search]).
//! The write path — add, delete, modify, modrdn, compare — lives in
//! [modify].
//!
//! The wire protocol codec, schema *loader*, access-control evaluation,
//! and connection pool are external collaborators; this crate only
//! specifies the interfaces it expects from them: a [kv::KvStore] to
//! store into, a [schema::Schema] describing attribute types and matching
//! rules, and an [search::OpContext] carrying the abandon flag and
//! deadline for one in-flight operation.

pub mod attr_index;
pub mod cache;
pub mod config;
pub mod dn;
pub mod entry;
mod error;
pub mod filter;
pub mod idl;
pub mod kv;
pub mod modify;
pub mod result_code;
pub mod schema;
pub mod search;
#[cfg(test)]
mod testutil;

pub use entry::Id;
pub use error::{Error, Result};
pub use result_code::{Outcome, ResultCode};
