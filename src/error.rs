//! Crate-wide error type, following the same `err_at!`-tagged-variant
//! convention used across the storage engine: every error carries the
//! `file!():line!()` of the call site plus a short message, never a bare
//! string.

use std::{fmt, result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    IOError(String),
    DecodeFail(String),
    EncodeFail(String),
    FailConvert(String),
    Invalid(String),
    KeyExist(String),
    KeyNotFound(String),
    DuplicateKey(String),
    NoSuchObject(String),
    NotAllowedOnNonleaf(String),
    InappropriateMatching(String),
    UndefinedType(String),
    AssertionFailed(String),
    InsufficientAccess(String),
    ProtocolError(String),
    Fatal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IOError(s) => write!(f, "IOError: {}", s),
            Error::DecodeFail(s) => write!(f, "DecodeFail: {}", s),
            Error::EncodeFail(s) => write!(f, "EncodeFail: {}", s),
            Error::FailConvert(s) => write!(f, "FailConvert: {}", s),
            Error::Invalid(s) => write!(f, "Invalid: {}", s),
            Error::KeyExist(s) => write!(f, "KeyExist: {}", s),
            Error::KeyNotFound(s) => write!(f, "KeyNotFound: {}", s),
            Error::DuplicateKey(s) => write!(f, "DuplicateKey: {}", s),
            Error::NoSuchObject(s) => write!(f, "NoSuchObject: {}", s),
            Error::NotAllowedOnNonleaf(s) => write!(f, "NotAllowedOnNonleaf: {}", s),
            Error::InappropriateMatching(s) => write!(f, "InappropriateMatching: {}", s),
            Error::UndefinedType(s) => write!(f, "UndefinedType: {}", s),
            Error::AssertionFailed(s) => write!(f, "AssertionFailed: {}", s),
            Error::InsufficientAccess(s) => write!(f, "InsufficientAccess: {}", s),
            Error::ProtocolError(s) => write!(f, "ProtocolError: {}", s),
            Error::Fatal(s) => write!(f, "Fatal: {}", s),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Tag a fallible expression, or format a message, with an [Error] variant
/// and the call-site location. Mirrors the `err_at!` idiom used throughout
/// this crate's lower layers (kv, idl, dn, attr_index).
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(format!("{} {}", prefix, format!($($arg),+))))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(format!("{} {}", prefix, err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(format!(
                    "{} {} {}",
                    prefix,
                    format!($($arg),+),
                    err
                )))
            }
        }
    }};
}
