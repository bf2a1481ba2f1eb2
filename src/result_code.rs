//! LDAP result codes, kept as a numeric newtype distinct from [crate::Error]
//! so internal plumbing never leaks raw LDAP numerics past the operation
//! driver boundary (search, modify, add, delete, modrdn, compare).

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);
    pub const TIMELIMIT_EXCEEDED: ResultCode = ResultCode(3);
    pub const SIZELIMIT_EXCEEDED: ResultCode = ResultCode(4);
    pub const REFERRAL: ResultCode = ResultCode(10);
    pub const NO_SUCH_ATTRIBUTE: ResultCode = ResultCode(16);
    pub const UNDEFINED_TYPE: ResultCode = ResultCode(17);
    pub const INAPPROPRIATE_MATCHING: ResultCode = ResultCode(18);
    pub const PROTOCOL_ERROR: ResultCode = ResultCode(2);
    pub const NO_SUCH_OBJECT: ResultCode = ResultCode(32);
    pub const INSUFFICIENT_ACCESS: ResultCode = ResultCode(50);
    pub const ASSERTION_FAILED: ResultCode = ResultCode(122);
    pub const NOT_ALLOWED_ON_NONLEAF: ResultCode = ResultCode(66);
    pub const ALREADY_EXISTS: ResultCode = ResultCode(68);
    pub const OTHER: ResultCode = ResultCode(80);
}

/// Terminal outcome of an operation, pairing a [ResultCode] with the
/// optional `matchedDN` / referral list / diagnostic text the client sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub code: ResultCode,
    pub matched_dn: Option<String>,
    pub diagnostic: Option<String>,
    pub referrals: Vec<String>,
}

impl Outcome {
    pub fn success() -> Outcome {
        Outcome {
            code: ResultCode::SUCCESS,
            matched_dn: None,
            diagnostic: None,
            referrals: Vec::new(),
        }
    }

    pub fn referral(referrals: Vec<String>) -> Outcome {
        Outcome {
            code: ResultCode::REFERRAL,
            matched_dn: None,
            diagnostic: None,
            referrals,
        }
    }

    pub fn no_such_object(matched_dn: Option<String>) -> Outcome {
        Outcome {
            code: ResultCode::NO_SUCH_OBJECT,
            matched_dn,
            diagnostic: None,
            referrals: Vec::new(),
        }
    }

    pub fn from_code(code: ResultCode) -> Outcome {
        Outcome {
            code,
            matched_dn: None,
            diagnostic: None,
            referrals: Vec::new(),
        }
    }
}

impl From<&Error> for ResultCode {
    /// Storage-layer errors become `OTHER` with diagnostic text attached by
    /// the caller; a handful of errors correspond directly to a specific
    /// LDAP numeric per spec.md's error-kind taxonomy.
    fn from(err: &Error) -> ResultCode {
        match err {
            Error::NoSuchObject(_) => ResultCode::NO_SUCH_OBJECT,
            Error::NotAllowedOnNonleaf(_) => ResultCode::NOT_ALLOWED_ON_NONLEAF,
            Error::KeyExist(_) => ResultCode::ALREADY_EXISTS,
            Error::DuplicateKey(_) => ResultCode::ALREADY_EXISTS,
            Error::InappropriateMatching(_) => ResultCode::INAPPROPRIATE_MATCHING,
            Error::UndefinedType(_) => ResultCode::UNDEFINED_TYPE,
            Error::AssertionFailed(_) => ResultCode::ASSERTION_FAILED,
            Error::InsufficientAccess(_) => ResultCode::INSUFFICIENT_ACCESS,
            Error::ProtocolError(_) => ResultCode::PROTOCOL_ERROR,
            Error::IOError(_)
            | Error::DecodeFail(_)
            | Error::EncodeFail(_)
            | Error::FailConvert(_)
            | Error::Invalid(_)
            | Error::KeyNotFound(_)
            | Error::Fatal(_) => ResultCode::OTHER,
        }
    }
}
