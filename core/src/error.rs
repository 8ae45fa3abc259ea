//! The exhaustive error taxonomy shared between the path resolver, token
//! verifier, transform pipeline and resumable manager.
//!
//! Each variant maps to exactly one HTTP status at the edge (see
//! `ingest_server::error`); this crate only knows about the kind, not the
//! status code, so it stays usable from contexts that are not HTTP at all
//! (the background sweeper, unit tests).

use displaydoc::Display;
use thiserror::Error;

/// The canonical error enum. Aliased as `ServerError` for call sites that
/// think of it as "the error the server returns" rather than "the kind of
/// thing that went wrong" — both names resolve to the same type.
#[derive(Debug, Clone, Error, Display)]
pub enum ErrorKind {
    /// missing or unparseable Authorization header
    MissingToken,

    /// token signature is invalid
    InvalidSignature,

    /// token is expired or not yet valid
    Expired,

    /// token's project does not match the URL's project
    WrongProject,

    /// token's role is not permitted on this route
    WrongRole,

    /// requested group is not in the token's group set
    NotAMember,

    /// path component failed validation: {0}
    InvalidPath(String),

    /// SNS parameter failed validation: {0}
    InvalidSnsParam(String),

    /// filename missing or empty
    MissingFilename,

    /// upload body was empty
    EmptyBody,

    /// transform pipeline failed: {0}
    TransformError(String),

    /// checksum did not match the client-supplied digest
    ChecksumMismatch,

    /// request body exceeded the configured size cap
    PayloadTooLarge,

    /// no resumable upload matches the given id/filename
    ResumableNotFound,

    /// operation denied
    Forbidden,

    /// I/O error: {0}
    IOError(String),
}

pub type ServerError = ErrorKind;

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        ErrorKind::IOError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ErrorKind>;
