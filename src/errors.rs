//! Error taxonomies for the wire codec, resolver socket, directory and
//! validator, mirroring the teacher crate's split between a bare
//! `io::Error`-based codec layer (see [`crate::io`]) and `thiserror`-derived
//! enums everywhere a caller needs to match on a specific failure kind.

use crate::types::Rcode;
use std::io;
use thiserror::Error;

/// Construct and return an `io::Error` of a given `ErrorKind`.
///
/// Kept from the teacher crate unchanged: the wire codec's cursor-level
/// primitives (`io.rs`) stay on plain `io::Error`, since they only ever run
/// inside a function that already returns `io::Result`.
#[macro_export]
macro_rules! bail {
    ($kind:ident, $($arg:tt)*) => {
        // Construct the I/O error.
        return Err(
            ::std::io::Error::new(::std::io::ErrorKind::$kind, format!($($arg)*))
        )
    };
}

/// Error parsing a structured field (name, rdata, TSIG record, ...) out of a
/// byte buffer whose length was already validated by the caller.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Construct and return a [`ParseError::Message`].
#[macro_export]
macro_rules! parse_error {
    ($($arg:tt)*) => {
        return Err($crate::errors::ParseError::Message(format!($($arg)*)))
    };
}

/// Errors surfaced by the resolver socket (§4.2 of the design).
///
/// Socket-level faults (`Other`) reject every outstanding task on the
/// affected transport; every other variant is task-scoped.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("no known name servers configured")]
    NoKnownNameServers,

    #[error("a request with id {0} is already in flight on this transport")]
    RequestIDInUse(u16),

    #[error("request of {0} bytes exceeds the 65535 byte DNS message limit")]
    RequestTooLong(usize),

    #[error("no response was received for request id {0} after all retries")]
    RequestUnanswered(u16),

    #[error("response carried a non-NOERROR rcode: {0}")]
    ResponseBad(Rcode),

    #[error("response id {got} did not match any in-flight request (expected {expected})")]
    ResponseIDUnexpected { expected: u16, got: u16 },

    #[error("response opcode did not match the request")]
    ResponseNotExpected,

    #[error(transparent)]
    Other(#[from] io::Error),
}

/// Aggregate error for a fan-out across several transports/servers: the
/// individual failures the caller could not route around.
#[derive(Error, Debug)]
#[error("all {0} requests failed")]
pub struct MultiError(pub usize, #[source] pub Box<ResolverError>);

/// Errors raised directly by the directory contract (§4.5).
///
/// A validation [`crate::validator::Report`] full of violations is never
/// represented as one of these: only structural misuse of the directory
/// itself (a non fully-qualified key handed to `add`, or a transaction that
/// failed for a reason the caller must see) raises a `DirectoryError`.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("path {0:?} is not fully qualified (it ends with '.')")]
    PathNotFullyQualified(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error(transparent)]
    Engine(#[from] heed::Error),

    #[error(transparent)]
    Encoding(#[from] serde_json::Error),
}

/// Errors raised by patch application (§4.5): a violation list is a
/// first-class success value, this is reserved for patches that are
/// malformed at the protocol level.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("patch document name {patch_name:?} does not match document {document_name:?}")]
    MismatchedName {
        patch_name: String,
        document_name: String,
    },

    #[error("patch path segment {0:?} is neither a list index nor a map key")]
    InvalidSegment(String),
}

/// Errors raised by the composed patch flow (§4.5 "PATCH flow"): a wrapper
/// over the two failure kinds its two composed steps (directory access,
/// single-patch application) can raise. A non-empty [`crate::validator::Report`]
/// is never one of these — it is the flow's ordinary, successful-rejection
/// outcome.
#[derive(Error, Debug)]
pub enum PatchFlowError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}
