//! Error types for the relay.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error for starting and running the relay.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load local records: {0}")]
    Load(#[from] LoadError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Reasons an incoming datagram is not treated as a query.
///
/// Every variant results in the datagram being dropped without a reply.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message is {0} bytes, shorter than a DNS header")]
    TooShort(usize),

    #[error("QR bit is set, message is a response")]
    NotAQuery,

    #[error("QDCOUNT is zero")]
    NoQuestion,

    #[error("label at offset {offset} runs past the end of the message")]
    LabelOverrun { offset: usize },

    #[error("unsupported label type {byte:#04x} at offset {offset}")]
    UnsupportedLabel { offset: usize, byte: u8 },

    #[error("question is missing QTYPE/QCLASS")]
    MissingQuestionFields,
}

/// Failure of a single upstream exchange.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("no reply from upstream within {0:?}")]
    Timeout(Duration),

    #[error("upstream socket error: {0}")]
    Io(#[from] io::Error),
}

/// Failure to read the local records file.
#[derive(Debug, Error)]
#[error("cannot read {}: {source}", .path.display())]
pub struct LoadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
