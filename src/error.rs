//! Crate-wide client error type.
//!
//! Every lower layer (`encoding`, `network`, `datalink`) keeps its own
//! `thiserror` error type so unit tests for that layer can match on it
//! directly. `ClientError` is the single type the public client API
//! surfaces, folding those per-layer errors into the taxonomy a caller
//! actually needs to act on.

use crate::datalink::DataLinkError;
use crate::encoding::EncodingError;
use crate::network::NetworkError;

/// Result type returned by the public client API.
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A caller supplied an argument the client can reject without touching
    /// the network (e.g. an out-of-range instance number).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A received frame could not be parsed at all.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A received frame parsed, but a field carried a type other than the
    /// one the caller was decoding for.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Underlying socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response arrived before the caller-supplied timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// The caller's `CancellationToken` fired before a response arrived.
    #[error("request cancelled")]
    Cancelled,

    /// The remote device returned a BACnet Error-PDU.
    #[error("device returned error (class {class}, code {code})")]
    ApduError { class: u32, code: u32 },

    /// A response referenced an invoke-id this client has no record of
    /// (already timed out, already completed, or never sent).
    #[error("no such transaction: invoke-id {0}")]
    NoSuchTransaction(u8),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    DataLink(#[from] DataLinkError),

    #[error(transparent)]
    Network(#[from] NetworkError),
}
