//! BACnet/IP data link layer.
//!
//! This is the bottom of the frame stack: BVLC framing over UDP. Other
//! BACnet data links (Ethernet, MS/TP, point-to-point, ARCnet) are out of
//! scope — this client only ever talks BACnet/IP (Annex J), so there is no
//! trait abstracting over multiple link types, just the one implementation
//! in [`bip`].

use std::fmt;

pub type Result<T> = std::result::Result<T, DataLinkError>;

/// Errors from the BACnet/IP data link.
#[derive(Debug, thiserror::Error)]
pub enum DataLinkError {
    /// Underlying socket I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A received UDP datagram did not start with a valid BVLC header.
    #[error("invalid BVLC frame: {0}")]
    InvalidFrame(String),

    /// Could not resolve the requested bind interface/CIDR/address to a
    /// local IPv4 address.
    #[error("address resolution failed: {0}")]
    AddressError(String),
}

impl DataLinkError {
    pub fn invalid_frame(msg: impl fmt::Display) -> Self {
        DataLinkError::InvalidFrame(msg.to_string())
    }

    pub fn address_error(msg: impl fmt::Display) -> Self {
        DataLinkError::AddressError(msg.to_string())
    }
}

pub mod bip;

pub use bip::{BacnetIpSocket, BvlcFunction, BvlcHeader};
