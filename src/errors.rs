//! The errors that can be emitted when performing a handshake.

use thiserror::Error;

/// Errors that can occur during a handshake.
///
/// Every variant is terminal: once a session returns one of these, it has
/// moved to its `Failed` state and every subsequent call returns
/// [`HandshakeError::Misuse`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    /// An inbound message failed authentication: an HMAC mismatch on a
    /// challenge, a Poly1305 MAC failure on an opened envelope, or an
    /// Ed25519 signature that did not verify.
    #[error("peer message failed authentication")]
    InvalidMessage,

    /// An Ed25519-to-Curve25519 key conversion rejected its input, or a
    /// scalar multiplication produced the all-zero output.
    #[error("a key conversion or scalar multiplication produced an invalid result")]
    InvalidKey,

    /// A handshake step was invoked out of its protocol position.
    #[error("handshake operation invoked out of order")]
    Misuse,
}
