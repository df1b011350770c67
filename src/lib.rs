//! Implementation of the [secret-handshake](https://github.com/auditdrivencrypto/secret-handshake)
//! protocol version 1 (SHS1): a 4-message mutual-authentication handshake
//! between two parties who each know the other's longterm public key ahead
//! of time, producing a symmetric key/nonce pair for an outer box-stream
//! transport.
//!
//! This crate implements only the cryptographic state machine, not the
//! transport: [`ClientSession`] and [`ServerSession`] consume and produce
//! plain byte buffers, and the caller is responsible for getting those
//! buffers across the wire.
//!
//! This library uses libsodium internally through `sodiumoxide`. Call
//! [`sodiumoxide::init()`] once, before performing any handshakes.

#![deny(missing_docs)]

pub mod crypto;
mod client;
mod errors;
mod ffi;
mod server;

pub use crate::client::ClientSession;
pub use crate::crypto::{NETWORK_IDENTIFIER_BYTES, MSG1_BYTES, MSG2_BYTES, MSG3_BYTES, MSG4_BYTES, Outcome};
pub use crate::errors::HandshakeError;
pub use crate::server::ServerSession;
