//! Primitive wrappers and the shared `Outcome` type.
//!
//! Nothing in this module performs I/O; it shells out to libsodium (via
//! `sodiumoxide`) for the actual cryptography and turns its conventions
//! (zero group elements, MAC mismatches, invalid point encodings, ...) into
//! [`HandshakeError`]s. You probably don't need to use this module
//! directly — [`crate::ClientSession`] and [`crate::ServerSession`] are the
//! public surface.

use sodiumoxide::crypto::auth;
use sodiumoxide::crypto::hash::sha256;
use sodiumoxide::crypto::scalarmult;
use sodiumoxide::crypto::secretbox;
use sodiumoxide::crypto::sign;
use sodiumoxide::utils::memzero;

use crate::errors::HandshakeError;
use crate::ffi;

/// Length of the shared application key, in bytes.
pub const NETWORK_IDENTIFIER_BYTES: usize = auth::KEYBYTES;

/// Length of the client challenge (msg1), in bytes.
pub const MSG1_BYTES: usize = auth::TAGBYTES + scalarmult::GROUPELEMENTBYTES;
/// Length of the server challenge (msg2), in bytes.
pub const MSG2_BYTES: usize = MSG1_BYTES;
/// Length of the client authentication envelope (msg3), in bytes.
pub const MSG3_BYTES: usize = HELLO_BYTES + secretbox::MACBYTES;
/// Length of the server accept envelope (msg4), in bytes.
pub const MSG4_BYTES: usize = sign::SIGNATUREBYTES + secretbox::MACBYTES;

/// Length of the client's "hello": a signature over the long-term/ephemeral
/// binding, concatenated with the client's longterm public key.
pub(crate) const HELLO_BYTES: usize = sign::SIGNATUREBYTES + sign::PUBLICKEYBYTES;

const ZERO_NONCE: secretbox::Nonce = secretbox::Nonce([0; secretbox::NONCEBYTES]);

/// The data resulting from a completed handshake: keys and nonces for the
/// outer box-stream transport, and the verified longterm public key of the
/// peer.
#[derive(Debug)]
pub struct Outcome {
    encryption_key: [u8; secretbox::KEYBYTES],
    encryption_nonce: [u8; secretbox::NONCEBYTES],
    decryption_key: [u8; secretbox::KEYBYTES],
    decryption_nonce: [u8; secretbox::NONCEBYTES],
    peer_longterm_pk: [u8; sign::PUBLICKEYBYTES],
}

impl Outcome {
    pub(crate) fn new(encryption_key: [u8; secretbox::KEYBYTES],
                       encryption_nonce: [u8; secretbox::NONCEBYTES],
                       decryption_key: [u8; secretbox::KEYBYTES],
                       decryption_nonce: [u8; secretbox::NONCEBYTES],
                       peer_longterm_pk: [u8; sign::PUBLICKEYBYTES])
                       -> Outcome {
        Outcome {
            encryption_key,
            encryption_nonce,
            decryption_key,
            decryption_nonce,
            peer_longterm_pk,
        }
    }

    /// The key to use for encrypting messages to the peer.
    pub fn encryption_key(&self) -> secretbox::Key {
        secretbox::Key(self.encryption_key)
    }

    /// The initial nonce to use for encrypting messages to the peer.
    pub fn encryption_nonce(&self) -> secretbox::Nonce {
        secretbox::Nonce(self.encryption_nonce)
    }

    /// The key to use for decrypting messages from the peer.
    pub fn decryption_key(&self) -> secretbox::Key {
        secretbox::Key(self.decryption_key)
    }

    /// The initial nonce to use for decrypting messages from the peer.
    pub fn decryption_nonce(&self) -> secretbox::Nonce {
        secretbox::Nonce(self.decryption_nonce)
    }

    /// The longterm public key of the peer, as verified by the handshake.
    pub fn peer_longterm_pk(&self) -> sign::PublicKey {
        sign::PublicKey(self.peer_longterm_pk)
    }
}

/// Zero out all sensitive data when going out of scope.
impl Drop for Outcome {
    fn drop(&mut self) {
        memzero(&mut self.encryption_key);
        memzero(&mut self.encryption_nonce);
        memzero(&mut self.decryption_key);
        memzero(&mut self.decryption_nonce);
    }
}

/// `hmac_K(msg)`: HMAC-SHA-512-256 over `msg` under `key`.
pub(crate) fn hmac(key: &[u8; auth::KEYBYTES], msg: &[u8]) -> [u8; auth::TAGBYTES] {
    let auth::Tag(tag) = auth::authenticate(msg, &auth::Key(*key));
    tag
}

/// Constant-time verification of an HMAC tag.
pub(crate) fn hmac_verify(tag: &[u8; auth::TAGBYTES], msg: &[u8], key: &[u8; auth::KEYBYTES]) -> bool {
    auth::verify(&auth::Tag(*tag), msg, &auth::Key(*key))
}

/// `sha256(msg)`.
pub(crate) fn sha256(msg: &[u8]) -> [u8; sha256::DIGESTBYTES] {
    let sha256::Digest(digest) = sha256::hash(msg);
    digest
}

/// X25519 scalar multiplication. Rejects the all-zero output, which would
/// otherwise silently defeat the handshake's contributory-behaviour
/// guarantees against small-subgroup points.
pub(crate) fn scalarmult(scalar: &[u8; scalarmult::SCALARBYTES],
                         point: &[u8; scalarmult::GROUPELEMENTBYTES])
                         -> Result<[u8; scalarmult::GROUPELEMENTBYTES], HandshakeError> {
    let scalarmult::GroupElement(out) =
        scalarmult::scalarmult(&scalarmult::Scalar(*scalar), &scalarmult::GroupElement(*point))
            .map_err(|()| HandshakeError::InvalidKey)?;
    if out.iter().all(|&b| b == 0) {
        return Err(HandshakeError::InvalidKey);
    }
    Ok(out)
}

/// Ed25519 detached signature.
pub(crate) fn sign_detached(msg: &[u8], sk: &[u8; sign::SECRETKEYBYTES]) -> [u8; sign::SIGNATUREBYTES] {
    let sign::Signature(sig) = sign::sign_detached(msg, &sign::SecretKey(*sk));
    sig
}

/// Ed25519 detached signature verification.
pub(crate) fn verify_detached(sig: &[u8; sign::SIGNATUREBYTES],
                              msg: &[u8],
                              pk: &[u8; sign::PUBLICKEYBYTES])
                              -> bool {
    sign::verify_detached(&sign::Signature(*sig), msg, &sign::PublicKey(*pk))
}

/// Seals `plaintext` under `key` with the handshake's fixed all-zero nonce.
/// Safe only because every box key here is freshly derived from ephemeral
/// DH output and used exactly once.
pub(crate) fn seal(plaintext: &[u8], key: &[u8; secretbox::KEYBYTES]) -> Vec<u8> {
    secretbox::seal(plaintext, &ZERO_NONCE, &secretbox::Key(*key))
}

/// Opens a ciphertext sealed by [`seal`].
pub(crate) fn open(ciphertext: &[u8], key: &[u8; secretbox::KEYBYTES]) -> Result<Vec<u8>, HandshakeError> {
    secretbox::open(ciphertext, &ZERO_NONCE, &secretbox::Key(*key)).map_err(|()| HandshakeError::InvalidMessage)
}

/// Converts an Ed25519 public key to its Curve25519 equivalent.
pub(crate) fn ed25519_pk_to_curve25519(pk: &[u8; sign::PUBLICKEYBYTES])
                                       -> Result<[u8; sodiumoxide::crypto::box_::PUBLICKEYBYTES], HandshakeError> {
    ffi::ed25519_pk_to_curve25519(pk)
}

/// Converts an Ed25519 secret key to its Curve25519 equivalent. This
/// conversion cannot fail: it is a deterministic hash of the signing seed.
pub(crate) fn ed25519_sk_to_curve25519(sk: &[u8; sign::SECRETKEYBYTES])
                                       -> [u8; sodiumoxide::crypto::box_::SECRETKEYBYTES] {
    ffi::ed25519_sk_to_curve25519(sk)
}
