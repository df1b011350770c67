//! Raw bindings to libsodium functions for converting Ed25519 signing keys
//! into their Curve25519 Diffie-Hellman equivalents.
//!
//! `sodiumoxide` doesn't expose these (some bindings are missing from its
//! surface), so we declare them ourselves. No extra linking is required:
//! `sodiumoxide` already links libsodium, and these symbols come along for
//! free.

use libc::c_int;

use sodiumoxide::crypto::box_;
use sodiumoxide::crypto::sign;

use crate::errors::HandshakeError;

extern "C" {
    fn crypto_sign_ed25519_pk_to_curve25519(curve25519_pk: *mut [u8; box_::PUBLICKEYBYTES],
                                            ed25519_pk: *const [u8; sign::PUBLICKEYBYTES])
                                            -> c_int;

    fn crypto_sign_ed25519_sk_to_curve25519(curve25519_sk: *mut [u8; box_::SECRETKEYBYTES],
                                            ed25519_sk: *const [u8; sign::SECRETKEYBYTES])
                                            -> c_int;
}

/// Converts an Ed25519 public key to its Curve25519 equivalent. Fails if
/// the input does not decode to a point on the curve.
pub(crate) fn ed25519_pk_to_curve25519(ed25519_pk: &[u8; sign::PUBLICKEYBYTES])
                                       -> Result<[u8; box_::PUBLICKEYBYTES], HandshakeError> {
    let mut curve = [0u8; box_::PUBLICKEYBYTES];
    let ret = unsafe { crypto_sign_ed25519_pk_to_curve25519(&mut curve, ed25519_pk) };
    if ret == 0 {
        Ok(curve)
    } else {
        Err(HandshakeError::InvalidKey)
    }
}

/// Converts an Ed25519 secret key to its Curve25519 equivalent. This is a
/// deterministic hash of the signing seed and cannot fail.
pub(crate) fn ed25519_sk_to_curve25519(ed25519_sk: &[u8; sign::SECRETKEYBYTES])
                                       -> [u8; box_::SECRETKEYBYTES] {
    let mut curve = [0u8; box_::SECRETKEYBYTES];
    unsafe {
        crypto_sign_ed25519_sk_to_curve25519(&mut curve, ed25519_sk);
    }
    curve
}
