//! The server side of a handshake.

use sodiumoxide::crypto::hash::sha256;
use sodiumoxide::crypto::scalarmult;
use sodiumoxide::crypto::secretbox;
use sodiumoxide::crypto::sign;
use sodiumoxide::crypto::box_;
use sodiumoxide::utils::memzero;
use tracing::{debug, warn};

use crate::crypto::{self, HELLO_BYTES, MSG1_BYTES, MSG2_BYTES, MSG3_BYTES, MSG4_BYTES,
                    NETWORK_IDENTIFIER_BYTES, Outcome};
use crate::errors::HandshakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    GotChallenge,
    SentChallenge,
    GotAuth,
    Done,
    Failed,
}

/// Drives the server side of a handshake to completion.
///
/// Mirrors [`crate::ClientSession`]: borrowed key material, an internal
/// state counter that rejects out-of-order calls with
/// [`HandshakeError::Misuse`], and buffers that are zeroed on drop.
pub struct ServerSession<'a> {
    network_identifier: &'a [u8; NETWORK_IDENTIFIER_BYTES],
    server_longterm_pk: &'a [u8; sign::PUBLICKEYBYTES],
    server_longterm_sk: &'a [u8; sign::SECRETKEYBYTES],
    server_ephemeral_pk: &'a [u8; box_::PUBLICKEYBYTES],
    server_ephemeral_sk: &'a [u8; box_::SECRETKEYBYTES],

    state: State,
    client_ephemeral_pk: [u8; box_::PUBLICKEYBYTES],
    shared_secret_ab: [u8; scalarmult::GROUPELEMENTBYTES],
    shared_secret_ab_server: [u8; scalarmult::GROUPELEMENTBYTES],
    shared_hash: [u8; sha256::DIGESTBYTES],
    client_hello: [u8; HELLO_BYTES],
    client_longterm_pk: [u8; sign::PUBLICKEYBYTES],
    box_key_2: [u8; secretbox::KEYBYTES],
}

impl<'a> ServerSession<'a> {
    /// Creates a new server session.
    pub fn new(network_identifier: &'a [u8; NETWORK_IDENTIFIER_BYTES],
               server_longterm_pk: &'a [u8; sign::PUBLICKEYBYTES],
               server_longterm_sk: &'a [u8; sign::SECRETKEYBYTES],
               server_ephemeral_pk: &'a [u8; box_::PUBLICKEYBYTES],
               server_ephemeral_sk: &'a [u8; box_::SECRETKEYBYTES])
               -> ServerSession<'a> {
        ServerSession {
            network_identifier,
            server_longterm_pk,
            server_longterm_sk,
            server_ephemeral_pk,
            server_ephemeral_sk,
            state: State::Init,
            client_ephemeral_pk: [0; box_::PUBLICKEYBYTES],
            shared_secret_ab: [0; scalarmult::GROUPELEMENTBYTES],
            shared_secret_ab_server: [0; scalarmult::GROUPELEMENTBYTES],
            shared_hash: [0; sha256::DIGESTBYTES],
            client_hello: [0; HELLO_BYTES],
            client_longterm_pk: [0; sign::PUBLICKEYBYTES],
            box_key_2: [0; secretbox::KEYBYTES],
        }
    }

    fn check_state(&self, expected: State) -> Result<(), HandshakeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HandshakeError::Misuse)
        }
    }

    fn fail(&mut self, err: HandshakeError) -> HandshakeError {
        warn!(error = ?err, "server handshake failed");
        self.state = State::Failed;
        err
    }

    /// Verifies the client's challenge (msg1) by checking its HMAC and
    /// storing the advertised ephemeral key.
    pub fn verify_client_challenge(&mut self, msg: &[u8; MSG1_BYTES]) -> Result<(), HandshakeError> {
        self.check_state(State::Init)?;
        debug!("verifying client challenge");

        let tag: [u8; 32] = msg[..32].try_into().expect("slice has len 32");
        let client_eph_pk: [u8; box_::PUBLICKEYBYTES] = msg[32..].try_into().expect("slice has len 32");

        if !crypto::hmac_verify(&tag, &client_eph_pk, self.network_identifier) {
            return Err(self.fail(HandshakeError::InvalidMessage));
        }
        self.client_ephemeral_pk = client_eph_pk;

        self.state = State::GotChallenge;
        Ok(())
    }

    /// Produces the server challenge (msg2): `hmac(app, eph_pk) || eph_pk`.
    pub fn create_server_challenge(&mut self, out: &mut [u8; MSG2_BYTES]) -> Result<(), HandshakeError> {
        self.check_state(State::GotChallenge)?;
        debug!("creating server challenge");

        let tag = crypto::hmac(self.network_identifier, self.server_ephemeral_pk);
        out[..32].copy_from_slice(&tag);
        out[32..].copy_from_slice(self.server_ephemeral_pk);

        self.state = State::SentChallenge;
        Ok(())
    }

    /// Verifies the client's authentication envelope (msg3) and records the
    /// client's longterm public key. Returns [`HandshakeError::InvalidKey`]
    /// if the client's ephemeral key or its embedded longterm public key is
    /// a small-subgroup point or fails curve conversion, and
    /// [`HandshakeError::InvalidMessage`] on a MAC or signature mismatch.
    pub fn verify_client_auth(&mut self, msg: &[u8; MSG3_BYTES]) -> Result<(), HandshakeError> {
        self.check_state(State::SentChallenge)?;
        debug!("verifying client authentication");

        self.shared_secret_ab = match crypto::scalarmult(self.server_ephemeral_sk, &self.client_ephemeral_pk) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(e)),
        };

        let server_sk_curve = crypto::ed25519_sk_to_curve25519(self.server_longterm_sk);
        self.shared_secret_ab_server = match crypto::scalarmult(&server_sk_curve, &self.client_ephemeral_pk) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(e)),
        };

        self.shared_hash = crypto::sha256(&self.shared_secret_ab);

        let mut box_key_input = Vec::with_capacity(NETWORK_IDENTIFIER_BYTES * 3);
        box_key_input.extend_from_slice(self.network_identifier);
        box_key_input.extend_from_slice(&self.shared_secret_ab);
        box_key_input.extend_from_slice(&self.shared_secret_ab_server);
        let box_key_1 = crypto::sha256(&box_key_input);

        let opened = match crypto::open(msg, &box_key_1) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e)),
        };
        self.client_hello.copy_from_slice(&opened);

        let client_pk: [u8; sign::PUBLICKEYBYTES] =
            self.client_hello[sign::SIGNATUREBYTES..].try_into().expect("slice has len 32");

        let mut sig_input = Vec::with_capacity(NETWORK_IDENTIFIER_BYTES + sign::PUBLICKEYBYTES +
                                                sha256::DIGESTBYTES);
        sig_input.extend_from_slice(self.network_identifier);
        sig_input.extend_from_slice(self.server_longterm_pk);
        sig_input.extend_from_slice(&self.shared_hash);

        let sig: [u8; sign::SIGNATUREBYTES] =
            self.client_hello[..sign::SIGNATUREBYTES].try_into().expect("slice has len 64");
        if !crypto::verify_detached(&sig, &sig_input, &client_pk) {
            return Err(self.fail(HandshakeError::InvalidMessage));
        }

        let client_pk_curve = match crypto::ed25519_pk_to_curve25519(&client_pk) {
            Ok(k) => k,
            Err(e) => return Err(self.fail(e)),
        };
        let shared_secret_client_longterm = match crypto::scalarmult(self.server_ephemeral_sk, &client_pk_curve) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(e)),
        };

        let mut box_key_2_input = Vec::with_capacity(NETWORK_IDENTIFIER_BYTES * 4);
        box_key_2_input.extend_from_slice(self.network_identifier);
        box_key_2_input.extend_from_slice(&self.shared_secret_ab);
        box_key_2_input.extend_from_slice(&self.shared_secret_ab_server);
        box_key_2_input.extend_from_slice(&shared_secret_client_longterm);
        self.box_key_2 = crypto::sha256(&box_key_2_input);

        self.client_longterm_pk = client_pk;

        self.state = State::GotAuth;
        Ok(())
    }

    /// The longterm public key of the client, once the client's
    /// authentication envelope has been verified. Returns `None` before
    /// that point, so callers cannot observe an unauthenticated key.
    pub fn client_longterm_pk(&self) -> Option<[u8; sign::PUBLICKEYBYTES]> {
        match self.state {
            State::GotAuth | State::Done => Some(self.client_longterm_pk),
            _ => None,
        }
    }

    /// Produces the server accept message (msg4), using the `box_sec` key
    /// already validated and persisted by `verify_client_auth`.
    pub fn create_server_accept(&mut self, out: &mut [u8; MSG4_BYTES]) -> Result<(), HandshakeError> {
        self.check_state(State::GotAuth)?;
        debug!("creating server accept");

        let mut sig_input = Vec::with_capacity(NETWORK_IDENTIFIER_BYTES + sign::SIGNATUREBYTES +
                                                sign::PUBLICKEYBYTES + sha256::DIGESTBYTES);
        sig_input.extend_from_slice(self.network_identifier);
        sig_input.extend_from_slice(&self.client_hello[..sign::SIGNATUREBYTES]);
        sig_input.extend_from_slice(&self.client_longterm_pk);
        sig_input.extend_from_slice(&self.shared_hash);
        let ack_sig = crypto::sign_detached(&sig_input, self.server_longterm_sk);

        let sealed = crypto::seal(&ack_sig, &self.box_key_2);
        out.copy_from_slice(&sealed);

        self.state = State::Done;
        Ok(())
    }

    /// Consumes the session and returns the negotiated outcome.
    pub fn outcome(self) -> Result<Outcome, HandshakeError> {
        self.check_state(State::Done)?;

        // `box_key_2` is already `sha256(app || dh1 || dh2 || dh3)`, i.e.
        // exactly `box_sec` as defined for the outcome derivation.
        let secret_hash = crypto::sha256(&crypto::sha256(&self.box_key_2));

        let mut enc_key_input = Vec::with_capacity(sha256::DIGESTBYTES + sign::PUBLICKEYBYTES);
        enc_key_input.extend_from_slice(&secret_hash);
        enc_key_input.extend_from_slice(&self.client_longterm_pk);
        let encryption_key = crypto::sha256(&enc_key_input);

        let mut dec_key_input = Vec::with_capacity(sha256::DIGESTBYTES + sign::PUBLICKEYBYTES);
        dec_key_input.extend_from_slice(&secret_hash);
        dec_key_input.extend_from_slice(self.server_longterm_pk);
        let decryption_key = crypto::sha256(&dec_key_input);

        let encryption_nonce_full = crypto::hmac(self.network_identifier, &self.client_ephemeral_pk);
        let decryption_nonce_full = crypto::hmac(self.network_identifier, self.server_ephemeral_pk);

        let mut encryption_nonce = [0u8; secretbox::NONCEBYTES];
        encryption_nonce.copy_from_slice(&encryption_nonce_full[..secretbox::NONCEBYTES]);
        let mut decryption_nonce = [0u8; secretbox::NONCEBYTES];
        decryption_nonce.copy_from_slice(&decryption_nonce_full[..secretbox::NONCEBYTES]);

        Ok(Outcome::new(encryption_key,
                         encryption_nonce,
                         decryption_key,
                         decryption_nonce,
                         self.client_longterm_pk))
    }
}

impl<'a> Drop for ServerSession<'a> {
    fn drop(&mut self) {
        memzero(&mut self.client_ephemeral_pk);
        memzero(&mut self.shared_secret_ab);
        memzero(&mut self.shared_secret_ab_server);
        memzero(&mut self.shared_hash);
        memzero(&mut self.client_hello);
        memzero(&mut self.client_longterm_pk);
        memzero(&mut self.box_key_2);
    }
}
