//! The client side of a handshake.

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
    SentChallenge,
    GotChallenge,
    SentAuth,
    Done,
    Failed,
}

/// Drives the client side of a handshake to completion.
///
/// Every long-term and ephemeral key is borrowed for the session's lifetime
/// rather than copied, so the caller stays in control of when that key
/// material is zeroed. Methods must be called in protocol order; calling one
/// out of order returns [`HandshakeError::Misuse`] without touching the
/// network-visible state.
pub struct ClientSession<'a> {
    network_identifier: &'a [u8; NETWORK_IDENTIFIER_BYTES],
    client_longterm_pk: &'a [u8; sign::PUBLICKEYBYTES],
    client_longterm_sk: &'a [u8; sign::SECRETKEYBYTES],
    client_ephemeral_pk: &'a [u8; box_::PUBLICKEYBYTES],
    client_ephemeral_sk: &'a [u8; box_::SECRETKEYBYTES],
    server_longterm_pk: &'a [u8; sign::PUBLICKEYBYTES],

    state: State,
    server_ephemeral_pk: [u8; box_::PUBLICKEYBYTES],
    shared_secret_ab: [u8; scalarmult::GROUPELEMENTBYTES],
    shared_secret_ab_server: [u8; scalarmult::GROUPELEMENTBYTES],
    shared_hash: [u8; sha256::DIGESTBYTES],
    hello: [u8; HELLO_BYTES],
    box_key_2: [u8; secretbox::KEYBYTES],
}

impl<'a> ClientSession<'a> {
    /// Creates a new client session. `server_longterm_pk` must already be
    /// known to the client out of band; this is what makes the handshake a
    /// mutual authentication of two known parties rather than a blind
    /// key exchange.
    pub fn new(network_identifier: &'a [u8; NETWORK_IDENTIFIER_BYTES],
               client_longterm_pk: &'a [u8; sign::PUBLICKEYBYTES],
               client_longterm_sk: &'a [u8; sign::SECRETKEYBYTES],
               client_ephemeral_pk: &'a [u8; box_::PUBLICKEYBYTES],
               client_ephemeral_sk: &'a [u8; box_::SECRETKEYBYTES],
               server_longterm_pk: &'a [u8; sign::PUBLICKEYBYTES])
               -> ClientSession<'a> {
        ClientSession {
            network_identifier,
            client_longterm_pk,
            client_longterm_sk,
            client_ephemeral_pk,
            client_ephemeral_sk,
            server_longterm_pk,
            state: State::Init,
            server_ephemeral_pk: [0; box_::PUBLICKEYBYTES],
            shared_secret_ab: [0; scalarmult::GROUPELEMENTBYTES],
            shared_secret_ab_server: [0; scalarmult::GROUPELEMENTBYTES],
            shared_hash: [0; sha256::DIGESTBYTES],
            hello: [0; HELLO_BYTES],
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
        warn!(error = ?err, "client handshake failed");
        self.state = State::Failed;
        err
    }

    /// Produces the client challenge (msg1): `hmac(app, eph_pk) || eph_pk`.
    pub fn create_client_challenge(&mut self, out: &mut [u8; MSG1_BYTES]) -> Result<(), HandshakeError> {
        self.check_state(State::Init)?;
        debug!("creating client challenge");

        let tag = crypto::hmac(self.network_identifier, self.client_ephemeral_pk);
        out[..32].copy_from_slice(&tag);
        out[32..].copy_from_slice(self.client_ephemeral_pk);

        self.state = State::SentChallenge;
        Ok(())
    }

    /// Verifies the server's challenge (msg2) by checking its HMAC and
    /// storing the advertised ephemeral key. Returns
    /// [`HandshakeError::InvalidMessage`] if the HMAC does not match.
    pub fn verify_server_challenge(&mut self, msg: &[u8; MSG2_BYTES]) -> Result<(), HandshakeError> {
        self.check_state(State::SentChallenge)?;
        debug!("verifying server challenge");

        let tag: [u8; 32] = msg[..32].try_into().expect("slice has len 32");
        let server_eph_pk: [u8; box_::PUBLICKEYBYTES] = msg[32..].try_into().expect("slice has len 32");

        if !crypto::hmac_verify(&tag, &server_eph_pk, self.network_identifier) {
            return Err(self.fail(HandshakeError::InvalidMessage));
        }
        self.server_ephemeral_pk = server_eph_pk;

        self.state = State::GotChallenge;
        Ok(())
    }

    /// Produces the client authentication envelope (msg3): the client's
    /// signed, encrypted "hello". Returns [`HandshakeError::InvalidKey`] if
    /// the server's advertised ephemeral key is a small-subgroup point.
    pub fn create_client_auth(&mut self, out: &mut [u8; MSG3_BYTES]) -> Result<(), HandshakeError> {
        self.check_state(State::GotChallenge)?;
        debug!("creating client authentication");

        self.shared_secret_ab = match crypto::scalarmult(self.client_ephemeral_sk, &self.server_ephemeral_pk) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(e)),
        };

        let server_pk_curve = match crypto::ed25519_pk_to_curve25519(self.server_longterm_pk) {
            Ok(k) => k,
            Err(e) => return Err(self.fail(e)),
        };
        let shared_secret_ab_server = match crypto::scalarmult(self.client_ephemeral_sk, &server_pk_curve) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(e)),
        };
        self.shared_secret_ab_server = shared_secret_ab_server;

        self.shared_hash = crypto::sha256(&self.shared_secret_ab);

        let mut sig_input = Vec::with_capacity(NETWORK_IDENTIFIER_BYTES + sign::PUBLICKEYBYTES +
                                                sha256::DIGESTBYTES);
        sig_input.extend_from_slice(self.network_identifier);
        sig_input.extend_from_slice(self.server_longterm_pk);
        sig_input.extend_from_slice(&self.shared_hash);
        let sig = crypto::sign_detached(&sig_input, self.client_longterm_sk);

        self.hello[..sign::SIGNATUREBYTES].copy_from_slice(&sig);
        self.hello[sign::SIGNATUREBYTES..].copy_from_slice(self.client_longterm_pk);

        let mut box_key_input = Vec::with_capacity(NETWORK_IDENTIFIER_BYTES * 3);
        box_key_input.extend_from_slice(self.network_identifier);
        box_key_input.extend_from_slice(&self.shared_secret_ab);
        box_key_input.extend_from_slice(&self.shared_secret_ab_server);
        let box_key_1 = crypto::sha256(&box_key_input);

        let sealed = crypto::seal(&self.hello, &box_key_1);
        out.copy_from_slice(&sealed);

        self.state = State::SentAuth;
        Ok(())
    }

    /// Verifies the server's accept message (msg4).
    pub fn verify_server_accept(&mut self, msg: &[u8; MSG4_BYTES]) -> Result<(), HandshakeError> {
        self.check_state(State::SentAuth)?;
        debug!("verifying server accept");

        let client_sk_curve = crypto::ed25519_sk_to_curve25519(self.client_longterm_sk);
        let shared_secret_server_eph = match crypto::scalarmult(&client_sk_curve, &self.server_ephemeral_pk) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(e)),
        };

        let mut box_key_input = Vec::with_capacity(NETWORK_IDENTIFIER_BYTES * 4);
        box_key_input.extend_from_slice(self.network_identifier);
        box_key_input.extend_from_slice(&self.shared_secret_ab);
        box_key_input.extend_from_slice(&self.shared_secret_ab_server);
        box_key_input.extend_from_slice(&shared_secret_server_eph);
        self.box_key_2 = crypto::sha256(&box_key_input);

        let opened = match crypto::open(msg, &self.box_key_2) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e)),
        };

        let mut sig_input = Vec::with_capacity(NETWORK_IDENTIFIER_BYTES + sign::SIGNATUREBYTES +
                                                sign::PUBLICKEYBYTES + sha256::DIGESTBYTES);
        sig_input.extend_from_slice(self.network_identifier);
        sig_input.extend_from_slice(&self.hello[..sign::SIGNATUREBYTES]);
        sig_input.extend_from_slice(self.client_longterm_pk);
        sig_input.extend_from_slice(&self.shared_hash);

        let sig: [u8; sign::SIGNATUREBYTES] = opened[..].try_into().expect("secretbox opened to 64 bytes");
        if !crypto::verify_detached(&sig, &sig_input, self.server_longterm_pk) {
            return Err(self.fail(HandshakeError::InvalidMessage));
        }

        self.state = State::Done;
        Ok(())
    }

    /// Consumes the session and returns the negotiated outcome. Consuming
    /// `self` means the session's buffers are zeroed (via `Drop`) as soon
    /// as the caller is done extracting the outcome.
    pub fn outcome(self) -> Result<Outcome, HandshakeError> {
        self.check_state(State::Done)?;

        // `box_key_2` is already `sha256(app || ab || aB || Ab)`, i.e. exactly
        // `box_sec` as defined for the outcome derivation; no need to
        // recompute the Diffie-Hellman terms here.
        let secret_hash = crypto::sha256(&crypto::sha256(&self.box_key_2));

        let mut enc_key_input = Vec::with_capacity(sha256::DIGESTBYTES + sign::PUBLICKEYBYTES);
        enc_key_input.extend_from_slice(&secret_hash);
        enc_key_input.extend_from_slice(self.server_longterm_pk);
        let encryption_key = crypto::sha256(&enc_key_input);

        let mut dec_key_input = Vec::with_capacity(sha256::DIGESTBYTES + sign::PUBLICKEYBYTES);
        dec_key_input.extend_from_slice(&secret_hash);
        dec_key_input.extend_from_slice(self.client_longterm_pk);
        let decryption_key = crypto::sha256(&dec_key_input);

        let encryption_nonce_full = crypto::hmac(self.network_identifier, &self.server_ephemeral_pk);
        let decryption_nonce_full = crypto::hmac(self.network_identifier, self.client_ephemeral_pk);

        let mut encryption_nonce = [0u8; secretbox::NONCEBYTES];
        encryption_nonce.copy_from_slice(&encryption_nonce_full[..secretbox::NONCEBYTES]);
        let mut decryption_nonce = [0u8; secretbox::NONCEBYTES];
        decryption_nonce.copy_from_slice(&decryption_nonce_full[..secretbox::NONCEBYTES]);

        Ok(Outcome::new(encryption_key,
                         encryption_nonce,
                         decryption_key,
                         decryption_nonce,
                         *self.server_longterm_pk))
    }
}

impl<'a> Drop for ClientSession<'a> {
    fn drop(&mut self) {
        memzero(&mut self.server_ephemeral_pk);
        memzero(&mut self.shared_secret_ab);
        memzero(&mut self.shared_secret_ab_server);
        memzero(&mut self.shared_hash);
        memzero(&mut self.hello);
        memzero(&mut self.box_key_2);
    }
}
