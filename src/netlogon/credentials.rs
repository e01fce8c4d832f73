//! Credential math of the secure channel: session-key derivation from the
//! machine-account secret and the challenge pair, the double-DES credential
//! function, and the per-call rolling state.

use byteorder::{ByteOrder, LittleEndian};

use crate::crypto::des::{des_encrypt, DES_KEY_SIZE};
use crate::crypto::{compute_hmac_md5, compute_md5};
use crate::{CHALLENGE_SIZE, CREDENTIAL_SIZE, SESSION_KEY_SIZE};

/// Strong-key session-key derivation: HMAC-MD5 of the MD5 digest of four
/// zero bytes followed by both nonces, keyed by the shared secret.
pub fn compute_session_key(
    secret: &[u8; SESSION_KEY_SIZE],
    client_nonce: &[u8; CHALLENGE_SIZE],
    server_nonce: &[u8; CHALLENGE_SIZE],
) -> crate::Result<[u8; SESSION_KEY_SIZE]> {
    let mut data = [0x00; 4 + CHALLENGE_SIZE * 2];
    data[4..4 + CHALLENGE_SIZE].copy_from_slice(client_nonce);
    data[4 + CHALLENGE_SIZE..].copy_from_slice(server_nonce);

    compute_hmac_md5(secret.as_ref(), &compute_md5(&data))
}

/// The credential function: two chained single-block DES encryptions keyed
/// by the first two 7-byte halves of the session key.
pub fn compute_credential(session_key: &[u8; SESSION_KEY_SIZE], input: &[u8; CREDENTIAL_SIZE]) -> [u8; CREDENTIAL_SIZE] {
    let k1: [u8; DES_KEY_SIZE] = session_key[..DES_KEY_SIZE].try_into().expect("7-byte key half");
    let k2: [u8; DES_KEY_SIZE] = session_key[DES_KEY_SIZE..DES_KEY_SIZE * 2]
        .try_into()
        .expect("7-byte key half");

    des_encrypt(&k2, &des_encrypt(&k1, input))
}

/// Adds the sequence counter into the first four bytes of the seed,
/// little-endian with wrap-around.
pub fn add_sequence(seed: &[u8; CREDENTIAL_SIZE], sequence: u32) -> [u8; CREDENTIAL_SIZE] {
    let mut result = *seed;
    let low = LittleEndian::read_u32(&result[..4]).wrapping_add(sequence);
    LittleEndian::write_u32(&mut result[..4], low);

    result
}

/// The rolled credential accompanying every secure-channel call.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct Authenticator {
    pub credential: [u8; CREDENTIAL_SIZE],
    pub sequence: u32,
}

/// Rolling credential state shared with the domain controller. Created once
/// per secure-channel session by the challenge exchange; rolled exactly once
/// per subsequent call, in strict call order.
#[derive(Debug, Clone)]
pub struct CredentialChain {
    client: [u8; CREDENTIAL_SIZE],
    server: [u8; CREDENTIAL_SIZE],
    seed: [u8; CREDENTIAL_SIZE],
    session_key: [u8; SESSION_KEY_SIZE],
    sequence: u32,
}

impl CredentialChain {
    /// Derives the initial chain from the shared secret and the exchanged
    /// nonce pair. Both sides compute the same state independently.
    pub fn new(
        secret: &[u8; SESSION_KEY_SIZE],
        client_nonce: &[u8; CHALLENGE_SIZE],
        server_nonce: &[u8; CHALLENGE_SIZE],
    ) -> crate::Result<Self> {
        let session_key = compute_session_key(secret, client_nonce, server_nonce)?;
        let client = compute_credential(&session_key, client_nonce);
        let server = compute_credential(&session_key, server_nonce);

        Ok(Self {
            client,
            server,
            seed: client,
            session_key,
            sequence: 0,
        })
    }

    pub fn client_credential(&self) -> &[u8; CREDENTIAL_SIZE] {
        &self.client
    }

    pub fn server_credential(&self) -> &[u8; CREDENTIAL_SIZE] {
        &self.server
    }

    pub fn session_key(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.session_key
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Advances the chain for the next call: the sequence grows by two, the
    /// counter is folded into the seed and the result is re-encrypted into
    /// the new client credential.
    pub fn roll(&mut self) -> Authenticator {
        self.sequence = self.sequence.wrapping_add(2);

        let input = add_sequence(&self.seed, self.sequence);
        self.client = compute_credential(&self.session_key, &input);
        self.seed = input;

        Authenticator {
            credential: self.client,
            sequence: self.sequence,
        }
    }

    /// The return credential the controller must present for the last rolled
    /// call: the seed advanced by one more, re-encrypted.
    pub fn expected_return_credential(&self) -> [u8; CREDENTIAL_SIZE] {
        compute_credential(&self.session_key, &add_sequence(&self.seed, 1))
    }

    /// Checks the controller's return authenticator for the last rolled
    /// call. A mismatch means the two sides disagree on the chain state.
    pub fn verify_return(&self, authenticator: &Authenticator) -> bool {
        authenticator.credential == self.expected_return_credential()
    }
}
