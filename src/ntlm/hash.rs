//! LM/NTLM password hashing and challenge-response computation.

use crate::crypto::des::{des_encrypt, des_long, CHALLENGE_RESPONSE_SIZE, DES_KEY_SIZE};
use crate::crypto::{compute_hmac_md5, compute_md4, HASH_SIZE};
use crate::utils::string_to_utf16;
use crate::CHALLENGE_SIZE;

const LM_PASSWORD_SIZE: usize = 14;
const LM_MAGIC: &[u8; 8] = b"KGS!@#$%";

/// LM hash: the upper-cased password, truncated or zero-padded to 14 ASCII
/// bytes, used as two DES key halves over a fixed plaintext.
pub fn lm_hash(password: &str) -> [u8; HASH_SIZE] {
    let mut padded = [0x00; LM_PASSWORD_SIZE];
    for (slot, byte) in padded.iter_mut().zip(password.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }

    let mut hash = [0x00; HASH_SIZE];
    for (i, half) in padded.chunks_exact(DES_KEY_SIZE).enumerate() {
        let key: [u8; DES_KEY_SIZE] = half.try_into().expect("chunks_exact yields 7-byte chunks");
        hash[i * 8..(i + 1) * 8].copy_from_slice(&des_encrypt(&key, LM_MAGIC));
    }

    hash
}

/// NTLM hash: MD4 over the UTF-16LE form of the password.
pub fn ntlm_hash(password: &str) -> [u8; HASH_SIZE] {
    compute_md4(&string_to_utf16(password))
}

/// The v1 challenge-response: DESL of the stored hash over the server
/// challenge.
pub fn challenge_response(hash: &[u8; HASH_SIZE], challenge: &[u8; CHALLENGE_SIZE]) -> [u8; CHALLENGE_RESPONSE_SIZE] {
    des_long(hash, challenge)
}

/// The NTLMv2 "v2 hash": HMAC-MD5 of the upper-cased user name followed by
/// the domain name (both UTF-16LE), keyed by the NTLM hash. The domain is
/// taken exactly as supplied; the matcher drives the casing variants.
pub fn ntlm_v2_hash(nt_hash: &[u8; HASH_SIZE], user: &str, domain: &str) -> crate::Result<[u8; HASH_SIZE]> {
    let mut user_uppercase_with_domain = string_to_utf16(user.to_uppercase().as_str());
    user_uppercase_with_domain.extend(string_to_utf16(domain));

    compute_hmac_md5(nt_hash, &user_uppercase_with_domain)
}

/// The 16-byte proof over a v2 response body: HMAC-MD5 of the server
/// challenge followed by the client-supplied blob, keyed by the v2 hash.
/// For NTLMv2 the blob is the timestamped target-info structure; for LMv2
/// it is the 8-byte client nonce.
pub fn v2_proof(v2_hash: &[u8; HASH_SIZE], challenge: &[u8; CHALLENGE_SIZE], blob: &[u8]) -> crate::Result<[u8; HASH_SIZE]> {
    let mut input = Vec::with_capacity(CHALLENGE_SIZE + blob.len());
    input.extend_from_slice(challenge);
    input.extend_from_slice(blob);

    compute_hmac_md5(v2_hash, &input)
}

/// Session key for a v1 match: MD4 of the NTLM hash.
pub fn v1_session_key(nt_hash: &[u8; HASH_SIZE]) -> [u8; HASH_SIZE] {
    compute_md4(nt_hash)
}

/// Session key for a v2 match: HMAC-MD5 of the matched proof, keyed by the
/// matched v2 hash.
pub fn v2_session_key(v2_hash: &[u8; HASH_SIZE], proof: &[u8; HASH_SIZE]) -> crate::Result<[u8; HASH_SIZE]> {
    compute_hmac_md5(v2_hash, proof)
}
