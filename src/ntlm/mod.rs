//! Local Credential Matcher: verifies a client-supplied LM/NTLM/NTLMv2
//! response blob against the local credential store and derives the raw
//! session key on match.
//!
//! # MSDN
//!
//! * [[MS-NLMP]: NT LAN Manager (NTLM) Authentication Protocol](https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-nlmp/b38c36ed-2804-4868-a9ff-8dd3182128e4)

pub mod hash;
#[cfg(test)]
mod test;

use rand::rngs::OsRng;
use rand::RngCore;

use self::hash::{challenge_response, lm_hash, ntlm_hash, ntlm_v2_hash, v1_session_key, v2_proof, v2_session_key};
use crate::config::AuthPolicy;
use crate::crypto::des::CHALLENGE_RESPONSE_SIZE;
use crate::crypto::HASH_SIZE;
use crate::secret::SessionKey;
use crate::store::{CredentialStore, PasswordLookup, PasswordRecord};
use crate::{Error, ErrorKind, CHALLENGE_SIZE};

const V2_PROOF_SIZE: usize = HASH_SIZE;

/// Which challenge-response method produced a match.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CredentialMethod {
    Lm,
    LmV2,
    Ntlm,
    NtlmV2,
}

/// Domain-name variants tried for the v2 methods, in this exact order. The
/// order is a compatibility contract with deployed clients; it is preserved,
/// not re-derived.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DomainVariant {
    CasePreserved,
    Lowercase,
    Empty,
}

const DOMAIN_VARIANTS: [DomainVariant; 3] = [DomainVariant::CasePreserved, DomainVariant::Lowercase, DomainVariant::Empty];

impl DomainVariant {
    fn apply(self, domain: &str) -> String {
        match self {
            DomainVariant::CasePreserved => domain.to_owned(),
            DomainVariant::Lowercase => domain.to_lowercase(),
            DomainVariant::Empty => String::new(),
        }
    }
}

/// Transient per-attempt record: the client-submitted response bytes plus
/// diagnostics about which method and domain variant matched. Created at the
/// start of one logon attempt and discarded at its end.
#[derive(Debug)]
pub struct AuthenticationDescriptor<'a> {
    pub lm_response: &'a [u8],
    pub nt_response: &'a [u8],
    matched: Option<(CredentialMethod, Option<DomainVariant>)>,
    variants_tried: usize,
}

impl<'a> AuthenticationDescriptor<'a> {
    pub fn new(lm_response: &'a [u8], nt_response: &'a [u8]) -> Self {
        Self {
            lm_response,
            nt_response,
            matched: None,
            variants_tried: 0,
        }
    }

    pub fn matched_method(&self) -> Option<CredentialMethod> {
        self.matched.map(|(method, _)| method)
    }

    pub fn matched_variant(&self) -> Option<DomainVariant> {
        self.matched.and_then(|(_, variant)| variant)
    }

    /// How many domain variants were evaluated across the v2 methods.
    pub fn variants_tried(&self) -> usize {
        self.variants_tried
    }
}

/// Outcome of a successful local match.
#[derive(Debug)]
pub struct LocalLogon {
    pub rid: u32,
    pub guest: bool,
    pub method: Option<CredentialMethod>,
    pub session_key: SessionKey,
}

/// Random 8-byte server challenge handed to connecting clients.
pub fn generate_challenge() -> [u8; CHALLENGE_SIZE] {
    let mut challenge = [0x00; CHALLENGE_SIZE];
    OsRng.fill_bytes(&mut challenge);

    challenge
}

/// Verifies one logon attempt against the local store. Methods are evaluated
/// in a fixed order, each gated by the policy mask: NTLM, NTLMv2, LMv2, LM.
/// The first match wins and derives the session key; no match is a uniform
/// logon failure.
pub fn authenticate(
    store: &dyn CredentialStore,
    policy: AuthPolicy,
    domain: &str,
    user: &str,
    challenge: &[u8; CHALLENGE_SIZE],
    descriptor: &mut AuthenticationDescriptor<'_>,
) -> crate::Result<LocalLogon> {
    let record = match store.lookup(user) {
        PasswordLookup::NoAuthRequired { rid } => {
            debug!(user, rid, "account requires no authentication, guest logon");

            return Ok(LocalLogon {
                rid,
                guest: true,
                method: None,
                session_key: SessionKey::default(),
            });
        }
        PasswordLookup::UnknownUser => {
            warn!(user, "unknown account, illegal account identifier");

            return Err(Error::new(ErrorKind::LogonFailure, "no such account"));
        }
        PasswordLookup::Record(record) => record,
    };

    let (stored_lm, stored_nt) = stored_hashes(&record)?;

    if let Some(logon) = match_nt_response(policy, domain, user, challenge, descriptor, &stored_nt, record.rid)? {
        return Ok(logon);
    }

    if let Some(logon) = match_lm_response(policy, domain, user, challenge, descriptor, &stored_lm, &stored_nt, record.rid)? {
        return Ok(logon);
    }

    debug!(user, domain, "no credential method matched");

    Err(Error::new(ErrorKind::LogonFailure, "logon failure"))
}

fn stored_hashes(record: &PasswordRecord) -> crate::Result<([u8; HASH_SIZE], [u8; HASH_SIZE])> {
    if record.hashed {
        if record.bytes.len() != HASH_SIZE * 2 {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("hashed password record has {} bytes, expected 32", record.bytes.len()),
            ));
        }

        let mut lm = [0x00; HASH_SIZE];
        let mut nt = [0x00; HASH_SIZE];
        lm.copy_from_slice(&record.bytes[..HASH_SIZE]);
        nt.copy_from_slice(&record.bytes[HASH_SIZE..]);

        Ok((lm, nt))
    } else {
        let password = std::str::from_utf8(&record.bytes)
            .map_err(|_| Error::new(ErrorKind::InvalidParameter, "stored plaintext password is not UTF-8"))?;

        Ok((lm_hash(password), ntlm_hash(password)))
    }
}

fn match_nt_response(
    policy: AuthPolicy,
    domain: &str,
    user: &str,
    challenge: &[u8; CHALLENGE_SIZE],
    descriptor: &mut AuthenticationDescriptor<'_>,
    stored_nt: &[u8; HASH_SIZE],
    rid: u32,
) -> crate::Result<Option<LocalLogon>> {
    // v1 responses are exactly 24 bytes; anything longer carries the v2
    // timestamped blob behind the 16-byte proof.
    if policy.contains(AuthPolicy::NTLM) && descriptor.nt_response.len() == CHALLENGE_RESPONSE_SIZE {
        let expected = challenge_response(stored_nt, challenge);

        if expected[..] == *descriptor.nt_response {
            debug!(user, "NTLM response matched");
            descriptor.matched = Some((CredentialMethod::Ntlm, None));

            return Ok(Some(LocalLogon {
                rid,
                guest: false,
                method: Some(CredentialMethod::Ntlm),
                session_key: SessionKey::new(v1_session_key(stored_nt)),
            }));
        }
    }

    if policy.contains(AuthPolicy::NTLMV2) && descriptor.nt_response.len() > CHALLENGE_RESPONSE_SIZE {
        let (client_proof, blob) = descriptor.nt_response.split_at(V2_PROOF_SIZE);

        for variant in DOMAIN_VARIANTS {
            descriptor.variants_tried += 1;

            let v2_hash = ntlm_v2_hash(stored_nt, user, &variant.apply(domain))?;
            let proof = v2_proof(&v2_hash, challenge, blob)?;

            if proof[..] == *client_proof {
                debug!(user, ?variant, "NTLMv2 response matched");
                descriptor.matched = Some((CredentialMethod::NtlmV2, Some(variant)));

                return Ok(Some(LocalLogon {
                    rid,
                    guest: false,
                    method: Some(CredentialMethod::NtlmV2),
                    session_key: SessionKey::new(v2_session_key(&v2_hash, &proof)?),
                }));
            }
        }
    }

    Ok(None)
}

#[allow(clippy::too_many_arguments)]
fn match_lm_response(
    policy: AuthPolicy,
    domain: &str,
    user: &str,
    challenge: &[u8; CHALLENGE_SIZE],
    descriptor: &mut AuthenticationDescriptor<'_>,
    stored_lm: &[u8; HASH_SIZE],
    stored_nt: &[u8; HASH_SIZE],
    rid: u32,
) -> crate::Result<Option<LocalLogon>> {
    if descriptor.lm_response.len() != CHALLENGE_RESPONSE_SIZE {
        return Ok(None);
    }

    if policy.contains(AuthPolicy::LMV2) {
        // An LMv2 response is the 16-byte proof followed by the 8-byte
        // client nonce in the same 24-byte buffer a v1 response uses.
        let (client_proof, client_nonce) = descriptor.lm_response.split_at(V2_PROOF_SIZE);

        for variant in DOMAIN_VARIANTS {
            descriptor.variants_tried += 1;

            let v2_hash = ntlm_v2_hash(stored_nt, user, &variant.apply(domain))?;
            let proof = v2_proof(&v2_hash, challenge, client_nonce)?;

            if proof[..] == *client_proof {
                debug!(user, ?variant, "LMv2 response matched");
                descriptor.matched = Some((CredentialMethod::LmV2, Some(variant)));

                return Ok(Some(LocalLogon {
                    rid,
                    guest: false,
                    method: Some(CredentialMethod::LmV2),
                    session_key: SessionKey::new(v2_session_key(&v2_hash, &proof)?),
                }));
            }
        }
    }

    if policy.contains(AuthPolicy::LM) {
        let expected = challenge_response(stored_lm, challenge);

        if expected[..] == *descriptor.lm_response {
            debug!(user, "LM response matched");
            descriptor.matched = Some((CredentialMethod::Lm, None));

            return Ok(Some(LocalLogon {
                rid,
                guest: false,
                method: Some(CredentialMethod::Lm),
                session_key: SessionKey::new(v1_session_key(stored_nt)),
            }));
        }
    }

    Ok(None)
}
