use super::hash::{challenge_response, lm_hash, ntlm_hash, ntlm_v2_hash, v1_session_key, v2_proof, v2_session_key};
use super::{authenticate, AuthenticationDescriptor, CredentialMethod, DomainVariant};
use crate::config::AuthPolicy;
use crate::store::MemoryCredentialStore;
use crate::ErrorKind;

const CHALLENGE: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];

fn store_with_user() -> MemoryCredentialStore {
    let mut store = MemoryCredentialStore::new();
    store.add_plaintext("alice", "password", 1104);

    store
}

fn v2_response(user: &str, domain: &str, blob: &[u8]) -> Vec<u8> {
    let v2_hash = ntlm_v2_hash(&ntlm_hash("password"), user, domain).unwrap();
    let proof = v2_proof(&v2_hash, &CHALLENGE, blob).unwrap();

    let mut response = proof.to_vec();
    response.extend_from_slice(blob);

    response
}

#[test]
fn lm_hash_known_vector() {
    assert_eq!(
        lm_hash("password"),
        [
            0xE5, 0x2C, 0xAC, 0x67, 0x41, 0x9A, 0x9A, 0x22, 0x4A, 0x3B, 0x10, 0x8F, 0x3F, 0xA6, 0xCB, 0x6D
        ]
    );
}

#[test]
fn ntlm_hash_known_vector() {
    assert_eq!(
        ntlm_hash("password"),
        [
            0x88, 0x46, 0xF7, 0xEA, 0xEE, 0x8F, 0xB1, 0x17, 0xAD, 0x06, 0xBD, 0xD8, 0x30, 0xB7, 0x58, 0x6C
        ]
    );
}

#[test]
fn password_hashing_is_idempotent() {
    assert_eq!(lm_hash("S3cre!t"), lm_hash("S3cre!t"));
    assert_eq!(ntlm_hash("S3cre!t"), ntlm_hash("S3cre!t"));
}

#[test]
fn ntlm_v1_response_matches() {
    let store = store_with_user();
    let nt_response = challenge_response(&ntlm_hash("password"), &CHALLENGE);
    let mut descriptor = AuthenticationDescriptor::new(&[], &nt_response);

    let logon = authenticate(&store, AuthPolicy::all(), "CORP", "alice", &CHALLENGE, &mut descriptor).unwrap();

    assert_eq!(logon.rid, 1104);
    assert!(!logon.guest);
    assert_eq!(logon.method, Some(CredentialMethod::Ntlm));
    assert_eq!(logon.session_key.as_bytes(), &v1_session_key(&ntlm_hash("password")));
}

#[test]
fn disabled_ntlm_policy_rejects_v1_response() {
    let store = store_with_user();
    let nt_response = challenge_response(&ntlm_hash("password"), &CHALLENGE);
    let mut descriptor = AuthenticationDescriptor::new(&[], &nt_response);

    let err = authenticate(
        &store,
        AuthPolicy::NTLMV2 | AuthPolicy::LMV2,
        "CORP",
        "alice",
        &CHALLENGE,
        &mut descriptor,
    )
    .unwrap_err();

    assert_eq!(err.error_type, ErrorKind::LogonFailure);
}

#[test]
fn ntlm_v2_first_variant_short_circuits() {
    let store = store_with_user();
    let blob = [0x11; 36];
    let nt_response = v2_response("alice", "CORP", &blob);
    let mut descriptor = AuthenticationDescriptor::new(&[], &nt_response);

    let logon = authenticate(&store, AuthPolicy::all(), "CORP", "alice", &CHALLENGE, &mut descriptor).unwrap();

    assert_eq!(logon.method, Some(CredentialMethod::NtlmV2));
    assert_eq!(descriptor.matched_variant(), Some(DomainVariant::CasePreserved));
    // The case-preserved variant matched, so no later variant may be tried.
    assert_eq!(descriptor.variants_tried(), 1);
}

#[test]
fn ntlm_v2_falls_back_to_lowercased_domain() {
    let store = store_with_user();
    let blob = [0x22; 36];
    // Client hashed the domain in lower case while the server presents it
    // upper-cased.
    let nt_response = v2_response("alice", "corp", &blob);
    let mut descriptor = AuthenticationDescriptor::new(&[], &nt_response);

    let logon = authenticate(&store, AuthPolicy::all(), "CORP", "alice", &CHALLENGE, &mut descriptor).unwrap();

    assert_eq!(logon.method, Some(CredentialMethod::NtlmV2));
    assert_eq!(descriptor.matched_variant(), Some(DomainVariant::Lowercase));
    assert_eq!(descriptor.variants_tried(), 2);
}

#[test]
fn ntlm_v2_empty_domain_is_last_resort() {
    let store = store_with_user();
    let blob = [0x33; 36];
    let nt_response = v2_response("alice", "", &blob);
    let mut descriptor = AuthenticationDescriptor::new(&[], &nt_response);

    let logon = authenticate(&store, AuthPolicy::all(), "Corp", "alice", &CHALLENGE, &mut descriptor).unwrap();

    assert_eq!(logon.method, Some(CredentialMethod::NtlmV2));
    assert_eq!(descriptor.matched_variant(), Some(DomainVariant::Empty));
    assert_eq!(descriptor.variants_tried(), 3);
}

#[test]
fn ntlm_v2_session_key_is_proof_derived() {
    let store = store_with_user();
    let blob = [0x44; 36];
    let nt_response = v2_response("alice", "CORP", &blob);
    let mut descriptor = AuthenticationDescriptor::new(&[], &nt_response);

    let logon = authenticate(&store, AuthPolicy::all(), "CORP", "alice", &CHALLENGE, &mut descriptor).unwrap();

    let v2_hash = ntlm_v2_hash(&ntlm_hash("password"), "alice", "CORP").unwrap();
    let proof = v2_proof(&v2_hash, &CHALLENGE, &blob).unwrap();

    assert_eq!(logon.session_key.as_bytes(), &v2_session_key(&v2_hash, &proof).unwrap());
}

#[test]
fn lm_v2_response_matches() {
    let store = store_with_user();
    let client_nonce = [0x55; 8];
    let v2_hash = ntlm_v2_hash(&ntlm_hash("password"), "alice", "CORP").unwrap();
    let proof = v2_proof(&v2_hash, &CHALLENGE, &client_nonce).unwrap();

    let mut lm_response = proof.to_vec();
    lm_response.extend_from_slice(&client_nonce);
    let mut descriptor = AuthenticationDescriptor::new(&lm_response, &[]);

    let logon = authenticate(&store, AuthPolicy::all(), "CORP", "alice", &CHALLENGE, &mut descriptor).unwrap();

    assert_eq!(logon.method, Some(CredentialMethod::LmV2));
    assert_eq!(logon.rid, 1104);
}

#[test]
fn lm_response_matches_when_v2_does_not() {
    let store = store_with_user();
    let lm_response = challenge_response(&lm_hash("password"), &CHALLENGE);
    let mut descriptor = AuthenticationDescriptor::new(&lm_response, &[]);

    let logon = authenticate(&store, AuthPolicy::all(), "CORP", "alice", &CHALLENGE, &mut descriptor).unwrap();

    assert_eq!(logon.method, Some(CredentialMethod::Lm));
    // LMv2 was tried first over all three domain variants.
    assert_eq!(descriptor.variants_tried(), 3);
}

#[test]
fn hashed_record_matches_like_plaintext() {
    let mut store = MemoryCredentialStore::new();
    store.add_hashed("alice", "password", 1104);

    let nt_response = challenge_response(&ntlm_hash("password"), &CHALLENGE);
    let mut descriptor = AuthenticationDescriptor::new(&[], &nt_response);

    let logon = authenticate(&store, AuthPolicy::all(), "CORP", "alice", &CHALLENGE, &mut descriptor).unwrap();

    assert_eq!(logon.method, Some(CredentialMethod::Ntlm));
}

#[test]
fn no_auth_account_succeeds_without_comparison() {
    let mut store = MemoryCredentialStore::new();
    store.add_no_auth("guest", 501);

    // Garbage responses: they must never be inspected.
    let mut descriptor = AuthenticationDescriptor::new(&[0xFF; 24], &[0xFF; 24]);

    let logon = authenticate(&store, AuthPolicy::all(), "CORP", "guest", &CHALLENGE, &mut descriptor).unwrap();

    assert!(logon.guest);
    assert_eq!(logon.rid, 501);
    assert_eq!(logon.method, None);
    assert_eq!(descriptor.variants_tried(), 0);
}

#[test]
fn unknown_user_fails_with_logon_failure() {
    let store = MemoryCredentialStore::new();
    let mut descriptor = AuthenticationDescriptor::new(&[], &[0x00; 24]);

    let err = authenticate(&store, AuthPolicy::all(), "CORP", "mallory", &CHALLENGE, &mut descriptor).unwrap_err();

    assert_eq!(err.error_type, ErrorKind::LogonFailure);
}

#[test]
fn wrong_password_fails_uniformly() {
    let store = store_with_user();
    let nt_response = challenge_response(&ntlm_hash("not-the-password"), &CHALLENGE);
    let mut descriptor = AuthenticationDescriptor::new(&[], &nt_response);

    let err = authenticate(&store, AuthPolicy::all(), "CORP", "alice", &CHALLENGE, &mut descriptor).unwrap_err();

    assert_eq!(err.error_type, ErrorKind::LogonFailure);
    assert_eq!(descriptor.matched_method(), None);
}
