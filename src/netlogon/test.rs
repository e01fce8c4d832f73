use static_assertions::const_assert_eq;

use super::credentials::{add_sequence, compute_credential, compute_session_key, Authenticator, CredentialChain};
use super::{DelegatedLogonRequest, SecureChannel};
use crate::rpc::RpcTransport;
use crate::{Error, ErrorKind, CHALLENGE_SIZE, CREDENTIAL_SIZE, SESSION_KEY_SIZE};

const_assert_eq!(CHALLENGE_SIZE, 8);
const_assert_eq!(CREDENTIAL_SIZE, 8);
const_assert_eq!(SESSION_KEY_SIZE, 16);

const SECRET: [u8; 16] = [
    0x8A, 0x61, 0x0A, 0x15, 0x2C, 0x33, 0x40, 0x5E, 0x6B, 0x72, 0x89, 0x90, 0xA7, 0xBE, 0xC5, 0xDC,
];
const CLIENT_NONCE: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
const SERVER_NONCE: [u8; 8] = [0xF1, 0xE2, 0xD3, 0xC4, 0xB5, 0xA6, 0x97, 0x88];

fn chain() -> CredentialChain {
    CredentialChain::new(&SECRET, &CLIENT_NONCE, &SERVER_NONCE).unwrap()
}

#[test]
fn initial_credential_is_pure_function_of_inputs() {
    let first = chain();
    let second = chain();

    assert_eq!(first.client_credential(), second.client_credential());
    assert_eq!(first.server_credential(), second.server_credential());
    assert_eq!(first.session_key(), second.session_key());

    let session_key = compute_session_key(&SECRET, &CLIENT_NONCE, &SERVER_NONCE).unwrap();
    assert_eq!(first.client_credential(), &compute_credential(&session_key, &CLIENT_NONCE));
}

#[test]
fn different_secret_yields_different_credentials() {
    let other_secret = [0x42; 16];
    let other = CredentialChain::new(&other_secret, &CLIENT_NONCE, &SERVER_NONCE).unwrap();

    assert_ne!(chain().client_credential(), other.client_credential());
}

#[test]
fn roll_is_deterministic_and_never_equals_unrolled_state() {
    let mut first = chain();
    let mut second = chain();
    let unrolled = *first.client_credential();

    let auth_one = first.roll();
    let auth_two = second.roll();

    assert_eq!(auth_one, auth_two);
    assert_ne!(auth_one.credential, unrolled);
    assert_eq!(auth_one.sequence, 2);

    let auth_three = first.roll();
    assert_eq!(auth_three.sequence, 4);
    assert_ne!(auth_three.credential, auth_one.credential);
}

#[test]
fn sequence_increases_by_two_per_roll() {
    let mut chain = chain();

    for expected in [2u32, 4, 6, 8] {
        assert_eq!(chain.roll().sequence, expected);
    }
}

#[test]
fn return_authenticator_verification() {
    let mut member = chain();
    let mut controller = chain();

    let authenticator = member.roll();
    let mirrored = controller.roll();
    assert_eq!(authenticator, mirrored);

    // The controller answers with its own derived value.
    let return_authenticator = Authenticator {
        credential: controller.expected_return_credential(),
        sequence: mirrored.sequence + 1,
    };
    assert!(member.verify_return(&return_authenticator));

    let mut tampered = return_authenticator;
    tampered.credential[0] ^= 0xFF;
    assert!(!member.verify_return(&tampered));
}

#[test]
fn add_sequence_wraps_in_first_word() {
    let seed = [0xFF, 0xFF, 0xFF, 0xFF, 0xAA, 0xBB, 0xCC, 0xDD];
    let result = add_sequence(&seed, 1);

    assert_eq!(result[..4], [0x00, 0x00, 0x00, 0x00]);
    // The upper half of the seed never changes.
    assert_eq!(result[4..], seed[4..]);
}

struct UnreachableTransport;

impl RpcTransport for UnreachableTransport {
    fn transact(&mut self, _opnum: u16, _request: &[u8]) -> crate::Result<Vec<u8>> {
        Err(Error::new(ErrorKind::BadNetworkPath, "no route to controller"))
    }

    fn session_transport_key(&self) -> crate::Result<[u8; SESSION_KEY_SIZE]> {
        Ok([0x00; SESSION_KEY_SIZE])
    }
}

#[test]
fn unestablished_channel_rejects_calls() {
    let mut channel = SecureChannel::new(UnreachableTransport, "DC01", "SRV01");

    let err = channel
        .validate_logon(&DelegatedLogonRequest {
            domain: "CORP",
            user: "alice",
            workstation: "WS01",
            challenge: [0x00; 8],
            lm_response: &[],
            nt_response: &[],
        })
        .unwrap_err();

    assert_eq!(err.error_type, ErrorKind::NotReady);
}

#[test]
fn establish_surfaces_transport_failure() {
    let mut channel = SecureChannel::new(UnreachableTransport, "DC01", "SRV01");

    let err = channel.establish(&SECRET.into()).unwrap_err();

    assert_eq!(err.error_type, ErrorKind::BadNetworkPath);
}
