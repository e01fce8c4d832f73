//! Pass-Through Logon Orchestrator: decides per attempt whether to delegate
//! validation to the domain controller over the secure channel or to match
//! against the local credential store, and derives the final session key.

use tracing::instrument;

use crate::config::{EngineConfig, ServerRole};
use crate::crypto::{compute_hmac_md5, Rc4};
use crate::netlogon::{DelegatedLogon, DelegatedLogonRequest, DomainTrustContext, NegotiationFlags};
use crate::ntlm::{self, AuthenticationDescriptor};
use crate::rpc::{DcLocator, PipeConnector};
use crate::secret::SessionKey;
use crate::store::CredentialStore;
use crate::utils::validate_netbios_name;
use crate::{Error, ErrorKind, CHALLENGE_SIZE, SESSION_KEY_SIZE};

/// Primary group RID assigned to locally matched users.
pub const DOMAIN_GROUP_RID_USERS: u32 = 513;

/// One inbound logon attempt.
#[derive(Debug)]
pub struct LogonRequest<'a> {
    pub domain: &'a str,
    pub user: &'a str,
    pub workstation: &'a str,
    pub challenge: [u8; CHALLENGE_SIZE],
    pub lm_response: &'a [u8],
    pub nt_response: &'a [u8],
    /// Whether NTLM2 extended session security was negotiated on the
    /// connection this attempt arrived over.
    pub extended_security: bool,
    /// Session key the client negotiated itself, only meaningful when the
    /// secure channel negotiated key exchange.
    pub candidate_session_key: Option<[u8; SESSION_KEY_SIZE]>,
    /// Whether pass-through delegation is administratively enabled for this
    /// connection.
    pub delegation_enabled: bool,
}

/// Final authentication verdict for a successful attempt.
#[derive(Debug)]
pub struct SessionInfo {
    pub rid: u32,
    pub group_rid: u32,
    pub guest: bool,
    pub session_key: SessionKey,
}

/// Validates one logon attempt. Delegates to the domain controller when the
/// configuration, the presented domain and the connection allow it; any
/// delegation failure falls back to local matching silently, and only if
/// that also fails does the caller see a single logon failure.
#[instrument(level = "debug", skip_all, fields(user = request.user, domain = request.domain))]
pub fn logon<C: PipeConnector, L: DcLocator>(
    config: &EngineConfig,
    store: &dyn CredentialStore,
    trust: &DomainTrustContext<C, L>,
    request: &LogonRequest<'_>,
) -> crate::Result<SessionInfo> {
    // Name validation comes first so that a bad name never reaches the
    // wire. Both fields may be empty: clients routinely omit the
    // workstation, and an empty domain targets the local store.
    if !request.workstation.is_empty() {
        validate_netbios_name(request.workstation)?;
    }
    if !request.domain.is_empty() {
        validate_netbios_name(request.domain)?;
    }

    if should_delegate(config, trust, request) {
        match delegate(trust, request) {
            Ok(session) => return Ok(session),
            Err(err) => {
                // Recovered locally; the caller never sees the delegation
                // error unless local matching fails too.
                warn!(error = %err, "pass-through validation failed, falling back to local matching");
            }
        }
    }

    local_logon(config, store, request)
}

fn should_delegate<C: PipeConnector, L: DcLocator>(
    config: &EngineConfig,
    trust: &DomainTrustContext<C, L>,
    request: &LogonRequest<'_>,
) -> bool {
    if config.role != ServerRole::DomainMember {
        return false;
    }

    if !request.delegation_enabled {
        debug!("delegation disabled for this connection");
        return false;
    }

    // A domain naming this host targets the local account store.
    if request.domain.is_empty() || request.domain.eq_ignore_ascii_case(&config.computer_name) {
        return false;
    }

    if !trust.has_machine_secret() {
        debug!("no machine account secret provisioned, skipping delegation");
        return false;
    }

    true
}

fn delegate<C: PipeConnector, L: DcLocator>(
    trust: &DomainTrustContext<C, L>,
    request: &LogonRequest<'_>,
) -> crate::Result<SessionInfo> {
    let delegated = trust.validate_logon(&DelegatedLogonRequest {
        domain: request.domain,
        user: request.user,
        workstation: request.workstation,
        challenge: request.challenge,
        lm_response: request.lm_response,
        nt_response: request.nt_response,
    })?;

    let session_key = finalize_session_key(&delegated, request)?;

    debug!(rid = delegated.user_rid, "pass-through validation succeeded");

    Ok(SessionInfo {
        rid: delegated.user_rid,
        group_rid: delegated.group_rid,
        guest: false,
        session_key,
    })
}

/// Post-processes the controller-returned key, in this order: the extended
/// session security mix over the connection's session nonce, then the
/// key-exchange step that decrypts under the chain session key. When the
/// client negotiated its own key, that candidate replaces the delegated
/// key entirely.
fn finalize_session_key(delegated: &DelegatedLogon, request: &LogonRequest<'_>) -> crate::Result<SessionKey> {
    let mut key = delegated.session_key;

    if request.extended_security && request.lm_response.len() >= CHALLENGE_SIZE {
        let mut session_nonce = [0x00; CHALLENGE_SIZE * 2];
        session_nonce[..CHALLENGE_SIZE].copy_from_slice(&request.challenge);
        session_nonce[CHALLENGE_SIZE..].copy_from_slice(&request.lm_response[..CHALLENGE_SIZE]);

        key = compute_hmac_md5(&key, &session_nonce)?;
    }

    if delegated.negotiated_flags.contains(NegotiationFlags::KEY_EXCHANGE) {
        let mut cipher = Rc4::new(&delegated.chain_session_key);
        let processed = match request.candidate_session_key {
            Some(candidate) => cipher.process(&candidate),
            None => cipher.process(&key),
        };

        key.copy_from_slice(&processed);
    }

    Ok(SessionKey::new(key))
}

fn local_logon(
    config: &EngineConfig,
    store: &dyn CredentialStore,
    request: &LogonRequest<'_>,
) -> crate::Result<SessionInfo> {
    let mut descriptor = AuthenticationDescriptor::new(request.lm_response, request.nt_response);

    let local = ntlm::authenticate(
        store,
        config.policy,
        request.domain,
        request.user,
        &request.challenge,
        &mut descriptor,
    )
    .map_err(|_| Error::new(ErrorKind::LogonFailure, "logon failure"))?;

    debug!(rid = local.rid, method = ?local.method, "local matching succeeded");

    Ok(SessionInfo {
        rid: local.rid,
        group_rid: DOMAIN_GROUP_RID_USERS,
        guest: local.guest,
        session_key: local.session_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlogon::DelegatedLogon;

    fn delegated(flags: NegotiationFlags) -> DelegatedLogon {
        DelegatedLogon {
            user_rid: 1104,
            group_rid: 513,
            session_key: [0x11; 16],
            negotiated_flags: flags,
            chain_session_key: [0x77; 16],
        }
    }

    fn request(candidate: Option<[u8; 16]>, extended_security: bool) -> LogonRequest<'static> {
        LogonRequest {
            domain: "CORP",
            user: "alice",
            workstation: "WS01",
            challenge: [0x01; 8],
            lm_response: &[0xAB; 24],
            nt_response: &[0xCD; 24],
            extended_security,
            candidate_session_key: candidate,
            delegation_enabled: true,
        }
    }

    #[test]
    fn plain_key_passes_through_untouched() {
        let key = finalize_session_key(&delegated(NegotiationFlags::empty()), &request(None, false)).unwrap();

        assert_eq!(key.as_bytes(), &[0x11; 16]);
    }

    #[test]
    fn key_exchange_replaces_delegated_key_with_candidate() {
        let candidate = [0x42; 16];
        let key = finalize_session_key(
            &delegated(NegotiationFlags::KEY_EXCHANGE),
            &request(Some(candidate), false),
        )
        .unwrap();

        let expected = Rc4::new(&[0x77; 16]).process(&candidate);
        assert_eq!(key.as_bytes()[..], expected[..]);
    }

    #[test]
    fn key_exchange_without_candidate_decrypts_in_place() {
        let key = finalize_session_key(&delegated(NegotiationFlags::KEY_EXCHANGE), &request(None, false)).unwrap();

        let expected = Rc4::new(&[0x77; 16]).process(&[0x11; 16]);
        assert_eq!(key.as_bytes()[..], expected[..]);
    }

    #[test]
    fn extended_security_mix_precedes_key_exchange() {
        let req = request(None, true);
        let key = finalize_session_key(&delegated(NegotiationFlags::KEY_EXCHANGE), &req).unwrap();

        let mut session_nonce = [0x00; 16];
        session_nonce[..8].copy_from_slice(&req.challenge);
        session_nonce[8..].copy_from_slice(&req.lm_response[..8]);
        let mixed = compute_hmac_md5(&[0x11; 16], &session_nonce).unwrap();
        let expected = Rc4::new(&[0x77; 16]).process(&mixed);

        assert_eq!(key.as_bytes()[..], expected[..]);
    }
}
