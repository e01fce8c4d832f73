//! Secure-Channel Credential Chain: the mutually-authenticated connection
//! between this domain member and a domain controller, carrying a rolling
//! credential that authenticates every delegated call.
//!
//! # MSDN
//!
//! * [[MS-NRPC]: Netlogon Remote Protocol](https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-nrpc/ff8f970f-3e37-40f7-bd4b-af7336e4792f)

pub mod calls;
pub mod credentials;
#[cfg(test)]
mod test;

use std::sync::Mutex;

use bitflags::bitflags;
use rand::rngs::OsRng;
use rand::RngCore;

pub use self::calls::TrustedDomain;
use self::calls::{
    DsrEnumerateDomainTrusts, LogonSamLogon, ServerAuthenticate2, ServerReqChallenge, NETWORK_LOGON_LEVEL,
};
pub use self::credentials::{compute_credential, compute_session_key, Authenticator, CredentialChain};
use crate::config::EngineConfig;
use crate::rpc::{invoke, invoke_raw, DcLocator, PipeConnector, RpcTransport};
use crate::secret::MachineAccountSecret;
use crate::{Error, ErrorKind, CHALLENGE_SIZE, SESSION_KEY_SIZE, STATUS_SUCCESS};

pub const NETLOGON_PIPE: &str = "netlogon";

bitflags! {
    /// Capability word negotiated by `ServerAuthenticate2`.
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct NegotiationFlags: u32 {
        const ACCOUNT_LOCKOUT = 0x0000_0001;
        const PERSISTENT_FULL_SYNC = 0x0000_0002;
        /// User session keys returned by delegated calls arrive RC4-encrypted
        /// under the chain session key.
        const KEY_EXCHANGE = 0x0000_0004;
        const BDC_CHANGELOG = 0x0000_0008;
        const FULL_SYNC_RESTART = 0x0000_0010;
        const MULTIPLE_SIDS = 0x0000_0020;
        const REDO = 0x0000_0040;
        const CHANGELOG_PASSWORD = 0x0000_0080;
        const STRONG_KEYS = 0x0000_4000;
        const TRANSITIVE_TRUSTS = 0x0000_8000;
    }
}

/// Flags the engine asks for; the controller answers with the subset it
/// supports.
pub const REQUESTED_NEGOTIATION_FLAGS: NegotiationFlags = NegotiationFlags::ACCOUNT_LOCKOUT
    .union(NegotiationFlags::KEY_EXCHANGE)
    .union(NegotiationFlags::STRONG_KEYS)
    .union(NegotiationFlags::TRANSITIVE_TRUSTS);

/// Trust-flags word for `DsrEnumerateDomainTrusts`: everything directly or
/// transitively trusted, in both directions, plus the member's own domain.
pub const TRUST_SCOPE_ALL: u32 = 0x0000_003F;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ChannelState {
    Unestablished,
    Challenged,
    Authenticated,
}

/// Parameters of one delegated logon-validation call.
#[derive(Debug)]
pub struct DelegatedLogonRequest<'a> {
    pub domain: &'a str,
    pub user: &'a str,
    pub workstation: &'a str,
    pub challenge: [u8; CHALLENGE_SIZE],
    pub lm_response: &'a [u8],
    pub nt_response: &'a [u8],
}

/// Result of a delegated logon validation. The session key is the raw
/// 16-byte key as returned by the controller; key-exchange decryption and
/// extended-security mixing are the orchestrator's responsibility, so the
/// chain's own session key rides along for that.
#[derive(Debug)]
pub struct DelegatedLogon {
    pub user_rid: u32,
    pub group_rid: u32,
    pub session_key: [u8; SESSION_KEY_SIZE],
    pub negotiated_flags: NegotiationFlags,
    pub chain_session_key: [u8; SESSION_KEY_SIZE],
}

/// One secure-channel session over a netlogon pipe connection.
/// `Unestablished -> Challenged -> Authenticated`, then rolled once per call.
pub struct SecureChannel<T: RpcTransport> {
    transport: T,
    server_name: String,
    computer_name: String,
    state: ChannelState,
    client_nonce: [u8; CHALLENGE_SIZE],
    server_nonce: [u8; CHALLENGE_SIZE],
    chain: Option<CredentialChain>,
    flags: NegotiationFlags,
}

impl<T: RpcTransport> SecureChannel<T> {
    pub fn new(transport: T, server_name: &str, computer_name: &str) -> Self {
        Self {
            transport,
            server_name: server_name.to_owned(),
            computer_name: computer_name.to_owned(),
            state: ChannelState::Unestablished,
            client_nonce: [0x00; CHALLENGE_SIZE],
            server_nonce: [0x00; CHALLENGE_SIZE],
            chain: None,
            flags: NegotiationFlags::empty(),
        }
    }

    pub fn negotiated_flags(&self) -> NegotiationFlags {
        self.flags
    }

    pub fn establish(&mut self, secret: &MachineAccountSecret) -> crate::Result<()> {
        self.challenge()?;
        self.authenticate(secret)
    }

    /// `Unestablished -> Challenged`: exchange random 8-byte nonces.
    fn challenge(&mut self) -> crate::Result<()> {
        if self.state != ChannelState::Unestablished {
            return Err(Error::new(ErrorKind::NotReady, "challenge exchange already performed"));
        }

        OsRng.fill_bytes(&mut self.client_nonce);

        let response = invoke(
            &mut self.transport,
            &ServerReqChallenge {
                server_name: self.server_name.clone(),
                computer_name: self.computer_name.clone(),
                client_nonce: self.client_nonce,
            },
        )?;

        self.server_nonce = response.server_nonce;
        self.state = ChannelState::Challenged;

        Ok(())
    }

    /// `Challenged -> Authenticated`: derive the initial chain, present the
    /// client credential and verify the controller's.
    fn authenticate(&mut self, secret: &MachineAccountSecret) -> crate::Result<()> {
        if self.state != ChannelState::Challenged {
            return Err(Error::new(ErrorKind::NotReady, "challenge exchange has not been performed"));
        }

        let chain = CredentialChain::new(secret.as_ref(), &self.client_nonce, &self.server_nonce)?;

        let response = invoke(
            &mut self.transport,
            &ServerAuthenticate2 {
                server_name: self.server_name.clone(),
                account_name: format!("{}$", self.computer_name),
                computer_name: self.computer_name.clone(),
                client_credential: *chain.client_credential(),
                negotiation_flags: REQUESTED_NEGOTIATION_FLAGS.bits(),
            },
        )?;

        if response.server_credential != *chain.server_credential() {
            warn!(server = %self.server_name, "controller presented a bad credential");

            return Err(Error::new(
                ErrorKind::TrustFailure,
                "domain controller failed credential verification",
            ));
        }

        self.flags = NegotiationFlags::from_bits_truncate(response.negotiation_flags);
        self.chain = Some(chain);
        self.state = ChannelState::Authenticated;

        debug!(server = %self.server_name, flags = ?self.flags, "secure channel established");

        Ok(())
    }

    fn chain_mut(&mut self) -> crate::Result<&mut CredentialChain> {
        if self.state != ChannelState::Authenticated {
            return Err(Error::new(ErrorKind::NotReady, "secure channel is not established"));
        }

        self.chain
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::NotReady, "secure channel is not established"))
    }

    /// Issues the delegated logon-validation call, rolling the chain first.
    /// A rejection verdict still carries a return authenticator, so the
    /// chain stays in step across ordinary logon failures; only a dead
    /// exchange or a credential mismatch poisons the channel.
    pub fn validate_logon(&mut self, request: &DelegatedLogonRequest<'_>) -> crate::Result<DelegatedLogon> {
        let server_name = self.server_name.clone();
        let computer_name = self.computer_name.clone();

        let chain = self.chain_mut()?;
        let authenticator = chain.roll();

        let call = LogonSamLogon {
            server_name,
            computer_name,
            authenticator,
            return_authenticator: Authenticator::default(),
            logon_level: NETWORK_LOGON_LEVEL,
            domain_name: request.domain.to_owned(),
            user_name: request.user.to_owned(),
            workstation: request.workstation.to_owned(),
            challenge: request.challenge,
            nt_response: request.nt_response.to_vec(),
            lm_response: request.lm_response.to_vec(),
            parameter_control: 0,
        };

        let response = match invoke_raw(&mut self.transport, &call) {
            Ok(response) => response,
            Err(err) => {
                // The exchange died mid-call; whether the controller rolled
                // its side is unknown.
                self.poison();

                return Err(err);
            }
        };

        let negotiated_flags = self.flags;
        let chain = self.chain_mut()?;
        let verified = chain.verify_return(&response.return_authenticator);
        let chain_session_key = *chain.session_key();

        if !verified {
            self.poison();

            return Err(Error::new(
                ErrorKind::TrustFailure,
                "controller return authenticator mismatch",
            ));
        }

        if response.status != STATUS_SUCCESS {
            return Err(Error::from_status(
                response.status,
                format!("controller rejected the logon with status 0x{:08X}", response.status),
            ));
        }

        Ok(DelegatedLogon {
            user_rid: response.user_rid,
            group_rid: response.group_rid,
            session_key: response.session_key,
            negotiated_flags,
            chain_session_key,
        })
    }

    /// Enumerates the controller's trusted domains. A secure-channel call
    /// like any other: the chain rolls exactly once for it.
    pub fn enumerate_trusts(&mut self, trust_flags: u32) -> crate::Result<Vec<TrustedDomain>> {
        let server_name = self.server_name.clone();

        let chain = self.chain_mut()?;
        let authenticator = chain.roll();

        let call = DsrEnumerateDomainTrusts {
            server_name,
            trust_flags,
            authenticator,
        };

        let response = match invoke_raw(&mut self.transport, &call) {
            Ok(response) => response,
            Err(err) => {
                self.poison();

                return Err(err);
            }
        };

        let chain = self.chain_mut()?;
        let verified = chain.verify_return(&response.return_authenticator);

        if !verified {
            self.poison();

            return Err(Error::new(
                ErrorKind::TrustFailure,
                "controller return authenticator mismatch",
            ));
        }

        if response.status != STATUS_SUCCESS {
            return Err(Error::from_status(
                response.status,
                format!("trust enumeration failed with status 0x{:08X}", response.status),
            ));
        }

        Ok(response.trusts)
    }

    fn is_established(&self) -> bool {
        self.state == ChannelState::Authenticated
    }

    /// Drops the chain back to `Unestablished`, forcing re-establishment on
    /// the next use.
    fn poison(&mut self) {
        self.state = ChannelState::Unestablished;
        self.chain = None;
        self.flags = NegotiationFlags::empty();
    }
}

struct ContextInner<T: RpcTransport> {
    open: bool,
    channel: Option<SecureChannel<T>>,
}

/// Owner of the cached domain-controller connection and its credential
/// chain. The chain's correctness is sequence-order dependent, so the whole
/// get-or-create plus roll-and-call sequence runs under one mutex: two
/// concurrent logons against the same controller are strictly ordered,
/// never interleaved mid-roll.
pub struct DomainTrustContext<C: PipeConnector, L: DcLocator> {
    connector: C,
    locator: L,
    domain_name: String,
    computer_name: String,
    secret: Option<MachineAccountSecret>,
    inner: Mutex<ContextInner<C::Transport>>,
}

impl<C: PipeConnector, L: DcLocator> DomainTrustContext<C, L> {
    pub fn new(connector: C, locator: L, config: &EngineConfig) -> Self {
        Self {
            connector,
            locator,
            domain_name: config.domain_name.clone(),
            computer_name: config.computer_name.clone(),
            secret: None,
            inner: Mutex::new(ContextInner {
                open: false,
                channel: None,
            }),
        }
    }

    /// Installs the machine-account secret established by a domain join.
    /// Read-only afterwards; overwritten only by a subsequent join.
    pub fn set_machine_secret(&mut self, secret: MachineAccountSecret) {
        self.secret = Some(secret);
    }

    pub fn clear_machine_secret(&mut self) {
        self.secret = None;
    }

    pub fn has_machine_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn open(&self) -> crate::Result<()> {
        let mut inner = self.lock()?;
        inner.open = true;

        Ok(())
    }

    /// Tears down the cached connection. Any later use reports `NotReady`
    /// until the context is opened again.
    pub fn close(&self) -> crate::Result<()> {
        let mut inner = self.lock()?;
        inner.open = false;
        inner.channel = None;

        Ok(())
    }

    /// Delegates one logon validation to the domain controller, holding the
    /// context lock across get-or-create, roll and call.
    pub fn validate_logon(&self, request: &DelegatedLogonRequest<'_>) -> crate::Result<DelegatedLogon> {
        let mut inner = self.lock()?;

        let result = self.with_channel(&mut inner, |channel| channel.validate_logon(request));
        Self::drop_poisoned_channel(&mut inner, &result);

        result
    }

    /// Enumerates domains trusted by the controller.
    pub fn enumerate_trusts(&self, trust_flags: u32) -> crate::Result<Vec<TrustedDomain>> {
        let mut inner = self.lock()?;

        let result = self.with_channel(&mut inner, |channel| channel.enumerate_trusts(trust_flags));
        Self::drop_poisoned_channel(&mut inner, &result);

        result
    }

    /// A channel that poisoned itself is out of step with the controller
    /// and must hand-shake afresh on the next use. A remote rejection
    /// leaves the chain in step; the connection stays cached.
    fn drop_poisoned_channel<R>(inner: &mut ContextInner<C::Transport>, result: &crate::Result<R>) {
        if result.is_err() && !inner.channel.as_ref().is_some_and(|channel| channel.is_established()) {
            inner.channel = None;
        }
    }

    fn with_channel<R>(
        &self,
        inner: &mut ContextInner<C::Transport>,
        operation: impl FnOnce(&mut SecureChannel<C::Transport>) -> crate::Result<R>,
    ) -> crate::Result<R> {
        if !inner.open {
            return Err(Error::new(ErrorKind::NotReady, "domain trust context is not open"));
        }

        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::NoTrustLsaSecret, "no machine account secret is provisioned"))?;

        if inner.channel.is_none() {
            let controller = self.locator.locate(&self.domain_name)?;
            debug!(domain = %self.domain_name, controller = %controller, "establishing secure channel");

            let transport = self.connector.open(&controller, NETLOGON_PIPE, None)?;
            let mut channel = SecureChannel::new(transport, &controller, &self.computer_name);
            channel.establish(secret)?;

            inner.channel = Some(channel);
        }

        let channel = inner
            .channel
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::NotReady, "secure channel is not established"))?;

        operation(channel)
    }

    fn lock(&self) -> crate::Result<std::sync::MutexGuard<'_, ContextInner<C::Transport>>> {
        self.inner
            .lock()
            .map_err(|_| Error::new(ErrorKind::Unsuccessful, "domain trust context lock is poisoned"))
    }
}
