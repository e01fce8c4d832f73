//! Typed request/response pairs for the netlogon pipe. Each request carries
//! its fixed operation number; [`crate::rpc::invoke`] is the single generic
//! dispatch over a pair.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::credentials::Authenticator;
use crate::rpc::{
    read_byte_vec, read_utf16_str, write_byte_vec, write_utf16_str, CallStatus, Decode, Encode, RemoteCall, Sid,
};
use crate::{CHALLENGE_SIZE, CREDENTIAL_SIZE, SESSION_KEY_SIZE};

/// Logon-level selector for delegated validation: network logon carries the
/// challenge and both raw responses.
pub const NETWORK_LOGON_LEVEL: u16 = 2;

impl Encode for Authenticator {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        writer.write_all(&self.credential)?;
        writer.write_u32::<LittleEndian>(self.sequence)?;

        Ok(())
    }
}

impl Decode for Authenticator {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let mut credential = [0x00; CREDENTIAL_SIZE];
        reader.read_exact(&mut credential)?;
        let sequence = reader.read_u32::<LittleEndian>()?;

        Ok(Self { credential, sequence })
    }
}

// === ServerReqChallenge (opnum 4) ===

#[derive(Debug, Clone)]
pub struct ServerReqChallenge {
    pub server_name: String,
    pub computer_name: String,
    pub client_nonce: [u8; CHALLENGE_SIZE],
}

#[derive(Debug, Clone)]
pub struct ServerReqChallengeResponse {
    pub server_nonce: [u8; CHALLENGE_SIZE],
    pub status: u32,
}

impl Encode for ServerReqChallenge {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        write_utf16_str(&self.server_name, &mut writer)?;
        write_utf16_str(&self.computer_name, &mut writer)?;
        writer.write_all(&self.client_nonce)?;

        Ok(())
    }
}

impl Decode for ServerReqChallenge {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let server_name = read_utf16_str(&mut reader)?;
        let computer_name = read_utf16_str(&mut reader)?;
        let mut client_nonce = [0x00; CHALLENGE_SIZE];
        reader.read_exact(&mut client_nonce)?;

        Ok(Self {
            server_name,
            computer_name,
            client_nonce,
        })
    }
}

impl Encode for ServerReqChallengeResponse {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        writer.write_all(&self.server_nonce)?;
        writer.write_u32::<LittleEndian>(self.status)?;

        Ok(())
    }
}

impl Decode for ServerReqChallengeResponse {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let mut server_nonce = [0x00; CHALLENGE_SIZE];
        reader.read_exact(&mut server_nonce)?;
        let status = reader.read_u32::<LittleEndian>()?;

        Ok(Self { server_nonce, status })
    }
}

impl CallStatus for ServerReqChallengeResponse {
    fn status(&self) -> u32 {
        self.status
    }
}

impl RemoteCall for ServerReqChallenge {
    const OPNUM: u16 = 4;
    type Response = ServerReqChallengeResponse;
}

// === ServerAuthenticate2 (opnum 15) ===

#[derive(Debug, Clone)]
pub struct ServerAuthenticate2 {
    pub server_name: String,
    /// `$`-suffixed computer account name.
    pub account_name: String,
    pub computer_name: String,
    pub client_credential: [u8; CREDENTIAL_SIZE],
    pub negotiation_flags: u32,
}

#[derive(Debug, Clone)]
pub struct ServerAuthenticate2Response {
    pub server_credential: [u8; CREDENTIAL_SIZE],
    pub negotiation_flags: u32,
    pub status: u32,
}

impl Encode for ServerAuthenticate2 {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        write_utf16_str(&self.server_name, &mut writer)?;
        write_utf16_str(&self.account_name, &mut writer)?;
        write_utf16_str(&self.computer_name, &mut writer)?;
        writer.write_all(&self.client_credential)?;
        writer.write_u32::<LittleEndian>(self.negotiation_flags)?;

        Ok(())
    }
}

impl Decode for ServerAuthenticate2 {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let server_name = read_utf16_str(&mut reader)?;
        let account_name = read_utf16_str(&mut reader)?;
        let computer_name = read_utf16_str(&mut reader)?;
        let mut client_credential = [0x00; CREDENTIAL_SIZE];
        reader.read_exact(&mut client_credential)?;
        let negotiation_flags = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            server_name,
            account_name,
            computer_name,
            client_credential,
            negotiation_flags,
        })
    }
}

impl Encode for ServerAuthenticate2Response {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        writer.write_all(&self.server_credential)?;
        writer.write_u32::<LittleEndian>(self.negotiation_flags)?;
        writer.write_u32::<LittleEndian>(self.status)?;

        Ok(())
    }
}

impl Decode for ServerAuthenticate2Response {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let mut server_credential = [0x00; CREDENTIAL_SIZE];
        reader.read_exact(&mut server_credential)?;
        let negotiation_flags = reader.read_u32::<LittleEndian>()?;
        let status = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            server_credential,
            negotiation_flags,
            status,
        })
    }
}

impl CallStatus for ServerAuthenticate2Response {
    fn status(&self) -> u32 {
        self.status
    }
}

impl RemoteCall for ServerAuthenticate2 {
    const OPNUM: u16 = 15;
    type Response = ServerAuthenticate2Response;
}

// === LogonSamLogon (opnum 2) ===

#[derive(Debug, Clone)]
pub struct LogonSamLogon {
    pub server_name: String,
    pub computer_name: String,
    pub authenticator: Authenticator,
    /// Zeroed on send; the controller fills in its return credential.
    pub return_authenticator: Authenticator,
    pub logon_level: u16,
    pub domain_name: String,
    pub user_name: String,
    pub workstation: String,
    pub challenge: [u8; CHALLENGE_SIZE],
    pub nt_response: Vec<u8>,
    pub lm_response: Vec<u8>,
    pub parameter_control: u32,
}

#[derive(Debug, Clone)]
pub struct LogonSamLogonResponse {
    pub return_authenticator: Authenticator,
    pub user_rid: u32,
    pub group_rid: u32,
    /// RC4-encrypted under the chain session key when key exchange was
    /// negotiated.
    pub session_key: [u8; SESSION_KEY_SIZE],
    pub status: u32,
}

impl Encode for LogonSamLogon {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        write_utf16_str(&self.server_name, &mut writer)?;
        write_utf16_str(&self.computer_name, &mut writer)?;
        self.authenticator.encode(&mut writer)?;
        self.return_authenticator.encode(&mut writer)?;
        writer.write_u16::<LittleEndian>(self.logon_level)?;
        write_utf16_str(&self.domain_name, &mut writer)?;
        write_utf16_str(&self.user_name, &mut writer)?;
        write_utf16_str(&self.workstation, &mut writer)?;
        writer.write_all(&self.challenge)?;
        write_byte_vec(&self.nt_response, &mut writer)?;
        write_byte_vec(&self.lm_response, &mut writer)?;
        writer.write_u32::<LittleEndian>(self.parameter_control)?;

        Ok(())
    }
}

impl Decode for LogonSamLogon {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let server_name = read_utf16_str(&mut reader)?;
        let computer_name = read_utf16_str(&mut reader)?;
        let authenticator = Authenticator::decode(&mut reader)?;
        let return_authenticator = Authenticator::decode(&mut reader)?;
        let logon_level = reader.read_u16::<LittleEndian>()?;
        let domain_name = read_utf16_str(&mut reader)?;
        let user_name = read_utf16_str(&mut reader)?;
        let workstation = read_utf16_str(&mut reader)?;
        let mut challenge = [0x00; CHALLENGE_SIZE];
        reader.read_exact(&mut challenge)?;
        let nt_response = read_byte_vec(&mut reader)?;
        let lm_response = read_byte_vec(&mut reader)?;
        let parameter_control = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            server_name,
            computer_name,
            authenticator,
            return_authenticator,
            logon_level,
            domain_name,
            user_name,
            workstation,
            challenge,
            nt_response,
            lm_response,
            parameter_control,
        })
    }
}

impl Encode for LogonSamLogonResponse {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.return_authenticator.encode(&mut writer)?;
        writer.write_u32::<LittleEndian>(self.user_rid)?;
        writer.write_u32::<LittleEndian>(self.group_rid)?;
        writer.write_all(&self.session_key)?;
        writer.write_u32::<LittleEndian>(self.status)?;

        Ok(())
    }
}

impl Decode for LogonSamLogonResponse {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let return_authenticator = Authenticator::decode(&mut reader)?;
        let user_rid = reader.read_u32::<LittleEndian>()?;
        let group_rid = reader.read_u32::<LittleEndian>()?;
        let mut session_key = [0x00; SESSION_KEY_SIZE];
        reader.read_exact(&mut session_key)?;
        let status = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            return_authenticator,
            user_rid,
            group_rid,
            session_key,
            status,
        })
    }
}

impl CallStatus for LogonSamLogonResponse {
    fn status(&self) -> u32 {
        self.status
    }
}

impl RemoteCall for LogonSamLogon {
    const OPNUM: u16 = 2;
    type Response = LogonSamLogonResponse;
}

// === DsrEnumerateDomainTrusts (opnum 40) ===

#[derive(Debug, Clone)]
pub struct DsrEnumerateDomainTrusts {
    pub server_name: String,
    pub trust_flags: u32,
    pub authenticator: Authenticator,
}

/// One trusted domain: NetBIOS and DNS names plus the domain SID.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TrustedDomain {
    pub netbios_name: String,
    pub dns_name: String,
    pub sid: Sid,
}

#[derive(Debug, Clone)]
pub struct DsrEnumerateDomainTrustsResponse {
    pub return_authenticator: Authenticator,
    pub trusts: Vec<TrustedDomain>,
    pub status: u32,
}

impl Encode for DsrEnumerateDomainTrusts {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        write_utf16_str(&self.server_name, &mut writer)?;
        writer.write_u32::<LittleEndian>(self.trust_flags)?;
        self.authenticator.encode(&mut writer)?;

        Ok(())
    }
}

impl Decode for DsrEnumerateDomainTrusts {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let server_name = read_utf16_str(&mut reader)?;
        let trust_flags = reader.read_u32::<LittleEndian>()?;
        let authenticator = Authenticator::decode(&mut reader)?;

        Ok(Self {
            server_name,
            trust_flags,
            authenticator,
        })
    }
}

impl Encode for TrustedDomain {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        write_utf16_str(&self.netbios_name, &mut writer)?;
        write_utf16_str(&self.dns_name, &mut writer)?;
        self.sid.encode(&mut writer)?;

        Ok(())
    }
}

impl Decode for TrustedDomain {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let netbios_name = read_utf16_str(&mut reader)?;
        let dns_name = read_utf16_str(&mut reader)?;
        let sid = Sid::decode(&mut reader)?;

        Ok(Self {
            netbios_name,
            dns_name,
            sid,
        })
    }
}

impl Encode for DsrEnumerateDomainTrustsResponse {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.return_authenticator.encode(&mut writer)?;
        writer.write_u32::<LittleEndian>(u32::try_from(self.trusts.len()).map_err(|_| {
            crate::Error::new(
                crate::ErrorKind::BufferTooSmall,
                format!("too many trusted domains: {}", self.trusts.len()),
            )
        })?)?;
        for trust in &self.trusts {
            trust.encode(&mut writer)?;
        }
        writer.write_u32::<LittleEndian>(self.status)?;

        Ok(())
    }
}

impl Decode for DsrEnumerateDomainTrustsResponse {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let return_authenticator = Authenticator::decode(&mut reader)?;
        let count = reader.read_u32::<LittleEndian>()? as usize;

        let mut trusts = Vec::with_capacity(count);
        for _ in 0..count {
            trusts.push(TrustedDomain::decode(&mut reader)?);
        }
        let status = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            return_authenticator,
            trusts,
            status,
        })
    }
}

impl CallStatus for DsrEnumerateDomainTrustsResponse {
    fn status(&self) -> u32 {
        self.status
    }
}

impl RemoteCall for DsrEnumerateDomainTrusts {
    const OPNUM: u16 = 40;
    type Response = DsrEnumerateDomainTrustsResponse;
}
