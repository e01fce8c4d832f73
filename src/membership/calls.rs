//! Typed request/response pairs for the account-management (SAMR) pipe.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::rpc::{read_byte_vec, read_utf16_str, write_byte_vec, write_utf16_str, CallStatus, Decode, Encode, RemoteCall, RpcHandle, Sid};

/// Password set buffer: 512 bytes of right-aligned UTF-16LE password plus a
/// trailing length word, RC4-encrypted under the pipe session's key.
pub const PASSWORD_BUFFER_SIZE: usize = 516;

/// `SetUserInfo` information level carrying the encrypted password buffer.
pub const USER_INFO_PASSWORD: u16 = 24;
/// `SetUserInfo` information level carrying the account control word.
pub const USER_INFO_CONTROL: u16 = 16;

/// Workstation-trust account control bit.
pub const ACB_WSTRUST: u32 = 0x0000_0080;

pub const MAXIMUM_ALLOWED: u32 = 0x0200_0000;

// === Connect (opnum 0) ===

#[derive(Debug, Clone)]
pub struct SamrConnect {
    pub server_name: String,
    pub desired_access: u32,
}

#[derive(Debug, Clone)]
pub struct SamrHandleResponse {
    pub handle: RpcHandle,
    pub status: u32,
}

impl Encode for SamrConnect {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        write_utf16_str(&self.server_name, &mut writer)?;
        writer.write_u32::<LittleEndian>(self.desired_access)?;

        Ok(())
    }
}

impl Decode for SamrConnect {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let server_name = read_utf16_str(&mut reader)?;
        let desired_access = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            server_name,
            desired_access,
        })
    }
}

impl Encode for SamrHandleResponse {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.handle.encode(&mut writer)?;
        writer.write_u32::<LittleEndian>(self.status)?;

        Ok(())
    }
}

impl Decode for SamrHandleResponse {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let handle = RpcHandle::decode(&mut reader)?;
        let status = reader.read_u32::<LittleEndian>()?;

        Ok(Self { handle, status })
    }
}

impl CallStatus for SamrHandleResponse {
    fn status(&self) -> u32 {
        self.status
    }
}

impl RemoteCall for SamrConnect {
    const OPNUM: u16 = 0;
    type Response = SamrHandleResponse;
}

// === Close (opnum 1) ===

#[derive(Debug, Clone)]
pub struct SamrClose {
    pub handle: RpcHandle,
}

#[derive(Debug, Clone)]
pub struct SamrStatusResponse {
    pub status: u32,
}

impl Encode for SamrClose {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.handle.encode(&mut writer)?;

        Ok(())
    }
}

impl Decode for SamrClose {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        Ok(Self {
            handle: RpcHandle::decode(&mut reader)?,
        })
    }
}

impl Encode for SamrStatusResponse {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        writer.write_u32::<LittleEndian>(self.status)?;

        Ok(())
    }
}

impl Decode for SamrStatusResponse {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        Ok(Self {
            status: reader.read_u32::<LittleEndian>()?,
        })
    }
}

impl CallStatus for SamrStatusResponse {
    fn status(&self) -> u32 {
        self.status
    }
}

impl RemoteCall for SamrClose {
    const OPNUM: u16 = 1;
    type Response = SamrStatusResponse;
}

// === LookupDomain (opnum 5) ===

#[derive(Debug, Clone)]
pub struct SamrLookupDomain {
    pub server_handle: RpcHandle,
    pub domain_name: String,
}

#[derive(Debug, Clone)]
pub struct SamrLookupDomainResponse {
    pub sid: Sid,
    pub status: u32,
}

impl Encode for SamrLookupDomain {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.server_handle.encode(&mut writer)?;
        write_utf16_str(&self.domain_name, &mut writer)?;

        Ok(())
    }
}

impl Decode for SamrLookupDomain {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let server_handle = RpcHandle::decode(&mut reader)?;
        let domain_name = read_utf16_str(&mut reader)?;

        Ok(Self {
            server_handle,
            domain_name,
        })
    }
}

impl Encode for SamrLookupDomainResponse {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.sid.encode(&mut writer)?;
        writer.write_u32::<LittleEndian>(self.status)?;

        Ok(())
    }
}

impl Decode for SamrLookupDomainResponse {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let sid = Sid::decode(&mut reader)?;
        let status = reader.read_u32::<LittleEndian>()?;

        Ok(Self { sid, status })
    }
}

impl CallStatus for SamrLookupDomainResponse {
    fn status(&self) -> u32 {
        self.status
    }
}

impl RemoteCall for SamrLookupDomain {
    const OPNUM: u16 = 5;
    type Response = SamrLookupDomainResponse;
}

// === OpenDomain (opnum 7) ===

#[derive(Debug, Clone)]
pub struct SamrOpenDomain {
    pub server_handle: RpcHandle,
    pub desired_access: u32,
    pub sid: Sid,
}

impl Encode for SamrOpenDomain {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.server_handle.encode(&mut writer)?;
        writer.write_u32::<LittleEndian>(self.desired_access)?;
        self.sid.encode(&mut writer)?;

        Ok(())
    }
}

impl Decode for SamrOpenDomain {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let server_handle = RpcHandle::decode(&mut reader)?;
        let desired_access = reader.read_u32::<LittleEndian>()?;
        let sid = Sid::decode(&mut reader)?;

        Ok(Self {
            server_handle,
            desired_access,
            sid,
        })
    }
}

impl RemoteCall for SamrOpenDomain {
    const OPNUM: u16 = 7;
    type Response = SamrHandleResponse;
}

// === CreateUser (opnum 12) ===

#[derive(Debug, Clone)]
pub struct SamrCreateUser {
    pub domain_handle: RpcHandle,
    pub account_name: String,
    pub account_type: u32,
    pub desired_access: u32,
}

#[derive(Debug, Clone)]
pub struct SamrCreateUserResponse {
    pub handle: RpcHandle,
    pub rid: u32,
    pub status: u32,
}

impl Encode for SamrCreateUser {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.domain_handle.encode(&mut writer)?;
        write_utf16_str(&self.account_name, &mut writer)?;
        writer.write_u32::<LittleEndian>(self.account_type)?;
        writer.write_u32::<LittleEndian>(self.desired_access)?;

        Ok(())
    }
}

impl Decode for SamrCreateUser {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let domain_handle = RpcHandle::decode(&mut reader)?;
        let account_name = read_utf16_str(&mut reader)?;
        let account_type = reader.read_u32::<LittleEndian>()?;
        let desired_access = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            domain_handle,
            account_name,
            account_type,
            desired_access,
        })
    }
}

impl Encode for SamrCreateUserResponse {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.handle.encode(&mut writer)?;
        writer.write_u32::<LittleEndian>(self.rid)?;
        writer.write_u32::<LittleEndian>(self.status)?;

        Ok(())
    }
}

impl Decode for SamrCreateUserResponse {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let handle = RpcHandle::decode(&mut reader)?;
        let rid = reader.read_u32::<LittleEndian>()?;
        let status = reader.read_u32::<LittleEndian>()?;

        Ok(Self { handle, rid, status })
    }
}

impl CallStatus for SamrCreateUserResponse {
    fn status(&self) -> u32 {
        self.status
    }
}

impl RemoteCall for SamrCreateUser {
    const OPNUM: u16 = 12;
    type Response = SamrCreateUserResponse;
}

// === LookupNames (opnum 17) ===

#[derive(Debug, Clone)]
pub struct SamrLookupNames {
    pub domain_handle: RpcHandle,
    pub account_name: String,
}

#[derive(Debug, Clone)]
pub struct SamrLookupNamesResponse {
    pub rid: u32,
    pub status: u32,
}

impl Encode for SamrLookupNames {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.domain_handle.encode(&mut writer)?;
        write_utf16_str(&self.account_name, &mut writer)?;

        Ok(())
    }
}

impl Decode for SamrLookupNames {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let domain_handle = RpcHandle::decode(&mut reader)?;
        let account_name = read_utf16_str(&mut reader)?;

        Ok(Self {
            domain_handle,
            account_name,
        })
    }
}

impl Encode for SamrLookupNamesResponse {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        writer.write_u32::<LittleEndian>(self.rid)?;
        writer.write_u32::<LittleEndian>(self.status)?;

        Ok(())
    }
}

impl Decode for SamrLookupNamesResponse {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let rid = reader.read_u32::<LittleEndian>()?;
        let status = reader.read_u32::<LittleEndian>()?;

        Ok(Self { rid, status })
    }
}

impl CallStatus for SamrLookupNamesResponse {
    fn status(&self) -> u32 {
        self.status
    }
}

impl RemoteCall for SamrLookupNames {
    const OPNUM: u16 = 17;
    type Response = SamrLookupNamesResponse;
}

// === OpenUser (opnum 34) ===

#[derive(Debug, Clone)]
pub struct SamrOpenUser {
    pub domain_handle: RpcHandle,
    pub desired_access: u32,
    pub rid: u32,
}

impl Encode for SamrOpenUser {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.domain_handle.encode(&mut writer)?;
        writer.write_u32::<LittleEndian>(self.desired_access)?;
        writer.write_u32::<LittleEndian>(self.rid)?;

        Ok(())
    }
}

impl Decode for SamrOpenUser {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let domain_handle = RpcHandle::decode(&mut reader)?;
        let desired_access = reader.read_u32::<LittleEndian>()?;
        let rid = reader.read_u32::<LittleEndian>()?;

        Ok(Self {
            domain_handle,
            desired_access,
            rid,
        })
    }
}

impl RemoteCall for SamrOpenUser {
    const OPNUM: u16 = 34;
    type Response = SamrHandleResponse;
}

// === DeleteUser (opnum 35) ===

#[derive(Debug, Clone)]
pub struct SamrDeleteUser {
    pub user_handle: RpcHandle,
}

impl Encode for SamrDeleteUser {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.user_handle.encode(&mut writer)?;

        Ok(())
    }
}

impl Decode for SamrDeleteUser {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        Ok(Self {
            user_handle: RpcHandle::decode(&mut reader)?,
        })
    }
}

impl RemoteCall for SamrDeleteUser {
    const OPNUM: u16 = 35;
    type Response = SamrStatusResponse;
}

// === SetUserInfo (opnum 37) ===

#[derive(Debug, Clone)]
pub struct SamrSetUserInfo {
    pub user_handle: RpcHandle,
    pub level: u16,
    pub data: Vec<u8>,
}

impl Encode for SamrSetUserInfo {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        self.user_handle.encode(&mut writer)?;
        writer.write_u16::<LittleEndian>(self.level)?;
        write_byte_vec(&self.data, &mut writer)?;

        Ok(())
    }
}

impl Decode for SamrSetUserInfo {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let user_handle = RpcHandle::decode(&mut reader)?;
        let level = reader.read_u16::<LittleEndian>()?;
        let data = read_byte_vec(&mut reader)?;

        Ok(Self {
            user_handle,
            level,
            data,
        })
    }
}

impl RemoteCall for SamrSetUserInfo {
    const OPNUM: u16 = 37;
    type Response = SamrStatusResponse;
}
