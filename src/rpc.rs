//! Wire seams for the remote-procedure calls the engine issues. The pipe
//! transport, pipe-connect machinery and controller location are external
//! collaborators consumed through the traits below; this module only fixes
//! the typed request/response shape of each call and a generic `invoke`.

use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::secret::Secret;
use crate::utils::{bytes_to_utf16_string, string_to_utf16};
use crate::{Error, ErrorKind, SESSION_KEY_SIZE, STATUS_SUCCESS};

pub const HANDLE_SIZE: usize = 20;

pub trait Encode {
    fn encode(&self, writer: impl Write) -> crate::Result<()>;
}

pub trait EncodeExt: Encode {
    fn encode_to_vec(&self) -> crate::Result<Vec<u8>> {
        let mut buf = Vec::new();

        self.encode(&mut buf)?;

        Ok(buf)
    }
}

impl<T: Encode> EncodeExt for T {}

pub trait Decode: Sized {
    fn decode(reader: impl Read) -> crate::Result<Self>;
}

/// One remote call: the request type carries the fixed operation number and
/// names its response type. Responses expose their trailing status word so
/// `invoke` can surface remote failures uniformly.
pub trait RemoteCall: Encode {
    const OPNUM: u16;
    type Response: Decode + CallStatus;
}

pub trait CallStatus {
    fn status(&self) -> u32;
}

/// Issues one remote call over the transport: marshal, transact, unmarshal,
/// map a non-zero remote status word onto the error taxonomy. The transport
/// may fragment the exchange into several round-trips internally.
pub fn invoke<C: RemoteCall>(transport: &mut dyn RpcTransport, call: &C) -> crate::Result<C::Response> {
    let response = invoke_raw(transport, call)?;

    let status = response.status();
    if status != STATUS_SUCCESS {
        return Err(Error::from_status(
            status,
            format!("remote call {} failed with status 0x{:08X}", C::OPNUM, status),
        ));
    }

    Ok(response)
}

/// Like [`invoke`], but hands the decoded response back even when the
/// remote status word is non-zero, for calls whose response carries state
/// the caller must consume before acting on the failure.
pub fn invoke_raw<C: RemoteCall>(transport: &mut dyn RpcTransport, call: &C) -> crate::Result<C::Response> {
    let request = call.encode_to_vec()?;
    let raw = transport.transact(C::OPNUM, &request)?;

    C::Response::decode(raw.as_slice())
}

/// A blocking request/response exchange over a pre-established pipe
/// connection owned by the caller's session.
pub trait RpcTransport {
    fn transact(&mut self, opnum: u16, request: &[u8]) -> crate::Result<Vec<u8>>;

    /// Key material of the underlying pipe session, consumed when a call
    /// must encrypt a payload under the transport (SAMR password set).
    fn session_transport_key(&self) -> crate::Result<[u8; SESSION_KEY_SIZE]>;
}

/// Opens a named pipe on a remote server, optionally authenticating the
/// connection with explicit administrator credentials.
pub trait PipeConnector {
    type Transport: RpcTransport;

    fn open(&self, server: &str, pipe: &str, credentials: Option<&AdminCredentials>) -> crate::Result<Self::Transport>;
}

/// Resolves the domain controller for a domain. Resolution is performed
/// fresh on each domain operation; nothing here is cached.
pub trait DcLocator {
    fn locate(&self, domain: &str) -> crate::Result<String>;
}

/// Administrator identity used transiently for domain join/leave. Threaded
/// through the calls explicitly instead of living in process-wide state.
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub domain: String,
    pub password: Secret<String>,
}

impl AdminCredentials {
    pub fn new(username: &str, domain: &str, password: &str) -> Self {
        Self {
            username: username.to_owned(),
            domain: domain.to_owned(),
            password: Secret::new(password.to_owned()),
        }
    }
}

/// Opaque 20-byte policy handle returned by account-management calls.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct RpcHandle(pub [u8; HANDLE_SIZE]);

impl Encode for RpcHandle {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        writer.write_all(&self.0)?;

        Ok(())
    }
}

impl Decode for RpcHandle {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let mut handle = [0x00; HANDLE_SIZE];
        reader.read_exact(&mut handle)?;

        Ok(Self(handle))
    }
}

/// Binary security identifier: revision, sub-authority count, a 6-byte
/// big-endian authority and the little-endian sub-authority words.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Sid {
    pub revision: u8,
    pub identifier_authority: [u8; 6],
    pub sub_authorities: Vec<u32>,
}

impl Sid {
    pub fn new(identifier_authority: [u8; 6], sub_authorities: Vec<u32>) -> Self {
        Self {
            revision: 1,
            identifier_authority,
            sub_authorities,
        }
    }

    /// The RID is the last sub-authority of an account SID.
    pub fn rid(&self) -> Option<u32> {
        self.sub_authorities.last().copied()
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut authority = [0x00; 8];
        authority[2..].copy_from_slice(&self.identifier_authority);
        write!(f, "S-{}-{}", self.revision, u64::from_be_bytes(authority))?;

        for sub_authority in &self.sub_authorities {
            write!(f, "-{}", sub_authority)?;
        }

        Ok(())
    }
}

impl Encode for Sid {
    fn encode(&self, mut writer: impl Write) -> crate::Result<()> {
        writer.write_u8(self.revision)?;
        writer.write_u8(u8::try_from(self.sub_authorities.len()).map_err(|_| {
            Error::new(
                ErrorKind::InvalidParameter,
                format!("too many SID sub-authorities: {}", self.sub_authorities.len()),
            )
        })?)?;
        writer.write_all(&self.identifier_authority)?;

        for sub_authority in &self.sub_authorities {
            writer.write_u32::<LittleEndian>(*sub_authority)?;
        }

        Ok(())
    }
}

impl Decode for Sid {
    fn decode(mut reader: impl Read) -> crate::Result<Self> {
        let revision = reader.read_u8()?;
        let count = reader.read_u8()? as usize;

        let mut identifier_authority = [0x00; 6];
        reader.read_exact(&mut identifier_authority)?;

        let mut sub_authorities = Vec::with_capacity(count);
        for _ in 0..count {
            sub_authorities.push(reader.read_u32::<LittleEndian>()?);
        }

        Ok(Self {
            revision,
            identifier_authority,
            sub_authorities,
        })
    }
}

pub fn write_utf16_str(value: &str, mut writer: impl Write) -> crate::Result<()> {
    let encoded = string_to_utf16(value);
    writer.write_u16::<LittleEndian>(u16::try_from(encoded.len() / 2).map_err(|_| {
        Error::new(ErrorKind::InvalidParameter, format!("string too long: {} characters", value.len()))
    })?)?;
    writer.write_all(&encoded)?;

    Ok(())
}

pub fn read_utf16_str(mut reader: impl Read) -> crate::Result<String> {
    let char_count = reader.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0x00; char_count * 2];
    reader.read_exact(&mut buf)?;

    Ok(bytes_to_utf16_string(&buf))
}

pub fn write_byte_vec(value: &[u8], mut writer: impl Write) -> crate::Result<()> {
    writer.write_u32::<LittleEndian>(u32::try_from(value.len()).map_err(|_| {
        Error::new(ErrorKind::BufferTooSmall, format!("buffer too long: {} bytes", value.len()))
    })?)?;
    writer.write_all(value)?;

    Ok(())
}

pub fn read_byte_vec(mut reader: impl Read) -> crate::Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut buf = vec![0x00; len];
    reader.read_exact(&mut buf)?;

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sid_round_trip_and_display() {
        let sid = Sid::new([0, 0, 0, 0, 0, 5], vec![21, 1000, 2000, 1104]);

        let encoded = sid.encode_to_vec().unwrap();
        let decoded = Sid::decode(encoded.as_slice()).unwrap();

        assert_eq!(decoded, sid);
        assert_eq!(decoded.rid(), Some(1104));
        assert_eq!(sid.to_string(), "S-1-5-21-1000-2000-1104");
    }

    #[test]
    fn utf16_string_round_trip() {
        let mut buf = Vec::new();
        write_utf16_str("CORP", &mut buf).unwrap();

        assert_eq!(read_utf16_str(buf.as_slice()).unwrap(), "CORP");
    }
}
