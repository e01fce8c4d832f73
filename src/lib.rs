#[macro_use]
extern crate tracing;

pub mod config;
pub mod crypto;
pub mod logon;
pub mod membership;
pub mod netlogon;
pub mod ntlm;
pub mod rpc;
pub mod secret;
pub mod store;
pub mod utils;

use std::{error, fmt, io, result, string};

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive as _;

pub use crate::config::{AuthPolicy, EngineConfig, ServerRole};
pub use crate::logon::{logon, LogonRequest, SessionInfo};
pub use crate::membership::{join, leave};
pub use crate::netlogon::{DomainTrustContext, NegotiationFlags, TrustedDomain};
pub use crate::ntlm::{generate_challenge, AuthenticationDescriptor, CredentialMethod};
pub use crate::rpc::{AdminCredentials, DcLocator, PipeConnector, RpcTransport};
pub use crate::secret::{MachineAccountSecret, Secret, SessionKey};
pub use crate::store::{CredentialStore, MemoryCredentialStore, PasswordLookup, PasswordRecord};

pub type Result<T> = result::Result<T, Error>;

/// Size of the server and client challenges exchanged during authentication.
pub const CHALLENGE_SIZE: usize = 8;
/// Size of a per-logon session key and of the secure channel's own key.
pub const SESSION_KEY_SIZE: usize = 16;
/// Size of a rolling secure-channel credential.
pub const CREDENTIAL_SIZE: usize = 8;

pub const STATUS_SUCCESS: u32 = 0;

/// The kind of an engine error. Discriminants are the NT status codes the
/// engine speaks on the wire, so remote status words map directly onto it.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum ErrorKind {
    Unsuccessful = 0xC000_0001,
    InvalidParameter = 0xC000_000D,
    NoMemory = 0xC000_0017,
    AccessDenied = 0xC000_0022,
    BufferTooSmall = 0xC000_0023,
    UserExists = 0xC000_0063,
    NoSuchUser = 0xC000_0064,
    LogonFailure = 0xC000_006D,
    NotReady = 0xC000_00A3,
    BadNetworkPath = 0xC000_00BE,
    InvalidNetworkResponse = 0xC000_00C3,
    NoSuchDomain = 0xC000_00DF,
    NoTrustLsaSecret = 0xC000_018A,
    NoTrustSamAccount = 0xC000_018B,
    TrustFailure = 0xC000_018D,
}

impl ErrorKind {
    /// Maps a remote status word onto the error taxonomy. Status codes the
    /// engine has no name for collapse to [`ErrorKind::Unsuccessful`].
    pub fn from_status(status: u32) -> Self {
        ErrorKind::from_u32(status).unwrap_or(ErrorKind::Unsuccessful)
    }
}

/// Holds the [`ErrorKind`] and the description of the error.
#[derive(Debug, Clone)]
pub struct Error {
    pub error_type: ErrorKind,
    pub description: String,
}

impl Error {
    pub fn new(error_type: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            error_type,
            description: description.into(),
        }
    }

    pub fn from_status(status: u32, description: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_status(status), description)
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.error_type, self.description)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::Unsuccessful, format!("IO error: {:?}", err))
    }
}

impl From<rand::Error> for Error {
    fn from(err: rand::Error) -> Self {
        Self::new(ErrorKind::Unsuccessful, format!("Rand error: {:?}", err))
    }
}

impl From<string::FromUtf16Error> for Error {
    fn from(err: string::FromUtf16Error) -> Self {
        Self::new(ErrorKind::InvalidParameter, format!("UTF-16 error: {:?}", err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        io::Error::new(io::ErrorKind::Other, format!("{:?}: {}", err.error_type, err.description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_maps_known_codes() {
        assert_eq!(ErrorKind::from_status(0xC000_006D), ErrorKind::LogonFailure);
        assert_eq!(ErrorKind::from_status(0xC000_018A), ErrorKind::NoTrustLsaSecret);
        assert_eq!(ErrorKind::from_status(0xC000_000D), ErrorKind::InvalidParameter);
    }

    #[test]
    fn from_status_collapses_unknown_codes() {
        assert_eq!(ErrorKind::from_status(0xC000_FFFF), ErrorKind::Unsuccessful);
        assert_eq!(ErrorKind::from_status(0xDEAD_BEEF), ErrorKind::Unsuccessful);
    }
}
