use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::SESSION_KEY_SIZE;

/// Wrapper that keeps sensitive material out of debug output and wipes it
/// on drop.
#[derive(Zeroize, ZeroizeOnDrop, Eq, PartialEq, Default, Clone)]
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(inner: T) -> Self {
        Self(inner)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret")?;

        Ok(())
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(secret)")?;

        Ok(())
    }
}

impl<T: Zeroize> AsRef<T> for Secret<T> {
    fn as_ref(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize> AsMut<T> for Secret<T> {
    fn as_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: Zeroize> From<T> for Secret<T> {
    fn from(inner: T) -> Self {
        Self(inner)
    }
}

/// The NTLM-style hash of the computer account's password, established on
/// domain join. The secure channel derives every session key from it.
pub type MachineAccountSecret = Secret<[u8; SESSION_KEY_SIZE]>;

/// Per-logon symmetric key handed to the session for later message signing
/// and sealing. Derived once per successful logon, never regenerated.
#[derive(Zeroize, ZeroizeOnDrop, Eq, PartialEq, Default, Clone)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    pub fn new(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey")?;

        Ok(())
    }
}

impl From<[u8; SESSION_KEY_SIZE]> for SessionKey {
    fn from(key: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_opaque() {
        let secret = MachineAccountSecret::new([0xAA; 16]);
        let key = SessionKey::new([0xBB; 16]);

        assert_eq!(format!("{:?}", secret), "Secret");
        assert_eq!(format!("{:?}", key), "SessionKey");
    }
}
