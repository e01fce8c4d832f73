//! Credential Store Adapter seam. Persistence of local password records and
//! of the machine-account secret belongs entirely to the implementor; the
//! matcher only ever reads through [`CredentialStore::lookup`].

use std::collections::HashMap;

use crate::crypto::HASH_SIZE;
use crate::ntlm::hash::{lm_hash, ntlm_hash};

/// A stored password: either the concatenated LM and NTLM hashes
/// (32 bytes, `hashed`) or the plaintext password bytes.
#[derive(Debug, Clone)]
pub struct PasswordRecord {
    pub hashed: bool,
    pub bytes: Vec<u8>,
    pub rid: u32,
}

impl PasswordRecord {
    pub fn plaintext(password: &str, rid: u32) -> Self {
        Self {
            hashed: false,
            bytes: password.as_bytes().to_vec(),
            rid,
        }
    }

    pub fn hashed(lm: [u8; HASH_SIZE], ntlm: [u8; HASH_SIZE], rid: u32) -> Self {
        let mut bytes = Vec::with_capacity(HASH_SIZE * 2);
        bytes.extend_from_slice(&lm);
        bytes.extend_from_slice(&ntlm);

        Self { hashed: true, bytes, rid }
    }
}

/// Outcome of an account lookup.
#[derive(Debug, Clone)]
pub enum PasswordLookup {
    /// Guest-equivalent account; no password comparison is performed.
    NoAuthRequired { rid: u32 },
    UnknownUser,
    Record(PasswordRecord),
}

pub trait CredentialStore {
    fn lookup(&self, user: &str) -> PasswordLookup;
}

/// HashMap-backed store for embedders without their own account database
/// and for tests. Lookups are case-insensitive on the account name.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    accounts: HashMap<String, PasswordLookup>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plaintext(&mut self, user: &str, password: &str, rid: u32) {
        self.accounts.insert(
            user.to_ascii_lowercase(),
            PasswordLookup::Record(PasswordRecord::plaintext(password, rid)),
        );
    }

    /// Stores the hash pair of `password` instead of the password itself.
    pub fn add_hashed(&mut self, user: &str, password: &str, rid: u32) {
        self.accounts.insert(
            user.to_ascii_lowercase(),
            PasswordLookup::Record(PasswordRecord::hashed(lm_hash(password), ntlm_hash(password), rid)),
        );
    }

    pub fn add_no_auth(&mut self, user: &str, rid: u32) {
        self.accounts
            .insert(user.to_ascii_lowercase(), PasswordLookup::NoAuthRequired { rid });
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn lookup(&self, user: &str) -> PasswordLookup {
        self.accounts
            .get(&user.to_ascii_lowercase())
            .cloned()
            .unwrap_or(PasswordLookup::UnknownUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut store = MemoryCredentialStore::new();
        store.add_plaintext("Alice", "secret", 1001);

        assert!(matches!(store.lookup("ALICE"), PasswordLookup::Record(_)));
        assert!(matches!(store.lookup("bob"), PasswordLookup::UnknownUser));
    }
}
