/// Credential Hashing and Verification
///
/// One bcrypt primitive shared by two call sites: login passwords and
/// refresh-token secrets.

use bcrypt::{hash, verify};

use crate::error::HashError;

/// Work factor applied to every hash this service produces
pub const DEFAULT_HASH_COST: u32 = 10;

#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    cost: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_COST)
    }
}

impl CredentialHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a plaintext secret with a fresh salt
    ///
    /// # Errors
    /// Returns error if bcrypt rejects the input (e.g. interior NUL byte)
    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        hash(plaintext, self.cost).map_err(|e| HashError::Hashing(e.to_string()))
    }

    /// Verify a plaintext secret against a stored hash
    ///
    /// A mismatch is `Ok(false)`; only a hash that cannot be parsed is an error.
    pub fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, HashError> {
        verify(plaintext, hash).map_err(|e| HashError::Format(e.to_string()))
    }
}
