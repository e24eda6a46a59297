//! Argon2id password hashing.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;

use crate::domain::error::FireError;
use crate::ports::credential_port::CredentialPort;

#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Credentials;

impl Argon2Credentials {
    fn hasher() -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
    }
}

impl CredentialPort for Argon2Credentials {
    fn hash(&self, password: &str) -> Result<String, FireError> {
        let salt = SaltString::generate(&mut OsRng);
        Self::hasher()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| FireError::auth(format!("could not hash password: {e}")))
    }

    /// A malformed stored hash never verifies.
    fn verify(&self, hash: &str, password: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Self::hasher()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
