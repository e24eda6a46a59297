//! One-way password hashing port trait.

use crate::domain::error::FireError;

pub trait CredentialPort: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, FireError>;
    fn verify(&self, hash: &str, password: &str) -> bool;
}
