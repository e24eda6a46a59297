//! Registration and credential checks.

use tracing::info;

use super::error::FireError;
use super::user::User;
use crate::ports::credential_port::CredentialPort;
use crate::ports::store_port::LedgerStore;

const INVALID_CREDENTIALS: &str = "invalid username or password";

pub fn register(
    store: &dyn LedgerStore,
    credentials: &dyn CredentialPort,
    username: &str,
    password: &str,
    confirmation: &str,
) -> Result<User, FireError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(FireError::invalid_input("username", "username is required"));
    }
    if password.is_empty() {
        return Err(FireError::invalid_input("password", "password is required"));
    }
    if password != confirmation {
        return Err(FireError::invalid_input("password", "passwords do not match"));
    }
    if store.find_user_by_username(username)?.is_some() {
        return Err(FireError::auth("username already taken"));
    }

    let hash = credentials.hash(password)?;
    let user = store.create_user(username, &hash)?;
    info!(user = user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Unknown usernames and wrong passwords fail identically.
pub fn authenticate(
    store: &dyn LedgerStore,
    credentials: &dyn CredentialPort,
    username: &str,
    password: &str,
) -> Result<User, FireError> {
    let user = store
        .find_user_by_username(username.trim())?
        .ok_or_else(|| FireError::auth(INVALID_CREDENTIALS))?;
    if !credentials.verify(&user.password_hash, password) {
        return Err(FireError::auth(INVALID_CREDENTIALS));
    }
    Ok(user)
}
