//! Authentication backend for axum-login.
//!
//! Users live in the ledger store; passwords are checked through the
//! credential port on a blocking thread.

use axum_login::{AuthUser, AuthnBackend, UserId};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::domain::auth;
use crate::domain::error::FireError;
use crate::domain::user::User;
use crate::ports::credential_port::CredentialPort;
use crate::ports::store_port::LedgerStore;

use super::blocking;

pub type AuthSession = axum_login::AuthSession<Backend>;

/// The logged-in user as stored in the session.
#[derive(Clone)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    /// The stored password hash; a changed hash invalidates old sessions.
    pw_hash_bytes: Vec<u8>,
}

impl fmt::Debug for SessionUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionUser")
            .field("id", &self.id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl From<User> for SessionUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            pw_hash_bytes: user.password_hash.into_bytes(),
        }
    }
}

impl AuthUser for SessionUser {
    type Id = i64;

    fn id(&self) -> i64 {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        &self.pw_hash_bytes
    }
}

/// Login credentials submitted via the login form.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone)]
pub struct Backend {
    store: Arc<dyn LedgerStore>,
    credentials: Arc<dyn CredentialPort>,
}

impl Backend {
    pub fn new(store: Arc<dyn LedgerStore>, credentials: Arc<dyn CredentialPort>) -> Self {
        Self { store, credentials }
    }
}

impl AuthnBackend for Backend {
    type User = SessionUser;
    type Credentials = Credentials;
    type Error = FireError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let store = self.store.clone();
        let credentials = self.credentials.clone();
        let outcome = blocking(move || {
            auth::authenticate(
                store.as_ref(),
                credentials.as_ref(),
                &creds.username,
                &creds.password,
            )
        })
        .await;
        match outcome {
            Ok(user) => Ok(Some(user.into())),
            Err(FireError::AuthFailure { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        let store = self.store.clone();
        let id = *user_id;
        let user = blocking(move || store.get_user(id)).await?;
        Ok(user.map(SessionUser::from))
    }
}
