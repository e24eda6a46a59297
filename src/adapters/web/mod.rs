//! Web server adapter.
//!
//! Axum router with askama pages. Handlers render page fragments; the
//! [`apply_layout`] middleware wraps them in the site layout unless the
//! request came from HTMX (`HX-Request`), which gets the bare fragment.

mod auth;
mod error;
mod handlers;
mod templates;

pub use auth::{AuthSession, Backend, Credentials, SessionUser};
pub use error::{WebError, status_from_error};

use askama::Template;
use axum::{
    Router,
    body::to_bytes,
    extract::Request,
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use axum_login::{AuthManagerLayerBuilder, login_required};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::Key;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::domain::error::FireError;
use crate::ports::config_port::ConfigPort;
use crate::ports::credential_port::CredentialPort;
use crate::ports::quote_port::QuotePort;
use crate::ports::store_port::LedgerStore;

/// Smallest signing key accepted for session cookies, in bytes.
pub const MIN_SESSION_KEY_BYTES: usize = 64;
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 86_400;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub quotes: Arc<dyn QuotePort>,
    pub credentials: Arc<dyn CredentialPort>,
    pub config: Arc<dyn ConfigPort + Send + Sync>,
}

/// Marks a response body as a page fragment with the given title.
#[derive(Clone, Debug)]
pub(crate) struct Fragment {
    pub title: String,
}

/// Builds the application router with sessions and login enforcement.
pub fn build_router(state: AppState) -> Result<Router, FireError> {
    let key = session_key(state.config.as_ref())?;
    let lifetime = state.config.get_int(
        "auth",
        "session_lifetime",
        DEFAULT_SESSION_LIFETIME_SECS,
    );
    if lifetime <= 0 {
        return Err(FireError::ConfigInvalid {
            section: "auth".into(),
            key: "session_lifetime".into(),
            reason: "must be a positive number of seconds".into(),
        });
    }

    let secure_cookie = state.config.get_bool("auth", "secure_cookie", false);

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(secure_cookie)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(lifetime)))
        .with_signed(key);
    let backend = Backend::new(state.store.clone(), state.credentials.clone());
    let auth_layer = AuthManagerLayerBuilder::new(backend, session_layer).build();

    let protected = Router::new()
        .route("/", get(handlers::dashboard))
        .route(
            "/accounts",
            get(handlers::accounts).post(handlers::open_account),
        )
        .route("/deposit", get(handlers::deposit_form).post(handlers::deposit))
        .route("/buy", get(handlers::buy_form).post(handlers::buy))
        .route("/sell", get(handlers::sell_form).post(handlers::sell))
        .route("/quote", get(handlers::quote_form).post(handlers::quote))
        .route("/history", get(handlers::history))
        .route("/fire", get(handlers::fire_form).post(handlers::fire))
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route_layer(login_required!(Backend, login_url = "/login"));

    let public = Router::new()
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route(
            "/register",
            get(handlers::register_form).post(handlers::register),
        );

    Ok(Router::new()
        .merge(protected)
        .merge(public)
        .nest_service("/static", ServeDir::new("static"))
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(apply_layout))
        .layer(TraceLayer::new_for_http())
        .layer(auth_layer)
        .with_state(Arc::new(state)))
}

fn session_key(config: &dyn ConfigPort) -> Result<Key, FireError> {
    let secret = config.require_string("auth", "session_secret")?;
    let invalid = |reason: String| FireError::ConfigInvalid {
        section: "auth".into(),
        key: "session_secret".into(),
        reason,
    };
    let bytes = hex::decode(secret.trim()).map_err(|e| invalid(e.to_string()))?;
    if bytes.len() < MIN_SESSION_KEY_BYTES {
        return Err(invalid(format!(
            "must decode to at least {MIN_SESSION_KEY_BYTES} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Key::from(bytes.as_slice()))
}

fn is_htmx_request(headers: &HeaderMap) -> bool {
    headers.get("HX-Request").is_some()
}

/// Wraps fragment responses in the site layout for non-HTMX requests.
async fn apply_layout(auth_session: AuthSession, request: Request, next: Next) -> Response {
    let htmx = is_htmx_request(request.headers());
    let response = next.run(request).await;
    if htmx {
        return response;
    }
    let Some(fragment) = response.extensions().get::<Fragment>().cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "could not buffer page fragment");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let content = String::from_utf8_lossy(&bytes);
    let username = auth_session
        .user
        .as_ref()
        .map(|u| u.username.as_str())
        .unwrap_or("");
    let page = templates::BasePage {
        title: &fragment.title,
        content: &content,
        username,
    };
    match page.render() {
        Ok(html) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            (parts, Html(html)).into_response()
        }
        Err(_) => (parts, Html(content.into_owned())).into_response(),
    }
}

/// Runs blocking store or quote work off the async executor.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, FireError>
where
    F: FnOnce() -> Result<T, FireError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| FireError::Io(std::io::Error::other(e)))?
}
