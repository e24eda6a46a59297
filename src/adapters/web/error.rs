//! HTTP error responses for the web adapter.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::domain::error::FireError;

use super::Fragment;
use super::templates::ErrorTemplate;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<FireError> for WebError {
    fn from(err: FireError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            error!(error = %err, "request failed");
            return Self::new(status, "Something went wrong. Please try again.");
        }
        Self::new(status, capitalize(&err.to_string()))
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let template = ErrorTemplate {
            message: &self.message,
            status: self.status.as_u16(),
        };
        let body = template
            .render()
            .unwrap_or_else(|_| format!("<p>{}</p>", self.message));
        let mut response = (self.status, Html(body)).into_response();
        response.extensions_mut().insert(Fragment {
            title: format!("Error {}", self.status.as_u16()),
        });
        response
    }
}

pub fn status_from_error(err: &FireError) -> StatusCode {
    match err {
        FireError::InvalidAmount { .. }
        | FireError::InvalidQuantity { .. }
        | FireError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        FireError::UnknownSymbol { .. }
        | FireError::InsufficientFunds { .. }
        | FireError::InsufficientShares { .. }
        | FireError::NotCashAccount { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FireError::AccountNotFound { .. } => StatusCode::NOT_FOUND,
        FireError::DuplicateCashAccount | FireError::DuplicateAccountName { .. } => {
            StatusCode::CONFLICT
        }
        FireError::AuthFailure { .. } => StatusCode::UNAUTHORIZED,
        FireError::Database { .. }
        | FireError::DatabaseQuery { .. }
        | FireError::ConfigParse { .. }
        | FireError::ConfigMissing { .. }
        | FireError::ConfigInvalid { .. }
        | FireError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
