//! Domain error types.

use rust_decimal::Decimal;

/// Top-level error type for firetrack.
///
/// The first group is the user-facing taxonomy surfaced at the request
/// boundary; the second group is infrastructure failure.
#[derive(Debug, thiserror::Error)]
pub enum FireError {
    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("invalid quantity: {reason}")]
    InvalidQuantity { reason: String },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("unknown symbol: {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("insufficient funds in {account}: need {needed}, have {available}")]
    InsufficientFunds {
        account: String,
        needed: Decimal,
        available: Decimal,
    },

    #[error("insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: String,
        requested: i64,
        held: i64,
    },

    #[error("a cash account already exists")]
    DuplicateCashAccount,

    #[error("an account named {name} already exists")]
    DuplicateAccountName { name: String },

    #[error("account {name} is not a cash account")]
    NotCashAccount { name: String },

    #[error("account not found: {name}")]
    AccountNotFound { name: String },

    #[error("authentication failed: {reason}")]
    AuthFailure { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FireError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FireError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn auth(reason: impl Into<String>) -> Self {
        FireError::AuthFailure {
            reason: reason.into(),
        }
    }

    /// True for errors caused by the request itself rather than the system.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            FireError::Database { .. }
                | FireError::DatabaseQuery { .. }
                | FireError::ConfigParse { .. }
                | FireError::ConfigMissing { .. }
                | FireError::ConfigInvalid { .. }
                | FireError::Io(_)
        )
    }
}

impl From<&FireError> for std::process::ExitCode {
    fn from(err: &FireError) -> Self {
        let code: u8 = match err {
            FireError::Io(_) => 1,
            FireError::ConfigParse { .. }
            | FireError::ConfigMissing { .. }
            | FireError::ConfigInvalid { .. } => 2,
            FireError::Database { .. } | FireError::DatabaseQuery { .. } => 3,
            FireError::InvalidAmount { .. }
            | FireError::InvalidQuantity { .. }
            | FireError::InvalidInput { .. } => 4,
            FireError::UnknownSymbol { .. } => 5,
            FireError::InsufficientFunds { .. } | FireError::InsufficientShares { .. } => 6,
            FireError::DuplicateCashAccount
            | FireError::DuplicateAccountName { .. }
            | FireError::NotCashAccount { .. }
            | FireError::AccountNotFound { .. } => 7,
            FireError::AuthFailure { .. } => 8,
        };
        std::process::ExitCode::from(code)
    }
}
