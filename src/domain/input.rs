//! Validation of raw form and command-line input.

use super::error::FireError;
use super::quote::normalize_symbol;

pub const MAX_SYMBOL_LEN: usize = 10;

/// Parses a share count: a strictly positive whole number.
pub fn parse_shares(input: &str) -> Result<i64, FireError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FireError::InvalidQuantity {
            reason: "number of shares is required".into(),
        });
    }
    let shares: i64 = trimmed.parse().map_err(|_| FireError::InvalidQuantity {
        reason: format!("'{trimmed}' is not a whole number of shares"),
    })?;
    if shares <= 0 {
        return Err(FireError::InvalidQuantity {
            reason: "number of shares must be positive".into(),
        });
    }
    Ok(shares)
}

/// Parses and normalizes a ticker symbol.
pub fn parse_symbol(input: &str) -> Result<String, FireError> {
    let symbol = normalize_symbol(input);
    if symbol.is_empty() {
        return Err(FireError::invalid_input("symbol", "symbol is required"));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(FireError::invalid_input(
            "symbol",
            format!("symbol longer than {MAX_SYMBOL_LEN} characters"),
        ));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
    {
        return Err(FireError::invalid_input(
            "symbol",
            format!("'{symbol}' contains invalid characters"),
        ));
    }
    Ok(symbol)
}

/// Parses a required account name.
pub fn parse_account_name(input: &str) -> Result<String, FireError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(FireError::invalid_input("account name", "name is required"));
    }
    Ok(name.to_string())
}

/// Parses a finite number for the named field. Blank input yields `None`.
pub fn parse_number(field: &str, input: &str) -> Result<Option<f64>, FireError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let cleaned: String = trimmed
        .trim_start_matches('$')
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(FireError::invalid_input(
            field,
            format!("'{trimmed}' is not a number"),
        )),
    }
}

/// Like [`parse_number`] but blank input is an error.
pub fn parse_required_number(field: &str, input: &str) -> Result<f64, FireError> {
    parse_number(field, input)?.ok_or_else(|| FireError::invalid_input(field, "is required"))
}
