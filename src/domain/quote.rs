//! Market quotes as returned by a quote provider.

use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
}

/// Canonical ticker form: trimmed and upper-cased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
