//! Market quote lookup port trait.

use crate::domain::quote::Quote;

pub trait QuotePort: Send + Sync {
    /// Current quote for `symbol`, or `None` when the provider has no result
    /// or fails. Implementations normalize symbol case.
    fn lookup(&self, symbol: &str) -> Option<Quote>;
}
