#![allow(dead_code)]

use firetrack::adapters::sqlite_adapter::SqliteAdapter;
use firetrack::domain::quote::{Quote, normalize_symbol};
use firetrack::domain::user::User;
use firetrack::ports::config_port::ConfigPort;
use firetrack::ports::credential_port::CredentialPort;
use firetrack::ports::quote_port::QuotePort;
use firetrack::ports::store_port::LedgerStore;
use firetrack::domain::error::FireError;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

/// 64 bytes of session key, hex encoded.
pub const SESSION_SECRET: &str = "00000000000000000000000000000001\
                                  00000000000000000000000000000001\
                                  00000000000000000000000000000001\
                                  00000000000000000000000000000001";

/// Canned quotes keyed by symbol. Symbols without a price have no quote.
pub struct MockQuotePort {
    pub quotes: HashMap<String, Quote>,
    pub lookups: Mutex<Vec<String>>,
}

impl MockQuotePort {
    pub fn new() -> Self {
        Self {
            quotes: HashMap::new(),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn with_price(mut self, symbol: &str, name: &str, price: Decimal) -> Self {
        let symbol = normalize_symbol(symbol);
        self.quotes.insert(
            symbol.clone(),
            Quote {
                symbol,
                name: name.to_string(),
                price,
            },
        );
        self
    }

    pub fn without(mut self, symbol: &str) -> Self {
        self.quotes.remove(&normalize_symbol(symbol));
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }
}

impl QuotePort for MockQuotePort {
    fn lookup(&self, symbol: &str) -> Option<Quote> {
        let symbol = normalize_symbol(symbol);
        self.lookups.lock().unwrap().push(symbol.clone());
        self.quotes.get(&symbol).cloned()
    }
}

/// Stores passwords as `plain:<password>` so tests skip the argon2 cost.
pub struct PlainCredentials;

impl CredentialPort for PlainCredentials {
    fn hash(&self, password: &str) -> Result<String, FireError> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, hash: &str, password: &str) -> bool {
        hash.strip_prefix("plain:") == Some(password)
    }
}

#[derive(Default)]
pub struct MockConfigPort {
    pub values: HashMap<(String, String), String>,
}

impl MockConfigPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, section: &str, key: &str, value: &str) -> Self {
        self.values
            .insert((section.to_string(), key.to_string()), value.to_string());
        self
    }

    pub fn for_web() -> Self {
        Self::new()
            .with("auth", "session_secret", SESSION_SECRET)
            .with("auth", "session_lifetime", "86400")
    }
}

impl ConfigPort for MockConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.values
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

pub fn memory_store() -> SqliteAdapter {
    let store = SqliteAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store
}

pub fn make_user(store: &dyn LedgerStore, username: &str) -> User {
    store
        .create_user(username, &format!("plain:{username}-pw"))
        .unwrap()
}

/// AAPL at $150, VTI at $200.50 and MSFT at $300.
pub fn market() -> MockQuotePort {
    use rust_decimal_macros::dec;
    MockQuotePort::new()
        .with_price("AAPL", "Apple Inc.", dec!(150.00))
        .with_price("VTI", "Vanguard Total Stock Market ETF", dec!(200.50))
        .with_price("MSFT", "Microsoft Corporation", dec!(300.00))
}
