//! Net worth and live-priced holdings.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use super::account::Account;
use super::error::FireError;
use super::ledger::{EntryKind, LedgerEntry, open_positions};
use super::money::{checked_total, trade_value};
use super::user::UserId;
use crate::ports::quote_port::QuotePort;
use crate::ports::store_port::LedgerStore;

pub const DEFAULT_TOP_HOLDINGS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: Decimal,
    pub value: Decimal,
}

/// Sum of account balances. No quote lookups.
pub fn total_balance(accounts: &[Account]) -> Result<Decimal, FireError> {
    checked_total(accounts.iter().map(|a| a.balance))
}

pub fn net_worth(store: &dyn LedgerStore, user: UserId) -> Result<Decimal, FireError> {
    total_balance(&store.list_accounts(user)?)
}

/// Ranks open positions by net share count, largest first, ties broken by
/// symbol. Only the first `limit` are priced; symbols whose quote cannot be
/// resolved are dropped from the result.
pub fn rank_holdings(
    entries: &[LedgerEntry],
    quotes: &dyn QuotePort,
    limit: usize,
) -> Vec<Holding> {
    let mut ranked: Vec<(String, i64)> = open_positions(entries).into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .take(limit)
        .filter_map(|(symbol, shares)| {
            let Some(quote) = quotes.lookup(&symbol) else {
                warn!(%symbol, "skipping holding without a quote");
                return None;
            };
            let Ok(value) = trade_value(quote.price, shares) else {
                warn!(%symbol, shares, price = %quote.price, "skipping holding with an unrepresentable value");
                return None;
            };
            Some(Holding {
                value,
                symbol,
                name: quote.name,
                shares,
                price: quote.price,
            })
        })
        .collect()
}

pub fn top_holdings(
    store: &dyn LedgerStore,
    quotes: &dyn QuotePort,
    user: UserId,
    limit: usize,
) -> Result<Vec<Holding>, FireError> {
    let entries = store.list_entries(user)?;
    Ok(rank_holdings(&entries, quotes, limit))
}

pub fn holdings_value(holdings: &[Holding]) -> Result<Decimal, FireError> {
    checked_total(holdings.iter().map(|h| h.value))
}

/// Every open position (shares > 0) by symbol. No quote lookups.
pub fn positions(
    store: &dyn LedgerStore,
    user: UserId,
) -> Result<BTreeMap<String, i64>, FireError> {
    Ok(open_positions(&store.list_entries(user)?))
}

/// One ledger entry with its account name resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub entry: LedgerEntry,
    pub account_name: String,
}

impl HistoryRow {
    pub fn shares(&self) -> Option<i64> {
        match &self.entry.kind {
            EntryKind::Trade { shares, .. } => Some(*shares),
            EntryKind::CashFlow { .. } => None,
        }
    }

    pub fn price(&self) -> Option<Decimal> {
        match &self.entry.kind {
            EntryKind::Trade { price, .. } => Some(*price),
            EntryKind::CashFlow { .. } => None,
        }
    }
}

/// The user's full ledger, oldest first.
pub fn history(store: &dyn LedgerStore, user: UserId) -> Result<Vec<HistoryRow>, FireError> {
    let names: HashMap<_, _> = store
        .list_accounts(user)?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();
    Ok(store
        .list_entries(user)?
        .into_iter()
        .map(|entry| HistoryRow {
            account_name: names
                .get(&entry.account_id)
                .cloned()
                .unwrap_or_else(|| format!("#{}", entry.account_id)),
            entry,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountType;
    use crate::domain::quote::Quote;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct FixedQuotes(HashMap<String, Decimal>);

    impl QuotePort for FixedQuotes {
        fn lookup(&self, symbol: &str) -> Option<Quote> {
            self.0.get(symbol).map(|price| Quote {
                symbol: symbol.to_string(),
                name: format!("{symbol} Inc."),
                price: *price,
            })
        }
    }

    fn quotes(pairs: &[(&str, Decimal)]) -> FixedQuotes {
        FixedQuotes(pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect())
    }

    fn trade(kind: EntryKind) -> LedgerEntry {
        LedgerEntry {
            id: 0,
            user_id: 1,
            account_id: 1,
            kind,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn total_balance_sums_all_account_types() {
        let accounts = vec![
            Account {
                id: 1,
                user_id: 1,
                name: "Cash".into(),
                account_type: AccountType::Cash,
                balance: dec!(100.25),
            },
            Account {
                id: 2,
                user_id: 1,
                name: "401k".into(),
                account_type: AccountType::Retirement,
                balance: dec!(5000),
            },
        ];
        assert_eq!(total_balance(&accounts).unwrap(), dec!(5100.25));
        assert_eq!(total_balance(&[]).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn total_balance_reports_overflow_as_an_error() {
        let huge = |id| Account {
            id,
            user_id: 1,
            name: format!("Vault {id}"),
            account_type: AccountType::Savings,
            balance: dec!(70000000000000000000000000000),
        };
        assert!(matches!(
            total_balance(&[huge(1), huge(2)]),
            Err(FireError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn holding_too_large_to_value_is_skipped() {
        let entries = vec![
            trade(EntryKind::buy("BIG", i64::MAX, dec!(1))),
            trade(EntryKind::buy("SMALL", 1, dec!(1))),
        ];
        let q = quotes(&[("BIG", Decimal::MAX), ("SMALL", dec!(4))]);
        let ranked = rank_holdings(&entries, &q, 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "SMALL");
    }

    #[test]
    fn ranks_by_share_count_not_value() {
        let entries = vec![
            trade(EntryKind::buy("BRK-A", 1, dec!(600000))),
            trade(EntryKind::buy("F", 100, dec!(12))),
            trade(EntryKind::buy("AAPL", 10, dec!(190))),
        ];
        let q = quotes(&[
            ("BRK-A", dec!(600000)),
            ("F", dec!(12)),
            ("AAPL", dec!(190)),
        ]);
        let ranked = rank_holdings(&entries, &q, 5);
        let symbols: Vec<&str> = ranked.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["F", "AAPL", "BRK-A"]);
        assert_eq!(ranked[0].value, dec!(1200));
    }

    #[test]
    fn limit_applies_before_quote_failures() {
        let entries = vec![
            trade(EntryKind::buy("AAA", 30, dec!(1))),
            trade(EntryKind::buy("BBB", 20, dec!(1))),
            trade(EntryKind::buy("CCC", 10, dec!(1))),
        ];
        let q = quotes(&[("AAA", dec!(2)), ("CCC", dec!(3))]);
        let ranked = rank_holdings(&entries, &q, 2);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "AAA");
        assert_eq!(ranked[0].value, dec!(60));
    }

    #[test]
    fn sold_out_positions_are_not_ranked() {
        let entries = vec![
            trade(EntryKind::buy("AAA", 5, dec!(1))),
            trade(EntryKind::sell("AAA", 5, dec!(1))),
            trade(EntryKind::buy("BBB", 1, dec!(1))),
        ];
        let q = quotes(&[("AAA", dec!(1)), ("BBB", dec!(1))]);
        let ranked = rank_holdings(&entries, &q, 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].symbol, "BBB");
    }

    #[test]
    fn ties_break_alphabetically() {
        let entries = vec![
            trade(EntryKind::buy("ZZZ", 5, dec!(1))),
            trade(EntryKind::buy("AAA", 5, dec!(1))),
        ];
        let q = quotes(&[("AAA", dec!(1)), ("ZZZ", dec!(1))]);
        let ranked = rank_holdings(&entries, &q, 5);
        assert_eq!(ranked[0].symbol, "AAA");
        assert_eq!(holdings_value(&ranked).unwrap(), dec!(10));
    }
}
