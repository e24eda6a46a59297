//! Append-only ledger entries and position derivation.
//!
//! Stock trades and cash flows are distinct variants. Sell entries carry a
//! negative share count so that the signed sum per symbol is the net position.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::account::AccountId;
use super::user::UserId;

pub type EntryId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Trade {
        symbol: String,
        side: TradeSide,
        /// Signed: positive for buys, negative for sells.
        shares: i64,
        price: Decimal,
    },
    CashFlow {
        amount: Decimal,
    },
}

impl EntryKind {
    pub fn buy(symbol: impl Into<String>, shares: i64, price: Decimal) -> Self {
        EntryKind::Trade {
            symbol: symbol.into(),
            side: TradeSide::Buy,
            shares: shares.abs(),
            price,
        }
    }

    pub fn sell(symbol: impl Into<String>, shares: i64, price: Decimal) -> Self {
        EntryKind::Trade {
            symbol: symbol.into(),
            side: TradeSide::Sell,
            shares: -shares.abs(),
            price,
        }
    }

    pub fn deposit(amount: Decimal) -> Self {
        EntryKind::CashFlow { amount }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Trade {
                side: TradeSide::Buy,
                ..
            } => "BUY",
            EntryKind::Trade {
                side: TradeSide::Sell,
                ..
            } => "SELL",
            EntryKind::CashFlow { .. } => "DEPOSIT",
        }
    }

    /// Signed change this entry applies to its account's cash balance.
    pub fn cash_effect(&self) -> Decimal {
        match self {
            EntryKind::Trade { shares, price, .. } => -(Decimal::from(*shares) * *price),
            EntryKind::CashFlow { amount } => *amount,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            EntryKind::Trade { symbol, .. } => Some(symbol),
            EntryKind::CashFlow { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub account_id: AccountId,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub kind: EntryKind,
    pub created_at: DateTime<Utc>,
}

/// Net shares held for `symbol`, summed over every trade in `entries`.
pub fn net_position(entries: &[LedgerEntry], symbol: &str) -> i64 {
    entries
        .iter()
        .filter_map(|e| match &e.kind {
            EntryKind::Trade {
                symbol: s, shares, ..
            } if s == symbol => Some(*shares),
            _ => None,
        })
        .fold(0, i64::saturating_add)
}

/// Net shares for every symbol that appears in a trade, including symbols
/// that have been sold back to zero.
pub fn net_positions(entries: &[LedgerEntry]) -> BTreeMap<String, i64> {
    let mut positions = BTreeMap::new();
    for entry in entries {
        if let EntryKind::Trade { symbol, shares, .. } = &entry.kind {
            let held = positions.entry(symbol.clone()).or_insert(0i64);
            *held = held.saturating_add(*shares);
        }
    }
    positions
}

/// Symbols with a strictly positive net position.
pub fn open_positions(entries: &[LedgerEntry]) -> BTreeMap<String, i64> {
    net_positions(entries)
        .into_iter()
        .filter(|(_, shares)| *shares > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(id: EntryId, kind: EntryKind) -> LedgerEntry {
        LedgerEntry {
            id,
            user_id: 1,
            account_id: 1,
            kind,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn sell_stores_negative_shares() {
        match EntryKind::sell("AAPL", 5, dec!(10)) {
            EntryKind::Trade { shares, side, .. } => {
                assert_eq!(shares, -5);
                assert_eq!(side, TradeSide::Sell);
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn cash_effect_signs() {
        assert_eq!(EntryKind::buy("AAPL", 3, dec!(10.50)).cash_effect(), dec!(-31.50));
        assert_eq!(EntryKind::sell("AAPL", 3, dec!(10.50)).cash_effect(), dec!(31.50));
        assert_eq!(EntryKind::deposit(dec!(250)).cash_effect(), dec!(250));
    }

    #[test]
    fn labels_match_stored_kinds() {
        assert_eq!(EntryKind::buy("X", 1, dec!(1)).label(), "BUY");
        assert_eq!(EntryKind::sell("X", 1, dec!(1)).label(), "SELL");
        assert_eq!(EntryKind::deposit(dec!(1)).label(), "DEPOSIT");
    }

    #[test]
    fn net_position_ignores_cash_flows_and_other_symbols() {
        let entries = vec![
            entry(1, EntryKind::deposit(dec!(1000))),
            entry(2, EntryKind::buy("AAPL", 10, dec!(10))),
            entry(3, EntryKind::buy("MSFT", 4, dec!(20))),
            entry(4, EntryKind::sell("AAPL", 3, dec!(12))),
        ];
        assert_eq!(net_position(&entries, "AAPL"), 7);
        assert_eq!(net_position(&entries, "MSFT"), 4);
        assert_eq!(net_position(&entries, "TSLA"), 0);
    }

    #[test]
    fn open_positions_drops_closed_symbols() {
        let entries = vec![
            entry(1, EntryKind::buy("AAPL", 10, dec!(10))),
            entry(2, EntryKind::sell("AAPL", 10, dec!(11))),
            entry(3, EntryKind::buy("MSFT", 2, dec!(20))),
        ];
        let all = net_positions(&entries);
        assert_eq!(all.get("AAPL"), Some(&0));

        let open = open_positions(&entries);
        assert_eq!(open.len(), 1);
        assert_eq!(open.get("MSFT"), Some(&2));
    }
}
