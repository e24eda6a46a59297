//! Ledger-coordinated mutations: deposit, buy, sell and opening accounts.
//!
//! Each mutation validates its input, resolves any quote it needs up front,
//! then runs its checks, balance update and ledger append inside one store
//! transaction so that nothing is retained unless all of it succeeds.

use rust_decimal::Decimal;
use tracing::{debug, info};

use super::account::{Account, AccountType, NewAccount};
use super::error::FireError;
use super::input::{parse_account_name, parse_symbol};
use super::ledger::{EntryKind, LedgerEntry, NewLedgerEntry};
use super::money::{CENTS_SCALE, credit, debit, trade_value};
use super::quote::Quote;
use super::user::UserId;
use crate::ports::quote_port::QuotePort;
use crate::ports::store_port::{LedgerStore, StoreTransaction, atomically};

/// Name given to a cash account created implicitly by a deposit.
pub const DEFAULT_CASH_ACCOUNT: &str = "Cash";

/// Outcome of a committed ledger mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub entry: LedgerEntry,
    /// The account as it stands after the mutation.
    pub account: Account,
    pub quote: Option<Quote>,
}

pub struct Bookkeeper<'a> {
    store: &'a dyn LedgerStore,
    quotes: &'a dyn QuotePort,
}

impl<'a> Bookkeeper<'a> {
    pub fn new(store: &'a dyn LedgerStore, quotes: &'a dyn QuotePort) -> Self {
        Self { store, quotes }
    }

    /// Credits the user's cash account, creating it (named `account_name`,
    /// or [`DEFAULT_CASH_ACCOUNT`] when blank) if the user has none.
    pub fn deposit(
        &self,
        user: UserId,
        account_name: &str,
        amount: Decimal,
    ) -> Result<Receipt, FireError> {
        if amount <= Decimal::ZERO {
            return Err(FireError::InvalidAmount {
                reason: "amount must be greater than zero".into(),
            });
        }
        let name = match account_name.trim() {
            "" => DEFAULT_CASH_ACCOUNT.to_string(),
            other => other.to_string(),
        };

        let receipt = atomically(self.store, |tx| {
            let account = match tx.find_cash_account(user)? {
                Some(mut cash) => {
                    cash.balance = credit(cash.balance, amount)?;
                    tx.set_balance(cash.id, cash.balance)?;
                    cash
                }
                None => {
                    if tx.find_account(user, &name)?.is_some() {
                        return Err(FireError::DuplicateAccountName { name: name.clone() });
                    }
                    tx.insert_account(
                        user,
                        &NewAccount {
                            name: name.clone(),
                            account_type: AccountType::Cash,
                            balance: credit(Decimal::ZERO, amount)?,
                        },
                    )?
                }
            };
            let entry = tx.append_entry(&NewLedgerEntry {
                user_id: user,
                account_id: account.id,
                kind: EntryKind::deposit(amount),
            })?;
            Ok(Receipt {
                entry,
                account,
                quote: None,
            })
        })?;

        info!(
            user,
            account = receipt.account.id,
            %amount,
            balance = %receipt.account.balance,
            "deposit recorded"
        );
        Ok(receipt)
    }

    /// Buys `shares` of `symbol` at the current quote, paid from the named
    /// cash account.
    pub fn buy(
        &self,
        user: UserId,
        symbol: &str,
        shares: i64,
        account_name: &str,
    ) -> Result<Receipt, FireError> {
        ensure_positive_shares(shares)?;
        let (quote, price) = self.resolve(symbol)?;
        let cost = trade_value(price, shares)?;

        let receipt = atomically(self.store, |tx| {
            let mut account = cash_account(tx, user, account_name)?;
            if !account.can_cover(cost) {
                return Err(FireError::InsufficientFunds {
                    account: account.name.clone(),
                    needed: cost,
                    available: account.balance,
                });
            }
            account.balance = debit(account.balance, cost)?;
            tx.set_balance(account.id, account.balance)?;
            let entry = tx.append_entry(&NewLedgerEntry {
                user_id: user,
                account_id: account.id,
                kind: EntryKind::buy(quote.symbol.clone(), shares, price),
            })?;
            Ok(Receipt {
                entry,
                account,
                quote: Some(quote.clone()),
            })
        })?;

        info!(
            user,
            account = receipt.account.id,
            symbol = %quote.symbol,
            shares,
            %price,
            "buy recorded"
        );
        Ok(receipt)
    }

    /// Sells `shares` of `symbol` at the current quote, crediting the named
    /// cash account. Positions are per user and symbol, not per account.
    pub fn sell(
        &self,
        user: UserId,
        symbol: &str,
        shares: i64,
        account_name: &str,
    ) -> Result<Receipt, FireError> {
        ensure_positive_shares(shares)?;
        let (quote, price) = self.resolve(symbol)?;
        let proceeds = trade_value(price, shares)?;

        let receipt = atomically(self.store, |tx| {
            let held = tx.net_position(user, &quote.symbol)?;
            if held < shares {
                return Err(FireError::InsufficientShares {
                    symbol: quote.symbol.clone(),
                    requested: shares,
                    held,
                });
            }
            let mut account = cash_account(tx, user, account_name)?;
            account.balance = credit(account.balance, proceeds)?;
            tx.set_balance(account.id, account.balance)?;
            let entry = tx.append_entry(&NewLedgerEntry {
                user_id: user,
                account_id: account.id,
                kind: EntryKind::sell(quote.symbol.clone(), shares, price),
            })?;
            Ok(Receipt {
                entry,
                account,
                quote: Some(quote.clone()),
            })
        })?;

        info!(
            user,
            account = receipt.account.id,
            symbol = %quote.symbol,
            shares,
            %price,
            "sell recorded"
        );
        Ok(receipt)
    }

    /// Opens a new account. The opening balance is not a ledger entry.
    pub fn open_account(
        &self,
        user: UserId,
        account_type: AccountType,
        name: &str,
        initial_balance: Decimal,
    ) -> Result<Account, FireError> {
        let name = parse_account_name(name)?;
        if initial_balance.is_sign_negative() && !initial_balance.is_zero() {
            return Err(FireError::InvalidAmount {
                reason: "initial balance cannot be negative".into(),
            });
        }
        let initial_balance = credit(Decimal::ZERO, initial_balance)?;

        let account = atomically(self.store, |tx| {
            if account_type == AccountType::Cash && tx.find_cash_account(user)?.is_some() {
                return Err(FireError::DuplicateCashAccount);
            }
            if tx.find_account(user, &name)?.is_some() {
                return Err(FireError::DuplicateAccountName { name: name.clone() });
            }
            tx.insert_account(
                user,
                &NewAccount {
                    name: name.clone(),
                    account_type,
                    balance: initial_balance,
                },
            )
        })?;

        info!(user, account = account.id, kind = %account_type, "account opened");
        Ok(account)
    }

    /// Looks up a quote, treating a miss as `UnknownSymbol`. The returned
    /// price is rounded to cents so trade costs are whole cents.
    fn resolve(&self, symbol: &str) -> Result<(Quote, Decimal), FireError> {
        let symbol = parse_symbol(symbol)?;
        let quote = self
            .quotes
            .lookup(&symbol)
            .ok_or_else(|| FireError::UnknownSymbol {
                symbol: symbol.clone(),
            })?;
        let price = quote.price.round_dp(CENTS_SCALE);
        if price <= Decimal::ZERO {
            return Err(FireError::UnknownSymbol { symbol });
        }
        debug!(symbol = %quote.symbol, %price, "quote resolved");
        Ok((quote, price))
    }
}

fn ensure_positive_shares(shares: i64) -> Result<(), FireError> {
    if shares <= 0 {
        return Err(FireError::InvalidQuantity {
            reason: "number of shares must be positive".into(),
        });
    }
    Ok(())
}

fn cash_account(
    tx: &mut dyn StoreTransaction,
    user: UserId,
    account_name: &str,
) -> Result<Account, FireError> {
    let name = parse_account_name(account_name)?;
    let account = tx
        .find_account(user, &name)?
        .ok_or_else(|| FireError::AccountNotFound { name: name.clone() })?;
    if !account.is_cash() {
        return Err(FireError::NotCashAccount { name });
    }
    Ok(account)
}
