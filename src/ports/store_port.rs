//! Persistent storage port traits for users, accounts and the ledger.
//!
//! Reads go through [`LedgerStore`] directly. Every mutation that pairs a
//! ledger append with a balance change runs inside [`LedgerStore::transaction`],
//! whose scope is serialized against other writers and discarded as a whole
//! when the closure returns an error.

use rust_decimal::Decimal;

use crate::domain::account::{Account, AccountId, NewAccount};
use crate::domain::error::FireError;
use crate::domain::fire::FireProjection;
use crate::domain::ledger::{LedgerEntry, NewLedgerEntry};
use crate::domain::user::{User, UserId};

/// Operations available inside one atomic unit of work.
pub trait StoreTransaction {
    fn find_account(&mut self, user: UserId, name: &str) -> Result<Option<Account>, FireError>;

    fn find_cash_account(&mut self, user: UserId) -> Result<Option<Account>, FireError>;

    fn insert_account(&mut self, user: UserId, account: &NewAccount)
    -> Result<Account, FireError>;

    fn set_balance(&mut self, account: AccountId, balance: Decimal) -> Result<(), FireError>;

    fn append_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, FireError>;

    /// Signed sum of every trade for `symbol` in the user's full ledger.
    fn net_position(&mut self, user: UserId, symbol: &str) -> Result<i64, FireError>;
}

pub trait LedgerStore: Send + Sync {
    fn initialize_schema(&self) -> Result<(), FireError>;

    /// Inserts a user; a taken username is `AuthFailure`.
    fn create_user(&self, username: &str, password_hash: &str) -> Result<User, FireError>;

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, FireError>;

    fn get_user(&self, id: UserId) -> Result<Option<User>, FireError>;

    fn save_projection(&self, user: UserId, projection: &FireProjection)
    -> Result<(), FireError>;

    /// All of the user's accounts, ordered by name.
    fn list_accounts(&self, user: UserId) -> Result<Vec<Account>, FireError>;

    /// The user's ledger, oldest first.
    fn list_entries(&self, user: UserId) -> Result<Vec<LedgerEntry>, FireError>;

    /// Runs `work` as one atomic, writer-serialized unit. Commits only if
    /// `work` returns `Ok`.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn StoreTransaction) -> Result<(), FireError>,
    ) -> Result<(), FireError>;
}

/// Typed wrapper over [`LedgerStore::transaction`] that hands back the value
/// produced by `work`.
pub fn atomically<T>(
    store: &dyn LedgerStore,
    mut work: impl FnMut(&mut dyn StoreTransaction) -> Result<T, FireError>,
) -> Result<T, FireError> {
    let mut output = None;
    store.transaction(&mut |tx| {
        output = Some(work(tx)?);
        Ok(())
    })?;
    output.ok_or_else(|| FireError::Database {
        reason: "transaction committed without a result".into(),
    })
}
