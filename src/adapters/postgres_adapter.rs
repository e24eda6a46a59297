//! PostgreSQL storage adapter.
//!
//! Money columns are NUMERIC and map straight onto `Decimal`. Write
//! transactions run at SERIALIZABLE and are retried a few times when the
//! server reports a serialization conflict.

use chrono::{DateTime, Utc};
use postgres::error::SqlState;
use postgres::{IsolationLevel, NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

use crate::domain::account::{Account, AccountId, AccountType, NewAccount};
use crate::domain::error::FireError;
use crate::domain::fire::FireProjection;
use crate::domain::ledger::{EntryKind, LedgerEntry, NewLedgerEntry, TradeSide};
use crate::domain::user::{User, UserId};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{LedgerStore, StoreTransaction};

type Manager = PostgresConnectionManager<NoTls>;

const MAX_SERIALIZATION_RETRIES: usize = 3;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        hash TEXT NOT NULL,
        fire_number DOUBLE PRECISION,
        time_to_fire DOUBLE PRECISION
    );
    CREATE TABLE IF NOT EXISTS accounts (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        type TEXT NOT NULL
            CHECK (type IN ('CASH', 'SAVINGS', 'BROKERAGE', 'RETIREMENT', 'HEALTH')),
        balance NUMERIC(20, 2) NOT NULL,
        UNIQUE (user_id, name)
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_one_cash
        ON accounts(user_id) WHERE type = 'CASH';
    CREATE TABLE IF NOT EXISTS transactions (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        account_id BIGINT NOT NULL REFERENCES accounts(id),
        type TEXT NOT NULL CHECK (type IN ('BUY', 'SELL', 'DEPOSIT')),
        symbol TEXT,
        shares BIGINT,
        price NUMERIC(20, 2),
        amount NUMERIC(20, 2) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_user_symbol
        ON transactions(user_id, symbol);
    CREATE OR REPLACE FUNCTION reject_ledger_change() RETURNS trigger AS $$
    BEGIN
        RAISE EXCEPTION 'ledger entries are immutable';
    END;
    $$ LANGUAGE plpgsql;
    DROP TRIGGER IF EXISTS transactions_immutable ON transactions;
    CREATE TRIGGER transactions_immutable
        BEFORE UPDATE OR DELETE ON transactions
        FOR EACH ROW EXECUTE FUNCTION reject_ledger_change();
";

const ACCOUNT_COLUMNS: &str = "id, user_id, name, type, balance";
const ENTRY_COLUMNS: &str =
    "id, user_id, account_id, type, symbol, shares, price, amount, created_at";
const USER_COLUMNS: &str = "id, username, hash, fire_number, time_to_fire";

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

fn pool_err(e: r2d2::Error) -> FireError {
    FireError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: postgres::Error) -> FireError {
    FireError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn is_unique_violation(e: &postgres::Error) -> bool {
    e.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

fn is_serialization_failure(e: &postgres::Error) -> bool {
    e.code() == Some(&SqlState::T_R_SERIALIZATION_FAILURE)
}

fn account_from_row(row: &Row) -> Result<Account, FireError> {
    let kind: String = row.try_get(3).map_err(query_err)?;
    Ok(Account {
        id: row.try_get(0).map_err(query_err)?,
        user_id: row.try_get(1).map_err(query_err)?,
        name: row.try_get(2).map_err(query_err)?,
        account_type: AccountType::from_str(&kind)?,
        balance: row.try_get(4).map_err(query_err)?,
    })
}

fn user_from_row(row: &Row) -> Result<User, FireError> {
    Ok(User {
        id: row.try_get(0).map_err(query_err)?,
        username: row.try_get(1).map_err(query_err)?,
        password_hash: row.try_get(2).map_err(query_err)?,
        fire_number: row.try_get(3).map_err(query_err)?,
        time_to_fire: row.try_get(4).map_err(query_err)?,
    })
}

fn entry_from_row(row: &Row) -> Result<LedgerEntry, FireError> {
    let label: String = row.try_get(3).map_err(query_err)?;
    let kind = match label.as_str() {
        "DEPOSIT" => EntryKind::CashFlow {
            amount: row.try_get(7).map_err(query_err)?,
        },
        "BUY" | "SELL" => EntryKind::Trade {
            symbol: row.try_get(4).map_err(query_err)?,
            side: if label == "BUY" {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            },
            shares: row.try_get(5).map_err(query_err)?,
            price: row.try_get(6).map_err(query_err)?,
        },
        other => {
            return Err(FireError::DatabaseQuery {
                reason: format!("unknown ledger entry type {other}"),
            });
        }
    };
    let created_at: DateTime<Utc> = row.try_get(8).map_err(query_err)?;
    Ok(LedgerEntry {
        id: row.try_get(0).map_err(query_err)?,
        user_id: row.try_get(1).map_err(query_err)?,
        account_id: row.try_get(2).map_err(query_err)?,
        kind,
        created_at,
    })
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FireError> {
        let connection_string = config.require_string("postgres", "connection_string")?;
        let pool_size = config.get_int("postgres", "pool_size", 8).max(1) as u32;

        let pg_config = postgres::Config::from_str(&connection_string).map_err(|e| {
            FireError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            }
        })?;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, FireError> {
        self.pool.get().map_err(pool_err)
    }

    fn run_serializable(
        &self,
        work: &mut dyn FnMut(&mut dyn StoreTransaction) -> Result<(), FireError>,
    ) -> Result<Result<(), FireError>, postgres::Error> {
        let mut conn = match self.conn() {
            Ok(conn) => conn,
            Err(e) => return Ok(Err(e)),
        };
        let tx = conn
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()?;
        let mut scope = PostgresTransaction { tx, failure: None };
        let outcome = work(&mut scope);
        if let Some(e) = scope.failure.take() {
            return Err(e);
        }
        match outcome {
            Ok(()) => {
                scope.tx.commit()?;
                Ok(Ok(()))
            }
            Err(e) => Ok(Err(e)),
        }
    }
}

impl LedgerStore for PostgresAdapter {
    fn initialize_schema(&self) -> Result<(), FireError> {
        self.conn()?.batch_execute(SCHEMA).map_err(query_err)
    }

    fn create_user(&self, username: &str, password_hash: &str) -> Result<User, FireError> {
        let row = self
            .conn()?
            .query_one(
                &format!(
                    "INSERT INTO users (username, hash) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
                ),
                &[&username, &password_hash],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    FireError::auth("username already taken")
                } else {
                    query_err(e)
                }
            })?;
        user_from_row(&row)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, FireError> {
        self.conn()?
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"),
                &[&username],
            )
            .map_err(query_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, FireError> {
        self.conn()?
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
                &[&id],
            )
            .map_err(query_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    fn save_projection(
        &self,
        user: UserId,
        projection: &FireProjection,
    ) -> Result<(), FireError> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE users SET fire_number = $1, time_to_fire = $2 WHERE id = $3",
                &[&projection.fire_number, &projection.years_to_fire, &user],
            )
            .map_err(query_err)?;
        if updated == 0 {
            return Err(FireError::auth(format!("no user with id {user}")));
        }
        Ok(())
    }

    fn list_accounts(&self, user: UserId) -> Result<Vec<Account>, FireError> {
        self.conn()?
            .query(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 ORDER BY name"
                ),
                &[&user],
            )
            .map_err(query_err)?
            .iter()
            .map(account_from_row)
            .collect()
    }

    fn list_entries(&self, user: UserId) -> Result<Vec<LedgerEntry>, FireError> {
        self.conn()?
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM transactions WHERE user_id = $1 ORDER BY id"
                ),
                &[&user],
            )
            .map_err(query_err)?
            .iter()
            .map(entry_from_row)
            .collect()
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn StoreTransaction) -> Result<(), FireError>,
    ) -> Result<(), FireError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.run_serializable(work) {
                Ok(outcome) => return outcome,
                Err(e) if is_serialization_failure(&e) && attempt < MAX_SERIALIZATION_RETRIES => {
                    warn!(attempt, "serialization conflict, retrying transaction");
                }
                Err(e) => return Err(query_err(e)),
            }
        }
    }
}

/// A unit of work bound to one SERIALIZABLE transaction. The first driver
/// error is kept in `failure` so the caller can tell conflicts apart from
/// domain errors.
struct PostgresTransaction<'a> {
    tx: postgres::Transaction<'a>,
    failure: Option<postgres::Error>,
}

impl PostgresTransaction<'_> {
    fn record(&mut self, e: postgres::Error) -> FireError {
        let err = FireError::DatabaseQuery {
            reason: e.to_string(),
        };
        if self.failure.is_none() {
            self.failure = Some(e);
        }
        err
    }
}

impl StoreTransaction for PostgresTransaction<'_> {
    fn find_account(&mut self, user: UserId, name: &str) -> Result<Option<Account>, FireError> {
        let row = self
            .tx
            .query_opt(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 AND name = $2"
                ),
                &[&user, &name],
            )
            .map_err(|e| self.record(e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    fn find_cash_account(&mut self, user: UserId) -> Result<Option<Account>, FireError> {
        let row = self
            .tx
            .query_opt(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 AND type = 'CASH'"
                ),
                &[&user],
            )
            .map_err(|e| self.record(e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    fn insert_account(
        &mut self,
        user: UserId,
        account: &NewAccount,
    ) -> Result<Account, FireError> {
        let result = self.tx.query_one(
            &format!(
                "INSERT INTO accounts (user_id, name, type, balance) VALUES ($1, $2, $3, $4) \
                 RETURNING {ACCOUNT_COLUMNS}"
            ),
            &[
                &user,
                &account.name,
                &account.account_type.as_str(),
                &account.balance,
            ],
        );
        match result {
            Ok(row) => account_from_row(&row),
            // The failed statement aborts the transaction; it rolls back on drop.
            Err(e) if is_unique_violation(&e) => {
                if account.account_type == AccountType::Cash
                    && e.as_db_error()
                        .and_then(|db| db.constraint())
                        .is_some_and(|c| c == "idx_accounts_one_cash")
                {
                    Err(FireError::DuplicateCashAccount)
                } else {
                    Err(FireError::DuplicateAccountName {
                        name: account.name.clone(),
                    })
                }
            }
            Err(e) => Err(self.record(e)),
        }
    }

    fn set_balance(&mut self, account: AccountId, balance: Decimal) -> Result<(), FireError> {
        let updated = self
            .tx
            .execute(
                "UPDATE accounts SET balance = $1 WHERE id = $2",
                &[&balance, &account],
            )
            .map_err(|e| self.record(e))?;
        if updated != 1 {
            return Err(FireError::AccountNotFound {
                name: format!("#{account}"),
            });
        }
        Ok(())
    }

    fn append_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, FireError> {
        let (symbol, shares, price) = match &entry.kind {
            EntryKind::Trade {
                symbol,
                shares,
                price,
                ..
            } => (Some(symbol.as_str()), Some(*shares), Some(*price)),
            EntryKind::CashFlow { .. } => (None, None, None),
        };
        let row = self
            .tx
            .query_one(
                &format!(
                    "INSERT INTO transactions \
                         (user_id, account_id, type, symbol, shares, price, amount) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) \
                     RETURNING {ENTRY_COLUMNS}"
                ),
                &[
                    &entry.user_id,
                    &entry.account_id,
                    &entry.kind.label(),
                    &symbol,
                    &shares,
                    &price,
                    &entry.kind.cash_effect(),
                ],
            )
            .map_err(|e| self.record(e))?;
        entry_from_row(&row)
    }

    fn net_position(&mut self, user: UserId, symbol: &str) -> Result<i64, FireError> {
        let row = self
            .tx
            .query_one(
                "SELECT COALESCE(SUM(shares), 0)::BIGINT FROM transactions \
                 WHERE user_id = $1 AND symbol = $2 AND type IN ('BUY', 'SELL')",
                &[&user, &symbol],
            )
            .map_err(|e| self.record(e))?;
        row.try_get(0).map_err(query_err)
    }
}
