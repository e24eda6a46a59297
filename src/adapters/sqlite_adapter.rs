//! SQLite storage adapter.
//!
//! Money is stored as TEXT and parsed back into `Decimal`. Write transactions
//! open with `BEGIN IMMEDIATE`, which takes the database write lock up front
//! and so serializes balance and position checks across connections.

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::account::{Account, AccountId, AccountType, NewAccount};
use crate::domain::error::FireError;
use crate::domain::fire::FireProjection;
use crate::domain::ledger::{EntryKind, LedgerEntry, NewLedgerEntry, TradeSide};
use crate::domain::user::{User, UserId};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{LedgerStore, StoreTransaction};

/// How long a writer waits on another connection's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        hash TEXT NOT NULL,
        fire_number REAL,
        time_to_fire REAL
    );
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        name TEXT NOT NULL,
        type TEXT NOT NULL
            CHECK (type IN ('CASH', 'SAVINGS', 'BROKERAGE', 'RETIREMENT', 'HEALTH')),
        balance TEXT NOT NULL,
        UNIQUE (user_id, name)
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_one_cash
        ON accounts(user_id) WHERE type = 'CASH';
    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        type TEXT NOT NULL CHECK (type IN ('BUY', 'SELL', 'DEPOSIT')),
        symbol TEXT,
        shares INTEGER,
        price TEXT,
        amount TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_user_symbol
        ON transactions(user_id, symbol);
    CREATE TRIGGER IF NOT EXISTS transactions_no_update
        BEFORE UPDATE ON transactions
        BEGIN SELECT RAISE(ABORT, 'ledger entries are immutable'); END;
    CREATE TRIGGER IF NOT EXISTS transactions_no_delete
        BEFORE DELETE ON transactions
        BEGIN SELECT RAISE(ABORT, 'ledger entries are immutable'); END;
";

const ACCOUNT_COLUMNS: &str = "id, user_id, name, type, balance";
const ENTRY_COLUMNS: &str =
    "id, user_id, account_id, type, symbol, shares, price, amount, created_at";
const USER_COLUMNS: &str = "id, username, hash, fire_number, time_to_fire";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> FireError {
    FireError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> FireError {
    FireError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

fn conversion_err<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}

fn decimal_column(row: &Row<'_>, column: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(column)?;
    Decimal::from_str(&text).map_err(|e| conversion_err(column, e))
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let kind: String = row.get(3)?;
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        account_type: AccountType::from_str(&kind).map_err(|e| conversion_err(3, e))?,
        balance: decimal_column(row, 4)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        fire_number: row.get(3)?,
        time_to_fire: row.get(4)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let label: String = row.get(3)?;
    let kind = match label.as_str() {
        "DEPOSIT" => EntryKind::CashFlow {
            amount: decimal_column(row, 7)?,
        },
        "BUY" | "SELL" => EntryKind::Trade {
            symbol: row.get(4)?,
            side: if label == "BUY" {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            },
            shares: row.get(5)?,
            price: decimal_column(row, 6)?,
        },
        other => {
            return Err(conversion_err(
                3,
                std::io::Error::other(format!("unknown ledger entry type {other}")),
            ));
        }
    };
    let created: String = row.get(8)?;
    let created_at = DateTime::parse_from_rfc3339(&created)
        .map_err(|e| conversion_err(8, e))?
        .with_timezone(&Utc);
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        kind,
        created_at,
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FireError> {
        let db_path = config.require_string("sqlite", "path")?;
        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path).with_init(|c| {
            c.busy_timeout(BUSY_TIMEOUT)?;
            c.execute_batch("PRAGMA foreign_keys = ON;")
        });
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, FireError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FireError> {
        self.pool.get().map_err(pool_err)
    }
}

impl LedgerStore for SqliteAdapter {
    fn initialize_schema(&self) -> Result<(), FireError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    fn create_user(&self, username: &str, password_hash: &str) -> Result<User, FireError> {
        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO users (username, hash) VALUES (?1, ?2)",
            params![username, password_hash],
        ) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(FireError::auth("username already taken"));
            }
            Err(e) => return Err(query_err(e)),
        }
        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            fire_number: None,
            time_to_fire: None,
        })
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, FireError> {
        self.conn()?
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, FireError> {
        self.conn()?
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn save_projection(
        &self,
        user: UserId,
        projection: &FireProjection,
    ) -> Result<(), FireError> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE users SET fire_number = ?1, time_to_fire = ?2 WHERE id = ?3",
                params![projection.fire_number, projection.years_to_fire, user],
            )
            .map_err(query_err)?;
        if updated == 0 {
            return Err(FireError::auth(format!("no user with id {user}")));
        }
        Ok(())
    }

    fn list_accounts(&self, user: UserId) -> Result<Vec<Account>, FireError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 ORDER BY name"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user], account_from_row)
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err)
    }

    fn list_entries(&self, user: UserId) -> Result<Vec<LedgerEntry>, FireError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM transactions WHERE user_id = ?1 ORDER BY id"
            ))
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![user], entry_from_row)
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err)
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn StoreTransaction) -> Result<(), FireError>,
    ) -> Result<(), FireError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;
        {
            let mut scope = SqliteTransaction { conn: &tx };
            work(&mut scope)?;
        }
        tx.commit().map_err(query_err)
    }
}

/// A unit of work bound to an open `BEGIN IMMEDIATE` transaction. Dropping
/// the transaction without commit rolls everything back.
struct SqliteTransaction<'a> {
    conn: &'a Connection,
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn find_account(&mut self, user: UserId, name: &str) -> Result<Option<Account>, FireError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 AND name = ?2"
                ),
                params![user, name],
                account_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn find_cash_account(&mut self, user: UserId) -> Result<Option<Account>, FireError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 AND type = 'CASH'"
                ),
                params![user],
                account_from_row,
            )
            .optional()
            .map_err(query_err)
    }

    fn insert_account(
        &mut self,
        user: UserId,
        account: &NewAccount,
    ) -> Result<Account, FireError> {
        let result = self.conn.execute(
            "INSERT INTO accounts (user_id, name, type, balance) VALUES (?1, ?2, ?3, ?4)",
            params![
                user,
                account.name,
                account.account_type.as_str(),
                account.balance.to_string()
            ],
        );
        match result {
            Ok(_) => Ok(Account {
                id: self.conn.last_insert_rowid(),
                user_id: user,
                name: account.name.clone(),
                account_type: account.account_type,
                balance: account.balance,
            }),
            Err(e) if is_constraint_violation(&e) => {
                if account.account_type == AccountType::Cash
                    && self.find_cash_account(user)?.is_some()
                {
                    Err(FireError::DuplicateCashAccount)
                } else {
                    Err(FireError::DuplicateAccountName {
                        name: account.name.clone(),
                    })
                }
            }
            Err(e) => Err(query_err(e)),
        }
    }

    fn set_balance(&mut self, account: AccountId, balance: Decimal) -> Result<(), FireError> {
        let updated = self
            .conn
            .execute(
                "UPDATE accounts SET balance = ?1 WHERE id = ?2",
                params![balance.to_string(), account],
            )
            .map_err(query_err)?;
        if updated != 1 {
            return Err(FireError::AccountNotFound {
                name: format!("#{account}"),
            });
        }
        Ok(())
    }

    fn append_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry, FireError> {
        let created_at = Utc::now();
        let (symbol, shares, price) = match &entry.kind {
            EntryKind::Trade {
                symbol,
                shares,
                price,
                ..
            } => (Some(symbol.as_str()), Some(*shares), Some(price.to_string())),
            EntryKind::CashFlow { .. } => (None, None, None),
        };
        self.conn
            .execute(
                "INSERT INTO transactions
                     (user_id, account_id, type, symbol, shares, price, amount, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.user_id,
                    entry.account_id,
                    entry.kind.label(),
                    symbol,
                    shares,
                    price,
                    entry.kind.cash_effect().to_string(),
                    created_at.to_rfc3339()
                ],
            )
            .map_err(query_err)?;
        Ok(LedgerEntry {
            id: self.conn.last_insert_rowid(),
            user_id: entry.user_id,
            account_id: entry.account_id,
            kind: entry.kind.clone(),
            created_at,
        })
    }

    fn net_position(&mut self, user: UserId, symbol: &str) -> Result<i64, FireError> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(shares), 0) FROM transactions
                 WHERE user_id = ?1 AND symbol = ?2 AND type IN ('BUY', 'SELL')",
                params![user, symbol],
                |row| row.get(0),
            )
            .map_err(query_err)
    }
}
