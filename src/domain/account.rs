//! Accounts: typed, per-user buckets holding a cash balance.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::error::FireError;
use super::user::UserId;

pub type AccountId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountType {
    Cash,
    Savings,
    Brokerage,
    Retirement,
    Health,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        AccountType::Cash,
        AccountType::Savings,
        AccountType::Brokerage,
        AccountType::Retirement,
        AccountType::Health,
    ];

    /// Stored and displayed form, e.g. `"CASH"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Cash => "CASH",
            AccountType::Savings => "SAVINGS",
            AccountType::Brokerage => "BROKERAGE",
            AccountType::Retirement => "RETIREMENT",
            AccountType::Health => "HEALTH",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = FireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CASH" => Ok(AccountType::Cash),
            "SAVINGS" => Ok(AccountType::Savings),
            "BROKERAGE" => Ok(AccountType::Brokerage),
            "RETIREMENT" => Ok(AccountType::Retirement),
            "HEALTH" => Ok(AccountType::Health),
            other => Err(FireError::invalid_input(
                "account type",
                format!("unsupported account type '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
}

impl Account {
    pub fn is_cash(&self) -> bool {
        self.account_type == AccountType::Cash
    }

    pub fn can_cover(&self, cost: Decimal) -> bool {
        self.balance >= cost
    }
}

/// Input for inserting an account row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn account_type_parses_case_insensitively() {
        assert_eq!("cash".parse::<AccountType>().unwrap(), AccountType::Cash);
        assert_eq!(
            " Retirement ".parse::<AccountType>().unwrap(),
            AccountType::Retirement
        );
    }

    #[test]
    fn account_type_rejects_unknown() {
        match "CHECKING".parse::<AccountType>() {
            Err(FireError::InvalidInput { field, .. }) => assert_eq!(field, "account type"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn account_type_round_trips_through_display() {
        for kind in AccountType::ALL {
            assert_eq!(kind.to_string().parse::<AccountType>().unwrap(), kind);
        }
    }

    #[test]
    fn can_cover_is_inclusive() {
        let account = Account {
            id: 1,
            user_id: 1,
            name: "Cash".into(),
            account_type: AccountType::Cash,
            balance: dec!(100.00),
        };
        assert!(account.can_cover(dec!(100.00)));
        assert!(!account.can_cover(dec!(100.01)));
        assert!(account.is_cash());
    }
}
