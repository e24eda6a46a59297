//! Money parsing and USD formatting.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::error::FireError;

/// Largest number of fractional digits accepted for a cash amount.
pub const CENTS_SCALE: u32 = 2;

/// Largest whole-dollar amount an account balance (and so any single
/// amount) may reach.
pub const MAX_BALANCE_DOLLARS: i64 = 1_000_000_000_000_000;

pub fn max_balance() -> Decimal {
    Decimal::from(MAX_BALANCE_DOLLARS)
}

fn over_limit() -> FireError {
    FireError::InvalidAmount {
        reason: format!("amounts cannot exceed {}", usd(max_balance())),
    }
}

/// `balance + amount`, rejected when the result passes [`max_balance`].
pub fn credit(balance: Decimal, amount: Decimal) -> Result<Decimal, FireError> {
    balance
        .checked_add(amount)
        .filter(|total| *total <= max_balance())
        .ok_or_else(over_limit)
}

/// `balance - amount`. Callers check coverage first.
pub fn debit(balance: Decimal, amount: Decimal) -> Result<Decimal, FireError> {
    balance.checked_sub(amount).ok_or_else(over_limit)
}

/// Cost of `shares` at `price`.
pub fn trade_value(price: Decimal, shares: i64) -> Result<Decimal, FireError> {
    price
        .checked_mul(Decimal::from(shares))
        .filter(|total| *total <= max_balance())
        .ok_or_else(over_limit)
}

/// Sum that fails instead of overflowing.
pub fn checked_total(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, FireError> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(over_limit)
}

fn parse_decimal(input: &str) -> Result<Decimal, FireError> {
    let cleaned: String = input
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.is_empty() {
        return Err(FireError::InvalidAmount {
            reason: "amount is required".into(),
        });
    }
    let value = Decimal::from_str(&cleaned).map_err(|_| FireError::InvalidAmount {
        reason: format!("'{}' is not a number", input.trim()),
    })?;
    if value.normalize().scale() > CENTS_SCALE {
        return Err(FireError::InvalidAmount {
            reason: "at most two decimal places are allowed".into(),
        });
    }
    if value.abs() > max_balance() {
        return Err(over_limit());
    }
    Ok(value)
}

/// Parses a strictly positive cash amount such as `"1,250.00"` or `"$40"`.
pub fn parse_amount(input: &str) -> Result<Decimal, FireError> {
    let value = parse_decimal(input)?;
    if value <= Decimal::ZERO {
        return Err(FireError::InvalidAmount {
            reason: "amount must be greater than zero".into(),
        });
    }
    Ok(value)
}

/// Parses a non-negative opening balance. Blank input means zero.
pub fn parse_balance(input: &str) -> Result<Decimal, FireError> {
    if input.trim().is_empty() {
        return Ok(Decimal::ZERO);
    }
    let value = parse_decimal(input)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(FireError::InvalidAmount {
            reason: "balance cannot be negative".into(),
        });
    }
    Ok(value)
}

/// Formats as US dollars: `$1,234.56`, `-$1,234.56`, `$0.00`.
pub fn usd(value: Decimal) -> String {
    let rounded = value.round_dp(CENTS_SCALE);
    if rounded.is_zero() {
        return "$0.00".to_string();
    }
    let text = format!("{:.2}", rounded.abs());
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if rounded.is_sign_negative() { "-" } else { "" };
    format!("{sign}${}.{frac}", group_thousands(whole))
}

/// [`usd`] for float values; non-finite input renders as `$0.00`.
pub fn usd_f64(value: f64) -> String {
    Decimal::try_from(value)
        .map(usd)
        .unwrap_or_else(|_| "$0.00".to_string())
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
