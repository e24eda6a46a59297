//! HTML templates using Askama.
//!
//! Every page template renders a fragment; the layout is applied by the
//! router middleware. Money and dates are formatted before they reach a
//! template.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::domain::account::Account;
use crate::domain::money::{usd, usd_f64};
use crate::domain::quote::Quote;
use crate::domain::valuation::{Holding, HistoryRow};

use super::{Fragment, WebError};

/// Renders `template` as a fragment response titled `title`.
pub(crate) fn page(
    title: &str,
    status: StatusCode,
    template: &impl Template,
) -> Result<Response, WebError> {
    let html = template
        .render()
        .map_err(|e| WebError::internal(e.to_string()))?;
    let mut response = (status, Html(html)).into_response();
    response.extensions_mut().insert(Fragment {
        title: title.to_string(),
    });
    Ok(response)
}

#[derive(Template)]
#[template(path = "base.html")]
pub struct BasePage<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub username: &'a str,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    pub message: &'a str,
    pub status: u16,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: String,
    pub username: String,
    pub next: String,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub error: String,
    pub username: String,
}

pub struct AccountRow {
    pub name: String,
    pub kind: &'static str,
    pub balance: String,
}

impl From<&Account> for AccountRow {
    fn from(account: &Account) -> Self {
        Self {
            name: account.name.clone(),
            kind: account.account_type.as_str(),
            balance: usd(account.balance),
        }
    }
}

pub struct HoldingRow {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: String,
    pub value: String,
}

impl From<&Holding> for HoldingRow {
    fn from(holding: &Holding) -> Self {
        Self {
            symbol: holding.symbol.clone(),
            name: holding.name.clone(),
            shares: holding.shares,
            price: usd(holding.price),
            value: usd(holding.value),
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub username: String,
    pub net_worth: String,
    pub accounts: Vec<AccountRow>,
    pub holdings: Vec<HoldingRow>,
    pub holdings_total: String,
    pub fire_number: String,
    pub time_to_fire: String,
}

#[derive(Template)]
#[template(path = "accounts.html")]
pub struct AccountsTemplate {
    pub accounts: Vec<AccountRow>,
    pub account_types: Vec<&'static str>,
    pub total: String,
}

#[derive(Template)]
#[template(path = "deposit.html")]
pub struct DepositTemplate {
    pub cash_account: String,
    pub has_cash_account: bool,
    pub balance: String,
}

pub struct PositionRow {
    pub symbol: String,
    pub shares: i64,
}

#[derive(Template)]
#[template(path = "trade.html")]
pub struct TradeTemplate {
    /// `"buy"` or `"sell"`; also the form's action path.
    pub action: &'static str,
    pub heading: &'static str,
    pub cash_accounts: Vec<AccountRow>,
    pub positions: Vec<PositionRow>,
}

pub struct QuoteRow {
    pub symbol: String,
    pub name: String,
    pub price: String,
}

impl From<&Quote> for QuoteRow {
    fn from(quote: &Quote) -> Self {
        Self {
            symbol: quote.symbol.clone(),
            name: quote.name.clone(),
            price: usd(quote.price),
        }
    }
}

#[derive(Template)]
#[template(path = "quote.html")]
pub struct QuoteTemplate {
    pub quote: Option<QuoteRow>,
}

pub struct HistoryLine {
    pub when: String,
    pub kind: &'static str,
    pub account: String,
    pub symbol: String,
    pub shares: String,
    pub price: String,
    pub amount: String,
}

impl From<&HistoryRow> for HistoryLine {
    fn from(row: &HistoryRow) -> Self {
        Self {
            when: row.entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            kind: row.entry.kind.label(),
            account: row.account_name.clone(),
            symbol: row.entry.kind.symbol().unwrap_or("").to_string(),
            shares: row.shares().map(|s| s.to_string()).unwrap_or_default(),
            price: row.price().map(usd).unwrap_or_default(),
            amount: usd(row.entry.kind.cash_effect()),
        }
    }
}

#[derive(Template)]
#[template(path = "history.html")]
pub struct HistoryTemplate {
    pub rows: Vec<HistoryLine>,
}

pub struct FireResult {
    pub fire_number: String,
    pub years_to_fire: String,
}

impl FireResult {
    pub fn new(fire_number: Option<f64>, years_to_fire: Option<f64>) -> Self {
        Self {
            fire_number: fire_number.map(usd_f64).unwrap_or_else(|| "n/a".into()),
            years_to_fire: years_to_fire
                .map(|y| format!("{y:.2} years"))
                .unwrap_or_else(|| "n/a".into()),
        }
    }
}

#[derive(Template)]
#[template(path = "fire.html")]
pub struct FireTemplate {
    pub net_worth: String,
    pub default_swr: f64,
    pub default_apr: f64,
    pub result: Option<FireResult>,
}
