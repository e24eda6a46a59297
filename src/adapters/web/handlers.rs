//! HTTP request handlers for the web adapter.

use axum::{
    Form,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::domain::account::AccountType;
use crate::domain::auth;
use crate::domain::bookkeeping::{Bookkeeper, DEFAULT_CASH_ACCOUNT};
use crate::domain::error::FireError;
use crate::domain::fire::{self, DEFAULT_APR, DEFAULT_SWR, FireInputs};
use crate::domain::input::{parse_number, parse_required_number, parse_shares, parse_symbol};
use crate::domain::money::{parse_amount, parse_balance, usd, usd_f64};
use crate::domain::valuation::{self, DEFAULT_TOP_HOLDINGS};

use super::templates::{
    AccountRow, AccountsTemplate, DashboardTemplate, DepositTemplate, FireResult, FireTemplate,
    HistoryLine, HistoryTemplate, HoldingRow, LoginTemplate, PositionRow, QuoteRow,
    QuoteTemplate, RegisterTemplate, TradeTemplate, page,
};
use super::{AppState, AuthSession, Credentials, SessionUser, WebError, blocking};

type SharedState = State<Arc<AppState>>;

const INVALID_LOGIN: &str = "Invalid username or password";

fn current_user(auth_session: &AuthSession) -> Result<SessionUser, WebError> {
    auth_session
        .user
        .clone()
        .ok_or_else(|| WebError::new(StatusCode::UNAUTHORIZED, "Please log in"))
}

/// Only same-site absolute paths are followed after login.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}

fn fire_defaults(state: &AppState) -> (f64, f64) {
    (
        state.config.get_double("fire", "default_swr", DEFAULT_SWR),
        state.config.get_double("fire", "default_apr", DEFAULT_APR),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

pub async fn login_form(
    auth_session: AuthSession,
    Query(query): Query<NextQuery>,
) -> Result<Response, WebError> {
    if auth_session.user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    page(
        "Log In",
        StatusCode::OK,
        &LoginTemplate {
            error: String::new(),
            username: String::new(),
            next: query.next.unwrap_or_default(),
        },
    )
}

pub async fn login(
    mut auth_session: AuthSession,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    let creds = Credentials {
        username: form.username.clone(),
        password: form.password,
    };
    let user = match auth_session.authenticate(creds).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return page(
                "Log In",
                StatusCode::UNAUTHORIZED,
                &LoginTemplate {
                    error: INVALID_LOGIN.into(),
                    username: form.username,
                    next: form.next.unwrap_or_default(),
                },
            );
        }
        Err(axum_login::Error::Backend(e)) => return Err(e.into()),
        Err(e) => return Err(WebError::internal(e.to_string())),
    };

    auth_session
        .login(&user)
        .await
        .map_err(|e| WebError::internal(e.to_string()))?;
    info!(user = user.id, "user logged in");
    Ok(Redirect::to(safe_next(form.next.as_deref())).into_response())
}

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirmation: String,
}

pub async fn register_form() -> Result<Response, WebError> {
    page(
        "Register",
        StatusCode::OK,
        &RegisterTemplate {
            error: String::new(),
            username: String::new(),
        },
    )
}

pub async fn register(
    State(state): SharedState,
    mut auth_session: AuthSession,
    Form(form): Form<RegisterForm>,
) -> Result<Response, WebError> {
    let username = form.username.clone();
    let result = blocking(move || {
        auth::register(
            state.store.as_ref(),
            state.credentials.as_ref(),
            &form.username,
            &form.password,
            &form.confirmation,
        )
    })
    .await;

    let user = match result {
        Ok(user) => user,
        Err(e) => {
            let err = WebError::from(e);
            if !err.status.is_client_error() {
                return Err(err);
            }
            return page(
                "Register",
                err.status,
                &RegisterTemplate {
                    error: err.message,
                    username,
                },
            );
        }
    };

    auth_session
        .login(&SessionUser::from(user))
        .await
        .map_err(|e| WebError::internal(e.to_string()))?;
    Ok(Redirect::to("/").into_response())
}

pub async fn logout(mut auth_session: AuthSession) -> Result<Response, WebError> {
    if let Some(user) = auth_session
        .logout()
        .await
        .map_err(|e| WebError::internal(e.to_string()))?
    {
        info!(user = user.id, "user logged out");
    }
    Ok(Redirect::to("/login").into_response())
}

pub async fn dashboard(
    State(state): SharedState,
    auth_session: AuthSession,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let user_id = user.id;
    let (accounts, holdings, record) = blocking(move || {
        let accounts = state.store.list_accounts(user_id)?;
        let holdings = valuation::top_holdings(
            state.store.as_ref(),
            state.quotes.as_ref(),
            user_id,
            DEFAULT_TOP_HOLDINGS,
        )?;
        let record = state.store.get_user(user_id)?;
        Ok((accounts, holdings, record))
    })
    .await?;

    let cached = FireResult::new(
        record.as_ref().and_then(|u| u.fire_number),
        record.as_ref().and_then(|u| u.time_to_fire),
    );
    page(
        "Dashboard",
        StatusCode::OK,
        &DashboardTemplate {
            username: user.username,
            net_worth: usd(valuation::total_balance(&accounts)?),
            accounts: accounts.iter().map(AccountRow::from).collect(),
            holdings_total: usd(valuation::holdings_value(&holdings)?),
            holdings: holdings.iter().map(HoldingRow::from).collect(),
            fire_number: cached.fire_number,
            time_to_fire: cached.years_to_fire,
        },
    )
}

pub async fn accounts(
    State(state): SharedState,
    auth_session: AuthSession,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let accounts = blocking(move || state.store.list_accounts(user.id)).await?;
    page(
        "Accounts",
        StatusCode::OK,
        &AccountsTemplate {
            total: usd(valuation::total_balance(&accounts)?),
            accounts: accounts.iter().map(AccountRow::from).collect(),
            account_types: AccountType::ALL.iter().map(|t| t.as_str()).collect(),
        },
    )
}

#[derive(Deserialize)]
pub struct OpenAccountForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub balance: String,
}

pub async fn open_account(
    State(state): SharedState,
    auth_session: AuthSession,
    Form(form): Form<OpenAccountForm>,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let account_type = AccountType::from_str(&form.account_type)?;
    let balance = parse_balance(&form.balance)?;
    blocking(move || {
        Bookkeeper::new(state.store.as_ref(), state.quotes.as_ref()).open_account(
            user.id,
            account_type,
            &form.name,
            balance,
        )
    })
    .await?;
    Ok(Redirect::to("/accounts").into_response())
}

pub async fn deposit_form(
    State(state): SharedState,
    auth_session: AuthSession,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let accounts = blocking(move || state.store.list_accounts(user.id)).await?;
    let cash = accounts.iter().find(|a| a.is_cash());
    page(
        "Deposit",
        StatusCode::OK,
        &DepositTemplate {
            cash_account: cash
                .map(|a| a.name.clone())
                .unwrap_or_else(|| DEFAULT_CASH_ACCOUNT.to_string()),
            has_cash_account: cash.is_some(),
            balance: cash.map(|a| usd(a.balance)).unwrap_or_default(),
        },
    )
}

#[derive(Deserialize)]
pub struct DepositForm {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub amount: String,
}

pub async fn deposit(
    State(state): SharedState,
    auth_session: AuthSession,
    Form(form): Form<DepositForm>,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let amount = parse_amount(&form.amount)?;
    blocking(move || {
        Bookkeeper::new(state.store.as_ref(), state.quotes.as_ref()).deposit(
            user.id,
            &form.account,
            amount,
        )
    })
    .await?;
    Ok(Redirect::to("/").into_response())
}

async fn trade_form(
    state: Arc<AppState>,
    auth_session: &AuthSession,
    action: &'static str,
    heading: &'static str,
) -> Result<Response, WebError> {
    let user = current_user(auth_session)?;
    let (accounts, positions) = blocking(move || {
        let accounts = state.store.list_accounts(user.id)?;
        let positions = valuation::positions(state.store.as_ref(), user.id)?;
        Ok((accounts, positions))
    })
    .await?;
    page(
        heading,
        StatusCode::OK,
        &TradeTemplate {
            action,
            heading,
            cash_accounts: accounts
                .iter()
                .filter(|a| a.is_cash())
                .map(AccountRow::from)
                .collect(),
            positions: positions
                .into_iter()
                .map(|(symbol, shares)| PositionRow { symbol, shares })
                .collect(),
        },
    )
}

pub async fn buy_form(
    State(state): SharedState,
    auth_session: AuthSession,
) -> Result<Response, WebError> {
    trade_form(state, &auth_session, "buy", "Buy").await
}

pub async fn sell_form(
    State(state): SharedState,
    auth_session: AuthSession,
) -> Result<Response, WebError> {
    trade_form(state, &auth_session, "sell", "Sell").await
}

#[derive(Deserialize)]
pub struct TradeForm {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub shares: String,
    #[serde(default)]
    pub account: String,
}

pub async fn buy(
    State(state): SharedState,
    auth_session: AuthSession,
    Form(form): Form<TradeForm>,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let shares = parse_shares(&form.shares)?;
    blocking(move || {
        Bookkeeper::new(state.store.as_ref(), state.quotes.as_ref()).buy(
            user.id,
            &form.symbol,
            shares,
            &form.account,
        )
    })
    .await?;
    Ok(Redirect::to("/").into_response())
}

pub async fn sell(
    State(state): SharedState,
    auth_session: AuthSession,
    Form(form): Form<TradeForm>,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let shares = parse_shares(&form.shares)?;
    blocking(move || {
        Bookkeeper::new(state.store.as_ref(), state.quotes.as_ref()).sell(
            user.id,
            &form.symbol,
            shares,
            &form.account,
        )
    })
    .await?;
    Ok(Redirect::to("/").into_response())
}

pub async fn quote_form() -> Result<Response, WebError> {
    page("Quote", StatusCode::OK, &QuoteTemplate { quote: None })
}

#[derive(Deserialize)]
pub struct QuoteForm {
    #[serde(default)]
    pub symbol: String,
}

pub async fn quote(
    State(state): SharedState,
    Form(form): Form<QuoteForm>,
) -> Result<Response, WebError> {
    let symbol = parse_symbol(&form.symbol)?;
    let quote = blocking(move || {
        state
            .quotes
            .lookup(&symbol)
            .ok_or(FireError::UnknownSymbol { symbol })
    })
    .await?;
    page(
        "Quote",
        StatusCode::OK,
        &QuoteTemplate {
            quote: Some(QuoteRow::from(&quote)),
        },
    )
}

pub async fn history(
    State(state): SharedState,
    auth_session: AuthSession,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let rows = blocking(move || valuation::history(state.store.as_ref(), user.id)).await?;
    page(
        "History",
        StatusCode::OK,
        &HistoryTemplate {
            rows: rows.iter().map(HistoryLine::from).collect(),
        },
    )
}

pub async fn fire_form(
    State(state): SharedState,
    auth_session: AuthSession,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let (default_swr, default_apr) = fire_defaults(&state);
    let net_worth = blocking(move || valuation::net_worth(state.store.as_ref(), user.id)).await?;
    page(
        "FIRE",
        StatusCode::OK,
        &FireTemplate {
            net_worth: usd(net_worth),
            default_swr,
            default_apr,
            result: None,
        },
    )
}

#[derive(Deserialize)]
pub struct FireForm {
    #[serde(default)]
    pub income: String,
    #[serde(default)]
    pub expenses: String,
    #[serde(default)]
    pub savings_rate: String,
    #[serde(default)]
    pub net_worth: String,
    #[serde(default)]
    pub swr: String,
    #[serde(default)]
    pub apr: String,
}

pub async fn fire(
    State(state): SharedState,
    auth_session: AuthSession,
    Form(form): Form<FireForm>,
) -> Result<Response, WebError> {
    let user = current_user(&auth_session)?;
    let (default_swr, default_apr) = fire_defaults(&state);
    let income = parse_required_number("income", &form.income)?;
    let expenses = parse_required_number("expenses", &form.expenses)?;
    let savings_rate = parse_required_number("savings rate", &form.savings_rate)?;
    let explicit_net_worth = parse_number("net worth", &form.net_worth)?;
    let swr = parse_number("safe withdrawal rate", &form.swr)?.unwrap_or(default_swr);
    let apr = parse_number("annual return", &form.apr)?.unwrap_or(default_apr);

    let (net_worth, projection) = blocking(move || {
        let net_worth = match explicit_net_worth {
            Some(value) => value,
            None => f64::try_from(valuation::net_worth(state.store.as_ref(), user.id)?)
                .unwrap_or(0.0),
        };
        let inputs = FireInputs {
            income,
            expenses,
            savings_rate,
            net_worth,
            swr,
            apr,
        };
        let projection = fire::project_and_save(state.store.as_ref(), user.id, &inputs)?;
        Ok((net_worth, projection))
    })
    .await?;

    page(
        "FIRE",
        StatusCode::OK,
        &FireTemplate {
            net_worth: usd_f64(net_worth),
            default_swr,
            default_apr,
            result: Some(FireResult::new(
                projection.fire_number,
                projection.years_to_fire,
            )),
        },
    )
}

pub async fn not_found(uri: Uri) -> WebError {
    WebError::not_found(format!("No page at {}", uri.path()))
}
