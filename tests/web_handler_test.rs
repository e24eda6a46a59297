#![cfg(feature = "web")]
//! Handler integration tests for the web adapter.
//!
//! Each test builds the full router over an in-memory SQLite store and a
//! canned quote source, logs in, and drives the pages through forms.

mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use firetrack::adapters::web::{AppState, build_router};
use firetrack::domain::account::AccountType;
use firetrack::domain::bookkeeping::Bookkeeper;
use firetrack::ports::store_port::LedgerStore;
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tower::ServiceExt;

use common::*;

const USERNAME: &str = "alice";
const PASSWORD: &str = "alice-pw";

struct TestApp {
    router: Router,
    store: Arc<dyn LedgerStore>,
    quotes: Arc<MockQuotePort>,
    user_id: i64,
    cookie: String,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_config(MockConfigPort::for_web()).await
    }

    async fn with_config(config: MockConfigPort) -> Self {
        let store = memory_store();
        let user = make_user(&store, USERNAME);
        let store: Arc<dyn LedgerStore> = Arc::new(store);
        let quotes = Arc::new(market());
        let state = AppState {
            store: store.clone(),
            quotes: quotes.clone(),
            credentials: Arc::new(PlainCredentials),
            config: Arc::new(config),
        };
        let router = build_router(state).unwrap();

        let response = router
            .clone()
            .oneshot(post(
                "/login",
                &format!("username={USERNAME}&password={PASSWORD}"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|sc| sc.split(';').next().unwrap_or("").to_string())
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            router,
            store,
            quotes,
            user_id: user.id,
            cookie,
        }
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .uri(uri)
            .header(header::COOKIE, &self.cookie)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn post(&self, uri: &str, form: &str) -> (StatusCode, String) {
        let mut request = post(uri, form);
        request
            .headers_mut()
            .insert(header::COOKIE, self.cookie.parse().unwrap());
        self.send(request).await
    }

    async fn htmx_post(&self, uri: &str, form: &str) -> (StatusCode, String) {
        let mut request = post(uri, form);
        request
            .headers_mut()
            .insert(header::COOKIE, self.cookie.parse().unwrap());
        request
            .headers_mut()
            .insert("HX-Request", "true".parse().unwrap());
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn books(&self) -> Bookkeeper<'_> {
        Bookkeeper::new(self.store.as_ref(), self.quotes.as_ref())
    }
}

fn post(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

mod dashboard {
    use super::*;

    #[tokio::test]
    async fn empty_dashboard() {
        let app = TestApp::new().await;

        let (status, body) = app.get("/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<title>Dashboard | firetrack</title>"));
        assert!(body.contains("No accounts yet."));
        assert!(body.contains("No holdings."));
        assert!(body.contains("<p class=\"figure\">$0.00</p>"));
        assert!(body.contains("FIRE number: n/a"));
    }

    #[tokio::test]
    async fn shows_accounts_holdings_and_net_worth() {
        let app = TestApp::new().await;
        app.books().deposit(app.user_id, "", dec!(2000)).unwrap();
        app.books()
            .open_account(app.user_id, AccountType::Savings, "Rainy Day", dec!(1234.5))
            .unwrap();
        app.books().buy(app.user_id, "AAPL", 10, "Cash").unwrap();

        let (status, body) = app.get("/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<p class=\"figure\">$1,734.50</p>"));
        assert!(body.contains("Rainy Day"));
        assert!(body.contains("SAVINGS"));
        assert!(body.contains("Apple Inc."));
        assert!(body.contains("$1,500.00"));
    }

    #[tokio::test]
    async fn holdings_without_a_quote_are_skipped() {
        let app = TestApp::new().await;
        app.books().deposit(app.user_id, "", dec!(5000)).unwrap();
        app.books().buy(app.user_id, "MSFT", 1, "Cash").unwrap();

        let store = app.store.clone();
        let state = AppState {
            store,
            quotes: Arc::new(market().without("MSFT")),
            credentials: Arc::new(PlainCredentials),
            config: Arc::new(MockConfigPort::for_web()),
        };
        let router = build_router(state).unwrap();
        let login = router
            .clone()
            .oneshot(post(
                "/login",
                &format!("username={USERNAME}&password={PASSWORD}"),
            ))
            .await
            .unwrap();
        let cookie = login
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("No holdings."));
        assert!(!body.contains("Microsoft"));
    }
}

mod cash {
    use super::*;

    #[tokio::test]
    async fn deposit_creates_cash_account() {
        let app = TestApp::new().await;

        let (status, _) = app.post("/deposit", "account=&amount=1000").await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let accounts = app.store.list_accounts(app.user_id).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "Cash");
        assert_eq!(accounts[0].balance, dec!(1000));

        let (_, body) = app.get("/").await;
        assert!(body.contains("$1,000.00"));
    }

    #[tokio::test]
    async fn deposit_form_names_existing_cash_account() {
        let app = TestApp::new().await;
        app.books().deposit(app.user_id, "Checking", dec!(12.34)).unwrap();

        let (status, body) = app.get("/deposit").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<strong>Checking</strong> (balance $12.34)"));
    }

    #[tokio::test]
    async fn invalid_amount_is_bad_request() {
        let app = TestApp::new().await;

        for amount in ["abc", "0", "-5", "1.234"] {
            let (status, body) = app.post("/deposit", &format!("amount={amount}")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{amount}");
            assert!(body.contains("Error 400"));
        }
        assert!(app.store.list_entries(app.user_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn amounts_past_the_ceiling_are_bad_requests_not_crashes() {
        let app = TestApp::new().await;
        let (status, _) = app.post("/deposit", "amount=1000000000000000").await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        for amount in ["70000000000000000000000000000", "0.01"] {
            let (status, body) = app.post("/deposit", &format!("amount={amount}")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{amount}");
            assert!(body.contains("cannot exceed"));
        }

        for uri in ["/", "/accounts"] {
            let (status, body) = app.get(uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert!(body.contains("$1,000,000,000,000,000.00"));
        }
        assert_eq!(app.store.list_entries(app.user_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn htmx_errors_are_fragments() {
        let app = TestApp::new().await;

        let (status, body) = app.htmx_post("/deposit", "amount=").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("<div id=\"error\""));
        assert!(!body.contains("<!DOCTYPE html>"));
    }
}

mod accounts {
    use super::*;

    #[tokio::test]
    async fn open_account_then_list() {
        let app = TestApp::new().await;

        let (status, _) = app
            .post("/accounts", "name=Roth&account_type=RETIREMENT&balance=6500")
            .await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let (status, body) = app.get("/accounts").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Roth"));
        assert!(body.contains("RETIREMENT"));
        assert!(body.contains("$6,500.00"));
        assert!(body.contains("<option value=\"HEALTH\">"));
    }

    #[tokio::test]
    async fn duplicates_conflict() {
        let app = TestApp::new().await;
        app.books().deposit(app.user_id, "", dec!(1)).unwrap();

        let (status, _) = app
            .post("/accounts", "name=Wallet&account_type=CASH&balance=0")
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .post("/accounts", "name=Cash&account_type=SAVINGS&balance=0")
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_account_type_is_bad_request() {
        let app = TestApp::new().await;

        let (status, _) = app
            .post("/accounts", "name=Odd&account_type=CRYPTO&balance=0")
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.store.list_accounts(app.user_id).unwrap().is_empty());
    }
}

mod trading {
    use super::*;

    async fn funded(amount: rust_decimal::Decimal) -> TestApp {
        let app = TestApp::new().await;
        app.books().deposit(app.user_id, "", amount).unwrap();
        app
    }

    #[tokio::test]
    async fn buy_then_sell_through_forms() {
        let app = funded(dec!(2000)).await;

        let (status, _) = app.post("/buy", "symbol=aapl&shares=10&account=Cash").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let (status, _) = app.post("/sell", "symbol=AAPL&shares=4&account=Cash").await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let accounts = app.store.list_accounts(app.user_id).unwrap();
        assert_eq!(accounts[0].balance, dec!(1100));
        let (_, body) = app.get("/sell").await;
        assert!(body.contains("<option value=\"AAPL\">AAPL (6)</option>"));
    }

    #[tokio::test]
    async fn unknown_symbol_is_unprocessable() {
        let app = funded(dec!(2000)).await;

        let (status, body) = app.post("/buy", "symbol=NOPE&shares=1&account=Cash").await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("Unknown symbol: NOPE"));
        assert_eq!(app.store.list_entries(app.user_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insufficient_funds_is_unprocessable() {
        let app = funded(dec!(100)).await;

        let (status, body) = app.post("/buy", "symbol=MSFT&shares=1&account=Cash").await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("Insufficient funds"));
        assert_eq!(
            app.store.list_accounts(app.user_id).unwrap()[0].balance,
            dec!(100)
        );
    }

    #[tokio::test]
    async fn overselling_is_unprocessable() {
        let app = funded(dec!(2000)).await;
        app.books().buy(app.user_id, "VTI", 2, "Cash").unwrap();

        let (status, body) = app.post("/sell", "symbol=VTI&shares=3&account=Cash").await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("Insufficient shares of VTI"));
    }

    #[tokio::test]
    async fn non_cash_and_missing_accounts() {
        let app = funded(dec!(2000)).await;
        app.books()
            .open_account(app.user_id, AccountType::Brokerage, "Broker", dec!(9000))
            .unwrap();

        let (status, _) = app.post("/buy", "symbol=AAPL&shares=1&account=Broker").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = app.post("/buy", "symbol=AAPL&shares=1&account=Ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_share_counts_never_reach_the_quote_source() {
        let app = funded(dec!(2000)).await;

        for shares in ["0", "-1", "1.5", "ten", ""] {
            let (status, _) = app
                .post("/buy", &format!("symbol=AAPL&shares={shares}&account=Cash"))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{shares}");
        }
        assert_eq!(app.quotes.lookup_count(), 0);
    }

    #[tokio::test]
    async fn buy_form_needs_a_cash_account() {
        let app = TestApp::new().await;

        let (status, body) = app.get("/buy").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("You need a cash account first."));
    }
}

mod quotes {
    use super::*;

    #[tokio::test]
    async fn quote_lookup_renders_price() {
        let app = TestApp::new().await;

        let (status, body) = app.post("/quote", "symbol=vti").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("A share of Vanguard Total Stock Market ETF (VTI) costs $200.50."));
        assert!(body.contains("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn htmx_quote_is_a_fragment() {
        let app = TestApp::new().await;

        let (status, body) = app.htmx_post("/quote", "symbol=AAPL").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("<h1>Quote</h1>"));
        assert!(body.contains("costs $150.00."));
    }

    #[tokio::test]
    async fn unknown_or_blank_symbol() {
        let app = TestApp::new().await;

        let (status, _) = app.post("/quote", "symbol=ZZZZ").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = app.post("/quote", "symbol=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod history {
    use super::*;

    #[tokio::test]
    async fn history_lists_entries_oldest_first() {
        let app = TestApp::new().await;
        app.books().deposit(app.user_id, "", dec!(1000)).unwrap();
        app.books().buy(app.user_id, "AAPL", 2, "Cash").unwrap();

        let (status, body) = app.get("/history").await;

        assert_eq!(status, StatusCode::OK);
        let deposit = body.find("<td>DEPOSIT</td>").unwrap();
        let buy = body.find("<td>BUY</td>").unwrap();
        assert!(deposit < buy);
        assert!(body.contains("-$300.00"));
    }

    #[tokio::test]
    async fn empty_history() {
        let app = TestApp::new().await;
        let (_, body) = app.get("/history").await;
        assert!(body.contains("No transactions yet."));
    }
}

mod fire {
    use super::*;

    #[tokio::test]
    async fn projection_with_explicit_net_worth() {
        let app = TestApp::new().await;

        let (status, body) = app
            .post(
                "/fire",
                "income=100000&expenses=40000&savings_rate=50&net_worth=500000&swr=4&apr=7",
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("FIRE number: $1,000,000.00"));
        assert!(body.contains("Time to FIRE: 10.24 years"));

        let user = app.store.get_user(app.user_id).unwrap().unwrap();
        assert!(user.fire_number.is_some());
        let (_, dashboard) = app.get("/").await;
        assert!(dashboard.contains("FIRE number: $1,000,000.00"));
    }

    #[tokio::test]
    async fn blank_fields_use_net_worth_and_configured_defaults() {
        let config = MockConfigPort::for_web()
            .with("fire", "default_swr", "4")
            .with("fire", "default_apr", "7");
        let app = TestApp::with_config(config).await;
        app.books().deposit(app.user_id, "", dec!(100000)).unwrap();

        let (status, body) = app
            .post(
                "/fire",
                "income=80000&expenses=40000&savings_rate=30&net_worth=&swr=&apr=",
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("FIRE number: $1,000,000.00"));
        assert!(body.contains("Time to FIRE: 34.03 years"));
    }

    #[tokio::test]
    async fn undefined_results_render_as_na() {
        let app = TestApp::new().await;

        let (status, body) = app
            .post(
                "/fire",
                "income=1&expenses=40000&savings_rate=10&net_worth=0&swr=0&apr=7",
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("FIRE number: n/a"));
        assert!(body.contains("Time to FIRE: n/a"));
    }

    #[tokio::test]
    async fn missing_or_invalid_inputs_are_bad_requests() {
        let app = TestApp::new().await;

        let (status, _) = app.post("/fire", "income=&expenses=1&savings_rate=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app
            .post("/fire", "income=1&expenses=1&savings_rate=101")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let user = app.store.get_user(app.user_id).unwrap().unwrap();
        assert!(user.fire_number.is_none());
    }
}

mod misc {
    use super::*;

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("No page at /nope"));
    }

    #[tokio::test]
    async fn stylesheet_is_served() {
        let app = TestApp::new().await;
        let (status, _) = app.get("/static/style.css").await;
        assert_eq!(status, StatusCode::OK);
    }
}
