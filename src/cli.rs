//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use crate::adapters::argon2_credentials::Argon2Credentials;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::open_store;
use crate::adapters::yahoo_quote_adapter::YahooQuoteAdapter;
use crate::domain::account::AccountType;
use crate::domain::auth;
use crate::domain::bookkeeping::{Bookkeeper, Receipt};
use crate::domain::error::FireError;
use crate::domain::fire::{self, DEFAULT_APR, DEFAULT_SWR, FireInputs};
use crate::domain::input::{parse_number, parse_required_number, parse_shares, parse_symbol};
use crate::domain::ledger::EntryKind;
use crate::domain::money::{parse_amount, parse_balance, usd, usd_f64};
use crate::domain::user::User;
use crate::domain::valuation::{self, DEFAULT_TOP_HOLDINGS};
use crate::log::init_logging;
use crate::ports::config_port::ConfigPort;
use crate::ports::credential_port::CredentialPort;
use crate::ports::quote_port::QuotePort;
use crate::ports::store_port::LedgerStore;

pub const DEFAULT_CONFIG_PATH: &str = "firetrack.ini";

#[derive(Parser, Debug)]
#[command(name = "firetrack", about = "Personal finance ledger and FIRE calculator")]
pub struct Cli {
    /// Path to the INI configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the web server
    Serve,
    /// Create the database schema
    InitDb,
    /// Register a user (password read from stdin when omitted)
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Open a new account
    OpenAccount {
        #[arg(long)]
        user: String,
        #[arg(long = "type")]
        account_type: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "0")]
        balance: String,
    },
    /// Deposit cash into the user's cash account
    Deposit {
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: String,
        /// Name for the cash account if one has to be created
        #[arg(long, default_value = "")]
        account: String,
    },
    /// Buy shares at the current quote
    Buy {
        #[arg(long)]
        user: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        shares: String,
        /// Cash account to pay from (defaults to the user's cash account)
        #[arg(long)]
        account: Option<String>,
    },
    /// Sell shares at the current quote
    Sell {
        #[arg(long)]
        user: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        shares: String,
        /// Cash account to credit (defaults to the user's cash account)
        #[arg(long)]
        account: Option<String>,
    },
    /// Look up the current quote for a symbol
    Quote {
        #[arg(long)]
        symbol: String,
    },
    /// Show net worth, accounts and top holdings
    Summary {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = DEFAULT_TOP_HOLDINGS)]
        top: usize,
    },
    /// List every ledger entry, oldest first
    History {
        #[arg(long)]
        user: String,
    },
    /// Compute and save a FIRE projection
    Fire {
        #[arg(long)]
        user: String,
        #[arg(long)]
        income: String,
        #[arg(long)]
        expenses: String,
        #[arg(long)]
        savings_rate: String,
        /// Defaults to the user's current net worth
        #[arg(long)]
        net_worth: Option<String>,
        #[arg(long)]
        swr: Option<String>,
        #[arg(long)]
        apr: Option<String>,
    },
}

/// The ports a command runs against.
pub struct Context<'a> {
    pub store: &'a dyn LedgerStore,
    pub quotes: &'a dyn QuotePort,
    pub credentials: &'a dyn CredentialPort,
    pub config: &'a dyn ConfigPort,
}

pub fn run(cli: Cli) -> ExitCode {
    if cli.verbose {
        init_logging(Some("debug"));
    }
    let result = match &cli.command {
        Command::Serve => run_serve(&cli.config),
        command => run_command(&cli.config, command),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

/// Loads the INI file and installs logging at its `[log] level`.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, FireError> {
    let config = FileConfigAdapter::from_file(path).map_err(|e| FireError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    init_logging(config.get_string("log", "level").as_deref());
    Ok(config)
}

fn run_command(config_path: &Path, command: &Command) -> Result<(), FireError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    store.initialize_schema()?;
    let quotes = YahooQuoteAdapter::from_config(&config)?;
    let ctx = Context {
        store: store.as_ref(),
        quotes: &quotes,
        credentials: &Argon2Credentials,
        config: &config,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(command, &ctx, &mut out)
}

fn read_password() -> Result<String, FireError> {
    eprintln!("Enter password:");
    let line = io::stdin().lock().lines().next().transpose()?;
    Ok(line.unwrap_or_default())
}

/// Looks a user up by name; an unknown name is `AuthFailure`.
pub fn resolve_user(store: &dyn LedgerStore, username: &str) -> Result<User, FireError> {
    store
        .find_user_by_username(username.trim())?
        .ok_or_else(|| FireError::auth(format!("no user named '{}'", username.trim())))
}

/// Explicit account name, or the user's cash account when omitted.
fn trade_account(
    store: &dyn LedgerStore,
    user: &User,
    account: Option<&str>,
) -> Result<String, FireError> {
    if let Some(name) = account {
        return Ok(name.to_string());
    }
    store
        .list_accounts(user.id)?
        .into_iter()
        .find(|a| a.is_cash())
        .map(|a| a.name)
        .ok_or_else(|| FireError::AccountNotFound {
            name: "cash account".into(),
        })
}

fn print_trade(out: &mut dyn Write, verb: &str, receipt: &Receipt) -> Result<(), FireError> {
    if let (Some(quote), EntryKind::Trade { shares, price, .. }) =
        (&receipt.quote, &receipt.entry.kind)
    {
        writeln!(
            out,
            "{verb} {} {} ({}) at {} for {}",
            shares.abs(),
            quote.symbol,
            quote.name,
            usd(*price),
            usd(receipt.entry.kind.cash_effect().abs()),
        )?;
    }
    writeln!(
        out,
        "{} balance: {}",
        receipt.account.name,
        usd(receipt.account.balance)
    )?;
    Ok(())
}

/// Runs one non-server command, writing its report to `out`.
pub fn execute(command: &Command, ctx: &Context, out: &mut dyn Write) -> Result<(), FireError> {
    let books = Bookkeeper::new(ctx.store, ctx.quotes);
    match command {
        Command::Serve => Err(FireError::invalid_input(
            "command",
            "serve cannot run as a one-shot command",
        )),
        Command::InitDb => {
            ctx.store.initialize_schema()?;
            writeln!(out, "Database schema is ready")?;
            Ok(())
        }
        Command::Register { username, password } => {
            let password = match password {
                Some(p) => p.clone(),
                None => read_password()?,
            };
            let user = auth::register(ctx.store, ctx.credentials, username, &password, &password)?;
            writeln!(out, "Registered {} (id {})", user.username, user.id)?;
            Ok(())
        }
        Command::OpenAccount {
            user,
            account_type,
            name,
            balance,
        } => {
            let user = resolve_user(ctx.store, user)?;
            let account_type = AccountType::from_str(account_type)?;
            let balance = parse_balance(balance)?;
            let account = books.open_account(user.id, account_type, name, balance)?;
            writeln!(
                out,
                "Opened {} account {} with balance {}",
                account.account_type,
                account.name,
                usd(account.balance)
            )?;
            Ok(())
        }
        Command::Deposit {
            user,
            amount,
            account,
        } => {
            let user = resolve_user(ctx.store, user)?;
            let amount = parse_amount(amount)?;
            let receipt = books.deposit(user.id, account, amount)?;
            writeln!(
                out,
                "Deposited {} into {}; balance {}",
                usd(amount),
                receipt.account.name,
                usd(receipt.account.balance)
            )?;
            Ok(())
        }
        Command::Buy {
            user,
            symbol,
            shares,
            account,
        } => {
            let user = resolve_user(ctx.store, user)?;
            let shares = parse_shares(shares)?;
            let account = trade_account(ctx.store, &user, account.as_deref())?;
            let receipt = books.buy(user.id, symbol, shares, &account)?;
            print_trade(out, "Bought", &receipt)
        }
        Command::Sell {
            user,
            symbol,
            shares,
            account,
        } => {
            let user = resolve_user(ctx.store, user)?;
            let shares = parse_shares(shares)?;
            let account = trade_account(ctx.store, &user, account.as_deref())?;
            let receipt = books.sell(user.id, symbol, shares, &account)?;
            print_trade(out, "Sold", &receipt)
        }
        Command::Quote { symbol } => {
            let symbol = parse_symbol(symbol)?;
            let quote = ctx
                .quotes
                .lookup(&symbol)
                .ok_or(FireError::UnknownSymbol { symbol })?;
            writeln!(
                out,
                "A share of {} ({}) costs {}",
                quote.name,
                quote.symbol,
                usd(quote.price)
            )?;
            Ok(())
        }
        Command::Summary { user, top } => {
            let user = resolve_user(ctx.store, user)?;
            let accounts = ctx.store.list_accounts(user.id)?;
            writeln!(
                out,
                "Net worth: {}",
                usd(valuation::total_balance(&accounts)?)
            )?;
            writeln!(out)?;
            writeln!(out, "Accounts:")?;
            if accounts.is_empty() {
                writeln!(out, "  (none)")?;
            }
            for account in &accounts {
                writeln!(
                    out,
                    "  {:<20} {:<10} {:>15}",
                    account.name,
                    account.account_type,
                    usd(account.balance)
                )?;
            }
            let holdings = valuation::top_holdings(ctx.store, ctx.quotes, user.id, *top)?;
            writeln!(out)?;
            writeln!(out, "Top holdings:")?;
            if holdings.is_empty() {
                writeln!(out, "  (none)")?;
            }
            for holding in &holdings {
                writeln!(
                    out,
                    "  {:<8} {:>8} x {:>12} = {:>15}  {}",
                    holding.symbol,
                    holding.shares,
                    usd(holding.price),
                    usd(holding.value),
                    holding.name
                )?;
            }
            writeln!(out)?;
            writeln!(
                out,
                "FIRE number: {}",
                user.fire_number.map(usd_f64).unwrap_or_else(|| "n/a".into())
            )?;
            writeln!(
                out,
                "Time to FIRE: {}",
                user.time_to_fire
                    .map(|y| format!("{y:.2} years"))
                    .unwrap_or_else(|| "n/a".into())
            )?;
            Ok(())
        }
        Command::History { user } => {
            let user = resolve_user(ctx.store, user)?;
            for row in valuation::history(ctx.store, user.id)? {
                writeln!(
                    out,
                    "{}  {:<7} {:<16} {:<8} {:>8} {:>12} {:>14}",
                    row.entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    row.entry.kind.label(),
                    row.account_name,
                    row.entry.kind.symbol().unwrap_or("-"),
                    row.shares().map(|s| s.to_string()).unwrap_or_default(),
                    row.price().map(usd).unwrap_or_default(),
                    usd(row.entry.kind.cash_effect()),
                )?;
            }
            Ok(())
        }
        Command::Fire {
            user,
            income,
            expenses,
            savings_rate,
            net_worth,
            swr,
            apr,
        } => {
            let user = resolve_user(ctx.store, user)?;
            let optional = |field: &str, value: &Option<String>| -> Result<Option<f64>, FireError> {
                match value {
                    Some(v) => parse_number(field, v),
                    None => Ok(None),
                }
            };
            let net_worth = match optional("net worth", net_worth)? {
                Some(v) => v,
                None => f64::try_from(valuation::net_worth(ctx.store, user.id)?).unwrap_or(0.0),
            };
            let inputs = FireInputs {
                income: parse_required_number("income", income)?,
                expenses: parse_required_number("expenses", expenses)?,
                savings_rate: parse_required_number("savings rate", savings_rate)?,
                net_worth,
                swr: optional("safe withdrawal rate", swr)?
                    .unwrap_or_else(|| ctx.config.get_double("fire", "default_swr", DEFAULT_SWR)),
                apr: optional("annual return", apr)?
                    .unwrap_or_else(|| ctx.config.get_double("fire", "default_apr", DEFAULT_APR)),
            };
            let projection = fire::project_and_save(ctx.store, user.id, &inputs)?;
            writeln!(
                out,
                "FIRE number: {}",
                projection
                    .fire_number
                    .map(usd_f64)
                    .unwrap_or_else(|| "n/a".into())
            )?;
            writeln!(
                out,
                "Time to FIRE: {}",
                projection
                    .years_to_fire
                    .map(|y| format!("{y:.2} years"))
                    .unwrap_or_else(|| "n/a".into())
            )?;
            Ok(())
        }
    }
}

fn run_serve(config_path: &Path) -> Result<(), FireError> {
    #[cfg(any(feature = "web-sqlite", feature = "web-postgres"))]
    {
        use crate::adapters::web::{AppState, build_router};
        use std::net::SocketAddr;
        use std::sync::Arc;

        eprintln!("Loading config from {}", config_path.display());
        let config = load_config(config_path)?;

        let store = open_store(&config)?;
        store.initialize_schema()?;

        let listen = config
            .get_string("web", "listen")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let addr: SocketAddr = listen.parse().map_err(|_| FireError::ConfigInvalid {
            section: "web".into(),
            key: "listen".into(),
            reason: format!("'{listen}' is not a socket address"),
        })?;

        // The blocking HTTP client must be created and dropped outside the
        // runtime; this handle outlives `block_on`.
        let quotes: Arc<dyn QuotePort> = Arc::new(YahooQuoteAdapter::from_config(&config)?);
        let state = AppState {
            store,
            quotes: quotes.clone(),
            credentials: Arc::new(Argon2Credentials),
            config: Arc::new(config),
        };
        let router = build_router(state)?;

        eprintln!("Starting web server on {}", addr);
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
        })?;
        drop(runtime);
        drop(quotes);
        Ok(())
    }

    #[cfg(not(any(feature = "web-sqlite", feature = "web-postgres")))]
    {
        let _ = config_path;
        Err(FireError::invalid_input(
            "command",
            "the web feature is required for serve",
        ))
    }
}
