//! Gold Signal Desk
//!
//! Publishes XAUUSD trading signals, gates them by subscription tier and
//! auto-executes new signals on connected simulated accounts with
//! risk-based position sizing.

mod api;
mod db;
mod errors;
mod metrics;
mod models;
mod monitor;
mod subscription;
mod trading;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::api::{Broker, HttpPriceFeed, PriceFeed, SimulatedBroker, StaticPriceFeed};
use crate::db::Database;
use crate::metrics::{AccountStats, SignalStats};
use crate::models::{Signal, SignalDirection, SignalStatus, Subscription, SubscriptionTier, TradingAccount};
use crate::monitor::{Monitor, MonitorConfig};
use crate::subscription::{check_feature, redact, Feature, TierPolicy};
use crate::trading::{evaluate, ClampReason, PositionSizer, TradingConfig};

/// Gold signal desk CLI.
#[derive(Parser)]
#[command(name = "goldsig")]
#[command(about = "XAUUSD trading signals with tiered access and auto-trade", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:./goldsig.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Quote endpoint (GET {url}?symbol=XAUUSD)
    #[arg(long, env = "PRICE_FEED_URL")]
    price_url: Option<String>,

    /// Bearer token for the quote endpoint
    #[arg(long, env = "PRICE_FEED_API_KEY", hide_env_values = true)]
    price_api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a new signal
    Publish {
        /// BUY or SELL
        direction: String,

        #[arg(short, long)]
        entry: Decimal,

        /// Stop-loss price
        #[arg(long)]
        sl: Decimal,

        /// Take-profit price
        #[arg(long)]
        tp: Decimal,

        /// Lowest tier that sees live levels (free, premium, vip)
        #[arg(long, default_value = "premium")]
        min_tier: String,

        #[arg(short, long, default_value = "")]
        note: String,
    },

    /// List signals
    List {
        /// Filter by status (active, hit_target, hit_stop, closed, cancelled)
        #[arg(short, long)]
        status: Option<String>,

        /// Show the list as this user sees it
        #[arg(short, long)]
        user: Option<String>,

        /// Mark-to-market price (defaults to the last recorded tick)
        #[arg(short, long)]
        price: Option<Decimal>,

        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Show one signal with its current evaluation
    Show {
        /// Signal id or unique prefix
        id: String,

        #[arg(short, long)]
        user: Option<String>,

        #[arg(short, long)]
        price: Option<Decimal>,
    },

    /// Close an active signal at a price
    Close {
        id: String,

        #[arg(short, long)]
        price: Decimal,
    },

    /// Cancel an active signal
    Cancel { id: String },

    /// Track-record statistics
    Stats {
        /// Only signals created in the last N days
        #[arg(long)]
        days: Option<i64>,
    },

    /// Set a user's subscription tier
    Subscribe {
        user: String,

        /// free, premium or vip
        tier: String,

        /// Subscription length in days (omit for no expiry)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Show a user's effective tier and limits
    Tier { user: String },

    /// Manage simulated trading accounts
    #[command(subcommand)]
    Account(AccountCommands),

    /// Calculate a risk-based position size
    Size {
        #[arg(short, long)]
        balance: Decimal,

        /// Percent of balance to risk
        #[arg(short, long)]
        risk: Decimal,

        #[arg(short, long)]
        entry: Decimal,

        #[arg(long)]
        sl: Decimal,
    },

    /// Run a single monitor tick
    Tick {
        /// Use a fixed price instead of the quote endpoint
        #[arg(short, long)]
        price: Option<Decimal>,
    },

    /// Run the monitor loop until Ctrl+C
    Run {
        /// Polling interval in seconds
        #[arg(short, long, default_value = "15")]
        interval: u64,

        #[arg(short, long)]
        price: Option<Decimal>,
    },

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Connect a new simulated account
    Add {
        user: String,

        #[arg(short, long)]
        balance: Decimal,

        #[arg(short, long, default_value = "")]
        label: String,

        /// Percent of balance risked per signal
        #[arg(short, long)]
        risk: Option<Decimal>,
    },

    /// List accounts and their results
    List {
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Reconnect an account
    Connect { id: String },

    /// Disconnect an account (stops auto-trade)
    Disconnect { id: String },

    /// Set risk percent per signal
    Risk { id: String, pct: Decimal },

    /// Turn auto-trade on or off
    AutoTrade {
        id: String,

        /// on or off
        state: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let db = Arc::new(Database::new(&cli.database).await?);
    let config = TradingConfig::default();

    match cli.command {
        Commands::Publish {
            direction,
            entry,
            sl,
            tp,
            min_tier,
            note,
        } => {
            let direction: SignalDirection = direction.parse()?;
            let min_tier: SubscriptionTier = min_tier.parse()?;

            let signal = Signal::new(&config.symbol, direction, entry, sl, tp)?
                .with_min_tier(min_tier)
                .with_note(note);
            db.insert_signal(&signal).await?;

            info!(signal = %signal.id, direction = %direction, entry = %entry, "Signal published");

            println!("Published {} {} @ {}", signal.symbol, direction, entry);
            println!("  ID:     {}", signal.id);
            println!("  SL/TP:  {} / {}", sl, tp);
            println!("  R:R     1:{}", signal.risk_reward().round_dp(2));
            println!("Auto-trade runs on the next monitor tick.");
        }

        Commands::List {
            status,
            user,
            price,
            limit,
        } => {
            let status = status.map(|s| s.parse::<SignalStatus>()).transpose()?;
            let signals = db.list_signals(status, limit).await?;
            let price = mark_price(&db, &config, price).await?;

            if signals.is_empty() {
                println!("No signals. Use 'goldsig publish' to add one.");
                return Ok(());
            }

            match user {
                Some(user) => {
                    let tier = db.get_subscription(&user).await?.effective_tier(Utc::now());
                    print_user_view(&signals, tier);
                }
                None => print_signals(&signals, price, &config),
            }
        }

        Commands::Show { id, user, price } => {
            let signal = find_signal(&db, &id).await?;

            if let Some(user) = user {
                let tier = db.get_subscription(&user).await?.effective_tier(Utc::now());
                print_user_view(std::slice::from_ref(&signal), tier);
                return Ok(());
            }

            println!("\n=== Signal {} ===", signal.id);
            println!("Symbol:     {}", signal.symbol);
            println!("Direction:  {}", signal.direction);
            println!("Entry:      {}", signal.entry_price);
            println!("Stop Loss:  {}", signal.stop_loss);
            println!("Target:     {}", signal.take_profit);
            println!("R:R:        1:{}", signal.risk_reward().round_dp(2));
            println!("Min Tier:   {}", signal.min_tier);
            println!("Status:     {}", signal.status);
            println!("Created:    {}", signal.created_at.format("%Y-%m-%d %H:%M"));
            if let Some(closed) = signal.closed_at {
                println!("Closed:     {}", closed.format("%Y-%m-%d %H:%M"));
            }
            if !signal.note.is_empty() {
                println!("Note:       {}", signal.note);
            }

            if let Some(price) = mark_price(&db, &config, price).await? {
                let eval = evaluate(&signal, price, &config);
                println!("\n--- At {} ---", price);
                println!("Status:     {}", eval.status);
                println!("Mark:       {}", eval.mark_price);
                println!("Pips:       {}", eval.pips.round_dp(1));
                println!("P&L/lot:    ${:.2}", eval.pnl_per_lot);
            }
        }

        Commands::Close { id, price } => {
            let signal = find_signal(&db, &id).await?;
            let now = Utc::now();

            let mut closed = signal.clone();
            closed.settle(SignalStatus::Closed, price, now)?;
            if !db.settle_signal(&signal.id, closed.status, price, now).await? {
                bail!("Signal {} was settled concurrently", signal.id);
            }

            let eval = evaluate(&closed, price, &config);
            info!(signal = %signal.id, price = %price, pips = %eval.pips, "Signal closed manually");
            println!("Closed {} at {} ({} pips)", signal.id, price, eval.pips.round_dp(1));
        }

        Commands::Cancel { id } => {
            let signal = find_signal(&db, &id).await?;
            let now = Utc::now();

            let mut cancelled = signal.clone();
            cancelled.settle(SignalStatus::Cancelled, signal.entry_price, now)?;
            if !db
                .settle_signal(&signal.id, cancelled.status, signal.entry_price, now)
                .await?
            {
                bail!("Signal {} was settled concurrently", signal.id);
            }
            info!(signal = %signal.id, "Signal cancelled");
            println!("Cancelled {}", signal.id);
        }

        Commands::Stats { days } => {
            let signals = match days {
                Some(days) => db.list_signals_since(days_before(Utc::now(), days)?).await?,
                None => db.list_signals(None, i64::MAX).await?,
            };

            let stats = SignalStats::from_signals(&signals, &config);
            println!("\n=== Signal Performance ===");
            println!("{}", stats);

            let counts = db.get_execution_counts().await?;
            println!("\n=== Auto-trade ===");
            println!(
                "Executions: {} (open {}, closed {}, failed {}, skipped {})",
                counts.total(),
                counts.open,
                counts.closed,
                counts.failed,
                counts.skipped
            );
        }

        Commands::Subscribe { user, tier, days } => {
            let tier: SubscriptionTier = tier.parse()?;
            let now = Utc::now();
            let sub = Subscription {
                user_id: user.clone(),
                tier,
                started_at: now,
                expires_at: days.map(|d| days_after(now, d)).transpose()?,
            };
            db.upsert_subscription(&sub).await?;

            info!(user = %user, tier = %tier, "Subscription updated");
            match sub.expires_at {
                Some(exp) => println!("{} is now {} until {}", user, tier, exp.format("%Y-%m-%d")),
                None => println!("{} is now {}", user, tier),
            }
        }

        Commands::Tier { user } => {
            let sub = db.get_subscription(&user).await?;
            let now = Utc::now();
            let tier = sub.effective_tier(now);
            let policy = TierPolicy::for_tier(tier);

            println!("\n=== {} ===", user);
            println!("Tier:           {}", tier);
            if sub.is_expired(now) {
                println!("                ({} expired)", sub.tier);
            } else if let Some(exp) = sub.expires_at {
                println!("Expires:        {}", exp.format("%Y-%m-%d"));
            }
            println!("Live signals:   {}", yes_no(policy.live_signals));
            match policy.history_days {
                Some(days) => println!("History:        {} days", days),
                None => println!("History:        unlimited"),
            }
            println!("Auto-trade:     {}", yes_no(policy.auto_trade));
            println!(
                "Accounts:       {}/{}",
                db.count_connected_accounts(&user).await?,
                policy.max_accounts
            );
        }

        Commands::Account(cmd) => run_account_command(&db, &config, cmd).await?,

        Commands::Size {
            balance,
            risk,
            entry,
            sl,
        } => {
            let sizer = PositionSizer::new(config.clone());
            let size = sizer.calculate(balance, risk, entry, sl)?;

            println!("\n=== Position Size ===");
            println!("Risk amount:    ${:.2}", size.risk_amount);
            println!("Stop distance:  {} pips", size.pip_distance.round_dp(1));
            println!("Raw lots:       {}", size.raw_lots.round_dp(4));
            println!("Lots:           {}", size.lots);
            println!(
                "Actual risk:    ${:.2} ({}%)",
                size.actual_risk,
                size.actual_risk_pct(balance).round_dp(2)
            );
            match size.clamped {
                ClampReason::None => {}
                ClampReason::RaisedToMin => {
                    println!("Note: raised to the {} lot minimum, risk exceeds target", config.min_lot)
                }
                ClampReason::CappedAtMax => println!("Note: capped at the {} lot maximum", config.max_lot),
            }
        }

        Commands::Tick { price } => {
            let monitor = build_monitor(&cli.price_url, cli.price_api_key, price, db.clone(), MonitorConfig::default())?;
            let report = monitor.tick().await?;

            println!("Price:            {}", report.price);
            println!("Signals settled:  {}", report.signals_settled);
            println!("Auto-trade:       {}", report.auto_trade);
            println!("Positions closed: {}", report.executions_closed);
            println!("Realized P&L:     ${:.2}", report.realized_pnl);
        }

        Commands::Run { interval, price } => {
            let monitor_config = MonitorConfig {
                poll_interval_secs: interval,
                trading_config: config.clone(),
            };
            let monitor = build_monitor(&cli.price_url, cli.price_api_key, price, db.clone(), monitor_config)?;

            println!("\n=== Gold Signal Monitor ===");
            println!("Symbol:           {}", config.symbol);
            println!("Polling interval: {}s", interval);
            println!(
                "Price source:     {}",
                match (price, &cli.price_url) {
                    (Some(p), _) => format!("fixed {}", p),
                    (None, Some(url)) => url.clone(),
                    (None, None) => "-".to_string(),
                }
            );
            println!("\nPress Ctrl+C to stop.\n");

            if let Err(e) = monitor.run().await {
                tracing::error!(error = %e, "Monitor error");
            }

            println!("\n{}", monitor.stats().await);
            db.close().await;
        }

        Commands::Config => {
            println!("\n=== Instrument ===\n");
            println!("  Symbol:               {}", config.symbol);
            println!("  Pip Size:             {}", config.pip_size);
            println!("  Pip Value per Lot:    ${}", config.pip_value_per_lot);
            println!("  Simulated Spread:     {}", config.spread);

            println!("\n=== Position Sizing ===\n");
            println!("  Lot Step:             {}", config.lot_step);
            println!("  Min Lot:              {}", config.min_lot);
            println!("  Max Lot:              {}", config.max_lot);
            println!("  Default Risk:         {}%", config.default_risk_pct);
            println!("  Max Risk:             {}%", config.max_risk_pct);

            println!("\n=== Tiers ===\n");
            println!("  {:<10} {:>6} {:>10} {:>11} {:>9}", "TIER", "LIVE", "HISTORY", "AUTO-TRADE", "ACCOUNTS");
            for tier in [SubscriptionTier::Free, SubscriptionTier::Premium, SubscriptionTier::Vip] {
                let p = TierPolicy::for_tier(tier);
                println!(
                    "  {:<10} {:>6} {:>10} {:>11} {:>9}",
                    tier.as_str(),
                    yes_no(p.live_signals),
                    p.history_days.map(|d| format!("{}d", d)).unwrap_or_else(|| "all".to_string()),
                    yes_no(p.auto_trade),
                    p.max_accounts
                );
            }

            println!("\n=== Runtime ===\n");
            println!("  Database:             {}", cli.database);
            println!("  Price Feed:           {}", cli.price_url.as_deref().unwrap_or("-"));
        }
    }

    Ok(())
}

async fn run_account_command(db: &Database, config: &TradingConfig, cmd: AccountCommands) -> Result<()> {
    let now = Utc::now();

    match cmd {
        AccountCommands::Add {
            user,
            balance,
            label,
            risk,
        } => {
            if balance <= Decimal::ZERO {
                bail!("Balance must be positive");
            }
            let tier = db.get_subscription(&user).await?.effective_tier(now);
            check_feature(tier, Feature::ConnectAccount)?;
            check_account_limit(db, &user, tier).await?;

            let risk = risk.unwrap_or(config.default_risk_pct);
            check_risk(config, risk)?;

            let account = TradingAccount::new(&user, label, balance).with_risk_pct(risk);
            db.insert_account(&account).await?;

            info!(account = %account.id, user = %user, "Account connected");
            println!("Connected account {} for {}", account.id, user);
            println!("  Balance: ${:.2}  Risk: {}%  Auto-trade: off", balance, risk);
        }

        AccountCommands::List { user } => {
            let accounts = db.list_accounts(user.as_deref()).await?;
            if accounts.is_empty() {
                println!("No accounts. Use 'goldsig account add' to connect one.");
                return Ok(());
            }
            let executions = db.list_executions(None).await?;

            println!(
                "\n{:<12} {:<12} {:<14} {:>12} {:>6} {:>5} {:>5} {:>6} {:>10}",
                "ID", "USER", "LABEL", "BALANCE", "RISK%", "AUTO", "OPEN", "WIN%", "P&L"
            );
            println!("{}", "-".repeat(92));

            for account in accounts {
                let stats = AccountStats::from_executions(&account.id, &executions);
                println!(
                    "{:<12} {:<12} {:<14} {:>12.2} {:>6} {:>5} {:>5} {:>5.1}% {:>10.2}{}",
                    truncate(&account.id, 12),
                    truncate(&account.user_id, 12),
                    truncate(&account.display_name(), 14),
                    account.balance,
                    account.risk_pct,
                    if account.auto_trade { "on" } else { "off" },
                    stats.open,
                    stats.win_rate * 100.0,
                    stats.realized_pnl,
                    if account.connected { "" } else { "  (disconnected)" }
                );
            }
        }

        AccountCommands::Connect { id } => {
            let account = find_account(db, &id).await?;
            if account.connected {
                println!("Account {} is already connected", account.id);
                return Ok(());
            }
            let tier = db.get_subscription(&account.user_id).await?.effective_tier(now);
            check_feature(tier, Feature::ConnectAccount)?;
            check_account_limit(db, &account.user_id, tier).await?;

            db.set_account_connected(&account.id, true).await?;
            println!("Connected {}", account.display_name());
        }

        AccountCommands::Disconnect { id } => {
            let account = find_account(db, &id).await?;
            db.set_account_connected(&account.id, false).await?;
            info!(account = %account.id, "Account disconnected");
            println!("Disconnected {}", account.display_name());
        }

        AccountCommands::Risk { id, pct } => {
            check_risk(config, pct)?;
            let account = find_account(db, &id).await?;
            db.set_account_risk(&account.id, pct).await?;
            println!("{} now risks {}% per signal", account.display_name(), pct);
        }

        AccountCommands::AutoTrade { id, state } => {
            let enabled = match state.to_lowercase().as_str() {
                "on" | "true" | "yes" => true,
                "off" | "false" | "no" => false,
                other => bail!("Expected on or off, got '{}'", other),
            };
            let account = find_account(db, &id).await?;
            if enabled {
                let tier = db.get_subscription(&account.user_id).await?.effective_tier(now);
                check_feature(tier, Feature::AutoTrade)?;
            }
            db.set_account_auto_trade(&account.id, enabled).await?;

            info!(account = %account.id, enabled = enabled, "Auto-trade toggled");
            println!(
                "Auto-trade {} for {}",
                if enabled { "enabled" } else { "disabled" },
                account.display_name()
            );
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    // RUST_LOG wins over --log-level when set
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Fixed price if given, otherwise the HTTP quote endpoint.
fn build_feed(
    price_url: &Option<String>,
    api_key: Option<String>,
    price: Option<Decimal>,
    config: &TradingConfig,
) -> Result<Arc<dyn PriceFeed>> {
    match (price, price_url) {
        (Some(price), _) => Ok(Arc::new(StaticPriceFeed::at(&config.symbol, price))),
        (None, Some(url)) => Ok(Arc::new(HttpPriceFeed::new(url.clone(), api_key)?)),
        (None, None) => bail!("No price source: pass --price or set PRICE_FEED_URL"),
    }
}

fn build_monitor(
    price_url: &Option<String>,
    api_key: Option<String>,
    price: Option<Decimal>,
    db: Arc<Database>,
    config: MonitorConfig,
) -> Result<Monitor> {
    let feed = build_feed(price_url, api_key, price, &config.trading_config)?;
    let broker: Arc<dyn Broker> =
        Arc::new(SimulatedBroker::new(feed.clone(), config.trading_config.clone()));
    Ok(Monitor::new(config, db, feed, broker))
}

/// Explicit price, else the last recorded tick.
async fn mark_price(db: &Database, config: &TradingConfig, price: Option<Decimal>) -> Result<Option<Decimal>> {
    if price.is_some() {
        return Ok(price);
    }
    Ok(db.latest_tick(&config.symbol).await?.map(|q| q.mid()))
}

async fn find_signal(db: &Database, id: &str) -> Result<Signal> {
    db.get_signal(id)
        .await?
        .with_context(|| format!("Signal not found: {}", id))
}

async fn find_account(db: &Database, id: &str) -> Result<TradingAccount> {
    db.get_account(id)
        .await?
        .with_context(|| format!("Account not found: {}", id))
}

async fn check_account_limit(db: &Database, user: &str, tier: SubscriptionTier) -> Result<()> {
    let max = TierPolicy::for_tier(tier).max_accounts;
    let connected = db.count_connected_accounts(user).await?;
    if connected >= max as i64 {
        bail!("{} tier allows {} connected account(s); {} has {}", tier, max, user, connected);
    }
    Ok(())
}

fn check_risk(config: &TradingConfig, pct: Decimal) -> Result<()> {
    if pct <= Decimal::ZERO || pct > config.max_risk_pct {
        bail!("Risk must be in (0, {}]%", config.max_risk_pct);
    }
    Ok(())
}

fn print_signals(signals: &[Signal], price: Option<Decimal>, config: &TradingConfig) {
    println!(
        "\n{:<10} {:<5} {:>10} {:>10} {:>10} {:<11} {:>9} {:>10}",
        "ID", "DIR", "ENTRY", "SL", "TP", "STATUS", "PIPS", "P&L/LOT"
    );
    println!("{}", "-".repeat(82));

    for signal in signals {
        let (status, pips, pnl) = match price.or(signal.close_price) {
            Some(p) => {
                let eval = evaluate(signal, p, config);
                (
                    eval.status,
                    format!("{:.1}", eval.pips),
                    format!("{:.2}", eval.pnl_per_lot),
                )
            }
            None => (signal.status, "-".to_string(), "-".to_string()),
        };

        println!(
            "{:<10} {:<5} {:>10} {:>10} {:>10} {:<11} {:>9} {:>10}",
            truncate(&signal.id, 10),
            signal.direction.as_str(),
            signal.entry_price,
            signal.stop_loss,
            signal.take_profit,
            status.as_str(),
            pips,
            pnl
        );
    }
}

fn print_user_view(signals: &[Signal], tier: SubscriptionTier) {
    let now = Utc::now();
    let views: Vec<_> = signals.iter().filter_map(|s| redact(s, tier, now)).collect();

    println!("\nViewing as {} tier", tier);
    if views.is_empty() {
        println!("Nothing visible on this tier.");
        return;
    }

    println!(
        "\n{:<10} {:<5} {:>10} {:>10} {:>10} {:<11} {:>10}",
        "ID", "DIR", "ENTRY", "SL", "TP", "STATUS", "CLOSE"
    );
    println!("{}", "-".repeat(72));

    let show = |v: Option<Decimal>, locked: bool| match v {
        Some(v) => v.to_string(),
        None if locked => "locked".to_string(),
        None => "-".to_string(),
    };

    for view in views {
        println!(
            "{:<10} {:<5} {:>10} {:>10} {:>10} {:<11} {:>10}",
            truncate(&view.id, 10),
            view.direction.as_str(),
            show(view.entry_price, view.locked),
            show(view.stop_loss, view.locked),
            show(view.take_profit, view.locked),
            view.status.as_str(),
            show(view.close_price, false)
        );
    }
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "yes"
    } else {
        "no"
    }
}

fn day_span(days: i64) -> Result<Duration> {
    if days <= 0 {
        bail!("--days must be positive, got {}", days);
    }
    Duration::try_days(days).with_context(|| format!("--days {} is too large", days))
}

fn days_before(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(day_span(days)?)
        .with_context(|| format!("--days {} reaches before the earliest date", days))
}

fn days_after(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    now.checked_add_signed(day_span(days)?)
        .with_context(|| format!("--days {} reaches past the latest date", days))
}

/// Shorten to `max_len` characters, ending in "..." when cut.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 12), "short");
        assert_eq!(truncate("ééééééééééééé", 12), "ééééééééé...");
        assert_eq!(truncate("ééééééééééééé", 13), "ééééééééééééé");
        assert_eq!(truncate("金価格シグナル口座", 6), "金価格...");
    }

    #[test]
    fn test_day_offsets() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(
            days_after(now, 30).unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            days_before(now, 7).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 25, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_day_offsets_reject_bad_input() {
        let now = Utc::now();

        assert!(days_after(now, 0).is_err());
        assert!(days_after(now, -5).is_err());
        assert!(days_before(now, -1).is_err());
        assert!(days_before(now, 200_000_000_000).is_err());
        assert!(days_after(now, 200_000_000_000).is_err());
        // Fits in a Duration but not in the calendar
        assert!(days_after(now, 100_000_000).is_err());
    }
}
