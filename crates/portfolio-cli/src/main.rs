//! Command-line interface for portfolio-rs

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use portfolio_core::{IndicatorSnapshot, PositionContext, Recommendation, RecommendationScorer, SentimentScore};
use portfolio_tracker::notify::formatter::money;
use portfolio_tracker::{
    ConsoleNotifier, DailyTracker, Holding, HoldingUpdate, Portfolio, PortfolioStore,
    PortfolioValuation, RunStatus, Settings, TrackerConfig,
};
use portfolio_utils::{LogConfig, LogFormat};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "portfolio")]
#[command(about = "Track a stock portfolio and get daily recommendations", long_about = None)]
struct Cli {
    /// Portfolio JSON file (overrides PORTFOLIO_FILE)
    #[arg(long, global = true)]
    portfolio: Option<PathBuf>,

    /// Settings JSON file (overrides SETTINGS_FILE)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show holdings, at stored prices unless --live
    Show {
        /// Fetch current quotes first
        #[arg(long)]
        live: bool,
    },
    /// Add a new holding
    Add {
        symbol: String,
        shares: f64,
        avg_price: f64,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Change an existing holding
    Update {
        symbol: String,
        #[arg(long)]
        shares: Option<f64>,
        #[arg(long)]
        avg_price: Option<f64>,
        /// Record a current price by hand
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove a holding
    Remove { symbol: String },
    /// Set available cash
    Cash { amount: f64 },
    /// Run the daily update
    Daily {
        /// Print messages instead of sending them and leave the portfolio file untouched
        #[arg(long)]
        dry_run: bool,
    },
    /// Test portfolio file, market data and Telegram
    Check,
    /// Score a position from values given on the command line
    Recommend(RecommendArgs),
}

#[derive(Args, Debug)]
struct RecommendArgs {
    #[arg(long)]
    shares: f64,
    #[arg(long)]
    avg_cost: f64,
    #[arg(long)]
    price: f64,
    #[arg(long)]
    rsi: Option<f64>,
    /// MACD line and signal
    #[arg(long, num_args = 2, value_names = ["LINE", "SIGNAL"], allow_hyphen_values = true)]
    macd: Option<Vec<f64>>,
    /// Short and long simple moving averages
    #[arg(long, num_args = 2, value_names = ["SHORT", "LONG"])]
    sma: Option<Vec<f64>>,
    /// News sentiment in -1..=1
    #[arg(long, allow_hyphen_values = true)]
    sentiment: Option<f64>,
    /// Total portfolio value including cash; the concentration check is skipped without it
    #[arg(long)]
    portfolio_value: Option<f64>,
    /// Available cash; the one-share affordability check is skipped without it
    #[arg(long)]
    cash: Option<f64>,
    /// Today's change in percent
    #[arg(long, allow_hyphen_values = true)]
    daily_change: Option<f64>,
    /// Print the recommendation as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log = LogConfig::from_env();
    if cli.json_logs {
        log = log.with_format(LogFormat::Json);
    }
    portfolio_utils::init_tracing_with(&log);

    let mut config = TrackerConfig::from_env().context("invalid configuration")?;
    if let Some(path) = cli.portfolio {
        config.portfolio_file = path;
    }
    if let Some(path) = cli.settings {
        config.settings_file = path;
    }

    let store = PortfolioStore::new(&config.portfolio_file);

    match cli.command {
        Command::Show { live } => show(&config, &store, live).await,
        Command::Add {
            symbol,
            shares,
            avg_price,
            notes,
        } => {
            let mut portfolio = store.load().await?;
            let mut holding = Holding::new(shares, avg_price)?;
            if let Some(notes) = notes {
                holding = holding.with_notes(notes);
            }
            portfolio.add_holding(&symbol, holding)?;
            store.save(&portfolio).await?;
            println!("Added {} shares of {} at {}", shares, symbol.to_uppercase(), money(avg_price));
            Ok(())
        }
        Command::Update {
            symbol,
            shares,
            avg_price,
            price,
            notes,
        } => {
            if shares.is_none() && avg_price.is_none() && price.is_none() && notes.is_none() {
                bail!("nothing to update, pass --shares, --avg-price, --price or --notes");
            }
            let mut portfolio = store.load().await?;
            let holding = portfolio.update_holding(
                &symbol,
                HoldingUpdate {
                    shares,
                    avg_price,
                    current_price: price,
                    notes,
                },
            )?;
            println!(
                "Updated {}: {} shares at {}",
                symbol.to_uppercase(),
                holding.shares,
                money(holding.avg_price)
            );
            store.save(&portfolio).await?;
            Ok(())
        }
        Command::Remove { symbol } => {
            let mut portfolio = store.load().await?;
            let removed = portfolio.remove_holding(&symbol)?;
            store.save(&portfolio).await?;
            println!("Removed {} ({} shares)", symbol.to_uppercase(), removed.shares);
            Ok(())
        }
        Command::Cash { amount } => {
            let mut portfolio = store.load().await?;
            portfolio.set_cash(amount)?;
            store.save(&portfolio).await?;
            println!("Cash set to {}", money(amount));
            Ok(())
        }
        Command::Daily { dry_run } => daily(&config, dry_run).await,
        Command::Check => check(&config).await,
        Command::Recommend(args) => recommend(&args, &Settings::load(&config.settings_file)),
    }
}

async fn show(config: &TrackerConfig, store: &PortfolioStore, live: bool) -> anyhow::Result<()> {
    let portfolio = store.load().await?;
    if portfolio.is_empty() {
        println!("No holdings yet. Add one with `portfolio add SYMBOL SHARES AVG_PRICE`.");
        println!("Cash: {}", money(portfolio.cash.available));
        return Ok(());
    }

    if live {
        let settings = Settings::load(&config.settings_file);
        let tracker = DailyTracker::from_config(config, &settings)?;
        let valuation = tracker.analyzer().value(&portfolio).await;
        println!("{}", valuation_table(&valuation));
        println!(
            "Value {} | Cash {} | Total {} | Gain/loss {} ({:+.2}%)",
            money(valuation.current_value),
            money(valuation.cash),
            money(valuation.total_portfolio_value),
            money(valuation.total_gain_loss),
            valuation.total_gain_loss_pct
        );
    } else {
        println!("{}", holdings_table(&portfolio));
        let totals = portfolio.totals();
        println!(
            "Value {} | Cash {} | Total {} | Gain/loss {} ({:+.2}%)",
            money(totals.value),
            money(totals.cash),
            money(totals.net_worth()),
            money(totals.gain_loss),
            totals.gain_loss_pct
        );
    }
    Ok(())
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

fn holdings_table(portfolio: &Portfolio) -> Table {
    let mut table = new_table(&["Symbol", "Shares", "Avg price", "Price", "Value", "Gain/loss", "%", "Notes"]);
    for (symbol, h) in &portfolio.stocks {
        table.add_row(vec![
            Cell::new(symbol),
            right(format!("{}", h.shares)),
            right(money(h.avg_price)),
            right(h.current_price.map(money).unwrap_or_else(|| "-".to_string())),
            right(money(h.value())),
            right(money(h.gain_loss())),
            right(format!("{:+.2}%", h.gain_loss_pct())),
            Cell::new(&h.notes),
        ]);
    }
    table
}

fn valuation_table(valuation: &PortfolioValuation) -> Table {
    let mut table = new_table(&["Symbol", "Shares", "Price", "Today", "Value", "Gain/loss", "%", "Weight"]);
    for p in valuation.positions.values() {
        table.add_row(vec![
            Cell::new(&p.symbol),
            right(format!("{}", p.shares)),
            right(money(p.current_price)),
            right(
                p.daily_change_pct
                    .map(|c| format!("{c:+.2}%"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            right(money(p.current_value)),
            right(money(p.gain_loss)),
            right(format!("{:+.2}%", p.gain_loss_pct)),
            right(format!("{:.1}%", valuation.weight(&p.symbol) * 100.0)),
        ]);
    }
    table
}

async fn daily(config: &TrackerConfig, dry_run: bool) -> anyhow::Result<()> {
    let settings = Settings::load(&config.settings_file);
    let mut tracker = DailyTracker::from_config(config, &settings)?;
    if dry_run {
        tracker = tracker
            .with_notifier(Arc::new(ConsoleNotifier))
            .with_save_prices(false);
    }

    info!(dry_run, "running daily update");
    let summary = tracker.run().await?;

    match summary.status {
        RunStatus::Completed => println!(
            "Daily update sent: {} holdings, {} alerts, {} actionable recommendations",
            summary.holdings, summary.alerts, summary.actionable
        ),
        RunStatus::Partial => println!("Daily update sent without recommendations"),
        RunStatus::EmptyPortfolio => println!("Portfolio is empty, nothing to track"),
    }
    for error in &summary.errors {
        eprintln!("warning: {error}");
    }
    Ok(())
}

async fn check(config: &TrackerConfig) -> anyhow::Result<()> {
    for var in config.missing_credentials() {
        println!("not set: {var}");
    }

    let settings = Settings::load(&config.settings_file);
    let tracker = DailyTracker::from_config(config, &settings)?;
    let check = tracker.check().await;

    match check.holdings {
        Some(n) => println!("portfolio: ok ({n} holdings)"),
        None => println!("portfolio: FAILED"),
    }
    match &check.quote {
        Some((symbol, price)) => println!("market data: ok ({symbol} {})", money(*price)),
        None => println!("market data: FAILED"),
    }
    match &check.notifier {
        Some(account) if check.test_message_sent => println!("notifications: ok ({account})"),
        _ => println!("notifications: FAILED"),
    }
    for error in &check.errors {
        eprintln!("  {error}");
    }

    if !check.passed() {
        bail!("system check failed");
    }
    println!("All systems operational");
    Ok(())
}

fn recommend(args: &RecommendArgs, settings: &Settings) -> anyhow::Result<()> {
    let rec = score(args, settings)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rec)?);
    } else {
        print_recommendation(&rec);
    }
    Ok(())
}

/// Score the position described on the command line with the configured thresholds
fn score(args: &RecommendArgs, settings: &Settings) -> anyhow::Result<Recommendation> {
    let scorer = RecommendationScorer::new(settings.scorer_config()).context("invalid scorer settings")?;

    let mut indicators = IndicatorSnapshot::new();
    if let Some(rsi) = args.rsi {
        indicators = indicators.with_rsi(rsi);
    }
    if let Some([line, signal]) = args.macd.as_deref() {
        indicators = indicators.with_macd(*line, *signal);
    }
    if let Some([short, long]) = args.sma.as_deref() {
        indicators = indicators.with_sma(*short, *long);
    }

    let mut position = PositionContext::new(args.shares, args.avg_cost, args.price);
    position.portfolio_value = args.portfolio_value;
    position.available_cash = args.cash;
    if let Some(change) = args.daily_change {
        position = position.with_daily_change(change);
    }

    Ok(scorer.score(&indicators, SentimentScore::from(args.sentiment), &position)?)
}

fn print_recommendation(rec: &Recommendation) {
    println!("{} ({:.0}% confidence, {} strength)", rec.label(), rec.confidence, rec.strength);
    println!(
        "Scores: technical {:+.2}, sentiment {:+.2}, total {:+.2}",
        rec.technical_score, rec.sentiment_score, rec.total_score
    );
    if let Some(fraction) = rec.sell_fraction {
        println!("Sell about {:.0}% of the position", fraction * 100.0);
    }
    for reason in &rec.reasons {
        println!("  - {reason}");
    }
    for risk in &rec.risk_factors {
        println!("  ! {risk}");
    }
}
