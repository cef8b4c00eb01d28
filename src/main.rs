//! bybit-trader: one-shot Bybit spot market orders.
//!
//! Entry point. Loads `.env` and the environment profile, initialises
//! logging, asks for confirmation on bulk runs and hands each coin to the
//! order processor.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};

use bybit_trader::config::AppConfig;
use bybit_trader::engine::dispatcher::{Dispatcher, Target};
use bybit_trader::engine::processor::{
    OrderProcessor, PollPolicy, ProcessorSettings, DEFAULT_MAX_DECIMALS,
};
use bybit_trader::exchange::bybit::BybitClient;
use bybit_trader::types::Side;

const USAGE: &str = "Usage: bybit-trader [buy/sell] [CoinSymbol/EVERYTHING]";

#[derive(Parser)]
#[command(name = "bybit-trader")]
#[command(about = "Place Bybit spot market orders from configured USD amounts or full wallet balances")]
#[command(version)]
struct Cli {
    /// buy or sell (case-insensitive)
    operation: Option<String>,

    /// Coin symbol (e.g. BTC) or EVERYTHING for every configured coin
    target: Option<String>,

    /// Size orders and report them without submitting
    #[arg(long)]
    dry_run: bool,

    /// Execution lookups after an order is placed
    #[arg(long, env = "EXECUTION_POLL_ATTEMPTS", default_value_t = 10)]
    poll_attempts: u32,

    /// Wait between execution lookups, in milliseconds
    #[arg(long, env = "EXECUTION_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Decimal places allowed on a quantity before precision retries
    #[arg(long, default_value_t = DEFAULT_MAX_DECIMALS)]
    max_decimals: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let (Some(operation), Some(target)) = (cli.operation.as_deref(), cli.target.as_deref()) else {
        println!("{USAGE}");
        return Ok(());
    };

    let side: Side = match operation.parse() {
        Ok(side) => side,
        Err(e) => {
            println!("{e}\n{USAGE}");
            return Ok(());
        }
    };
    let target: Target = match target.parse() {
        Ok(target) => target,
        Err(e) => {
            println!("{e}\n{USAGE}");
            return Ok(());
        }
    };

    let config = AppConfig::from_env();
    let network = config.profile.network;
    let coins = config.profile.coins;
    let client = BybitClient::new(network, config.profile.credentials, config.account_type)?;

    let settings = ProcessorSettings {
        max_decimals: cli.max_decimals,
        poll: PollPolicy {
            attempts: cli.poll_attempts,
            interval: Duration::from_millis(cli.poll_interval_ms),
        },
        dry_run: cli.dry_run,
        ..ProcessorSettings::default()
    };

    info!(
        network = %network,
        side = %side,
        target = %target,
        dry_run = settings.dry_run,
        "bybit-trader starting"
    );
    if settings.dry_run {
        warn!("Dry run: no orders will be submitted");
    }

    let processor = OrderProcessor::new(&client, &coins, settings);
    let stdin = std::io::stdin();
    let reports = Dispatcher::new(&processor, &coins)
        .confirm_and_run(side, &target, stdin.lock(), std::io::stdout())
        .await?;

    info!(processed = reports.len(), "bybit-trader finished");
    Ok(())
}

/// Initialise the `tracing` subscriber on stderr so status lines on
/// stdout stay readable.
fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json_logging = std::env::var("BYBIT_TRADER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}
