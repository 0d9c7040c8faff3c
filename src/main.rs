mod config;
mod dispatch;
mod enqueue;
mod error;
mod evaluate;
mod indicator;
mod market;
mod model;
mod repo;
mod runner;
mod scanner;
mod sender;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use dispatch::Dispatcher;
use market::MarketData;
use market::http::HttpMarketData;
use repo::AlertRepository;
use repo::sqlite::SqliteRepository;
use scanner::AlertScanner;
use sender::SenderRegistry;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("market data error")]
    MarketData,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(
    name = "stock-alerter",
    about = "Stock alert evaluation and notification dispatch engine"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    // ── Storage ───────────────────────────────────────────────────────────────
    let data_dir = &config.general.data_dir;
    std::fs::create_dir_all(data_dir)
        .change_context(AppError::Storage)
        .attach_with(|| format!("data_dir: {data_dir}"))?;

    let db_path = format!("{data_dir}/stock-alerter.db");
    let repo: Arc<dyn AlertRepository> = Arc::new(
        SqliteRepository::open(Path::new(&db_path))
            .await
            .change_context(AppError::Storage)?,
    );

    // ── Market data ───────────────────────────────────────────────────────────
    let market: Arc<dyn MarketData> = Arc::new(
        HttpMarketData::new(&config.market_data).change_context(AppError::MarketData)?,
    );

    // ── Senders ───────────────────────────────────────────────────────────────
    let registry = Arc::new(SenderRegistry::from_config(&config.senders));

    // ── Engine components ─────────────────────────────────────────────────────
    let scanner = Arc::new(AlertScanner::new(
        Arc::clone(&repo),
        Arc::clone(&market),
        config.scanner.bar_history,
        config.dispatcher.max_retries,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&repo),
        registry,
        config.dispatcher.batch_limit,
        Duration::from_secs(config.dispatcher.send_timeout_secs),
    ));

    // ── Loops ─────────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let mut task_handles = Vec::new();

    info!(
        scan_interval_secs = config.scanner.interval_secs,
        dispatch_interval_secs = config.dispatcher.interval_secs,
        "starting engine loops"
    );

    task_handles.push(tokio::spawn(runner::scan_loop(
        scanner,
        Duration::from_secs(config.scanner.interval_secs),
        cancel.clone(),
    )));
    task_handles.push(tokio::spawn(runner::dispatch_loop(
        dispatcher,
        Duration::from_secs(config.dispatcher.interval_secs),
        cancel.clone(),
    )));

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .change_context(AppError::Runtime)?;

    info!("ctrl+c received, shutting down");
    cancel.cancel();

    for handle in task_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
