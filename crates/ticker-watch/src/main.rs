use std::sync::Arc;

use anyhow::{Context, Result};
use notification_service::{NotificationConfig, NotificationService};
use social_client::HttpSessionFactory;
use ticker_store::{TickerRepository, TickerStore};
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;

mod account_pool;
mod config;
mod error;
mod ledger;
mod orchestrator;

use account_pool::AccountPool;
use config::WatchConfig;
use ledger::SeenIdLedger;
use orchestrator::{spawn_sweep_task, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting ticker watch");

    if let Err(e) = run().await {
        tracing::error!("Fatal: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<()> {
    // 2. Configuration
    let config = WatchConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded and validated");
    config.log_summary();

    // 3. Log every account in before polling starts
    let mut pool = AccountPool::new(config.accounts.clone(), config.fetch_delay())?;
    let mut factory =
        HttpSessionFactory::new(&config.social_api_base_url, config.request_timeout())?;
    if let Some(dir) = &config.session_dir {
        factory = factory.with_session_dir(dir);
    }
    pool.initialize_all(&factory).await?;
    tracing::info!(
        "{} account(s) ready: {}",
        pool.len(),
        pool.usernames().join(", ")
    );

    // 4. Storage
    let ticker_store = TickerStore::connect(&config.database_url, config.retention())
        .await
        .with_context(|| format!("Failed to open ticker store at {}", config.database_url))?;
    tracing::info!(
        "Ticker store ready ({} active tickers)",
        ticker_store.count().await?
    );
    let store: Arc<dyn TickerRepository> = Arc::new(ticker_store.clone());

    let ledger = SeenIdLedger::new(&config.seen_ids_file);
    let seen_ids = ledger.load().await?;
    tracing::info!(
        "Loaded {} previously seen post IDs from {}",
        seen_ids.len(),
        ledger.path().display()
    );

    // 5. Notifications (disabled with a warning when email settings are incomplete)
    let notifier = NotificationService::new(&NotificationConfig::from_env());

    // 6. Background sweep + shutdown on SIGINT/SIGTERM
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let sweep_handle = spawn_sweep_task(store.clone(), config.sweep_interval(), shutdown_rx.clone());

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
        signal_tx.send(true).ok();
    });

    // 7. Main loop: one batch per fetch cycle until shutdown
    tracing::info!(
        "Watching user {} ({} posts per request, {}s between requests)",
        config.target_user_id,
        config.page_size,
        config.fetch_delay_seconds
    );
    let mut orchestrator = Orchestrator::new(store, ledger, seen_ids, notifier);
    orchestrator
        .run(pool.fetch_stream(config.target_user_id.clone(), config.page_size, shutdown_rx))
        .await;

    tracing::info!("Fetch loop ended, shutting down...");
    shutdown_tx.send(true).ok();
    if let Err(e) = sweep_handle.await {
        tracing::warn!("Sweep task ended abnormally: {}", e);
    }

    let pending = orchestrator.pending_alerts();
    if pending > 0 {
        tracing::info!("Waiting for {} ticker alert(s) to finish sending...", pending);
    }
    orchestrator.drain(config.alert_drain_timeout()).await;
    ticker_store.close().await;

    tracing::info!(
        "Ticker watch stopped ({} post IDs recorded)",
        orchestrator.seen_count()
    );
    Ok(())
}
