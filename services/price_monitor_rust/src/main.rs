use anyhow::{Context, Result};
use dotenv::dotenv;
use price_monitor_rust::{
    Console, CsvWorkbookSink, MonitorConfig, PollScheduler, SchedulerSettings,
};
use pricewatch_rust_core::clients::{JupiterClient, MarketDataSource};
use pricewatch_rust_core::export::{ExportSink, NoopSink};
use pricewatch_rust_core::registry::{InstrumentRegistry, VolumeCategory};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Jupiter price monitor...");

    // Config
    let config = MonitorConfig::from_env().context("Failed to load configuration")?;
    let registry = Arc::new(
        InstrumentRegistry::default_solana().context("Failed to build instrument registry")?,
    );
    log_startup(&config, &registry);

    // Upstream
    let client = JupiterClient::with_base_url(config.api_key.clone(), config.base_url.clone())
        .context("Failed to initialize Jupiter client")?;
    let source: Arc<dyn MarketDataSource> = Arc::new(client);
    if !source.is_authenticated() {
        warn!(
            "{} API key missing: every iteration will show empty prices and quotes",
            source.source_name()
        );
    }

    // Export
    let sink: Arc<dyn ExportSink> = if config.export_enabled {
        Arc::new(
            CsvWorkbookSink::new(&config.output_dir)
                .with_context(|| format!("Failed to prepare {}", config.output_dir.display()))?,
        )
    } else {
        info!("Export disabled, history stays in memory");
        Arc::new(NoopSink)
    };

    let mut scheduler = PollScheduler::new(
        SchedulerSettings::from(&config),
        registry,
        source,
        sink,
        Console::stdout(),
    )?;

    // Ctrl+C cancels the run; the scheduler still flushes before returning
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                signal_token.cancel();
            }
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
            }
        }
    });

    scheduler
        .start(config.interval_secs, config.duration_minutes, cancel)
        .await
        .context("Price monitor stopped after a failure")?;

    info!("Price monitor finished");
    Ok(())
}

fn log_startup(config: &MonitorConfig, registry: &InstrumentRegistry) {
    info!("Configuration:");
    info!("  Base URL: {}", config.base_url);
    info!(
        "  API key: {}",
        if config.api_key.is_some() { "configured" } else { "missing" }
    );
    info!("  Interval: {}s", config.interval_secs);
    match config.duration_minutes {
        0 => info!("  Duration: until interrupted"),
        minutes => info!("  Duration: {} minutes", minutes),
    }
    info!("  Quote pacing: {}ms", config.quote_pacing_ms);
    info!(
        "  History capacity: {} (consolidated {})",
        config.history_capacity, config.consolidated_capacity
    );
    info!("  Output: {}", config.output_dir.display());

    for category in [VolumeCategory::High, VolumeCategory::Mid, VolumeCategory::Low] {
        let symbols: Vec<&str> = registry
            .list_by_category(category)
            .into_iter()
            .map(|i| i.symbol.as_str())
            .collect();
        if !symbols.is_empty() {
            info!("  {} volume tokens: {}", category, symbols.join(", "));
        }
    }

    let pairs: Vec<String> = config.quote_pairs.iter().map(|p| p.key()).collect();
    info!("  Quote pairs: {}", pairs.join(", "));
}
