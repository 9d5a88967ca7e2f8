//! Fixed-interval poll loop.
//!
//! Lifecycle: `Idle -> Running -> (Stopping | Failed) -> Stopped`. However the
//! run ends (tick budget exhausted, cancellation, orchestration failure) the
//! same finalizer flushes history to the export sink exactly once and then
//! releases the upstream client.

use crate::config::{tick_budget, MonitorConfig};
use crate::display::Console;
use crate::error::MonitorError;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use pricewatch_rust_core::clients::MarketDataSource;
use pricewatch_rust_core::error::ExportError;
use pricewatch_rust_core::export::ExportSink;
use pricewatch_rust_core::history::HistoryStore;
use pricewatch_rust_core::models::{PricePoint, QuotePair, QuotePoint};
use pricewatch_rust_core::registry::InstrumentRegistry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::spawn_blocking;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wall-clock source, swappable so date rollover can be driven in tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Tick budget exhausted
    Completed,
    Cancelled,
    Failed,
}

/// Per-run knobs that do not change between ticks
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub quote_pairs: Vec<QuotePair>,
    pub slippage_bps: u16,
    pub quote_pacing: Duration,
    pub history_capacity: usize,
    pub consolidated_capacity: usize,
}

impl From<&MonitorConfig> for SchedulerSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            quote_pairs: config.quote_pairs.clone(),
            slippage_bps: config.slippage_bps,
            quote_pacing: config.quote_pacing(),
            history_capacity: config.history_capacity,
            consolidated_capacity: config.consolidated_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub state: SchedulerState,
    pub stop_reason: Option<StopReason>,
    pub iterations: u64,
    pub tokens_monitored: usize,
    pub pairs_monitored: usize,
    pub price_points: usize,
    pub quote_points: usize,
    pub failure: Option<String>,
}

pub struct PollScheduler {
    settings: SchedulerSettings,
    registry: Arc<InstrumentRegistry>,
    source: Arc<dyn MarketDataSource>,
    sink: Arc<dyn ExportSink>,
    console: Console,
    clock: Clock,

    price_ids: Vec<String>,
    // Session-long history, never cleared
    price_history: HistoryStore<PricePoint>,
    // Export window, cleared at every flush
    consolidated_prices: HistoryStore<PricePoint>,
    quote_history: HistoryStore<QuotePoint>,
    window_date: Mutex<NaiveDate>,

    state: SchedulerState,
    stop_reason: Option<StopReason>,
    iterations: u64,
    failure: Option<String>,
}

impl PollScheduler {
    pub fn new(
        settings: SchedulerSettings,
        registry: Arc<InstrumentRegistry>,
        source: Arc<dyn MarketDataSource>,
        sink: Arc<dyn ExportSink>,
        console: Console,
    ) -> Result<Self, MonitorError> {
        let store_err = |e: pricewatch_rust_core::error::HistoryError| MonitorError::Config(e.to_string());

        let price_history = HistoryStore::new(settings.history_capacity).map_err(store_err)?;
        let consolidated_prices =
            HistoryStore::new(settings.consolidated_capacity).map_err(store_err)?;
        let quote_history = HistoryStore::new(settings.consolidated_capacity).map_err(store_err)?;

        let clock: Clock = Arc::new(Utc::now);
        let window_date = Mutex::new(clock().date_naive());

        Ok(Self {
            price_ids: registry.monitored_identifiers(),
            settings,
            registry,
            source,
            sink,
            console,
            clock,
            price_history,
            consolidated_prices,
            quote_history,
            window_date,
            state: SchedulerState::Idle,
            stop_reason: None,
            iterations: 0,
            failure: None,
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn price_history(&self) -> &HistoryStore<PricePoint> {
        &self.price_history
    }

    pub fn consolidated_prices(&self) -> &HistoryStore<PricePoint> {
        &self.consolidated_prices
    }

    pub fn quote_history(&self) -> &HistoryStore<QuotePoint> {
        &self.quote_history
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            state: self.state,
            stop_reason: self.stop_reason,
            iterations: self.iterations,
            tokens_monitored: self.price_ids.len(),
            pairs_monitored: self.settings.quote_pairs.len(),
            price_points: self.price_history.total_points(),
            quote_points: self.quote_history.total_points(),
            failure: self.failure.clone(),
        }
    }

    /// Runs the loop until the tick budget is spent or `cancel` fires.
    ///
    /// `duration_minutes == 0` runs until cancelled. History is flushed before
    /// this returns on every path; an orchestration failure is returned after
    /// the flush.
    pub async fn start(
        &mut self,
        interval_secs: u64,
        duration_minutes: u64,
        cancel: CancellationToken,
    ) -> Result<RunSummary, MonitorError> {
        if self.state != SchedulerState::Idle {
            return Err(MonitorError::InvalidState(self.state));
        }
        if interval_secs == 0 {
            return Err(MonitorError::Config("poll interval must be > 0".to_string()));
        }

        let budget = tick_budget(interval_secs, duration_minutes);
        *self.window_date.lock() = (self.clock)().date_naive();
        self.state = SchedulerState::Running;

        match budget {
            Some(ticks) => info!(
                "Monitoring every {}s for {} minutes ({} ticks)",
                interval_secs, duration_minutes, ticks
            ),
            None => info!("Monitoring every {}s until interrupted", interval_secs),
        }

        let outcome = self
            .run_loop(Duration::from_secs(interval_secs), budget, &cancel)
            .await;

        let failure = match outcome {
            Ok(reason) => {
                self.stop_reason = Some(reason);
                None
            }
            Err(e) => {
                error!("Monitoring failed: {}", e);
                self.state = SchedulerState::Failed;
                self.stop_reason = Some(StopReason::Failed);
                self.failure = Some(e.to_string());
                Some(e)
            }
        };

        self.state = SchedulerState::Stopping;
        self.finalize().await;
        self.state = SchedulerState::Stopped;

        let summary = self.summary();
        log_summary(&summary);

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn run_loop(
        &mut self,
        interval: Duration,
        budget: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<StopReason, MonitorError> {
        let mut tick = 0u64;

        loop {
            if budget.is_some_and(|ticks| tick >= ticks) {
                return Ok(StopReason::Completed);
            }
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }

            tick += 1;
            self.iterations = tick;

            // Outside the cancellable tick so a started flush always settles
            self.roll_consolidated_window((self.clock)().date_naive())
                .await;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.run_tick(tick) => Some(result),
            };
            match outcome {
                Some(result) => result?,
                None => {
                    info!("Interrupted during iteration {}", tick);
                    return Ok(StopReason::Cancelled);
                }
            }

            // No wait after the final tick
            if budget.is_some_and(|ticks| tick >= ticks) {
                return Ok(StopReason::Completed);
            }

            debug!("Waiting {:?} until next iteration", interval);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Interrupted while waiting for iteration {}", tick + 1);
                    return Ok(StopReason::Cancelled);
                }
                _ = sleep(interval) => {}
            }
        }
    }

    async fn run_tick(&self, iteration: u64) -> Result<(), MonitorError> {
        self.console
            .iteration_banner(iteration, (self.clock)())
            .map_err(|e| MonitorError::orchestration("iteration banner", e))?;

        self.poll_prices().await?;
        self.poll_quotes().await?;
        Ok(())
    }

    /// Flushes and resets the consolidated window when the UTC date moves on.
    ///
    /// The window is only cleared once the sink has written it (or had nothing
    /// to write). After a failed write the points stay for the next flush.
    async fn roll_consolidated_window(&self, today: NaiveDate) {
        let previous = {
            let mut window = self.window_date.lock();
            if *window == today {
                return;
            }
            std::mem::replace(&mut *window, today)
        };

        info!(
            "UTC date changed {} -> {}, flushing consolidated prices",
            previous, today
        );
        let snapshot = self.consolidated_prices.snapshot();
        let points: usize = snapshot.values().map(Vec::len).sum();
        let sink = Arc::clone(&self.sink);
        // Sinks do blocking file IO
        let result =
            spawn_blocking(move || sink.export_consolidated_prices(previous, &snapshot)).await;

        match result {
            Ok(Ok(path)) => {
                info!("Saved consolidated prices to {}", path.display());
                self.consolidated_prices.clear();
            }
            Ok(Err(ExportError::Empty(_))) => {
                debug!("No consolidated prices to flush for {}", previous);
                self.consolidated_prices.clear();
            }
            Ok(Err(e)) => error!(
                "Export of consolidated prices for {} failed, keeping {} points: {}",
                previous, points, e
            ),
            Err(e) => error!(
                "Consolidated price export task for {} failed, keeping {} points: {}",
                previous, points, e
            ),
        }
    }

    async fn poll_prices(&self) -> Result<(), MonitorError> {
        let prices = if self.price_ids.is_empty() {
            HashMap::new()
        } else {
            match self.source.fetch_prices(&self.price_ids).await {
                Ok(prices) => prices,
                Err(e) => {
                    warn!("Price fetch failed: {}", e);
                    HashMap::new()
                }
            }
        };

        let mut batch: Vec<(String, PricePoint)> = prices
            .into_values()
            .map(|point| (self.registry.symbol_for(&point.instrument_id), point))
            .collect();
        batch.sort_by(|a, b| a.0.cmp(&b.0));

        for (symbol, point) in &batch {
            self.price_history.append(symbol, point.clone());
            self.consolidated_prices.append(symbol, point.clone());
        }

        let placeholders = batch.iter().filter(|(_, p)| p.is_placeholder()).count();
        if placeholders > 0 {
            debug!("{} of {} prices are placeholders", placeholders, batch.len());
        }

        self.console
            .render_prices(&batch, (self.clock)())
            .map_err(|e| MonitorError::orchestration("price display", e))
    }

    async fn poll_quotes(&self) -> Result<(), MonitorError> {
        let mut quotes = Vec::with_capacity(self.settings.quote_pairs.len());
        let mut issued = 0usize;

        for pair in &self.settings.quote_pairs {
            let (input, output) = match self.registry.resolve_pair(pair) {
                Ok(legs) => legs,
                Err(e) => {
                    warn!("Skipping quote pair {}: {}", pair, e);
                    continue;
                }
            };

            // Pace between requests only, never before the first one
            if issued > 0 {
                sleep(self.settings.quote_pacing).await;
            }
            issued += 1;

            match self
                .source
                .fetch_quote(input, output, input.one_unit(), self.settings.slippage_bps)
                .await
            {
                Ok(Some(quote)) => {
                    self.quote_history.append(&pair.key(), quote.clone());
                    quotes.push(quote);
                }
                Ok(None) => debug!("No quote for {}", pair),
                Err(e) => warn!("Quote fetch failed for {}: {}", pair, e),
            }
        }

        self.console
            .render_quotes(&self.registry, &quotes, (self.clock)())
            .map_err(|e| MonitorError::orchestration("quote display", e))
    }

    /// Shutdown flush. Called once from `start`, on every exit path.
    async fn finalize(&self) {
        let today = (self.clock)().date_naive();
        let window = *self.window_date.lock();
        info!("Saving final data to {}", self.sink.destination());

        let consolidated = self.consolidated_prices.snapshot();
        log_export(
            "consolidated prices",
            self.sink.export_consolidated_prices(window, &consolidated),
        );

        let quotes = self.quote_history.snapshot();
        log_export(
            "consolidated quotes",
            self.sink.export_consolidated_quotes(today, &quotes),
        );

        let latest = self.price_history.latest_per_key();
        log_export(
            "daily summary",
            self.sink.export_daily_summary(today, &latest),
        );

        self.consolidated_prices.clear();
        self.source.close().await;
    }
}

fn log_export(what: &str, result: Result<PathBuf, ExportError>) {
    match result {
        Ok(path) => info!("Saved {} to {}", what, path.display()),
        Err(ExportError::Empty(_)) => warn!("Nothing to export for {}", what),
        Err(e) => error!("Export of {} failed: {}", what, e),
    }
}

fn log_summary(summary: &RunSummary) {
    info!("Session summary:");
    info!("  Iterations: {}", summary.iterations);
    info!("  Tokens monitored: {}", summary.tokens_monitored);
    info!("  Pairs monitored: {}", summary.pairs_monitored);
    info!("  Price points: {}", summary.price_points);
    info!("  Quote points: {}", summary.quote_points);
    if let Some(reason) = summary.stop_reason {
        info!("  Stopped: {:?}", reason);
    }
    if let Some(failure) = &summary.failure {
        error!("  Failure: {}", failure);
    }
}
