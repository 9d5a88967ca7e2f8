//! Scheduler lifecycle tests with an in-memory upstream and sink.
//!
//! All tests run on a paused clock so interval and pacing sleeps resolve
//! instantly while still being ordered correctly.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use price_monitor_rust::scheduler::Clock;
use price_monitor_rust::{
    Console, MonitorError, PollScheduler, SchedulerSettings, SchedulerState, StopReason,
};
use pricewatch_rust_core::clients::MarketDataSource;
use pricewatch_rust_core::error::{ExportError, UpstreamError};
use pricewatch_rust_core::export::ExportSink;
use pricewatch_rust_core::history::SeriesSnapshot;
use pricewatch_rust_core::models::{PricePoint, PriceMetadata, QuotePair, QuotePoint};
use pricewatch_rust_core::registry::{Instrument, InstrumentRegistry};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeSource {
    price_calls: AtomicUsize,
    quote_calls: AtomicUsize,
    close_calls: AtomicUsize,
    fail_prices: bool,
    /// Answer every quote request with "no route"
    no_quotes: bool,
    /// Cancel this token when the n-th quote (1-based) is requested
    cancel_on_quote: Option<(usize, CancellationToken)>,
    /// Advance this clock by one day on every price fetch
    day_clock: Option<Arc<Mutex<DateTime<Utc>>>>,
    quoted_pairs: Mutex<Vec<String>>,
}

#[async_trait]
impl MarketDataSource for FakeSource {
    fn source_name(&self) -> &str {
        "fake"
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    async fn fetch_prices(
        &self,
        identifiers: &[String],
    ) -> Result<HashMap<String, PricePoint>, UpstreamError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(clock) = &self.day_clock {
            let mut now = clock.lock();
            *now = *now + ChronoDuration::days(1);
        }
        if self.fail_prices {
            return Err(UpstreamError::Malformed {
                context: "fake prices",
                reason: "boom".to_string(),
            });
        }

        Ok(identifiers
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    PricePoint::live(id.clone(), 1.0, Utc::now(), PriceMetadata::default()),
                )
            })
            .collect())
    }

    async fn fetch_quote(
        &self,
        input: &Instrument,
        output: &Instrument,
        raw_amount: u64,
        slippage_bps: u16,
    ) -> Result<Option<QuotePoint>, UpstreamError> {
        let n = self.quote_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let key = format!("{}/{}", input.symbol, output.symbol);
        self.quoted_pairs.lock().push(key.clone());

        if let Some((at, token)) = &self.cancel_on_quote {
            if *at == n {
                token.cancel();
            }
        }

        if self.no_quotes {
            return Ok(None);
        }

        Ok(Some(QuotePoint {
            pair_key: key,
            input_symbol: input.symbol.clone(),
            output_symbol: output.symbol.clone(),
            input_id: input.identifier.clone(),
            output_id: output.identifier.clone(),
            input_amount: raw_amount,
            output_amount: 42,
            price_impact_pct: 0.0,
            slippage_bps,
            route_hop_count: 1,
            captured_at: Utc::now(),
        }))
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ExportCall {
    Prices(NaiveDate, usize),
    Quotes(usize),
    Summary(usize),
}

#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<ExportCall>>,
    fail_prices: bool,
}

impl RecordingSink {
    fn calls(&self) -> Vec<ExportCall> {
        self.calls.lock().clone()
    }

    fn finalizer_runs(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ExportCall::Summary(_)))
            .count()
    }
}

impl ExportSink for RecordingSink {
    fn export_consolidated_prices(
        &self,
        date: NaiveDate,
        series: &SeriesSnapshot<PricePoint>,
    ) -> Result<PathBuf, ExportError> {
        let points = series.values().map(Vec::len).sum();
        self.calls.lock().push(ExportCall::Prices(date, points));
        if self.fail_prices {
            return Err(ExportError::Io {
                path: PathBuf::from("/readonly"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        Ok(PathBuf::from("prices"))
    }

    fn export_consolidated_quotes(
        &self,
        _date: NaiveDate,
        series: &SeriesSnapshot<QuotePoint>,
    ) -> Result<PathBuf, ExportError> {
        let points = series.values().map(Vec::len).sum();
        self.calls.lock().push(ExportCall::Quotes(points));
        Ok(PathBuf::from("quotes"))
    }

    fn export_daily_summary(
        &self,
        _date: NaiveDate,
        latest: &BTreeMap<String, PricePoint>,
    ) -> Result<PathBuf, ExportError> {
        self.calls.lock().push(ExportCall::Summary(latest.len()));
        Ok(PathBuf::from("summary"))
    }

    fn destination(&self) -> String {
        "memory".to_string()
    }
}

/// Console target the test can read back
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn registry() -> Arc<InstrumentRegistry> {
    Arc::new(InstrumentRegistry::default_solana().unwrap())
}

fn settings(pairs: &[&str]) -> SchedulerSettings {
    SchedulerSettings {
        quote_pairs: pairs.iter().map(|p| p.parse::<QuotePair>().unwrap()).collect(),
        slippage_bps: 50,
        quote_pacing: Duration::from_millis(300),
        history_capacity: 1000,
        consolidated_capacity: 2880,
    }
}

fn scheduler(
    pairs: &[&str],
    source: Arc<FakeSource>,
    sink: Arc<RecordingSink>,
) -> PollScheduler {
    PollScheduler::new(
        settings(pairs),
        registry(),
        source,
        sink,
        Console::new(Box::new(io::sink())),
    )
    .unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_one_minute_at_thirty_seconds_runs_two_ticks() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(&["SOL/USDC", "JUP/USDC"], source.clone(), sink.clone());

    let started = Instant::now();
    let summary = scheduler.start(30, 1, CancellationToken::new()).await.unwrap();

    assert_eq!(source.price_calls.load(Ordering::SeqCst), 2);
    assert_eq!(source.quote_calls.load(Ordering::SeqCst), 4);
    assert_eq!(source.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.finalizer_runs(), 1);

    assert_eq!(summary.state, SchedulerState::Stopped);
    assert_eq!(summary.stop_reason, Some(StopReason::Completed));
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.tokens_monitored, 13);
    assert_eq!(summary.price_points, 26);
    assert_eq!(summary.quote_points, 4);

    // One interval wait plus pacing, no wait after the last tick
    assert!(started.elapsed() < Duration::from_secs(32));

    // Consolidated window cleared by the flush, session history kept
    assert!(scheduler.consolidated_prices().is_empty());
    assert_eq!(scheduler.price_history().len("SOL"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_finalizer_exports_in_order() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(&["SOL/USDC"], source, sink.clone());

    scheduler.start(30, 1, CancellationToken::new()).await.unwrap();

    let today = Utc::now().date_naive();
    assert_eq!(
        sink.calls(),
        vec![
            ExportCall::Prices(today, 26),
            ExportCall::Quotes(2),
            ExportCall::Summary(13),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_wait_returns_promptly() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(&["SOL/USDC"], source.clone(), sink.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let summary = scheduler.start(30, 0, cancel).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(6));
    assert_eq!(summary.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(source.price_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.finalizer_runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_tick_keeps_appended_data() {
    let cancel = CancellationToken::new();
    let source = Arc::new(FakeSource {
        cancel_on_quote: Some((2, cancel.clone())),
        ..FakeSource::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(
        &["SOL/USDC", "JUP/USDC", "RAY/USDC", "JTO/USDC"],
        source.clone(),
        sink.clone(),
    );

    let summary = scheduler.start(30, 60, cancel).await.unwrap();

    assert_eq!(summary.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(summary.iterations, 1);
    // Remaining quotes of the tick are abandoned
    assert_eq!(source.quote_calls.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.quote_history().total_points(), 2);
    assert_eq!(scheduler.price_history().series_count(), 13);

    assert_eq!(sink.finalizer_runs(), 1);
    assert!(sink.calls().contains(&ExportCall::Quotes(2)));
    assert_eq!(source.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_pair_is_skipped() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(
        &["SOL/USDX", "JUP/USDC", "BONK/SOL"],
        source.clone(),
        sink.clone(),
    );

    scheduler.start(30, 0, cancel_after_first_tick()).await.unwrap();

    assert_eq!(
        *source.quoted_pairs.lock(),
        vec!["JUP/USDC".to_string(), "BONK/SOL".to_string()]
    );
    assert_eq!(scheduler.quote_history().len("SOL/USDX"), 0);
    assert_eq!(scheduler.quote_history().len("BONK/SOL"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quote_pacing_only_between_requests() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(&["SOL/USDC", "JUP/USDC", "RAY/USDC"], source, sink);

    let started = Instant::now();
    // interval 60s, duration 1 minute: exactly one tick, no trailing wait
    scheduler.start(60, 1, CancellationToken::new()).await.unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(600));
    assert!(elapsed < Duration::from_millis(900));
}

#[tokio::test(start_paused = true)]
async fn test_price_fetch_failure_is_absorbed() {
    let source = Arc::new(FakeSource {
        fail_prices: true,
        ..FakeSource::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(&["SOL/USDC"], source.clone(), sink.clone());

    let summary = scheduler.start(30, 1, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.stop_reason, Some(StopReason::Completed));
    assert_eq!(summary.price_points, 0);
    // Quotes still run even though prices failed
    assert_eq!(summary.quote_points, 2);
    assert_eq!(sink.finalizer_runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_export_failure_does_not_block_shutdown() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(RecordingSink {
        fail_prices: true,
        ..RecordingSink::default()
    });
    let mut scheduler = scheduler(&["SOL/USDC"], source.clone(), sink.clone());

    scheduler.start(30, 1, CancellationToken::new()).await.unwrap();

    let calls = sink.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(calls[1], ExportCall::Quotes(2)));
    assert!(matches!(calls[2], ExportCall::Summary(13)));
    assert_eq!(source.close_calls.load(Ordering::SeqCst), 1);
    // Cleared even though the export failed
    assert!(scheduler.consolidated_prices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_orchestration_failure_still_flushes() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = PollScheduler::new(
        settings(&["SOL/USDC"]),
        registry(),
        source.clone(),
        sink.clone(),
        Console::new(Box::new(FailingWriter)),
    )
    .unwrap();

    let err = scheduler
        .start(30, 1, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::Orchestration { .. }));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);

    let summary = scheduler.summary();
    assert_eq!(summary.stop_reason, Some(StopReason::Failed));
    assert!(summary.failure.is_some());
    assert_eq!(summary.iterations, 1);

    assert_eq!(sink.finalizer_runs(), 1);
    assert_eq!(source.close_calls.load(Ordering::SeqCst), 1);
    // Failure hit the banner, before any fetch
    assert_eq!(source.price_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_only_from_idle() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(&["SOL/USDC"], source.clone(), sink.clone());

    scheduler.start(30, 1, CancellationToken::new()).await.unwrap();
    let err = scheduler
        .start(30, 1, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::InvalidState(SchedulerState::Stopped)));
    assert_eq!(source.price_calls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.finalizer_runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_rejected() {
    let source = Arc::new(FakeSource::default());
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(&["SOL/USDC"], source.clone(), sink.clone());

    let err = scheduler
        .start(0, 1, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MonitorError::Config(_)));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(source.close_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_date_rollover_flushes_consolidated_window() {
    let day0 = Utc.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap();
    let now = Arc::new(Mutex::new(day0));
    let clock_now = now.clone();
    let clock: Clock = Arc::new(move || *clock_now.lock());

    let source = Arc::new(FakeSource {
        day_clock: Some(now),
        ..FakeSource::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let mut scheduler = scheduler(&["SOL/USDC"], source, sink.clone()).with_clock(clock);

    scheduler.start(30, 1, CancellationToken::new()).await.unwrap();

    let d0 = day0.date_naive();
    let d1 = d0.succ_opt().unwrap();
    let price_exports: Vec<ExportCall> = sink
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ExportCall::Prices(..)))
        .collect();

    // Rollover flush of tick one, then the final flush of tick two's window
    assert_eq!(
        price_exports,
        vec![ExportCall::Prices(d0, 13), ExportCall::Prices(d1, 13)]
    );
    assert_eq!(sink.finalizer_runs(), 1);
    // Accumulation history is never cleared by rollover
    assert_eq!(scheduler.price_history().total_points(), 26);
}

#[tokio::test(start_paused = true)]
async fn test_failed_rollover_export_keeps_window() {
    let day0 = Utc.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap();
    let now = Arc::new(Mutex::new(day0));
    let clock_now = now.clone();
    let clock: Clock = Arc::new(move || *clock_now.lock());

    let source = Arc::new(FakeSource {
        day_clock: Some(now),
        ..FakeSource::default()
    });
    let sink = Arc::new(RecordingSink {
        fail_prices: true,
        ..RecordingSink::default()
    });
    let mut scheduler = scheduler(&["SOL/USDC"], source, sink.clone()).with_clock(clock);

    scheduler.start(30, 1, CancellationToken::new()).await.unwrap();

    let d0 = day0.date_naive();
    let d1 = d0.succ_opt().unwrap();
    let price_exports: Vec<ExportCall> = sink
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ExportCall::Prices(..)))
        .collect();

    // Tick one's points survive the failed rollover write and go out again
    // with tick two's in the final flush
    assert_eq!(
        price_exports,
        vec![ExportCall::Prices(d0, 13), ExportCall::Prices(d1, 26)]
    );
    assert_eq!(sink.finalizer_runs(), 1);
    // The shutdown flush clears regardless of the outcome
    assert!(scheduler.consolidated_prices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_console_shows_both_summaries_when_nothing_arrives() {
    let source = Arc::new(FakeSource {
        fail_prices: true,
        no_quotes: true,
        ..FakeSource::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let buffer = SharedBuffer::default();
    let mut scheduler = PollScheduler::new(
        settings(&["SOL/USDC", "JUP/USDC"]),
        registry(),
        source.clone(),
        sink,
        Console::new(Box::new(buffer.clone())),
    )
    .unwrap();

    let summary = scheduler.start(60, 1, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.iterations, 1);
    assert_eq!(summary.price_points, 0);
    assert_eq!(summary.quote_points, 0);
    assert_eq!(source.quote_calls.load(Ordering::SeqCst), 2);

    let text = buffer.contents();
    assert!(text.contains("Iteration 1 - "));
    assert!(text.contains("JUPITER PRICE UPDATE"));
    assert!(text.contains("No prices this iteration"));
    assert!(text.contains("JUPITER QUOTE UPDATE"));
    assert!(text.contains("No quotes this iteration"));
    let prices_at = text.find("JUPITER PRICE UPDATE").unwrap();
    let quotes_at = text.find("JUPITER QUOTE UPDATE").unwrap();
    assert!(prices_at < quotes_at);
}

fn cancel_after_first_tick() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        trigger.cancel();
    });
    cancel
}
