//! Configuration for price_monitor_rust

use anyhow::{anyhow, Context, Result};
use pricewatch_rust_core::models::QuotePair;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.jup.ag";
pub const DEFAULT_QUOTE_PAIRS: &str = "SOL/USDC,JUP/USDC,RAY/USDC,BONK/SOL,JTO/USDC,PYTH/USDC,WIF/SOL";
const PLACEHOLDER_API_KEY: &str = "your_jupiter_api_key_here";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    // Upstream
    pub api_key: Option<String>,
    pub base_url: String,

    // Scheduling
    pub interval_secs: u64,
    /// 0 runs until cancelled
    pub duration_minutes: u64,
    pub quote_pacing_ms: u64,

    // Quotes
    pub quote_pairs: Vec<QuotePair>,
    pub slippage_bps: u16,

    // History
    pub history_capacity: usize,
    pub consolidated_capacity: usize,

    // Export
    pub export_enabled: bool,
    pub output_dir: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            interval_secs: 30,
            duration_minutes: 60,
            quote_pacing_ms: 300,
            // Infallible: the default list is well-formed
            quote_pairs: parse_pairs(DEFAULT_QUOTE_PAIRS).unwrap_or_default(),
            slippage_bps: 50,
            history_capacity: 1000,
            consolidated_capacity: 2880,
            export_enabled: true,
            output_dir: PathBuf::from("price_history"),
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("JUPITER_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty() && key != PLACEHOLDER_API_KEY);

        let slippage_bps = parse_u64("MONITOR_SLIPPAGE_BPS", 50)?;
        let slippage_bps = u16::try_from(slippage_bps)
            .map_err(|_| anyhow!("MONITOR_SLIPPAGE_BPS must fit in u16"))?;

        let quote_pairs = parse_pairs(
            &env::var("MONITOR_QUOTE_PAIRS").unwrap_or_else(|_| DEFAULT_QUOTE_PAIRS.to_string()),
        )
        .context("MONITOR_QUOTE_PAIRS")?;

        let config = Self {
            api_key,
            base_url: env::var("JUPITER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),

            interval_secs: parse_u64("MONITOR_INTERVAL_SECONDS", 30)?,
            duration_minutes: parse_u64("MONITOR_DURATION_MINUTES", 60)?,
            quote_pacing_ms: parse_u64("MONITOR_QUOTE_PACING_MS", 300)?,

            quote_pairs,
            slippage_bps,

            history_capacity: parse_usize("MONITOR_HISTORY_CAPACITY", 1000)?,
            consolidated_capacity: parse_usize("MONITOR_CONSOLIDATED_CAPACITY", 2880)?,

            export_enabled: parse_bool("MONITOR_EXPORT_ENABLED", true)?,
            output_dir: env::var("MONITOR_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("price_history")),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(anyhow!("MONITOR_INTERVAL_SECONDS must be > 0"));
        }
        if self.history_capacity == 0 {
            return Err(anyhow!("MONITOR_HISTORY_CAPACITY must be > 0"));
        }
        if self.consolidated_capacity == 0 {
            return Err(anyhow!("MONITOR_CONSOLIDATED_CAPACITY must be > 0"));
        }
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("JUPITER_BASE_URL must not be empty"));
        }
        Ok(())
    }

    pub fn quote_pacing(&self) -> Duration {
        Duration::from_millis(self.quote_pacing_ms)
    }
}

/// `floor(duration_minutes * 60 / interval_secs)`, or `None` for an unbounded run
pub fn tick_budget(interval_secs: u64, duration_minutes: u64) -> Option<u64> {
    if duration_minutes == 0 || interval_secs == 0 {
        return None;
    }
    Some(duration_minutes.saturating_mul(60) / interval_secs)
}

/// Comma-separated `INPUT/OUTPUT` list
pub fn parse_pairs(raw: &str) -> Result<Vec<QuotePair>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<QuotePair>().map_err(|e| anyhow!(e)))
        .collect()
}

/// Parse environment variable as u64 with default fallback
fn parse_u64(var_name: &str, default: u64) -> Result<u64> {
    match env::var(var_name) {
        Ok(val) => val.trim().parse().map_err(|_| anyhow!("{} must be a valid u64", var_name)),
        Err(_) => Ok(default),
    }
}

/// Parse environment variable as usize with default fallback
fn parse_usize(var_name: &str, default: usize) -> Result<usize> {
    match env::var(var_name) {
        Ok(val) => val.trim().parse().map_err(|_| anyhow!("{} must be a valid usize", var_name)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(var_name: &str, default: bool) -> Result<bool> {
    match env::var(var_name) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(anyhow!("{} must be a boolean", var_name)),
        },
        Err(_) => Ok(default),
    }
}
