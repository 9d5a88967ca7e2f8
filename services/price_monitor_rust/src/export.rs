//! CSV workbook export.
//!
//! A "workbook" is a directory holding one CSV file per sheet, named
//! `<PREFIX>_<YYYYMMDD>`. The daily summary has a single sheet and is written
//! as a plain CSV file next to the workbooks.

use chrono::NaiveDate;
use pricewatch_rust_core::error::ExportError;
use pricewatch_rust_core::export::ExportSink;
use pricewatch_rust_core::history::SeriesSnapshot;
use pricewatch_rust_core::models::{PricePoint, QuotePoint};
use pricewatch_rust_core::utils::format::humanize_price;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Longest sheet name spreadsheet tools accept
pub const MAX_SHEET_NAME: usize = 31;

const PRICE_WORKBOOK_PREFIX: &str = "PRICE_HISTORY_CONSOLIDATED";
const QUOTE_WORKBOOK_PREFIX: &str = "QUOTE_HISTORY_CONSOLIDATED";
const SUMMARY_PREFIX: &str = "DAILY_SUMMARY";

#[derive(Debug, Serialize)]
struct PriceRow<'a> {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Symbol")]
    symbol: &'a str,
    #[serde(rename = "Price")]
    price: String,
    #[serde(rename = "Price (USD)")]
    price_usd: f64,
    #[serde(rename = "Status")]
    status: &'static str,
    #[serde(rename = "24h Change %")]
    price_change_24h: Option<f64>,
    #[serde(rename = "Confidence")]
    confidence: Option<f64>,
    #[serde(rename = "VS Token")]
    vs_token: Option<&'a str>,
    #[serde(rename = "VS Token Symbol")]
    vs_token_symbol: Option<&'a str>,
    #[serde(rename = "Provider")]
    provider: Option<&'a str>,
    #[serde(rename = "Block ID")]
    block_id: Option<u64>,
    #[serde(rename = "Decimals")]
    decimals: Option<u32>,
    #[serde(rename = "Mint")]
    mint: &'a str,
    #[serde(rename = "Note")]
    note: Option<&'a str>,
}

impl<'a> PriceRow<'a> {
    fn new(symbol: &'a str, point: &'a PricePoint) -> Self {
        let meta = &point.metadata;
        Self {
            timestamp: point.captured_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            symbol,
            price: humanize_price(point.price_usd),
            price_usd: point.price_usd,
            status: point.status.as_str(),
            price_change_24h: meta.price_change_24h,
            confidence: meta.confidence,
            vs_token: meta.vs_token.as_deref(),
            vs_token_symbol: meta.vs_token_symbol.as_deref(),
            provider: meta.provider.as_deref(),
            block_id: meta.block_id,
            decimals: meta.decimals,
            mint: &point.instrument_id,
            note: meta.note.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct QuoteRow<'a> {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Pair")]
    pair: &'a str,
    #[serde(rename = "Input Amount (raw)")]
    input_amount: u64,
    #[serde(rename = "Output Amount (raw)")]
    output_amount: u64,
    #[serde(rename = "Price Impact %")]
    price_impact_pct: f64,
    #[serde(rename = "Slippage (bps)")]
    slippage_bps: u16,
    #[serde(rename = "Route Hops")]
    route_hop_count: usize,
    #[serde(rename = "Input Mint")]
    input_mint: &'a str,
    #[serde(rename = "Output Mint")]
    output_mint: &'a str,
}

impl<'a> From<&'a QuotePoint> for QuoteRow<'a> {
    fn from(quote: &'a QuotePoint) -> Self {
        Self {
            timestamp: quote.captured_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            pair: &quote.pair_key,
            input_amount: quote.input_amount,
            output_amount: quote.output_amount,
            price_impact_pct: quote.price_impact_pct,
            slippage_bps: quote.slippage_bps,
            route_hop_count: quote.route_hop_count,
            input_mint: &quote.input_id,
            output_mint: &quote.output_id,
        }
    }
}

/// Writes workbooks under a fixed output directory
#[derive(Debug, Clone)]
pub struct CsvWorkbookSink {
    output_dir: PathBuf,
}

impl CsvWorkbookSink {
    /// Creates the output directory if it does not exist yet
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, ExportError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|source| ExportError::Io {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self { output_dir })
    }

    fn workbook_dir(&self, prefix: &str, date: NaiveDate) -> Result<PathBuf, ExportError> {
        let dir = self
            .output_dir
            .join(format!("{}_{}", prefix, date.format("%Y%m%d")));
        fs::create_dir_all(&dir).map_err(|source| ExportError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }
}

impl ExportSink for CsvWorkbookSink {
    fn export_consolidated_prices(
        &self,
        date: NaiveDate,
        series: &SeriesSnapshot<PricePoint>,
    ) -> Result<PathBuf, ExportError> {
        if series.values().all(Vec::is_empty) {
            return Err(ExportError::Empty("consolidated prices"));
        }

        let dir = self.workbook_dir(PRICE_WORKBOOK_PREFIX, date)?;
        for (symbol, points) in series.iter().filter(|(_, points)| !points.is_empty()) {
            let sheet = sheet_path(&dir, symbol);
            write_sheet(&sheet, points.iter().map(|p| PriceRow::new(symbol, p)))?;
        }

        info!(
            "Exported consolidated prices for {} tokens to {}",
            series.len(),
            dir.display()
        );
        Ok(dir)
    }

    fn export_consolidated_quotes(
        &self,
        date: NaiveDate,
        series: &SeriesSnapshot<QuotePoint>,
    ) -> Result<PathBuf, ExportError> {
        if series.values().all(Vec::is_empty) {
            return Err(ExportError::Empty("consolidated quotes"));
        }

        let dir = self.workbook_dir(QUOTE_WORKBOOK_PREFIX, date)?;
        for (pair, quotes) in series.iter().filter(|(_, quotes)| !quotes.is_empty()) {
            let sheet = sheet_path(&dir, pair);
            write_sheet(&sheet, quotes.iter().map(QuoteRow::from))?;
        }

        info!(
            "Exported consolidated quotes for {} pairs to {}",
            series.len(),
            dir.display()
        );
        Ok(dir)
    }

    fn export_daily_summary(
        &self,
        date: NaiveDate,
        latest: &BTreeMap<String, PricePoint>,
    ) -> Result<PathBuf, ExportError> {
        if latest.is_empty() {
            return Err(ExportError::Empty("daily summary"));
        }

        let path = self
            .output_dir
            .join(format!("{}_{}.csv", SUMMARY_PREFIX, date.format("%Y%m%d")));
        // BTreeMap iteration keeps rows sorted by symbol
        write_sheet(
            &path,
            latest.iter().map(|(symbol, point)| PriceRow::new(symbol, point)),
        )?;

        info!("Exported daily summary to {}", path.display());
        Ok(path)
    }

    fn destination(&self) -> String {
        self.output_dir.display().to_string()
    }
}

/// Sheet-safe name: `/` and other path separators become `-`, cut to 31 chars
pub fn sheet_name(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '[' | ']' => '-',
            other => other,
        })
        .take(MAX_SHEET_NAME)
        .collect()
}

fn sheet_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.csv", sheet_name(key)))
}

fn write_sheet<R, I>(path: &Path, rows: I) -> Result<(), ExportError>
where
    R: Serialize,
    I: IntoIterator<Item = R>,
{
    let encode_err = |e: csv::Error| ExportError::Encode {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut writer = csv::Writer::from_path(path).map_err(encode_err)?;
    let mut written = 0usize;
    for row in rows {
        writer.serialize(row).map_err(encode_err)?;
        written += 1;
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if written == 0 {
        warn!("Sheet {} was written without rows", path.display());
    }
    Ok(())
}
