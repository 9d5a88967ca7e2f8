//! Export sink contract.
//!
//! The scheduler hands sinks read-only snapshots at flush time. Every call is
//! fire-and-forget from the scheduler's side: an `Err` is logged at the call
//! site and the remaining shutdown steps still run.
//!
//! Implementations may block on file IO. Callers inside the poll loop run
//! them on the blocking pool.

use crate::error::ExportError;
use crate::history::SeriesSnapshot;
use crate::models::{PricePoint, QuotePoint};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub trait ExportSink: Send + Sync {
    /// One workbook for `date`, one sheet per instrument
    fn export_consolidated_prices(
        &self,
        date: NaiveDate,
        series: &SeriesSnapshot<PricePoint>,
    ) -> Result<PathBuf, ExportError>;

    /// One workbook for `date`, one sheet per pair
    fn export_consolidated_quotes(
        &self,
        date: NaiveDate,
        series: &SeriesSnapshot<QuotePoint>,
    ) -> Result<PathBuf, ExportError>;

    /// Latest point per instrument
    fn export_daily_summary(
        &self,
        date: NaiveDate,
        latest: &BTreeMap<String, PricePoint>,
    ) -> Result<PathBuf, ExportError>;

    /// Where artifacts end up, for the session summary
    fn destination(&self) -> String;
}

/// Sink used when export is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ExportSink for NoopSink {
    fn export_consolidated_prices(
        &self,
        _date: NaiveDate,
        _series: &SeriesSnapshot<PricePoint>,
    ) -> Result<PathBuf, ExportError> {
        Err(ExportError::Empty("consolidated prices (export disabled)"))
    }

    fn export_consolidated_quotes(
        &self,
        _date: NaiveDate,
        _series: &SeriesSnapshot<QuotePoint>,
    ) -> Result<PathBuf, ExportError> {
        Err(ExportError::Empty("consolidated quotes (export disabled)"))
    }

    fn export_daily_summary(
        &self,
        _date: NaiveDate,
        _latest: &BTreeMap<String, PricePoint>,
    ) -> Result<PathBuf, ExportError> {
        Err(ExportError::Empty("daily summary (export disabled)"))
    }

    fn destination(&self) -> String {
        "(export disabled)".to_string()
    }
}
