//! Market Data Source Trait
//!
//! Defines the upstream contract the poll scheduler drives: one batched price
//! lookup and one single-pair quote lookup per call. Implementations absorb
//! per-identifier gaps into placeholder points and only fail the whole call on
//! transport or payload errors.

use crate::error::UpstreamError;
use crate::models::{PricePoint, QuotePoint};
use crate::registry::Instrument;
use async_trait::async_trait;
use std::collections::HashMap;

/// Common trait for price/quote providers
///
/// Implementations must be Send + Sync for use in async contexts.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Display name for logging (e.g. "Jupiter")
    fn source_name(&self) -> &str;

    /// False when no credential was configured; every fetch is then a no-op
    fn is_authenticated(&self) -> bool;

    /// Fetch prices for all identifiers in one upstream call
    ///
    /// # Returns
    /// * `Ok(map)` - exactly one entry per requested identifier (placeholders
    ///   for missing or malformed entries), or empty when unauthenticated
    /// * `Err` - transport/status/payload failure for the whole batch
    async fn fetch_prices(
        &self,
        identifiers: &[String],
    ) -> Result<HashMap<String, PricePoint>, UpstreamError>;

    /// Fetch an ExactIn quote for `raw_amount` of `input` into `output`
    ///
    /// # Returns
    /// * `Ok(Some(quote))` - normalized quote
    /// * `Ok(None)` - unauthenticated, nothing was requested
    /// * `Err` - transport failure or a response without amounts
    async fn fetch_quote(
        &self,
        input: &Instrument,
        output: &Instrument,
        raw_amount: u64,
        slippage_bps: u16,
    ) -> Result<Option<QuotePoint>, UpstreamError>;

    /// Release the shared connection handle
    async fn close(&self);
}
