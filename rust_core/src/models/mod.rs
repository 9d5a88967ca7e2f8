// Shared models for the price monitor
use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Prices
// ============================================================================

/// Whether a price point carries real upstream data or is a placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatus {
    /// Upstream returned a usable price
    Live,
    /// Upstream did not return the identifier at all
    NoData,
    /// Upstream returned the identifier but without a usable price field
    Malformed,
}

impl PriceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceStatus::Live => "live",
            PriceStatus::NoData => "no_data",
            PriceStatus::Malformed => "malformed",
        }
    }

    pub fn is_placeholder(&self) -> bool {
        !matches!(self, PriceStatus::Live)
    }
}

/// Optional upstream fields. Absence is a valid state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceMetadata {
    /// Counterpart token the price is quoted against
    pub vs_token: Option<String>,
    pub vs_token_symbol: Option<String>,
    pub provider: Option<String>,
    pub price_change_24h: Option<f64>,
    pub confidence: Option<f64>,
    pub block_id: Option<u64>,
    pub decimals: Option<u32>,
    /// Reason a placeholder was produced
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub instrument_id: String,
    pub price_usd: f64,
    pub captured_at: DateTime<Utc>,
    pub status: PriceStatus,
    pub metadata: PriceMetadata,
}

impl PricePoint {
    pub fn live(
        instrument_id: impl Into<String>,
        price_usd: f64,
        captured_at: DateTime<Utc>,
        metadata: PriceMetadata,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            price_usd,
            captured_at,
            status: PriceStatus::Live,
            metadata,
        }
    }

    /// Zero-priced stand-in for an identifier the upstream had no usable data for
    pub fn placeholder(
        instrument_id: impl Into<String>,
        status: PriceStatus,
        note: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            price_usd: 0.0,
            captured_at,
            status,
            metadata: PriceMetadata {
                note: Some(note.into()),
                ..PriceMetadata::default()
            },
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.status.is_placeholder()
    }
}

// ============================================================================
// Quotes
// ============================================================================

/// A configured quote route, e.g. SOL -> USDC
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotePair {
    pub input: String,
    pub output: String,
}

impl QuotePair {
    pub fn new(input: &str, output: &str) -> Self {
        Self {
            input: input.trim().to_uppercase(),
            output: output.trim().to_uppercase(),
        }
    }

    /// "INPUT/OUTPUT"
    pub fn key(&self) -> String {
        pair_key(&self.input, &self.output)
    }
}

impl fmt::Display for QuotePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.input, self.output)
    }
}

impl FromStr for QuotePair {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((input, output))
                if !input.trim().is_empty()
                    && !output.trim().is_empty()
                    && !output.contains('/') =>
            {
                Ok(QuotePair::new(input, output))
            }
            _ => Err(RegistryError::InvalidPair(s.to_string())),
        }
    }
}

pub fn pair_key(input_symbol: &str, output_symbol: &str) -> String {
    format!("{}/{}", input_symbol, output_symbol)
}

/// Normalized ExactIn swap quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotePoint {
    pub pair_key: String,
    pub input_symbol: String,
    pub output_symbol: String,
    pub input_id: String,
    pub output_id: String,
    /// Raw smallest-unit amounts
    pub input_amount: u64,
    pub output_amount: u64,
    pub price_impact_pct: f64,
    pub slippage_bps: u16,
    pub route_hop_count: usize,
    pub captured_at: DateTime<Utc>,
}

impl QuotePoint {
    /// Output received per one input unit, in whole units
    pub fn effective_price(&self, input_decimals: u8, output_decimals: u8) -> f64 {
        let input = self.input_amount as f64 / 10f64.powi(i32::from(input_decimals));
        let output = self.output_amount as f64 / 10f64.powi(i32::from(output_decimals));
        if input > 0.0 {
            output / input
        } else {
            0.0
        }
    }

    pub fn is_direct_route(&self) -> bool {
        self.route_hop_count == 1
    }
}
