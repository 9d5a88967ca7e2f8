//! Jupiter API Client
//!
//! Prices come from the Price API v3 (batched by mint), quotes from the Swap
//! API v1. Both require an `x-api-key` header. Without a key the client is
//! inert: it logs that once at construction and never touches the network.

use super::market_data::MarketDataSource;
use crate::error::UpstreamError;
use crate::models::{pair_key, PriceMetadata, PricePoint, PriceStatus, QuotePoint};
use crate::registry::{short_identifier, Instrument};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.jup.ag";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const API_KEY_HEADER: &str = "x-api-key";

/// Jupiter API client implementing MarketDataSource
pub struct JupiterClient {
    /// Shared connection handle; `None` once closed
    http: Mutex<Option<Client>>,
    base_url: String,
    api_key: Option<String>,
}

impl JupiterClient {
    /// Create a client against the public Jupiter endpoint
    pub fn new(api_key: Option<String>) -> Result<Self, UpstreamError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        match &api_key {
            Some(key) => {
                let mut value = HeaderValue::from_str(key)
                    .map_err(|e| UpstreamError::InvalidCredential(e.to_string()))?;
                value.set_sensitive(true);
                headers.insert(API_KEY_HEADER, value);
                info!("Jupiter API key loaded ({} chars)", key.len());
            }
            None => {
                warn!("No Jupiter API key configured - prices and quotes will not be fetched");
            }
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .user_agent("pricewatch/0.1")
            .build()
            .map_err(|source| UpstreamError::Transport {
                context: "building HTTP client",
                source,
            })?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("Jupiter API client initialized ({})", base_url);

        Ok(Self {
            http: Mutex::new(Some(http)),
            base_url,
            api_key,
        })
    }

    fn handle(&self) -> Result<Client, UpstreamError> {
        self.http.lock().as_ref().cloned().ok_or(UpstreamError::Closed)
    }

    /// GET a JSON document, mapping every failure to an UpstreamError
    async fn get_json(
        &self,
        context: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, UpstreamError> {
        let http = self.handle()?;
        let url = format!("{}{}", self.base_url, path);

        let response = http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport { context, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                context,
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| UpstreamError::Transport { context, source })?;

        serde_json::from_str(&body).map_err(|e| UpstreamError::Malformed {
            context,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MarketDataSource for JupiterClient {
    fn source_name(&self) -> &str {
        "Jupiter"
    }

    fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_prices(
        &self,
        identifiers: &[String],
    ) -> Result<HashMap<String, PricePoint>, UpstreamError> {
        if self.api_key.is_none() || identifiers.is_empty() {
            return Ok(HashMap::new());
        }

        let ids = identifiers.join(",");
        debug!("Requesting price data for {} ids", identifiers.len());

        let payload = self
            .get_json("price request", "/price/v3", &[("ids", ids.as_str())])
            .await?;

        let prices = normalize_prices(identifiers, &payload, Utc::now())?;
        let live = prices.values().filter(|p| !p.is_placeholder()).count();
        info!(
            "Processed {} tokens, {} with valid prices",
            prices.len(),
            live
        );
        Ok(prices)
    }

    async fn fetch_quote(
        &self,
        input: &Instrument,
        output: &Instrument,
        raw_amount: u64,
        slippage_bps: u16,
    ) -> Result<Option<QuotePoint>, UpstreamError> {
        if self.api_key.is_none() {
            return Ok(None);
        }

        let amount = raw_amount.to_string();
        let slippage = slippage_bps.to_string();
        let payload = self
            .get_json(
                "quote request",
                "/swap/v1/quote",
                &[
                    ("inputMint", input.identifier.as_str()),
                    ("outputMint", output.identifier.as_str()),
                    ("amount", amount.as_str()),
                    ("slippageBps", slippage.as_str()),
                    ("swapMode", "ExactIn"),
                    ("restrictIntermediateTokens", "true"),
                    ("maxAccounts", "64"),
                ],
            )
            .await?;

        normalize_quote(input, output, slippage_bps, &payload, Utc::now()).map(Some)
    }

    async fn close(&self) {
        if self.http.lock().take().is_some() {
            info!("Jupiter API client closed");
        } else {
            debug!("Jupiter API client already closed");
        }
    }
}

/// Turn a Price API v3 payload into exactly one point per requested identifier
pub fn normalize_prices(
    identifiers: &[String],
    payload: &Value,
    captured_at: DateTime<Utc>,
) -> Result<HashMap<String, PricePoint>, UpstreamError> {
    let entries = payload.as_object().ok_or_else(|| UpstreamError::Malformed {
        context: "price response",
        reason: "top-level payload is not an object".to_string(),
    })?;

    let mut prices = HashMap::with_capacity(identifiers.len());
    for id in identifiers {
        let point = match entries.get(id) {
            None | Some(Value::Null) => {
                warn!("No price data returned for token: {}", short_identifier(id));
                PricePoint::placeholder(
                    id.as_str(),
                    PriceStatus::NoData,
                    "no price data returned",
                    captured_at,
                )
            }
            Some(entry) => parse_price_entry(id, entry, captured_at),
        };
        prices.insert(id.clone(), point);
    }

    Ok(prices)
}

fn parse_price_entry(id: &str, entry: &Value, captured_at: DateTime<Utc>) -> PricePoint {
    let price = entry.get("usdPrice").and_then(value_as_f64);

    match price {
        Some(price) if price.is_finite() && price >= 0.0 => {
            let metadata = PriceMetadata {
                vs_token: string_field(entry, "vsToken"),
                vs_token_symbol: string_field(entry, "vsTokenSymbol"),
                provider: string_field(entry, "provider"),
                price_change_24h: entry.get("priceChange24h").and_then(value_as_f64),
                confidence: entry.get("confidence").and_then(value_as_f64),
                block_id: entry.get("blockId").and_then(value_as_u64),
                decimals: entry
                    .get("decimals")
                    .and_then(value_as_u64)
                    .and_then(|d| u32::try_from(d).ok()),
                note: None,
            };
            debug!("Price for {}: ${}", short_identifier(id), price);
            PricePoint::live(id, price, captured_at, metadata)
        }
        _ => {
            let note = if entry.get("usdPrice").is_some() {
                "unusable usdPrice in response"
            } else {
                "no usdPrice in response"
            };
            warn!(
                "Token {} exists in response but has {}",
                short_identifier(id),
                note
            );
            PricePoint::placeholder(id, PriceStatus::Malformed, note, captured_at)
        }
    }
}

/// Turn a Swap API v1 quote payload into a QuotePoint; amounts are mandatory
pub fn normalize_quote(
    input: &Instrument,
    output: &Instrument,
    slippage_bps: u16,
    payload: &Value,
    captured_at: DateTime<Utc>,
) -> Result<QuotePoint, UpstreamError> {
    let amount = |field: &str| {
        payload
            .get(field)
            .and_then(value_as_u64)
            .ok_or_else(|| UpstreamError::Malformed {
                context: "quote response",
                reason: format!("missing or invalid {}", field),
            })
    };

    let input_amount = amount("inAmount")?;
    let output_amount = amount("outAmount")?;

    Ok(QuotePoint {
        pair_key: pair_key(&input.symbol, &output.symbol),
        input_symbol: input.symbol.clone(),
        output_symbol: output.symbol.clone(),
        input_id: input.identifier.clone(),
        output_id: output.identifier.clone(),
        input_amount,
        output_amount,
        price_impact_pct: payload
            .get("priceImpactPct")
            .and_then(value_as_f64)
            .unwrap_or(0.0),
        slippage_bps,
        route_hop_count: payload
            .get("routePlan")
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
        captured_at,
    })
}

fn string_field(entry: &Value, field: &str) -> Option<String> {
    entry.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Upstream sends numbers either as JSON numbers or numeric strings
fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InstrumentRegistry;
    use serde_json::json;

    const SOL: &str = "So11111111111111111111111111111111111111112";
    const JUP: &str = "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN";
    const WIF: &str = "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm";

    fn ids() -> Vec<String> {
        vec![SOL.to_string(), JUP.to_string(), WIF.to_string()]
    }

    #[test]
    fn test_normalize_prices_marks_missing_and_malformed_distinctly() {
        let payload = json!({
            SOL: {
                "usdPrice": 151.25,
                "blockId": 348_000_000u64,
                "decimals": 9,
                "priceChange24h": -1.5,
                "confidence": "0.98"
            },
            JUP: { "decimals": 6 }
        });

        let prices = normalize_prices(&ids(), &payload, Utc::now()).unwrap();
        assert_eq!(prices.len(), 3);

        let sol = &prices[SOL];
        assert_eq!(sol.status, PriceStatus::Live);
        assert_eq!(sol.price_usd, 151.25);
        assert_eq!(sol.metadata.block_id, Some(348_000_000));
        assert_eq!(sol.metadata.decimals, Some(9));
        assert_eq!(sol.metadata.price_change_24h, Some(-1.5));
        assert_eq!(sol.metadata.confidence, Some(0.98));
        assert_eq!(sol.metadata.provider, None);

        assert_eq!(prices[JUP].status, PriceStatus::Malformed);
        assert_eq!(prices[JUP].price_usd, 0.0);
        assert_eq!(prices[WIF].status, PriceStatus::NoData);
        assert_eq!(prices[WIF].price_usd, 0.0);
    }

    #[test]
    fn test_normalize_prices_null_entry_is_no_data() {
        let payload = json!({ SOL: null });
        let prices = normalize_prices(&[SOL.to_string()], &payload, Utc::now()).unwrap();
        assert_eq!(prices[SOL].status, PriceStatus::NoData);
    }

    #[test]
    fn test_normalize_prices_rejects_negative_price() {
        let payload = json!({ SOL: { "usdPrice": -3.0 } });
        let prices = normalize_prices(&[SOL.to_string()], &payload, Utc::now()).unwrap();
        assert_eq!(prices[SOL].status, PriceStatus::Malformed);
    }

    #[test]
    fn test_normalize_prices_top_level_must_be_object() {
        let err = normalize_prices(&ids(), &json!([1, 2, 3]), Utc::now()).unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed { .. }));
    }

    #[test]
    fn test_normalize_quote() {
        let registry = InstrumentRegistry::default_solana().unwrap();
        let sol = registry.lookup("SOL").unwrap();
        let usdc = registry.lookup("USDC").unwrap();

        let payload = json!({
            "inAmount": "1000000000",
            "outAmount": "151230000",
            "priceImpactPct": "0.0012",
            "routePlan": [{ "percent": 100 }, { "percent": 100 }]
        });

        let quote = normalize_quote(sol, usdc, 50, &payload, Utc::now()).unwrap();
        assert_eq!(quote.pair_key, "SOL/USDC");
        assert_eq!(quote.input_amount, 1_000_000_000);
        assert_eq!(quote.output_amount, 151_230_000);
        assert_eq!(quote.route_hop_count, 2);
        assert_eq!(quote.slippage_bps, 50);
        assert!((quote.price_impact_pct - 0.0012).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_quote_requires_amounts() {
        let registry = InstrumentRegistry::default_solana().unwrap();
        let sol = registry.lookup("SOL").unwrap();
        let usdc = registry.lookup("USDC").unwrap();

        let payload = json!({ "inAmount": "1000000000", "routePlan": [] });
        let err = normalize_quote(sol, usdc, 50, &payload, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("outAmount"));
    }

    #[tokio::test]
    async fn test_client_without_key_is_inert() {
        let client = JupiterClient::new(Some("   ".to_string())).unwrap();
        assert!(!client.is_authenticated());
        assert_eq!(client.source_name(), "Jupiter");
        assert!(client.fetch_prices(&ids()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = JupiterClient::new(Some("key".to_string())).unwrap();
        client.close().await;
        client.close().await;
        let err = client.fetch_prices(&ids()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Closed));
    }

    #[tokio::test]
    #[ignore] // Requires network access and JUPITER_API_KEY
    async fn test_live_prices() {
        let client = JupiterClient::new(std::env::var("JUPITER_API_KEY").ok()).unwrap();
        let prices = client.fetch_prices(&ids()).await.unwrap();
        assert_eq!(prices.len(), 3);
    }
}
