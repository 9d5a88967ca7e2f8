//! Console summaries.
//!
//! Rendering is a projection of the batch that was just fetched. It takes the
//! batch and the registry, never the history stores, so console output is the
//! same whether or not anything gets exported.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pricewatch_rust_core::models::{PricePoint, QuotePoint};
use pricewatch_rust_core::registry::InstrumentRegistry;
use pricewatch_rust_core::utils::format::{format_change, humanize_price};
use std::io::{self, Write};

const RULE_WIDTH: usize = 80;

/// Line-oriented console writer shared by the scheduler
pub struct Console {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Console {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn iteration_banner(&self, iteration: u64, at: DateTime<Utc>) -> io::Result<()> {
        let mut out = self.out.lock();
        writeln!(out)?;
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(out, "Iteration {} - {}", iteration, at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(out, "{}", "=".repeat(60))?;
        out.flush()
    }

    /// Price table for one batch, `(symbol, point)` sorted by symbol
    pub fn render_prices(
        &self,
        batch: &[(String, PricePoint)],
        at: DateTime<Utc>,
    ) -> io::Result<()> {
        let mut out = self.out.lock();
        write_header(&mut *out, "JUPITER PRICE UPDATE", at)?;

        if batch.is_empty() {
            writeln!(out, "  No prices this iteration")?;
        }
        for (symbol, point) in batch {
            let change = point.metadata.price_change_24h.unwrap_or(0.0);
            let confidence = point.metadata.confidence.unwrap_or(0.0);
            let price = if point.is_placeholder() {
                format!("n/a ({})", point.status.as_str())
            } else {
                humanize_price(point.price_usd)
            };

            writeln!(
                out,
                "  {:8} | {:20} | 24h: {:15} | Conf: {:.2}",
                symbol,
                price,
                format_change(change),
                confidence
            )?;
        }

        writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
        out.flush()
    }

    /// Quote table for one batch, in fetch order
    pub fn render_quotes(
        &self,
        registry: &InstrumentRegistry,
        quotes: &[QuotePoint],
        at: DateTime<Utc>,
    ) -> io::Result<()> {
        let mut out = self.out.lock();
        write_header(&mut *out, "JUPITER QUOTE UPDATE", at)?;

        if quotes.is_empty() {
            writeln!(out, "  No quotes this iteration")?;
        }
        for quote in quotes {
            let (Some(input), Some(output)) = (
                registry.lookup(&quote.input_symbol),
                registry.lookup(&quote.output_symbol),
            ) else {
                continue;
            };

            let route = if quote.is_direct_route() {
                "Direct".to_string()
            } else {
                format!("{} hops", quote.route_hop_count)
            };

            writeln!(
                out,
                "  {:12} | 1 {} = {:.6} {}",
                quote.pair_key,
                input.symbol,
                quote.effective_price(input.decimals, output.decimals),
                output.symbol
            )?;
            writeln!(
                out,
                "{:20}| Impact: {:.3}% | Slippage: {:.2}% | Route: {}",
                "",
                quote.price_impact_pct,
                f64::from(quote.slippage_bps) / 100.0,
                route
            )?;
            writeln!(out, "{:20}{}", "", "-".repeat(50))?;
        }

        writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
        out.flush()
    }
}

fn write_header(out: &mut dyn Write, title: &str, at: DateTime<Utc>) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out, "{} - {}", title, at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))
}
