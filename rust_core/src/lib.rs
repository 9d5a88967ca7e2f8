//! Pricewatch Core - shared building blocks for the Jupiter price monitor.
//!
//! This crate provides:
//! - An explicitly constructed, read-only instrument registry
//! - Price/quote point models with placeholder markers for missing data
//! - Fixed-capacity bounded history per series key
//! - The upstream market data trait and its Jupiter implementation
//! - The export sink contract used at shutdown
//! - Display formatting helpers

pub mod clients;
pub mod error;
pub mod export;
pub mod history;
pub mod models;
pub mod registry;
pub mod utils;

pub use clients::{JupiterClient, MarketDataSource};
pub use error::{ExportError, HistoryError, RegistryError, UpstreamError};
pub use export::{ExportSink, NoopSink};
pub use history::{BoundedSeries, HistoryStore, SeriesSnapshot};
pub use models::{PriceMetadata, PricePoint, PriceStatus, QuotePair, QuotePoint};
pub use registry::{Instrument, InstrumentRegistry, VolumeCategory};
