pub mod jupiter;
pub mod market_data;

// Re-export commonly used types
pub use jupiter::JupiterClient;
pub use market_data::MarketDataSource;
