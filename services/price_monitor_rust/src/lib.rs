//! price_monitor_rust - Jupiter price and quote polling with bounded history and CSV export

pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod scheduler;

pub use config::MonitorConfig;
pub use display::Console;
pub use error::MonitorError;
pub use export::CsvWorkbookSink;
pub use scheduler::{PollScheduler, RunSummary, SchedulerSettings, SchedulerState, StopReason};
