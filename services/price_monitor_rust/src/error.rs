use crate::scheduler::SchedulerState;
use thiserror::Error;

/// Errors that cross the scheduler boundary.
///
/// Upstream and export failures never show up here; they are absorbed where
/// they happen.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Fault in the tick logic itself, fatal to the run
    #[error("orchestration failure during {stage}: {source}")]
    Orchestration {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("scheduler cannot start from state {0:?}")]
    InvalidState(SchedulerState),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn orchestration(stage: &'static str, source: std::io::Error) -> Self {
        Self::Orchestration { stage, source }
    }
}
