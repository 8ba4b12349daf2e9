//! Error taxonomy for measurement runs
//!
//! Only [`RunError::Validation`] ever reaches a caller synchronously. Every
//! other variant is produced inside the worker and reported to viewers as a
//! terminal error event followed by the end-of-run sentinel. Timeouts of
//! auxiliary commands are [`ShellError`](crate::collectors::platform::shell::ShellError)s
//! and only ever degrade the query that hit them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    /// Bad start-run input, rejected before any state change
    #[error("{0}")]
    Validation(String),

    /// The measurement process could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the measurement process output failed
    #[error("failed to read measurement output: {0}")]
    StreamRead(#[source] std::io::Error),

    /// iperf3 itself reported a fatal condition
    #[error("{0}")]
    UpstreamFatal(String),
}

impl RunError {
    pub fn validation(message: impl Into<String>) -> Self {
        RunError::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, RunError::Validation(_))
    }
}
