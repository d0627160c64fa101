//! Error types for the inference pipeline

use crate::seq::SeqId;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by the pipeline to its caller
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration (pool size, selector)
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// `submit` was called before an output selector was set
    #[error("output selector is not set")]
    NotConfigured,

    /// Every worker slot is in use
    #[error("no idle worker available")]
    CapacityExhausted,

    /// First failure captured from a completion callback
    #[error("worker failure: {0}")]
    Worker(#[from] WorkerError),

    /// The same sequence id completed twice
    #[error("sequence id {0} completed twice")]
    DuplicateId(SeqId),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Pool must hold at least one worker
    #[error("max concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),

    /// Output selector is empty
    #[error("output selector must not be empty")]
    EmptySelector,

    /// Worker factory refused to build a slot
    #[error("failed to create worker {index}: {source}")]
    WorkerCreation {
        index: usize,
        #[source]
        source: WorkerError,
    },
}

/// Failures reported by a worker or raised while packaging its output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// The requested named output was not produced
    #[error("output `{0}` not found")]
    OutputMissing(String),

    /// The unit of work itself failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// The backend refused the unit (queue full or shut down)
    #[error("backend rejected submission")]
    Rejected,

    /// Reading the output panicked
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    /// Build an execution failure from anything printable.
    pub fn execution(msg: impl Into<String>) -> Self {
        WorkerError::Execution(msg.into())
    }
}
