//! Error types for elevation/imagery sources and the tile load scheduler.

use crate::scheduler::RequestId;

/// Errors reported by an elevation or imagery source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// The request cannot be served (empty grid, zero-sized texture, ...).
    #[error("invalid source request: {0}")]
    InvalidRequest(String),

    /// The source produced a buffer of the wrong size.
    #[error("source returned {actual} samples, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The data is temporarily or permanently unavailable.
    #[error("source data unavailable: {0}")]
    Unavailable(String),
}

/// Why a submitted fetch did not produce data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The source failed to produce samples or texels.
    #[error("fetch {request_id} failed: {source}")]
    Source {
        request_id: RequestId,
        #[source]
        source: SourceError,
    },

    /// The worker panicked while running the job. The worker itself survives.
    #[error("fetch {request_id} panicked on worker: {message}")]
    WorkerPanicked {
        request_id: RequestId,
        message: String,
    },
}

/// Errors returned synchronously by the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The in-flight limit is reached or every worker queue is full. Not a
    /// fetch failure: the caller simply tries again on a later frame.
    #[error("tile load scheduler saturated ({in_flight} in flight, limit {limit})")]
    Saturated { in_flight: usize, limit: usize },

    /// The workers are gone.
    #[error("tile load scheduler is shut down")]
    ShutDown,

    /// A worker thread could not be spawned.
    #[error("failed to spawn tile load worker: {0}")]
    Spawn(#[source] std::io::Error),
}
