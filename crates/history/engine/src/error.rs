//! Error types for the history engine

use history_persistence::PersistenceError;
use history_types::ShardId;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    /// Another node holds the shard now. Fatal to this shard.
    #[error("shard {shard_id} ownership lost: {msg}")]
    ShardOwnershipLost { shard_id: ShardId, msg: String },

    #[error("shard {0} is closed")]
    ShardClosed(ShardId),

    /// The execution moved on underneath a conditional write.
    #[error("concurrent update: {0}")]
    ConcurrentUpdate(String),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("entity not exists: {0}")]
    EntityNotExists(String),

    #[error("workflow execution already started: run {run_id}")]
    WorkflowExecutionAlreadyStarted {
        start_request_id: String,
        run_id: String,
    },

    #[error("event already started: {0}")]
    EventAlreadyStarted(String),

    #[error("cancellation already requested: {0}")]
    CancellationAlreadyRequested(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<HistoryError> },

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("persistence error: {0}")]
    Persistence(PersistenceError),
}

impl HistoryError {
    /// Worth another attempt with fresh state.
    pub fn is_retryable(&self) -> bool {
        match self {
            HistoryError::ConcurrentUpdate(_) | HistoryError::Dispatch(_) => true,
            HistoryError::Persistence(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Fatal to the shard.
    pub fn is_shard_fatal(&self) -> bool {
        matches!(
            self,
            HistoryError::ShardOwnershipLost { .. } | HistoryError::ShardClosed(_)
        )
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        HistoryError::InvalidStateTransition(msg.into())
    }

    pub fn not_exists(msg: impl Into<String>) -> Self {
        HistoryError::EntityNotExists(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        HistoryError::BadRequest(msg.into())
    }
}

impl From<PersistenceError> for HistoryError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::ShardOwnershipLost { shard_id, msg } => {
                HistoryError::ShardOwnershipLost { shard_id, msg }
            }
            PersistenceError::ConditionFailed(msg) => HistoryError::ConcurrentUpdate(msg),
            PersistenceError::NotFound(msg) => HistoryError::EntityNotExists(msg),
            PersistenceError::WorkflowExecutionAlreadyStarted {
                start_request_id,
                run_id,
                ..
            } => HistoryError::WorkflowExecutionAlreadyStarted {
                start_request_id,
                run_id,
            },
            other => HistoryError::Persistence(other),
        }
    }
}
