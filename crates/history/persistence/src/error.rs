use history_types::ShardId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PersistenceError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// The write carried a range id the shard row no longer holds.
    #[error("shard {shard_id} ownership lost: {msg}")]
    ShardOwnershipLost { shard_id: ShardId, msg: String },

    /// A conditional write lost to a concurrent writer.
    #[error("condition failed: {0}")]
    ConditionFailed(String),

    #[error("shard {0} already exists")]
    ShardAlreadyExists(ShardId),

    #[error("workflow execution already started: {msg}")]
    WorkflowExecutionAlreadyStarted {
        msg: String,
        start_request_id: String,
        run_id: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl PersistenceError {
    /// Failures that may succeed unchanged on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PersistenceError::Timeout(_) | PersistenceError::Unavailable(_)
        )
    }

    pub fn is_ownership_lost(&self) -> bool {
        matches!(self, PersistenceError::ShardOwnershipLost { .. })
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(PersistenceError::Timeout("t".into()).is_transient());
        assert!(PersistenceError::Unavailable("u".into()).is_transient());
        assert!(!PersistenceError::ConditionFailed("c".into()).is_transient());
        assert!(PersistenceError::ShardOwnershipLost {
            shard_id: ShardId(1),
            msg: "stolen".into(),
        }
        .is_ownership_lost());
    }
}
