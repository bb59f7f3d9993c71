//! Persistence manager traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use history_types::{
    ExecutionKey, HistoryEvent, ShardId, ShardInfo, TimerTaskInfo, TransferTaskInfo,
    WorkflowMutableState,
};

use crate::error::Result;
use crate::requests::{
    AppendHistoryEventsRequest, CreateWorkflowExecutionRequest, CurrentExecution,
    UpdateWorkflowExecutionRequest,
};

/// Shard rows.
#[async_trait]
pub trait ShardManager: Send + Sync {
    /// Insert a new shard row. Fails with `ShardAlreadyExists` if one is present.
    async fn create_shard(&self, info: ShardInfo) -> Result<()>;

    async fn get_shard(&self, shard_id: ShardId) -> Result<ShardInfo>;

    /// Replace the shard row if it still holds `previous_range_id`.
    async fn update_shard(&self, info: ShardInfo, previous_range_id: i64) -> Result<()>;
}

/// Executions and task queues of one shard.
#[async_trait]
pub trait ExecutionManager: Send + Sync {
    fn shard_id(&self) -> ShardId;

    async fn create_workflow_execution(&self, request: CreateWorkflowExecutionRequest)
        -> Result<()>;

    async fn get_workflow_execution(&self, key: &ExecutionKey) -> Result<WorkflowMutableState>;

    async fn get_current_execution(
        &self,
        domain_id: &str,
        workflow_id: &str,
    ) -> Result<CurrentExecution>;

    async fn update_workflow_execution(&self, request: UpdateWorkflowExecutionRequest)
        -> Result<()>;

    async fn delete_workflow_execution(&self, key: &ExecutionKey, range_id: i64) -> Result<()>;

    /// Transfer tasks with `read_level < task_id <= max_read_level`, ascending.
    async fn get_transfer_tasks(
        &self,
        read_level: i64,
        max_read_level: i64,
        batch_size: usize,
    ) -> Result<Vec<TransferTaskInfo>>;

    async fn complete_transfer_task(&self, task_id: i64, range_id: i64) -> Result<()>;

    /// Timer tasks with `min_timestamp <= visibility_timestamp <= max_timestamp`,
    /// ordered by (visibility timestamp, task id).
    async fn get_timer_index_tasks(
        &self,
        min_timestamp: DateTime<Utc>,
        max_timestamp: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<TimerTaskInfo>>;

    async fn complete_timer_task(
        &self,
        visibility_timestamp: DateTime<Utc>,
        task_id: i64,
        range_id: i64,
    ) -> Result<()>;
}

/// Append-only event log.
#[async_trait]
pub trait HistoryManager: Send + Sync {
    async fn append_history_events(&self, request: AppendHistoryEventsRequest) -> Result<()>;

    /// Events with `first_event_id <= event_id < next_event_id`, in order.
    async fn get_workflow_execution_history(
        &self,
        key: &ExecutionKey,
        first_event_id: i64,
        next_event_id: i64,
    ) -> Result<Vec<HistoryEvent>>;

    async fn delete_workflow_execution_history(&self, key: &ExecutionKey) -> Result<()>;
}
