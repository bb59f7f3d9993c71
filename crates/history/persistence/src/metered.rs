//! Metric-emitting wrappers around the persistence managers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use history_metrics::{Counter, MetricsClient, Scope, Timer};
use history_types::{
    ExecutionKey, HistoryEvent, ShardId, ShardInfo, TimerTaskInfo, TransferTaskInfo,
    WorkflowMutableState,
};

use crate::error::{PersistenceError, Result};
use crate::requests::{
    AppendHistoryEventsRequest, CreateWorkflowExecutionRequest, CurrentExecution,
    UpdateWorkflowExecutionRequest,
};
use crate::traits::{ExecutionManager, HistoryManager, ShardManager};

fn record<T>(metrics: &MetricsClient, scope: Scope, result: &Result<T>) {
    metrics.inc_counter(scope, Counter::PersistenceRequests);
    let Err(err) = result else {
        return;
    };

    let counter = match err {
        PersistenceError::ShardAlreadyExists(_) => Counter::PersistenceErrShardExists,
        PersistenceError::ShardOwnershipLost { .. } => Counter::PersistenceErrShardOwnershipLost,
        PersistenceError::ConditionFailed(_) => Counter::PersistenceErrConditionFailed,
        PersistenceError::Timeout(_) => Counter::PersistenceErrTimeout,
        // Expected outcomes the caller branches on, not failures.
        PersistenceError::NotFound(_) | PersistenceError::WorkflowExecutionAlreadyStarted { .. } => {
            return
        }
        PersistenceError::Unavailable(_) | PersistenceError::Serialization(_) => {
            Counter::PersistenceFailures
        }
    };
    metrics.inc_counter(scope, counter);
    if counter != Counter::PersistenceFailures {
        metrics.inc_counter(scope, Counter::PersistenceFailures);
    }
}

macro_rules! metered {
    ($self:ident, $scope:expr, $call:expr) => {{
        let _sw = $self.metrics.start_timer($scope, Timer::PersistenceLatency);
        let result = $call.await;
        record(&$self.metrics, $scope, &result);
        result
    }};
}

pub struct MeteredShardManager {
    inner: Arc<dyn ShardManager>,
    metrics: MetricsClient,
}

impl MeteredShardManager {
    pub fn new(inner: Arc<dyn ShardManager>, metrics: MetricsClient) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl ShardManager for MeteredShardManager {
    async fn create_shard(&self, info: ShardInfo) -> Result<()> {
        metered!(self, Scope::PersistenceCreateShard, self.inner.create_shard(info))
    }

    async fn get_shard(&self, shard_id: ShardId) -> Result<ShardInfo> {
        metered!(self, Scope::PersistenceGetShard, self.inner.get_shard(shard_id))
    }

    async fn update_shard(&self, info: ShardInfo, previous_range_id: i64) -> Result<()> {
        metered!(
            self,
            Scope::PersistenceUpdateShard,
            self.inner.update_shard(info, previous_range_id)
        )
    }
}

pub struct MeteredExecutionManager {
    inner: Arc<dyn ExecutionManager>,
    metrics: MetricsClient,
}

impl MeteredExecutionManager {
    pub fn new(inner: Arc<dyn ExecutionManager>, metrics: MetricsClient) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl ExecutionManager for MeteredExecutionManager {
    fn shard_id(&self) -> ShardId {
        self.inner.shard_id()
    }

    async fn create_workflow_execution(
        &self,
        request: CreateWorkflowExecutionRequest,
    ) -> Result<()> {
        metered!(
            self,
            Scope::PersistenceCreateWorkflowExecution,
            self.inner.create_workflow_execution(request)
        )
    }

    async fn get_workflow_execution(&self, key: &ExecutionKey) -> Result<WorkflowMutableState> {
        metered!(
            self,
            Scope::PersistenceGetWorkflowExecution,
            self.inner.get_workflow_execution(key)
        )
    }

    async fn get_current_execution(
        &self,
        domain_id: &str,
        workflow_id: &str,
    ) -> Result<CurrentExecution> {
        metered!(
            self,
            Scope::PersistenceGetCurrentExecution,
            self.inner.get_current_execution(domain_id, workflow_id)
        )
    }

    async fn update_workflow_execution(
        &self,
        request: UpdateWorkflowExecutionRequest,
    ) -> Result<()> {
        metered!(
            self,
            Scope::PersistenceUpdateWorkflowExecution,
            self.inner.update_workflow_execution(request)
        )
    }

    async fn delete_workflow_execution(&self, key: &ExecutionKey, range_id: i64) -> Result<()> {
        metered!(
            self,
            Scope::PersistenceDeleteWorkflowExecution,
            self.inner.delete_workflow_execution(key, range_id)
        )
    }

    async fn get_transfer_tasks(
        &self,
        read_level: i64,
        max_read_level: i64,
        batch_size: usize,
    ) -> Result<Vec<TransferTaskInfo>> {
        metered!(
            self,
            Scope::PersistenceGetTransferTasks,
            self.inner
                .get_transfer_tasks(read_level, max_read_level, batch_size)
        )
    }

    async fn complete_transfer_task(&self, task_id: i64, range_id: i64) -> Result<()> {
        metered!(
            self,
            Scope::PersistenceCompleteTransferTask,
            self.inner.complete_transfer_task(task_id, range_id)
        )
    }

    async fn get_timer_index_tasks(
        &self,
        min_timestamp: DateTime<Utc>,
        max_timestamp: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<TimerTaskInfo>> {
        metered!(
            self,
            Scope::PersistenceGetTimerIndexTasks,
            self.inner
                .get_timer_index_tasks(min_timestamp, max_timestamp, batch_size)
        )
    }

    async fn complete_timer_task(
        &self,
        visibility_timestamp: DateTime<Utc>,
        task_id: i64,
        range_id: i64,
    ) -> Result<()> {
        metered!(
            self,
            Scope::PersistenceCompleteTimerTask,
            self.inner
                .complete_timer_task(visibility_timestamp, task_id, range_id)
        )
    }
}

pub struct MeteredHistoryManager {
    inner: Arc<dyn HistoryManager>,
    metrics: MetricsClient,
}

impl MeteredHistoryManager {
    pub fn new(inner: Arc<dyn HistoryManager>, metrics: MetricsClient) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl HistoryManager for MeteredHistoryManager {
    async fn append_history_events(&self, request: AppendHistoryEventsRequest) -> Result<()> {
        metered!(
            self,
            Scope::PersistenceAppendHistoryEvents,
            self.inner.append_history_events(request)
        )
    }

    async fn get_workflow_execution_history(
        &self,
        key: &ExecutionKey,
        first_event_id: i64,
        next_event_id: i64,
    ) -> Result<Vec<HistoryEvent>> {
        metered!(
            self,
            Scope::PersistenceGetWorkflowExecutionHistory,
            self.inner
                .get_workflow_execution_history(key, first_event_id, next_event_id)
        )
    }

    async fn delete_workflow_execution_history(&self, key: &ExecutionKey) -> Result<()> {
        metered!(
            self,
            Scope::PersistenceDeleteWorkflowExecutionHistory,
            self.inner.delete_workflow_execution_history(key)
        )
    }
}
