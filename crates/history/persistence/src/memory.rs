//! In-memory store
//!
//! Reference driver used by tests and the development daemon. All state sits
//! behind one lock so every conditional check and the write it guards happen
//! atomically, which is the guarantee a real driver gets from lightweight
//! transactions.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use history_types::{
    ExecutionKey, HistoryEvent, ShardId, ShardInfo, TimerSequenceId, TimerTaskInfo,
    TransferTaskInfo, WorkflowMutableState, WorkflowState,
};
use parking_lot::Mutex;

use crate::error::{PersistenceError, Result};
use crate::requests::{
    AppendHistoryEventsRequest, CreateWorkflowExecutionRequest, CurrentExecution,
    UpdateWorkflowExecutionRequest,
};
use crate::traits::{ExecutionManager, HistoryManager, ShardManager};

#[derive(Default)]
struct ShardPartition {
    executions: HashMap<ExecutionKey, WorkflowMutableState>,
    current: HashMap<(String, String), CurrentExecution>,
    transfer_tasks: BTreeMap<i64, TransferTaskInfo>,
    timer_tasks: BTreeMap<TimerSequenceId, TimerTaskInfo>,
}

struct HistoryBatch {
    range_id: i64,
    transaction_id: i64,
    /// Serialized `Vec<HistoryEvent>`.
    blob: Vec<u8>,
}

#[derive(Default)]
struct StoreState {
    shards: HashMap<ShardId, ShardInfo>,
    partitions: HashMap<ShardId, ShardPartition>,
    history: HashMap<ExecutionKey, BTreeMap<i64, HistoryBatch>>,
}

impl StoreState {
    fn check_range(&self, shard_id: ShardId, range_id: i64) -> Result<()> {
        match self.shards.get(&shard_id) {
            Some(info) if info.range_id == range_id => Ok(()),
            Some(info) => Err(PersistenceError::ShardOwnershipLost {
                shard_id,
                msg: format!(
                    "write carried range id {} but shard holds {}",
                    range_id, info.range_id
                ),
            }),
            None => Err(PersistenceError::ShardOwnershipLost {
                shard_id,
                msg: "shard row missing".to_string(),
            }),
        }
    }
}

/// In-memory implementation of every persistence manager.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execution manager scoped to one shard.
    pub fn execution_manager(&self, shard_id: ShardId) -> InMemoryExecutionManager {
        InMemoryExecutionManager {
            shard_id,
            state: self.state.clone(),
        }
    }

    /// Pending transfer tasks of a shard, ascending.
    pub fn transfer_tasks(&self, shard_id: ShardId) -> Vec<TransferTaskInfo> {
        let state = self.state.lock();
        state
            .partitions
            .get(&shard_id)
            .map(|p| p.transfer_tasks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Pending timer tasks of a shard, in fire order.
    pub fn timer_tasks(&self, shard_id: ShardId) -> Vec<TimerTaskInfo> {
        let state = self.state.lock();
        state
            .partitions
            .get(&shard_id)
            .map(|p| p.timer_tasks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stored history batches for an execution.
    pub fn history_batch_count(&self, key: &ExecutionKey) -> usize {
        let state = self.state.lock();
        state.history.get(key).map(|b| b.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryStore")
            .field("shards", &state.shards.len())
            .field("histories", &state.history.len())
            .finish()
    }
}

#[async_trait]
impl ShardManager for InMemoryStore {
    async fn create_shard(&self, info: ShardInfo) -> Result<()> {
        let mut state = self.state.lock();
        if state.shards.contains_key(&info.shard_id) {
            return Err(PersistenceError::ShardAlreadyExists(info.shard_id));
        }
        state.partitions.entry(info.shard_id).or_default();
        state.shards.insert(info.shard_id, info);
        Ok(())
    }

    async fn get_shard(&self, shard_id: ShardId) -> Result<ShardInfo> {
        let state = self.state.lock();
        state
            .shards
            .get(&shard_id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(format!("shard {}", shard_id)))
    }

    async fn update_shard(&self, info: ShardInfo, previous_range_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.check_range(info.shard_id, previous_range_id)?;
        state.shards.insert(info.shard_id, info);
        Ok(())
    }
}

#[async_trait]
impl HistoryManager for InMemoryStore {
    async fn append_history_events(&self, request: AppendHistoryEventsRequest) -> Result<()> {
        let blob = serde_json::to_vec(&request.events)?;

        let mut state = self.state.lock();
        let batches = state.history.entry(request.execution.clone()).or_default();

        if let Some(existing) = batches.get(&request.first_event_id) {
            if existing.range_id > request.range_id
                || existing.transaction_id >= request.transaction_id
            {
                return Err(PersistenceError::ConditionFailed(format!(
                    "history batch {} of {} already written by transaction {}",
                    request.first_event_id, request.execution, existing.transaction_id
                )));
            }
            tracing::debug!(
                execution = %request.execution,
                first_event_id = request.first_event_id,
                orphan_transaction_id = existing.transaction_id,
                transaction_id = request.transaction_id,
                "Overwriting orphaned history batch"
            );
        }

        batches.insert(
            request.first_event_id,
            HistoryBatch {
                range_id: request.range_id,
                transaction_id: request.transaction_id,
                blob,
            },
        );
        Ok(())
    }

    async fn get_workflow_execution_history(
        &self,
        key: &ExecutionKey,
        first_event_id: i64,
        next_event_id: i64,
    ) -> Result<Vec<HistoryEvent>> {
        let state = self.state.lock();
        let batches = state
            .history
            .get(key)
            .ok_or_else(|| PersistenceError::NotFound(format!("history of {}", key)))?;

        let mut events = Vec::new();
        for batch in batches.range(..next_event_id).map(|(_, b)| b) {
            let decoded: Vec<HistoryEvent> = serde_json::from_slice(&batch.blob)?;
            events.extend(
                decoded
                    .into_iter()
                    .filter(|e| e.event_id >= first_event_id && e.event_id < next_event_id),
            );
        }
        Ok(events)
    }

    async fn delete_workflow_execution_history(&self, key: &ExecutionKey) -> Result<()> {
        let mut state = self.state.lock();
        state.history.remove(key);
        Ok(())
    }
}

/// Execution manager over one shard's partition of an [`InMemoryStore`].
#[derive(Clone)]
pub struct InMemoryExecutionManager {
    shard_id: ShardId,
    state: Arc<Mutex<StoreState>>,
}

#[async_trait]
impl ExecutionManager for InMemoryExecutionManager {
    fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    async fn create_workflow_execution(
        &self,
        request: CreateWorkflowExecutionRequest,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.check_range(self.shard_id, request.range_id)?;
        let partition = state.partitions.entry(self.shard_id).or_default();

        let info = &request.state.execution_info;
        let current_key = (info.domain_id.clone(), info.workflow_id.clone());
        if let Some(current) = partition.current.get(&current_key) {
            if current.state != WorkflowState::Completed {
                return Err(PersistenceError::WorkflowExecutionAlreadyStarted {
                    msg: format!(
                        "workflow {} is running as run {}",
                        info.workflow_id, current.run_id
                    ),
                    start_request_id: current.start_request_id.clone(),
                    run_id: current.run_id.clone(),
                });
            }
        }

        let key = info.key();
        if partition.executions.contains_key(&key) {
            return Err(PersistenceError::ConditionFailed(format!(
                "execution {} already exists",
                key
            )));
        }

        partition.current.insert(
            current_key,
            CurrentExecution {
                run_id: info.run_id.clone(),
                start_request_id: request.request_id.clone(),
                state: info.state,
                close_status: info.close_status,
            },
        );
        for task in request.transfer_tasks {
            partition.transfer_tasks.insert(task.task_id, task);
        }
        for task in request.timer_tasks {
            partition.timer_tasks.insert(task.sequence_id(), task);
        }
        partition.executions.insert(key, request.state);
        Ok(())
    }

    async fn get_workflow_execution(&self, key: &ExecutionKey) -> Result<WorkflowMutableState> {
        let state = self.state.lock();
        state
            .partitions
            .get(&self.shard_id)
            .and_then(|p| p.executions.get(key))
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(format!("execution {}", key)))
    }

    async fn get_current_execution(
        &self,
        domain_id: &str,
        workflow_id: &str,
    ) -> Result<CurrentExecution> {
        let state = self.state.lock();
        state
            .partitions
            .get(&self.shard_id)
            .and_then(|p| {
                p.current
                    .get(&(domain_id.to_string(), workflow_id.to_string()))
            })
            .cloned()
            .ok_or_else(|| {
                PersistenceError::NotFound(format!("current run of {}/{}", domain_id, workflow_id))
            })
    }

    async fn update_workflow_execution(
        &self,
        request: UpdateWorkflowExecutionRequest,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.check_range(self.shard_id, request.range_id)?;

        let key = request.execution();
        let partition = state
            .partitions
            .get_mut(&self.shard_id)
            .ok_or_else(|| PersistenceError::NotFound(format!("execution {}", key)))?;
        let stored = partition
            .executions
            .get_mut(&key)
            .ok_or_else(|| PersistenceError::NotFound(format!("execution {}", key)))?;

        if stored.execution_info.next_event_id != request.condition {
            return Err(PersistenceError::ConditionFailed(format!(
                "execution {} has next event id {}, update expected {}",
                key, stored.execution_info.next_event_id, request.condition
            )));
        }

        for info in request.upsert_activity_infos {
            stored.activity_infos.insert(info.schedule_id, info);
        }
        for schedule_id in &request.delete_activity_infos {
            stored.activity_infos.remove(schedule_id);
        }
        for info in request.upsert_timer_infos {
            stored.timer_infos.insert(info.timer_id.clone(), info);
        }
        for timer_id in &request.delete_timer_infos {
            stored.timer_infos.remove(timer_id);
        }
        for info in request.upsert_child_execution_infos {
            stored.child_execution_infos.insert(info.initiated_id, info);
        }
        for initiated_id in &request.delete_child_execution_infos {
            stored.child_execution_infos.remove(initiated_id);
        }
        for info in request.upsert_request_cancel_infos {
            stored.request_cancel_infos.insert(info.initiated_id, info);
        }
        for initiated_id in &request.delete_request_cancel_infos {
            stored.request_cancel_infos.remove(initiated_id);
        }

        let current_key = (
            request.execution_info.domain_id.clone(),
            request.execution_info.workflow_id.clone(),
        );
        if let Some(current) = partition.current.get_mut(&current_key) {
            if current.run_id == request.execution_info.run_id {
                current.state = request.execution_info.state;
                current.close_status = request.execution_info.close_status;
            }
        }
        stored.execution_info = request.execution_info;

        for task in request.transfer_tasks {
            partition.transfer_tasks.insert(task.task_id, task);
        }
        for task in request.timer_tasks {
            partition.timer_tasks.insert(task.sequence_id(), task);
        }
        Ok(())
    }

    async fn delete_workflow_execution(&self, key: &ExecutionKey, range_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.check_range(self.shard_id, range_id)?;
        if let Some(partition) = state.partitions.get_mut(&self.shard_id) {
            partition.executions.remove(key);
            let current_key = (key.domain_id.clone(), key.workflow_id.clone());
            if partition
                .current
                .get(&current_key)
                .is_some_and(|c| c.run_id == key.run_id)
            {
                partition.current.remove(&current_key);
            }
        }
        Ok(())
    }

    async fn get_transfer_tasks(
        &self,
        read_level: i64,
        max_read_level: i64,
        batch_size: usize,
    ) -> Result<Vec<TransferTaskInfo>> {
        if read_level >= max_read_level {
            return Ok(Vec::new());
        }
        let state = self.state.lock();
        let Some(partition) = state.partitions.get(&self.shard_id) else {
            return Ok(Vec::new());
        };
        Ok(partition
            .transfer_tasks
            .range((Bound::Excluded(read_level), Bound::Included(max_read_level)))
            .take(batch_size)
            .map(|(_, task)| task.clone())
            .collect())
    }

    async fn complete_transfer_task(&self, task_id: i64, range_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.check_range(self.shard_id, range_id)?;
        if let Some(partition) = state.partitions.get_mut(&self.shard_id) {
            partition.transfer_tasks.remove(&task_id);
        }
        Ok(())
    }

    async fn get_timer_index_tasks(
        &self,
        min_timestamp: DateTime<Utc>,
        max_timestamp: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<TimerTaskInfo>> {
        if min_timestamp > max_timestamp {
            return Ok(Vec::new());
        }
        let state = self.state.lock();
        let Some(partition) = state.partitions.get(&self.shard_id) else {
            return Ok(Vec::new());
        };
        let lower = TimerSequenceId::new(min_timestamp, i64::MIN);
        let upper = TimerSequenceId::new(max_timestamp, i64::MAX);
        Ok(partition
            .timer_tasks
            .range(lower..=upper)
            .take(batch_size)
            .map(|(_, task)| task.clone())
            .collect())
    }

    async fn complete_timer_task(
        &self,
        visibility_timestamp: DateTime<Utc>,
        task_id: i64,
        range_id: i64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.check_range(self.shard_id, range_id)?;
        if let Some(partition) = state.partitions.get_mut(&self.shard_id) {
            partition
                .timer_tasks
                .remove(&TimerSequenceId::new(visibility_timestamp, task_id));
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryExecutionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryExecutionManager")
            .field("shard_id", &self.shard_id)
            .finish()
    }
}
