//! Shared harness for the engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use history_engine::api::*;
use history_engine::{
    AddActivityTaskRequest, AddDecisionTaskRequest, HistoryClient, HistoryConfig, HistoryEngine,
    HistoryError, ManualTimeSource, MatchingClient, RetryPolicy, ShardContext, ShardStores,
    TimeSource,
};
use history_metrics::MetricsClient;
use history_persistence::{
    CreateWorkflowExecutionRequest, CurrentExecution, ExecutionManager, InMemoryStore,
    PersistenceError, UpdateWorkflowExecutionRequest,
};
use history_types::{
    EventAttributes, ExecutionKey, HistoryEvent, ShardId, TimerTaskInfo, TransferTaskInfo,
    WorkflowExecution, WorkflowMutableState,
};
use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

pub const SHARD: ShardId = ShardId(1);
pub const DOMAIN: &str = "domain";

pub fn config() -> HistoryConfig {
    let mut config = HistoryConfig::default();
    config.transfer.poll_interval_ms = 50;
    config.timer.max_poll_interval_ms = 200;
    config.retry = RetryPolicy {
        max_attempts: 5,
        initial_backoff_ms: 5,
        max_backoff_ms: 20,
    };
    config
}

/// Execution manager that fails, stalls or races chosen calls before they
/// reach the store.
pub struct FlakyExecutionManager {
    inner: Arc<dyn ExecutionManager>,
    fail_updates: AtomicUsize,
    hold: Arc<RwLock<()>>,
    before_next_update: Mutex<Option<BoxFuture<'static, ()>>>,
    pub updates: AtomicUsize,
    pub conflicts: AtomicUsize,
    pub completed_timers: Mutex<Vec<(DateTime<Utc>, i64)>>,
}

impl FlakyExecutionManager {
    pub fn new(inner: Arc<dyn ExecutionManager>) -> Self {
        Self {
            inner,
            fail_updates: AtomicUsize::new(0),
            hold: Arc::new(RwLock::new(())),
            before_next_update: Mutex::new(None),
            updates: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
            completed_timers: Mutex::new(Vec::new()),
        }
    }

    /// Reject the next `n` execution updates as unavailable.
    pub fn fail_next_updates(&self, n: usize) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    /// Stall every execution update until the guard drops.
    pub async fn hold_updates(&self) -> OwnedRwLockWriteGuard<()> {
        self.hold.clone().write_owned().await
    }

    /// Run `write` against the store just before the next update lands.
    pub fn before_next_update(&self, write: BoxFuture<'static, ()>) {
        *self.before_next_update.lock() = Some(write);
    }
}

#[async_trait]
impl ExecutionManager for FlakyExecutionManager {
    fn shard_id(&self) -> ShardId {
        self.inner.shard_id()
    }

    async fn create_workflow_execution(
        &self,
        request: CreateWorkflowExecutionRequest,
    ) -> history_persistence::Result<()> {
        self.inner.create_workflow_execution(request).await
    }

    async fn get_workflow_execution(
        &self,
        key: &ExecutionKey,
    ) -> history_persistence::Result<WorkflowMutableState> {
        self.inner.get_workflow_execution(key).await
    }

    async fn get_current_execution(
        &self,
        domain_id: &str,
        workflow_id: &str,
    ) -> history_persistence::Result<CurrentExecution> {
        self.inner.get_current_execution(domain_id, workflow_id).await
    }

    async fn update_workflow_execution(
        &self,
        request: UpdateWorkflowExecutionRequest,
    ) -> history_persistence::Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let _pass = self.hold.read().await;
        let injected = self
            .fail_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PersistenceError::Unavailable("injected".into()));
        }
        let competing = self.before_next_update.lock().take();
        if let Some(write) = competing {
            write.await;
        }
        let result = self.inner.update_workflow_execution(request).await;
        if matches!(result, Err(PersistenceError::ConditionFailed(_))) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn delete_workflow_execution(
        &self,
        key: &ExecutionKey,
        range_id: i64,
    ) -> history_persistence::Result<()> {
        self.inner.delete_workflow_execution(key, range_id).await
    }

    async fn get_transfer_tasks(
        &self,
        read_level: i64,
        max_read_level: i64,
        batch_size: usize,
    ) -> history_persistence::Result<Vec<TransferTaskInfo>> {
        self.inner
            .get_transfer_tasks(read_level, max_read_level, batch_size)
            .await
    }

    async fn complete_transfer_task(
        &self,
        task_id: i64,
        range_id: i64,
    ) -> history_persistence::Result<()> {
        self.inner.complete_transfer_task(task_id, range_id).await
    }

    async fn get_timer_index_tasks(
        &self,
        min_timestamp: DateTime<Utc>,
        max_timestamp: DateTime<Utc>,
        batch_size: usize,
    ) -> history_persistence::Result<Vec<TimerTaskInfo>> {
        self.inner
            .get_timer_index_tasks(min_timestamp, max_timestamp, batch_size)
            .await
    }

    async fn complete_timer_task(
        &self,
        visibility_timestamp: DateTime<Utc>,
        task_id: i64,
        range_id: i64,
    ) -> history_persistence::Result<()> {
        self.inner
            .complete_timer_task(visibility_timestamp, task_id, range_id)
            .await?;
        self.completed_timers
            .lock()
            .push((visibility_timestamp, task_id));
        Ok(())
    }
}

/// Records every dispatched task.
#[derive(Default)]
pub struct RecordingMatching {
    pub decisions: Mutex<Vec<AddDecisionTaskRequest>>,
    pub activities: Mutex<Vec<AddActivityTaskRequest>>,
}

#[async_trait]
impl MatchingClient for RecordingMatching {
    async fn add_decision_task(&self, request: AddDecisionTaskRequest) -> history_engine::Result<()> {
        self.decisions.lock().push(request);
        Ok(())
    }

    async fn add_activity_task(&self, request: AddActivityTaskRequest) -> history_engine::Result<()> {
        self.activities.lock().push(request);
        Ok(())
    }
}

/// Routes workflow-to-workflow calls back into one engine.
#[derive(Default)]
pub struct Loopback {
    engine: OnceLock<Weak<HistoryEngine>>,
}

impl Loopback {
    pub fn bind(&self, engine: &Arc<HistoryEngine>) {
        let _ = self.engine.set(Arc::downgrade(engine));
    }

    fn engine(&self) -> history_engine::Result<Arc<HistoryEngine>> {
        self.engine
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| HistoryError::Dispatch("engine not running".into()))
    }
}

#[async_trait]
impl HistoryClient for Loopback {
    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> history_engine::Result<StartWorkflowExecutionResponse> {
        self.engine()?.start_workflow_execution(request).await
    }

    async fn schedule_decision_task(
        &self,
        request: ScheduleDecisionTaskRequest,
    ) -> history_engine::Result<()> {
        self.engine()?.schedule_decision_task(request).await
    }

    async fn request_cancel_workflow_execution(
        &self,
        request: RequestCancelWorkflowExecutionRequest,
    ) -> history_engine::Result<()> {
        self.engine()?.request_cancel_workflow_execution(request).await
    }

    async fn record_child_execution_completed(
        &self,
        request: RecordChildExecutionCompletedRequest,
    ) -> history_engine::Result<()> {
        self.engine()?.record_child_execution_completed(request).await
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub executions: Arc<FlakyExecutionManager>,
    pub clock: Arc<ManualTimeSource>,
    pub matching: Arc<RecordingMatching>,
    pub engine: Arc<HistoryEngine>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_store(InMemoryStore::new(), "host-a").await
    }

    pub async fn with_store(store: InMemoryStore, owner: &str) -> Self {
        Self::with_config(store, owner, config()).await
    }

    pub async fn with_config(store: InMemoryStore, owner: &str, config: HistoryConfig) -> Self {
        let clock = Arc::new(ManualTimeSource::new(Utc::now()));
        let executions = Arc::new(FlakyExecutionManager::new(Arc::new(
            store.execution_manager(SHARD),
        )));
        let shard = ShardContext::acquire(
            SHARD,
            owner,
            &config,
            ShardStores {
                shards: Arc::new(store.clone()),
                executions: executions.clone(),
                history: Arc::new(store.clone()),
            },
            MetricsClient::detached(),
            clock.clone() as Arc<dyn TimeSource>,
        )
        .await
        .unwrap();

        let matching = Arc::new(RecordingMatching::default());
        let loopback = Arc::new(Loopback::default());
        let engine = HistoryEngine::new(shard, &config, matching.clone(), loopback.clone());
        loopback.bind(&engine);

        Self {
            store,
            executions,
            clock,
            matching,
            engine,
        }
    }

    pub async fn start_workflow(&self, workflow_id: &str) -> WorkflowExecution {
        let response = self
            .engine
            .start_workflow_execution(start_request(workflow_id, &format!("start-{workflow_id}")))
            .await
            .unwrap();
        WorkflowExecution::new(workflow_id, response.run_id)
    }

    pub async fn start_decision(&self, execution: &WorkflowExecution, schedule_id: i64) -> i64 {
        self.engine
            .record_decision_task_started(RecordDecisionTaskStartedRequest {
                domain_id: DOMAIN.into(),
                execution: execution.clone(),
                schedule_id,
                request_id: format!("poll-{schedule_id}"),
                identity: "worker".into(),
            })
            .await
            .unwrap()
            .started_event_id
    }

    pub async fn history(&self, execution: &WorkflowExecution) -> Vec<HistoryEvent> {
        self.engine
            .get_workflow_execution_history(GetWorkflowExecutionHistoryRequest {
                domain_id: DOMAIN.into(),
                execution: execution.clone(),
                first_event_id: 1,
                next_event_id: None,
            })
            .await
            .unwrap()
    }

    pub fn key(&self, execution: &WorkflowExecution) -> ExecutionKey {
        ExecutionKey::from_execution(DOMAIN, execution)
    }
}

pub fn start_request(workflow_id: &str, request_id: &str) -> StartWorkflowExecutionRequest {
    StartWorkflowExecutionRequest {
        domain_id: DOMAIN.into(),
        workflow_id: workflow_id.into(),
        workflow_type: "order".into(),
        task_list: "orders".into(),
        input: Vec::new(),
        execution_start_to_close_timeout_secs: 3600,
        task_start_to_close_timeout_secs: 10,
        identity: "client".into(),
        request_id: request_id.into(),
        parent: None,
    }
}

pub fn event_types(events: &[HistoryEvent]) -> Vec<&'static str> {
    events.iter().map(HistoryEvent::event_type).collect()
}

pub fn count_events(events: &[HistoryEvent], matches: impl Fn(&EventAttributes) -> bool) -> usize {
    events.iter().filter(|e| matches(&e.attributes)).count()
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
