//! Shard context
//!
//! One [`ShardContext`] exists per owned shard. It holds the lease (the
//! `range_id` fencing token), hands out task ids from the range the lease
//! covers, persists queue ack levels, and funnels every execution write so
//! that each one carries the range id the shard currently holds.
//!
//! The first write the store rejects for a stale range id closes the shard:
//! dependents observe [`ShardContext::closed_signal`] and stop.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use history_metrics::{Counter, MetricsClient, Scope};
use history_persistence::{
    AppendHistoryEventsRequest, CreateWorkflowExecutionRequest, ExecutionManager, HistoryManager,
    PersistenceError, ShardManager, UpdateWorkflowExecutionRequest,
};
use history_types::{
    ExecutionKey, HistoryEvent, NewTimerTask, ShardId, ShardInfo, TimerInfo, TimerTaskInfo,
    TimerTaskKind, TransferTaskInfo, TransferTaskKind, WorkflowMutableState,
};
use tokio::sync::{watch, Mutex, Notify};
use tracing::{error, info, warn};

use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};
use crate::time::TimeSource;
use crate::timer_gate::TimerGate;

/// Persistence managers a shard writes through.
#[derive(Clone)]
pub struct ShardStores {
    pub shards: Arc<dyn ShardManager>,
    pub executions: Arc<dyn ExecutionManager>,
    pub history: Arc<dyn HistoryManager>,
}

struct ShardState {
    info: ShardInfo,
    next_task_id: i64,
    /// Exclusive upper bound of the current range.
    max_task_id: i64,
    /// Highest timestamp the timer queue has listed up to.
    timer_max_read_level: DateTime<Utc>,
}

pub struct ShardContext {
    shard_id: ShardId,
    owner: String,
    range_size_bits: u32,
    stores: ShardStores,
    metrics: MetricsClient,
    time_source: Arc<dyn TimeSource>,
    range_id: AtomicI64,
    state: Mutex<ShardState>,
    transfer_max_read_level: AtomicI64,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    transfer_notify: Notify,
    timer_gate: TimerGate,
}

impl ShardContext {
    /// Take ownership of `shard_id`, creating the shard row if needed.
    pub async fn acquire(
        shard_id: ShardId,
        owner: impl Into<String>,
        config: &HistoryConfig,
        stores: ShardStores,
        metrics: MetricsClient,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Arc<Self>> {
        let owner = owner.into();

        let mut info = match stores.shards.get_shard(shard_id).await {
            Ok(info) => info,
            Err(PersistenceError::NotFound(_)) => {
                let info = ShardInfo::new(shard_id, owner.clone());
                match stores.shards.create_shard(info.clone()).await {
                    Ok(()) => info,
                    Err(PersistenceError::ShardAlreadyExists(_)) => {
                        stores.shards.get_shard(shard_id).await?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };

        let previous_range_id = info.range_id;
        if info.owner != owner {
            info!(
                shard_id = %shard_id,
                previous_owner = %info.owner,
                owner = %owner,
                "Taking over shard"
            );
            info.stolen_since_renew += 1;
            info.owner = owner.clone();
        }
        info.range_id += 1;
        info.updated_at = time_source.now();
        stores
            .shards
            .update_shard(info.clone(), previous_range_id)
            .await?;

        let bits = config.shard.range_size_bits;
        let range_id = info.range_id;
        let next_task_id = range_id << bits;
        let (closed_tx, _) = watch::channel(false);

        info!(
            shard_id = %shard_id,
            owner = %owner,
            range_id,
            transfer_ack_level = info.transfer_ack_level,
            timer_ack_level = %info.timer_ack_level,
            "Shard acquired"
        );

        Ok(Arc::new(Self {
            shard_id,
            owner,
            range_size_bits: bits,
            stores,
            metrics,
            time_source,
            range_id: AtomicI64::new(range_id),
            state: Mutex::new(ShardState {
                timer_max_read_level: info.timer_ack_level,
                info,
                next_task_id,
                max_task_id: (range_id + 1) << bits,
            }),
            transfer_max_read_level: AtomicI64::new(next_task_id - 1),
            closed: AtomicBool::new(false),
            closed_tx,
            transfer_notify: Notify::new(),
            timer_gate: TimerGate::new(),
        }))
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn current_range_id(&self) -> i64 {
        self.range_id.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> &MetricsClient {
        &self.metrics
    }

    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.time_source
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.time_source.now()
    }

    pub fn execution_manager(&self) -> &Arc<dyn ExecutionManager> {
        &self.stores.executions
    }

    pub fn history_manager(&self) -> &Arc<dyn HistoryManager> {
        &self.stores.history
    }

    pub async fn shard_info(&self) -> ShardInfo {
        self.state.lock().await.info.clone()
    }

    // Task ids

    pub async fn generate_transfer_task_id(&self) -> Result<i64> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        self.allocate_task_id(&mut state).await
    }

    /// Timer tasks draw from the same sequence; the timestamp only orders them.
    pub async fn generate_timer_task_id(&self, _visibility_timestamp: DateTime<Utc>) -> Result<i64> {
        self.generate_transfer_task_id().await
    }

    /// Highest transfer task id whose write has finished.
    pub fn transfer_max_read_level(&self) -> i64 {
        self.transfer_max_read_level.load(Ordering::SeqCst)
    }

    async fn allocate_task_id(&self, state: &mut ShardState) -> Result<i64> {
        if state.next_task_id >= state.max_task_id {
            self.renew_range(state).await?;
        }
        let id = state.next_task_id;
        state.next_task_id += 1;
        Ok(id)
    }

    async fn renew_range(&self, state: &mut ShardState) -> Result<()> {
        let previous_range_id = state.info.range_id;
        let mut updated = state.info.clone();
        updated.range_id += 1;
        updated.updated_at = self.now();

        let result = self
            .stores
            .shards
            .update_shard(updated.clone(), previous_range_id)
            .await;
        self.fence(result)?;

        let range_id = updated.range_id;
        state.info = updated;
        state.next_task_id = range_id << self.range_size_bits;
        state.max_task_id = (range_id + 1) << self.range_size_bits;
        self.range_id.store(range_id, Ordering::SeqCst);

        info!(shard_id = %self.shard_id, range_id, "Renewed shard range");
        Ok(())
    }

    /// Raise the timer read level to the current time and return it.
    ///
    /// Taken under the same lock every execution write holds, so a timer
    /// either commits before the queue lists or lands above the level.
    pub async fn update_timer_max_read_level(&self) -> DateTime<Utc> {
        let mut state = self.state.lock().await;
        let now = self.now();
        if now > state.timer_max_read_level {
            state.timer_max_read_level = now;
        }
        state.timer_max_read_level
    }

    pub async fn timer_max_read_level(&self) -> DateTime<Utc> {
        self.state.lock().await.timer_max_read_level
    }

    // Ack levels

    pub async fn transfer_ack_level(&self) -> i64 {
        self.state.lock().await.info.transfer_ack_level
    }

    pub async fn timer_ack_level(&self) -> DateTime<Utc> {
        self.state.lock().await.info.timer_ack_level
    }

    pub async fn update_transfer_ack_level(&self, level: i64) -> Result<()> {
        self.update_shard_info(|info| info.transfer_ack_level = level)
            .await
    }

    pub async fn update_timer_ack_level(&self, level: DateTime<Utc>) -> Result<()> {
        self.update_shard_info(|info| info.timer_ack_level = level)
            .await
    }

    async fn update_shard_info(&self, apply: impl FnOnce(&mut ShardInfo)) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let mut updated = state.info.clone();
        apply(&mut updated);
        updated.updated_at = self.now();

        let result = self
            .stores
            .shards
            .update_shard(updated.clone(), state.info.range_id)
            .await;
        self.fence(result)?;
        state.info = updated;
        Ok(())
    }

    // Execution writes

    /// Persist a brand new execution with its first tasks.
    ///
    /// Returns the timer tasks as written, ids assigned.
    pub async fn create_workflow_execution(
        &self,
        request_id: String,
        mut mutable_state: WorkflowMutableState,
        transfer_tasks: Vec<TransferTaskKind>,
        timer_tasks: Vec<NewTimerTask>,
    ) -> Result<Vec<TimerTaskInfo>> {
        self.ensure_open()?;
        let key = mutable_state.execution_info.key();

        let mut state = self.state.lock().await;
        let (transfer_tasks, timer_tasks) = self
            .assign_task_ids(&mut state, &key, transfer_tasks, timer_tasks)
            .await?;
        link_user_timers(mutable_state.timer_infos.values_mut(), &timer_tasks);

        let last_transfer_id = transfer_tasks.last().map(|t| t.task_id);
        let request = CreateWorkflowExecutionRequest {
            request_id,
            range_id: state.info.range_id,
            state: mutable_state,
            transfer_tasks,
            timer_tasks: timer_tasks.clone(),
        };
        let result = self
            .stores
            .executions
            .create_workflow_execution(request)
            .await;
        self.advance_transfer_max_read_level(last_transfer_id);
        drop(state);

        self.fence(result)?;
        self.notify_new_tasks(last_transfer_id.is_some(), &timer_tasks);
        Ok(timer_tasks)
    }

    /// Persist an execution update and its new tasks as one conditional write.
    ///
    /// The request's range id is replaced with the one the shard holds.
    /// Returns the timer tasks as written, ids assigned.
    pub async fn update_workflow_execution(
        &self,
        mut request: UpdateWorkflowExecutionRequest,
        transfer_tasks: Vec<TransferTaskKind>,
        timer_tasks: Vec<NewTimerTask>,
    ) -> Result<Vec<TimerTaskInfo>> {
        self.ensure_open()?;
        let key = request.execution();

        let mut state = self.state.lock().await;
        let (transfer_tasks, timer_tasks) = self
            .assign_task_ids(&mut state, &key, transfer_tasks, timer_tasks)
            .await?;
        link_user_timers(request.upsert_timer_infos.iter_mut(), &timer_tasks);

        let last_transfer_id = transfer_tasks.last().map(|t| t.task_id);
        request.range_id = state.info.range_id;
        request.transfer_tasks = transfer_tasks;
        request.timer_tasks = timer_tasks.clone();

        let result = self
            .stores
            .executions
            .update_workflow_execution(request)
            .await;
        self.advance_transfer_max_read_level(last_transfer_id);
        drop(state);

        self.fence(result)?;
        self.notify_new_tasks(last_transfer_id.is_some(), &timer_tasks);
        Ok(timer_tasks)
    }

    /// Append one history batch. The transaction id comes from the task sequence
    /// so a retried batch always supersedes its orphaned predecessor.
    pub async fn append_history_events(
        &self,
        execution: &ExecutionKey,
        first_event_id: i64,
        events: Vec<HistoryEvent>,
    ) -> Result<()> {
        self.ensure_open()?;
        let (range_id, transaction_id) = {
            let mut state = self.state.lock().await;
            let transaction_id = self.allocate_task_id(&mut state).await?;
            (state.info.range_id, transaction_id)
        };

        let result = self
            .stores
            .history
            .append_history_events(AppendHistoryEventsRequest {
                execution: execution.clone(),
                first_event_id,
                range_id,
                transaction_id,
                events,
            })
            .await;
        self.fence(result)
    }

    /// Remove the execution rows and its history.
    pub async fn delete_workflow_execution(&self, execution: &ExecutionKey) -> Result<()> {
        self.ensure_open()?;
        let result = self
            .stores
            .executions
            .delete_workflow_execution(execution, self.current_range_id())
            .await;
        self.fence(result)?;
        let result = self
            .stores
            .history
            .delete_workflow_execution_history(execution)
            .await;
        self.fence(result)
    }

    pub async fn complete_transfer_task(&self, task_id: i64) -> Result<()> {
        self.ensure_open()?;
        let result = self
            .stores
            .executions
            .complete_transfer_task(task_id, self.current_range_id())
            .await;
        self.fence(result)
    }

    pub async fn complete_timer_task(
        &self,
        visibility_timestamp: DateTime<Utc>,
        task_id: i64,
    ) -> Result<()> {
        self.ensure_open()?;
        let result = self
            .stores
            .executions
            .complete_timer_task(visibility_timestamp, task_id, self.current_range_id())
            .await;
        self.fence(result)
    }

    async fn assign_task_ids(
        &self,
        state: &mut ShardState,
        execution: &ExecutionKey,
        transfer_tasks: Vec<TransferTaskKind>,
        timer_tasks: Vec<NewTimerTask>,
    ) -> Result<(Vec<TransferTaskInfo>, Vec<TimerTaskInfo>)> {
        let mut transfer = Vec::with_capacity(transfer_tasks.len());
        for kind in transfer_tasks {
            transfer.push(TransferTaskInfo {
                execution: execution.clone(),
                task_id: self.allocate_task_id(state).await?,
                kind,
            });
        }

        // The queue has already listed up to the read level; anything at or
        // below it would be skipped forever.
        let read_level = state.timer_max_read_level;
        let mut timers = Vec::with_capacity(timer_tasks.len());
        for task in timer_tasks {
            let visibility_timestamp = if task.visibility_timestamp <= read_level {
                read_level + ChronoDuration::milliseconds(1)
            } else {
                task.visibility_timestamp
            };
            timers.push(TimerTaskInfo {
                execution: execution.clone(),
                visibility_timestamp,
                task_id: self.allocate_task_id(state).await?,
                kind: task.kind,
            });
        }
        Ok((transfer, timers))
    }

    fn advance_transfer_max_read_level(&self, last_task_id: Option<i64>) {
        if let Some(id) = last_task_id {
            self.transfer_max_read_level.fetch_max(id, Ordering::SeqCst);
        }
    }

    // Notifications

    /// Woken whenever new transfer tasks are committed.
    pub fn transfer_notifier(&self) -> &Notify {
        &self.transfer_notify
    }

    /// Wake-up gate of the timer queue.
    pub fn timer_gate(&self) -> &TimerGate {
        &self.timer_gate
    }

    /// Pull the timer queue's wake-up forward to the earliest of `timers`.
    pub fn notify_new_timers(&self, timers: &[TimerTaskInfo]) {
        if let Some(earliest) = timers.iter().map(|t| t.visibility_timestamp).min() {
            self.timer_gate.update(earliest);
        }
    }

    fn notify_new_tasks(&self, has_transfer: bool, timers: &[TimerTaskInfo]) {
        if has_transfer {
            self.transfer_notify.notify_one();
        }
        self.notify_new_timers(timers);
    }

    // Closure

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves to `true` once the shard has been closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// Mark the shard unusable and stop every dependent. Irrevocable.
    pub fn close_shard(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            shard_id = %self.shard_id,
            range_id = self.current_range_id(),
            "Shard closed"
        );
        self.closed_tx.send_replace(true);
        self.transfer_notify.notify_one();
        self.timer_gate.fire();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(HistoryError::ShardClosed(self.shard_id));
        }
        Ok(())
    }

    fn fence<T>(&self, result: history_persistence::Result<T>) -> Result<T> {
        match result {
            Err(e) if e.is_ownership_lost() => {
                error!(
                    shard_id = %self.shard_id,
                    range_id = self.current_range_id(),
                    error = %e,
                    "Shard ownership lost"
                );
                self.metrics
                    .inc_counter(Scope::ShardContext, Counter::ErrShardOwnershipLost);
                self.close_shard();
                Err(e.into())
            }
            other => other.map_err(HistoryError::from),
        }
    }
}

impl std::fmt::Debug for ShardContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardContext")
            .field("shard_id", &self.shard_id)
            .field("owner", &self.owner)
            .field("range_id", &self.current_range_id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Record on each user timer the id of the task that wakes it.
pub(crate) fn link_user_timers<'a>(
    timer_infos: impl Iterator<Item = &'a mut TimerInfo>,
    tasks: &[TimerTaskInfo],
) {
    for info in timer_infos {
        let task = tasks.iter().find(|t| {
            matches!(t.kind, TimerTaskKind::UserTimer { started_event_id }
                if started_event_id == info.started_event_id)
        });
        if let Some(task) = task {
            info.task_id = Some(task.task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SystemTimeSource;
    use history_persistence::InMemoryStore;
    use history_types::WorkflowExecutionInfo;
    use std::collections::HashSet;

    const SHARD: ShardId = ShardId(1);

    fn stores(store: &InMemoryStore) -> ShardStores {
        ShardStores {
            shards: Arc::new(store.clone()),
            executions: Arc::new(store.execution_manager(SHARD)),
            history: Arc::new(store.clone()),
        }
    }

    async fn acquire(store: &InMemoryStore, owner: &str, bits: u32) -> Arc<ShardContext> {
        let mut config = HistoryConfig::default();
        config.shard.range_size_bits = bits;
        ShardContext::acquire(
            SHARD,
            owner,
            &config,
            stores(store),
            MetricsClient::detached(),
            Arc::new(SystemTimeSource),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn acquire_bumps_range_and_counts_steals() {
        let store = InMemoryStore::new();
        let first = acquire(&store, "host-a", 20).await;
        assert_eq!(first.current_range_id(), 1);

        let second = acquire(&store, "host-b", 20).await;
        assert_eq!(second.current_range_id(), 2);

        let info = store.get_shard(SHARD).await.unwrap();
        assert_eq!(info.owner, "host-b");
        assert_eq!(info.stolen_since_renew, 1);

        let first_id = second.generate_transfer_task_id().await.unwrap();
        assert_eq!(first_id, 2 << 20);
    }

    #[tokio::test]
    async fn task_ids_are_unique_under_concurrency() {
        let store = InMemoryStore::new();
        let shard = acquire(&store, "host-a", 3).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let shard = shard.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for _ in 0..10 {
                    ids.push(shard.generate_transfer_task_id().await.unwrap());
                }
                ids
            }));
        }

        let mut all = HashSet::new();
        for handle in handles {
            let ids = handle.await.unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 80);
        // 80 ids over ranges of 8 forces repeated renewals.
        assert!(shard.current_range_id() > 1);
        assert_eq!(
            store.get_shard(SHARD).await.unwrap().range_id,
            shard.current_range_id()
        );
    }

    #[tokio::test]
    async fn stolen_shard_closes_on_first_write() {
        let store = InMemoryStore::new();
        let old = acquire(&store, "host-a", 20).await;
        let mut closed = old.closed_signal();

        let _new = acquire(&store, "host-b", 20).await;

        let err = old.update_transfer_ack_level(42).await.unwrap_err();
        assert!(matches!(err, HistoryError::ShardOwnershipLost { .. }));
        assert!(old.is_closed());
        closed.changed().await.unwrap();
        assert!(*closed.borrow());

        let err = old.update_transfer_ack_level(43).await.unwrap_err();
        assert!(matches!(err, HistoryError::ShardClosed(_)));
        assert_eq!(store.get_shard(SHARD).await.unwrap().transfer_ack_level, 0);
    }

    #[tokio::test]
    async fn ack_levels_persist() {
        let store = InMemoryStore::new();
        let shard = acquire(&store, "host-a", 20).await;

        shard.update_transfer_ack_level(17).await.unwrap();
        let ts = Utc::now();
        shard.update_timer_ack_level(ts).await.unwrap();

        assert_eq!(shard.transfer_ack_level().await, 17);
        let info = store.get_shard(SHARD).await.unwrap();
        assert_eq!(info.transfer_ack_level, 17);
        assert_eq!(info.timer_ack_level, ts);
    }

    #[tokio::test]
    async fn timers_at_or_below_the_read_level_land_just_above_it() {
        let store = InMemoryStore::new();
        let shard = acquire(&store, "host-a", 20).await;
        let read_level = shard.update_timer_max_read_level().await;
        assert!(shard.update_timer_max_read_level().await >= read_level);
        let read_level = shard.timer_max_read_level().await;

        let key = ExecutionKey::new("d", "wf", "run");
        let state = WorkflowMutableState::new(WorkflowExecutionInfo::new(&key, read_level));
        let later = read_level + ChronoDuration::seconds(30);
        let timers = shard
            .create_workflow_execution(
                "req".into(),
                state,
                Vec::new(),
                vec![
                    NewTimerTask {
                        visibility_timestamp: read_level - ChronoDuration::seconds(5),
                        kind: TimerTaskKind::WorkflowTimeout,
                    },
                    NewTimerTask {
                        visibility_timestamp: read_level,
                        kind: TimerTaskKind::UserTimer { started_event_id: 5 },
                    },
                    NewTimerTask {
                        visibility_timestamp: later,
                        kind: TimerTaskKind::UserTimer { started_event_id: 6 },
                    },
                ],
            )
            .await
            .unwrap();

        let bumped = read_level + ChronoDuration::milliseconds(1);
        let stamps: Vec<_> = timers.iter().map(|t| t.visibility_timestamp).collect();
        assert_eq!(stamps, vec![bumped, bumped, later]);
        assert_eq!(store.timer_tasks(SHARD).len(), 3);
    }

    #[test]
    fn user_timers_link_to_their_task() {
        let key = ExecutionKey::new("d", "wf", "run");
        let mut infos = vec![TimerInfo {
            timer_id: "t".into(),
            started_event_id: 7,
            expiry_time: Utc::now(),
            task_id: None,
        }];
        let tasks = vec![TimerTaskInfo {
            execution: key,
            visibility_timestamp: Utc::now(),
            task_id: 99,
            kind: TimerTaskKind::UserTimer {
                started_event_id: 7,
            },
        }];
        link_user_timers(infos.iter_mut(), &tasks);
        assert_eq!(infos[0].task_id, Some(99));
    }
}
