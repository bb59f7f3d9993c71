//! Timer queue processor
//!
//! Sleeps on the shard's [`TimerGate`](crate::timer_gate::TimerGate) until the
//! earliest known deadline, then fires every timer task that is due in
//! (visibility timestamp, task id) order. Tasks are applied one at a time; a
//! task that keeps failing stays un-acked and holds the ack level back.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use history_metrics::{Counter, Scope, Timer};
use history_types::{ExecutionKey, TimeoutType, TimerSequenceId, TimerTaskInfo, TimerTaskKind};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ack::AckManager;
use crate::cache::ExecutionCache;
use crate::config::{RetryPolicy, TimerQueueConfig};
use crate::error::{HistoryError, Result};
use crate::mutable_state::MutableState;
use crate::shard::ShardContext;

fn task_scope(kind: &TimerTaskKind) -> Scope {
    match kind {
        TimerTaskKind::DecisionTimeout { .. } => Scope::TimerTaskDecisionTimeout,
        TimerTaskKind::ActivityTimeout { .. } => Scope::TimerTaskActivityTimeout,
        TimerTaskKind::UserTimer { .. } => Scope::TimerTaskUserTimer,
        TimerTaskKind::WorkflowTimeout => Scope::TimerTaskWorkflowTimeout,
    }
}

pub struct TimerQueueProcessor {
    shard: Arc<ShardContext>,
    cache: Arc<ExecutionCache>,
    config: TimerQueueConfig,
    retry: RetryPolicy,
    stop_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerQueueProcessor {
    pub fn new(cache: Arc<ExecutionCache>, config: TimerQueueConfig, retry: RetryPolicy) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            shard: cache.shard().clone(),
            cache,
            config,
            retry,
            stop_tx,
            worker: Mutex::new(None),
        })
    }

    /// Spawn the processing loop. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let processor = self.clone();
        *worker = Some(tokio::spawn(async move { processor.run().await }));
    }

    /// Stop the loop, interrupting its sleep, and wait for it to exit.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        self.shard.timer_gate().fire();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(shard_id = %self.shard.shard_id(), error = %e, "Timer queue processor panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    async fn run(self: Arc<Self>) {
        let shard_id = self.shard.shard_id();
        let mut stop = self.stop_tx.subscribe();
        let mut closed = self.shard.closed_signal();
        let ack_level = self.shard.timer_ack_level().await;
        let mut ack = AckManager::new(TimerSequenceId::new(ack_level, i64::MIN));
        info!(shard_id = %shard_id, ack_level = %ack_level, "Timer queue processor started");

        loop {
            if *stop.borrow() || self.shard.is_closed() {
                break;
            }

            match self.process_due(&mut ack).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) if e.is_shard_fatal() => break,
                Err(e) => {
                    warn!(shard_id = %shard_id, error = %e, "Timer queue poll failed");
                    let retry_at = self.shard.now() + to_chrono(self.retry.backoff(1));
                    self.shard.timer_gate().schedule(retry_at);
                }
            }

            let now = self.shard.now();
            tokio::select! {
                _ = self.shard.timer_gate().wait(now, self.config.max_poll_interval()) => {}
                _ = stop.changed() => {}
                _ = closed.changed() => {}
            }
        }

        info!(shard_id = %shard_id, ack_level = %ack.ack_level(), "Timer queue processor stopped");
    }

    /// Fire everything due now. Returns whether a backlog remains.
    pub(crate) async fn process_due(&self, ack: &mut AckManager<TimerSequenceId>) -> Result<bool> {
        let gate = self.shard.timer_gate();
        gate.clear();

        let now = self.shard.update_timer_max_read_level().await;
        let tasks = self
            .shard
            .execution_manager()
            .get_timer_index_tasks(ack.ack_level().visibility_timestamp, now, self.config.batch_size)
            .await?;
        let full_page = tasks.len() >= self.config.batch_size;

        let mut failed = false;
        for task in tasks {
            let sequence = task.sequence_id();
            if ack.is_completed(sequence) {
                continue;
            }
            // Listing is bounded by `now`, so nothing here fires early.
            debug_assert!(task.visibility_timestamp <= now);
            ack.add(sequence);
            match self.process_task(&task).await {
                Ok(()) => ack.complete(sequence),
                Err(e) if e.is_shard_fatal() => return Err(e),
                Err(_) => failed = true,
            }
        }

        self.persist_ack_level(ack).await?;

        if failed {
            ack.reset_read_level();
            gate.schedule(now + to_chrono(self.retry.backoff(1)));
            return Ok(false);
        }
        if full_page {
            return Ok(true);
        }

        self.arm_next(now).await?;
        Ok(false)
    }

    /// Point the gate at the earliest timer still in the future.
    async fn arm_next(&self, now: DateTime<Utc>) -> Result<()> {
        let next = self
            .shard
            .execution_manager()
            .get_timer_index_tasks(now + ChronoDuration::nanoseconds(1), DateTime::<Utc>::MAX_UTC, 1)
            .await?;
        if let Some(task) = next.first() {
            self.shard.timer_gate().schedule(task.visibility_timestamp);
        }
        Ok(())
    }

    async fn persist_ack_level(&self, ack: &mut AckManager<TimerSequenceId>) -> Result<()> {
        let Some(level) = ack.update_ack_level() else {
            return Ok(());
        };
        let metrics = self.shard.metrics();
        match self
            .shard
            .update_timer_ack_level(level.visibility_timestamp)
            .await
        {
            Ok(()) => {
                metrics.inc_counter(Scope::TimerQueueProcessor, Counter::AckLevelUpdate);
                debug!(shard_id = %self.shard.shard_id(), ack_level = %level, "Timer ack level updated");
                Ok(())
            }
            Err(e) => {
                metrics.inc_counter(Scope::TimerQueueProcessor, Counter::AckLevelUpdateFailed);
                if e.is_shard_fatal() {
                    return Err(e);
                }
                warn!(shard_id = %self.shard.shard_id(), ack_level = %level, error = %e, "Failed to persist timer ack level");
                Ok(())
            }
        }
    }

    /// Apply with bounded retries, then mark the task complete.
    async fn process_task(&self, task: &TimerTaskInfo) -> Result<()> {
        let scope = task_scope(&task.kind);
        let metrics = self.shard.metrics();
        metrics.inc_counter(scope, Counter::TaskRequests);
        let _latency = metrics.start_timer(scope, Timer::TaskLatency);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.dispatch(task).await {
                Ok(()) => break,
                Err(e) => e,
            };
            metrics.inc_counter(scope, Counter::TaskFailures);
            if err.is_retryable() && attempt < self.retry.max_attempts && !self.shard.is_closed() {
                debug!(task_id = task.task_id, attempt, error = %err, "Retrying timer task");
                tokio::time::sleep(self.retry.backoff(attempt)).await;
                continue;
            }
            warn!(
                shard_id = %self.shard.shard_id(),
                task_id = task.task_id,
                task_type = task.kind.task_type().as_str(),
                visibility_timestamp = %task.visibility_timestamp,
                workflow_id = %task.execution.workflow_id,
                run_id = %task.execution.run_id,
                attempts = attempt,
                error = %err,
                "Timer task failed"
            );
            return Err(err);
        }

        self.shard
            .complete_timer_task(task.visibility_timestamp, task.task_id)
            .await
    }

    async fn dispatch(&self, task: &TimerTaskInfo) -> Result<()> {
        let result = match &task.kind {
            TimerTaskKind::DecisionTimeout {
                schedule_id,
                timeout_type,
            } => {
                self.process_decision_timeout(&task.execution, *schedule_id, *timeout_type)
                    .await
            }
            TimerTaskKind::ActivityTimeout {
                schedule_id,
                timeout_type,
            } => {
                self.process_activity_timeout(&task.execution, *schedule_id, *timeout_type)
                    .await
            }
            TimerTaskKind::UserTimer { started_event_id } => {
                self.process_user_timer(&task.execution, *started_event_id)
                    .await
            }
            TimerTaskKind::WorkflowTimeout => self.process_workflow_timeout(&task.execution).await,
        };

        match result {
            Err(HistoryError::EntityNotExists(what)) => {
                debug!(task_id = task.task_id, missing = %what, "Execution gone, dropping timer task");
                Ok(())
            }
            other => other,
        }
    }

    async fn process_decision_timeout(
        &self,
        execution: &ExecutionKey,
        schedule_id: i64,
        timeout_type: TimeoutType,
    ) -> Result<()> {
        self.cache
            .update_with_retry(execution, |state| {
                if !state.is_running() || timeout_type != TimeoutType::StartToClose {
                    return Ok(());
                }
                let started_id = match state.pending_decision() {
                    Some(decision) if decision.schedule_id == schedule_id => decision.started_id,
                    _ => None,
                };
                let Some(started_id) = started_id else {
                    return Ok(());
                };
                state.add_decision_task_timed_out_event(schedule_id, started_id)?;
                state.schedule_decision_if_needed()?;
                Ok(())
            })
            .await
    }

    async fn process_activity_timeout(
        &self,
        execution: &ExecutionKey,
        schedule_id: i64,
        timeout_type: TimeoutType,
    ) -> Result<()> {
        self.cache
            .update_with_retry(execution, |state| {
                if !state.is_running() {
                    return Ok(());
                }
                if !activity_timed_out(state, schedule_id, timeout_type) {
                    return Ok(());
                }
                state.add_activity_task_timed_out_event(schedule_id, timeout_type)?;
                state.schedule_decision_if_needed()?;
                Ok(())
            })
            .await
    }

    async fn process_user_timer(&self, execution: &ExecutionKey, started_event_id: i64) -> Result<()> {
        self.cache
            .update_with_retry(execution, |state| {
                if !state.is_running() {
                    return Ok(());
                }
                let timer_id = state
                    .pending_timers()
                    .find(|t| t.started_event_id == started_event_id)
                    .map(|t| t.timer_id.clone());
                let Some(timer_id) = timer_id else {
                    // Canceled, or fired by an earlier attempt.
                    return Ok(());
                };
                state.add_timer_fired_event(&timer_id)?;
                state.schedule_decision_if_needed()?;
                Ok(())
            })
            .await
    }

    async fn process_workflow_timeout(&self, execution: &ExecutionKey) -> Result<()> {
        self.cache
            .update_with_retry(execution, |state| {
                if state.is_running() {
                    state.add_timeout_workflow_event()?;
                }
                Ok(())
            })
            .await
    }
}

/// Whether the activity is still in the phase `timeout_type` bounds and its
/// deadline has passed. A heartbeat timeout that a later heartbeat pushed out
/// is re-armed instead.
fn activity_timed_out(state: &mut MutableState, schedule_id: i64, timeout_type: TimeoutType) -> bool {
    let Some(ai) = state.activity(schedule_id) else {
        return false;
    };
    match timeout_type {
        TimeoutType::ScheduleToStart => ai.started_id.is_none(),
        TimeoutType::ScheduleToClose => true,
        TimeoutType::StartToClose => ai.started_id.is_some(),
        TimeoutType::Heartbeat => {
            let Some(started_time) = ai.started_time else {
                return false;
            };
            let last_beat = ai.last_heartbeat_time.unwrap_or(started_time);
            let deadline = last_beat + ChronoDuration::seconds(i64::from(ai.heartbeat_timeout_secs));
            if deadline > state.now() {
                state.create_activity_heartbeat_timer(schedule_id, deadline);
                return false;
            }
            true
        }
    }
}

fn to_chrono(duration: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero())
}

impl std::fmt::Debug for TimerQueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueueProcessor")
            .field("shard_id", &self.shard.shard_id())
            .field("running", &self.is_running())
            .finish()
    }
}
