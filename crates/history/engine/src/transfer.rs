//! Transfer queue processor
//!
//! Drains the shard's transfer tasks in id order. Tasks of one page are
//! dispatched on a bounded pool and may finish in any order; the ack level
//! only moves across the completed prefix, so a crash re-reads everything
//! past the last persisted level.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use history_metrics::{Counter, Scope, Timer};
use history_types::{
    EventAttributes, ExecutionKey, ParentExecutionInfo, TransferTaskInfo, TransferTaskKind,
    WorkflowExecution,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::ack::AckManager;
use crate::api::{
    RecordChildExecutionCompletedRequest, RequestCancelWorkflowExecutionRequest,
    ScheduleDecisionTaskRequest, StartWorkflowExecutionRequest,
};
use crate::cache::ExecutionCache;
use crate::clients::{AddActivityTaskRequest, AddDecisionTaskRequest, HistoryClient, MatchingClient};
use crate::config::{RetryPolicy, TransferQueueConfig};
use crate::error::{HistoryError, Result};
use crate::shard::ShardContext;

/// Identity recorded on events the service writes on its own behalf.
pub(crate) const SERVICE_IDENTITY: &str = "history-service";

fn task_scope(kind: &TransferTaskKind) -> Scope {
    match kind {
        TransferTaskKind::ActivityTask { .. } => Scope::TransferTaskActivity,
        TransferTaskKind::DecisionTask { .. } => Scope::TransferTaskDecision,
        TransferTaskKind::DeleteExecution => Scope::TransferTaskDeleteExecution,
        TransferTaskKind::CancelExecution { .. } => Scope::TransferTaskCancelExecution,
        TransferTaskKind::StartChildExecution { .. } => Scope::TransferTaskStartChildExecution,
    }
}

pub struct TransferQueueProcessor {
    shard: Arc<ShardContext>,
    cache: Arc<ExecutionCache>,
    matching: Arc<dyn MatchingClient>,
    history: Arc<dyn HistoryClient>,
    config: TransferQueueConfig,
    retry: RetryPolicy,
    stop_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TransferQueueProcessor {
    pub fn new(
        cache: Arc<ExecutionCache>,
        matching: Arc<dyn MatchingClient>,
        history: Arc<dyn HistoryClient>,
        config: TransferQueueConfig,
        retry: RetryPolicy,
    ) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            shard: cache.shard().clone(),
            cache,
            matching,
            history,
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

    /// Stop the loop and wait for the page in flight to finish.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(shard_id = %self.shard.shard_id(), error = %e, "Transfer queue processor panicked");
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
        let mut ack = AckManager::new(self.shard.transfer_ack_level().await);
        info!(shard_id = %shard_id, ack_level = ack.ack_level(), "Transfer queue processor started");

        loop {
            if *stop.borrow() || self.shard.is_closed() {
                break;
            }

            let more = match self.process_batch(&mut ack).await {
                Ok(more) => more,
                Err(e) if e.is_shard_fatal() => break,
                Err(e) => {
                    warn!(shard_id = %shard_id, error = %e, "Transfer queue poll failed");
                    false
                }
            };
            if more {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                _ = self.shard.transfer_notifier().notified() => {}
                _ = stop.changed() => {}
                _ = closed.changed() => {}
            }
        }

        info!(shard_id = %shard_id, ack_level = ack.ack_level(), "Transfer queue processor stopped");
    }

    /// Read and dispatch one page past the read level. Returns whether the
    /// page was full, i.e. more tasks may be waiting.
    pub(crate) async fn process_batch(&self, ack: &mut AckManager<i64>) -> Result<bool> {
        let max_read_level = self.shard.transfer_max_read_level();
        let tasks = self
            .shard
            .execution_manager()
            .get_transfer_tasks(ack.read_level(), max_read_level, self.config.batch_size)
            .await?;
        if tasks.is_empty() {
            return Ok(false);
        }
        let full_page = tasks.len() >= self.config.batch_size;

        for task in &tasks {
            ack.add(task.task_id);
        }
        let pending: Vec<TransferTaskInfo> = tasks
            .into_iter()
            .filter(|task| !ack.is_completed(task.task_id))
            .collect();

        let results: Vec<(i64, Result<()>)> = stream::iter(pending)
            .map(|task| async move {
                let result = self.process_task(&task).await;
                (task.task_id, result)
            })
            .buffer_unordered(self.config.worker_count.max(1))
            .collect()
            .await;

        let mut failed = false;
        let mut fatal = None;
        for (task_id, result) in results {
            match result {
                Ok(()) => ack.complete(task_id),
                Err(e) if e.is_shard_fatal() => fatal = Some(e),
                Err(_) => failed = true,
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        self.persist_ack_level(ack).await?;

        if failed {
            ack.reset_read_level();
            return Ok(false);
        }
        Ok(full_page)
    }

    async fn persist_ack_level(&self, ack: &mut AckManager<i64>) -> Result<()> {
        let Some(level) = ack.update_ack_level() else {
            return Ok(());
        };
        let metrics = self.shard.metrics();
        match self.shard.update_transfer_ack_level(level).await {
            Ok(()) => {
                metrics.inc_counter(Scope::TransferQueueProcessor, Counter::AckLevelUpdate);
                debug!(shard_id = %self.shard.shard_id(), ack_level = level, "Transfer ack level updated");
                Ok(())
            }
            Err(e) => {
                metrics.inc_counter(Scope::TransferQueueProcessor, Counter::AckLevelUpdateFailed);
                if e.is_shard_fatal() {
                    return Err(e);
                }
                warn!(shard_id = %self.shard.shard_id(), ack_level = level, error = %e, "Failed to persist transfer ack level");
                Ok(())
            }
        }
    }

    /// Dispatch with bounded retries, then mark the task complete.
    async fn process_task(&self, task: &TransferTaskInfo) -> Result<()> {
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
                debug!(task_id = task.task_id, attempt, error = %err, "Retrying transfer task");
                tokio::time::sleep(self.retry.backoff(attempt)).await;
                continue;
            }
            warn!(
                shard_id = %self.shard.shard_id(),
                task_id = task.task_id,
                task_type = task.kind.task_type().as_str(),
                workflow_id = %task.execution.workflow_id,
                run_id = %task.execution.run_id,
                attempts = attempt,
                error = %err,
                "Transfer task failed"
            );
            return Err(err);
        }

        self.shard.complete_transfer_task(task.task_id).await
    }

    async fn dispatch(&self, task: &TransferTaskInfo) -> Result<()> {
        let execution = &task.execution;
        let result = match &task.kind {
            TransferTaskKind::ActivityTask {
                target_domain_id,
                task_list,
                schedule_id,
            } => {
                self.process_activity_task(execution, target_domain_id, task_list, *schedule_id)
                    .await
            }
            TransferTaskKind::DecisionTask {
                target_domain_id,
                task_list,
                schedule_id,
            } => {
                self.process_decision_task(execution, target_domain_id, task_list, *schedule_id)
                    .await
            }
            TransferTaskKind::DeleteExecution => self.process_delete_execution(execution).await,
            TransferTaskKind::CancelExecution {
                target_domain_id,
                target_workflow_id,
                target_run_id,
                initiated_id,
            } => {
                self.process_cancel_execution(
                    execution,
                    target_domain_id,
                    target_workflow_id,
                    target_run_id.clone(),
                    *initiated_id,
                )
                .await
            }
            TransferTaskKind::StartChildExecution {
                target_domain_id,
                target_workflow_id,
                initiated_id,
            } => {
                self.process_start_child_execution(
                    execution,
                    target_domain_id,
                    target_workflow_id,
                    *initiated_id,
                )
                .await
            }
        };

        match result {
            Err(HistoryError::EntityNotExists(what)) => {
                debug!(task_id = task.task_id, missing = %what, "Execution gone, dropping transfer task");
                Ok(())
            }
            other => other,
        }
    }

    async fn call<T>(&self, scope: Scope, request: impl Future<Output = Result<T>>) -> Result<T> {
        let metrics = self.shard.metrics();
        metrics.inc_counter(scope, Counter::TaskRequests);
        let _latency = metrics.start_timer(scope, Timer::TaskLatency);
        let result = request.await;
        if result.is_err() {
            metrics.inc_counter(scope, Counter::TaskFailures);
        }
        result
    }

    async fn process_activity_task(
        &self,
        execution: &ExecutionKey,
        target_domain_id: &str,
        task_list: &str,
        schedule_id: i64,
    ) -> Result<()> {
        let timeout = {
            let mut handle = self.cache.get_or_create(execution).await?;
            let state = handle.load_fresh(schedule_id).await?;
            if state.is_running() {
                state
                    .activity(schedule_id)
                    .filter(|ai| ai.started_id.is_none())
                    .map(|ai| ai.schedule_to_start_timeout_secs)
            } else {
                None
            }
        };
        let Some(schedule_to_start_timeout_secs) = timeout else {
            debug!(execution = %execution, schedule_id, "Activity no longer pending");
            return Ok(());
        };

        self.call(
            Scope::MatchingClientAddActivityTask,
            self.matching.add_activity_task(AddActivityTaskRequest {
                source_domain_id: execution.domain_id.clone(),
                domain_id: target_domain_id.to_string(),
                execution: execution.execution(),
                task_list: task_list.to_string(),
                schedule_id,
                schedule_to_start_timeout_secs,
            }),
        )
        .await
    }

    async fn process_decision_task(
        &self,
        execution: &ExecutionKey,
        target_domain_id: &str,
        task_list: &str,
        schedule_id: i64,
    ) -> Result<()> {
        let pending = {
            let mut handle = self.cache.get_or_create(execution).await?;
            let state = handle.load_fresh(schedule_id).await?;
            state.is_running()
                && state
                    .pending_decision()
                    .is_some_and(|d| d.schedule_id == schedule_id && d.started_id.is_none())
        };
        if !pending {
            debug!(execution = %execution, schedule_id, "Decision no longer pending");
            return Ok(());
        }

        self.call(
            Scope::MatchingClientAddDecisionTask,
            self.matching.add_decision_task(AddDecisionTaskRequest {
                domain_id: target_domain_id.to_string(),
                execution: execution.execution(),
                task_list: task_list.to_string(),
                schedule_id,
            }),
        )
        .await
    }

    /// Report a closed child to its parent, then drop the execution's rows.
    async fn process_delete_execution(&self, execution: &ExecutionKey) -> Result<()> {
        let (parent, next_event_id) = {
            let mut handle = self.cache.get_or_create(execution).await?;
            let state = handle.load().await?;
            if state.is_running() {
                return Err(HistoryError::invalid(format!(
                    "delete of running execution {}",
                    execution
                )));
            }
            (state.execution_info().parent.clone(), state.next_event_id())
        };

        if let Some(parent) = parent {
            self.report_to_parent(execution, parent, next_event_id)
                .await?;
        }

        let mut handle = self.cache.get_or_create(execution).await?;
        self.shard.delete_workflow_execution(execution).await?;
        handle.clear();
        debug!(execution = %execution, "Deleted execution");
        Ok(())
    }

    async fn report_to_parent(
        &self,
        execution: &ExecutionKey,
        parent: ParentExecutionInfo,
        next_event_id: i64,
    ) -> Result<()> {
        let closing = self
            .shard
            .history_manager()
            .get_workflow_execution_history(execution, next_event_id - 1, next_event_id)
            .await?;
        let outcome = closing.into_iter().find_map(|event| match event.attributes {
            EventAttributes::WorkflowExecutionClosed { outcome, .. } => Some(outcome),
            _ => None,
        });
        let Some(outcome) = outcome else {
            return Err(HistoryError::invalid(format!(
                "execution {} has no close event at {}",
                execution,
                next_event_id - 1
            )));
        };

        let result = self
            .call(
                Scope::HistoryClientRecordChildExecutionCompleted,
                self.history
                    .record_child_execution_completed(RecordChildExecutionCompletedRequest {
                        domain_id: parent.domain_id,
                        execution: parent.execution,
                        initiated_id: parent.initiated_id,
                        completed_execution: execution.execution(),
                        outcome,
                    }),
            )
            .await;
        match result {
            // The parent is gone, closed, or already has the result.
            Err(HistoryError::EntityNotExists(_)) | Err(HistoryError::InvalidStateTransition(_)) => {
                Ok(())
            }
            other => other,
        }
    }

    async fn process_cancel_execution(
        &self,
        execution: &ExecutionKey,
        target_domain_id: &str,
        target_workflow_id: &str,
        target_run_id: Option<String>,
        initiated_id: i64,
    ) -> Result<()> {
        let request_id = {
            let mut handle = self.cache.get_or_create(execution).await?;
            let state = handle.load_fresh(initiated_id).await?;
            if !state.is_running() {
                None
            } else {
                state
                    .request_cancel(initiated_id)
                    .map(|info| info.cancel_request_id.clone())
            }
        };
        let Some(request_id) = request_id else {
            debug!(execution = %execution, initiated_id, "Cancel request no longer pending");
            return Ok(());
        };

        let result = self
            .call(
                Scope::HistoryClientRequestCancelWorkflowExecution,
                self.history
                    .request_cancel_workflow_execution(RequestCancelWorkflowExecutionRequest {
                        domain_id: target_domain_id.to_string(),
                        workflow_id: target_workflow_id.to_string(),
                        run_id: target_run_id,
                        request_id,
                        identity: SERVICE_IDENTITY.to_string(),
                        cause: format!("requested by {}", execution),
                    }),
            )
            .await;

        let failure = match result {
            Ok(()) | Err(HistoryError::CancellationAlreadyRequested(_)) => None,
            Err(HistoryError::EntityNotExists(_)) => Some("ExternalWorkflowExecutionNotFound"),
            Err(HistoryError::InvalidStateTransition(_)) => Some("ExternalWorkflowExecutionClosed"),
            Err(e) => return Err(e),
        };

        self.cache
            .update_with_retry(execution, |state| {
                if !state.is_running() || state.request_cancel(initiated_id).is_none() {
                    return Ok(());
                }
                match failure {
                    None => {
                        state.add_external_workflow_execution_cancel_requested_event(initiated_id)?;
                    }
                    Some(cause) => {
                        state.add_request_cancel_external_workflow_execution_failed_event(
                            initiated_id,
                            cause,
                        )?;
                    }
                }
                state.schedule_decision_if_needed()?;
                Ok(())
            })
            .await
    }

    async fn process_start_child_execution(
        &self,
        execution: &ExecutionKey,
        target_domain_id: &str,
        target_workflow_id: &str,
        initiated_id: i64,
    ) -> Result<()> {
        let child = {
            let mut handle = self.cache.get_or_create(execution).await?;
            let state = handle.load_fresh(initiated_id).await?;
            if !state.is_running() {
                None
            } else {
                state.child_execution(initiated_id).cloned()
            }
        };
        let Some(child) = child else {
            debug!(execution = %execution, initiated_id, "Child initiation no longer pending");
            return Ok(());
        };

        // Started on an earlier attempt; only the first decision may be missing.
        if let (Some(_), Some(run_id)) = (child.started_id, child.run_id.clone()) {
            return self
                .schedule_child_decision(target_domain_id, target_workflow_id, run_id)
                .await;
        }

        let result = self
            .call(
                Scope::HistoryClientStartWorkflowExecution,
                self.history
                    .start_workflow_execution(StartWorkflowExecutionRequest {
                        domain_id: target_domain_id.to_string(),
                        workflow_id: target_workflow_id.to_string(),
                        workflow_type: child.workflow_type.clone(),
                        task_list: child.task_list.clone(),
                        input: child.input.clone(),
                        execution_start_to_close_timeout_secs: child
                            .execution_start_to_close_timeout_secs,
                        task_start_to_close_timeout_secs: child.task_start_to_close_timeout_secs,
                        identity: SERVICE_IDENTITY.to_string(),
                        request_id: child.create_request_id.clone(),
                        parent: Some(ParentExecutionInfo {
                            domain_id: execution.domain_id.clone(),
                            execution: execution.execution(),
                            initiated_id,
                        }),
                    }),
            )
            .await;

        let run_id = match result {
            Ok(response) => Some(response.run_id),
            Err(HistoryError::WorkflowExecutionAlreadyStarted {
                start_request_id,
                run_id,
            }) if start_request_id == child.create_request_id => Some(run_id),
            Err(HistoryError::WorkflowExecutionAlreadyStarted { .. }) => None,
            Err(e) => return Err(e),
        };

        let child_execution = run_id
            .as_ref()
            .map(|run_id| WorkflowExecution::new(target_workflow_id, run_id.clone()));
        self.cache
            .update_with_retry(execution, |state| {
                let pending = state
                    .child_execution(initiated_id)
                    .is_some_and(|c| c.started_id.is_none());
                if !state.is_running() || !pending {
                    return Ok(());
                }
                match &child_execution {
                    Some(started) => {
                        state.add_child_workflow_execution_started_event(
                            initiated_id,
                            target_domain_id,
                            started.clone(),
                        )?;
                    }
                    None => {
                        state.add_start_child_workflow_execution_failed_event(
                            initiated_id,
                            "WorkflowAlreadyRunning",
                        )?;
                    }
                }
                state.schedule_decision_if_needed()?;
                Ok(())
            })
            .await?;

        match run_id {
            Some(run_id) => {
                self.schedule_child_decision(target_domain_id, target_workflow_id, run_id)
                    .await
            }
            None => Ok(()),
        }
    }

    async fn schedule_child_decision(
        &self,
        domain_id: &str,
        workflow_id: &str,
        run_id: String,
    ) -> Result<()> {
        self.call(
            Scope::HistoryClientScheduleDecisionTask,
            self.history.schedule_decision_task(ScheduleDecisionTaskRequest {
                domain_id: domain_id.to_string(),
                execution: WorkflowExecution::new(workflow_id, run_id),
            }),
        )
        .await
    }
}

impl std::fmt::Debug for TransferQueueProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferQueueProcessor")
            .field("shard_id", &self.shard.shard_id())
            .field("running", &self.is_running())
            .finish()
    }
}
