//! History engine
//!
//! The per-shard service surface. Every operation resolves the target run,
//! then loads, mutates and commits its mutable state through the execution
//! cache with bounded conflict retries. The engine also owns the shard's
//! queue processors.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use history_metrics::{Counter, Scope, Timer};
use history_types::{
    new_run_id, Decision, DecisionType, ExecutionKey, HistoryEvent, WorkflowExecution,
};
use tracing::{debug, info};

use crate::api::*;
use crate::cache::ExecutionCache;
use crate::clients::{HistoryClient, MatchingClient};
use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};
use crate::mutable_state::{
    MutableState, ScheduleActivityParams, StartChildParams, StartWorkflowParams,
};
use crate::shard::ShardContext;
use crate::timer::TimerQueueProcessor;
use crate::transfer::TransferQueueProcessor;

pub struct HistoryEngine {
    shard: Arc<ShardContext>,
    cache: Arc<ExecutionCache>,
    transfer: Arc<TransferQueueProcessor>,
    timer: Arc<TimerQueueProcessor>,
}

impl HistoryEngine {
    pub fn new(
        shard: Arc<ShardContext>,
        config: &HistoryConfig,
        matching: Arc<dyn MatchingClient>,
        history: Arc<dyn HistoryClient>,
    ) -> Arc<Self> {
        let cache = Arc::new(ExecutionCache::new(
            shard.clone(),
            config.cache.max_size,
            config.retry.clone(),
        ));
        let transfer = TransferQueueProcessor::new(
            cache.clone(),
            matching,
            history,
            config.transfer.clone(),
            config.retry.clone(),
        );
        let timer = TimerQueueProcessor::new(cache.clone(), config.timer.clone(), config.retry.clone());
        Arc::new(Self {
            shard,
            cache,
            transfer,
            timer,
        })
    }

    pub fn start(&self) {
        info!(shard_id = %self.shard.shard_id(), "Starting history engine");
        self.transfer.start();
        self.timer.start();
    }

    pub async fn stop(&self) {
        info!(shard_id = %self.shard.shard_id(), "Stopping history engine");
        self.transfer.stop().await;
        self.timer.stop().await;
    }

    pub fn shard(&self) -> &Arc<ShardContext> {
        &self.shard
    }

    pub fn cache(&self) -> &Arc<ExecutionCache> {
        &self.cache
    }

    pub fn transfer_processor(&self) -> &Arc<TransferQueueProcessor> {
        &self.transfer
    }

    pub fn timer_processor(&self) -> &Arc<TimerQueueProcessor> {
        &self.timer
    }

    /// Count, time and classify one API call.
    async fn instrument<T>(&self, scope: Scope, call: impl Future<Output = Result<T>>) -> Result<T> {
        let metrics = self.shard.metrics();
        metrics.inc_counter(scope, Counter::HistoryRequests);
        let _latency = metrics.start_timer(scope, Timer::HistoryLatency);

        let result = call.await;
        if let Err(e) = &result {
            metrics.inc_counter(scope, Counter::HistoryFailures);
            let classified = match e {
                HistoryError::BadRequest(_) => Some(Counter::ErrBadRequest),
                HistoryError::EntityNotExists(_) => Some(Counter::ErrEntityNotExists),
                HistoryError::WorkflowExecutionAlreadyStarted { .. } => {
                    Some(Counter::ErrExecutionAlreadyStarted)
                }
                HistoryError::EventAlreadyStarted(_) => Some(Counter::ErrEventAlreadyStarted),
                HistoryError::ShardOwnershipLost { .. } => Some(Counter::ErrShardOwnershipLost),
                _ => None,
            };
            if let Some(counter) = classified {
                metrics.inc_counter(scope, counter);
            }
            debug!(operation = scope.operation(), error = %e, "History request failed");
        }
        result
    }

    /// Fill in the current run when `execution` names none.
    async fn resolve(&self, domain_id: &str, execution: &WorkflowExecution) -> Result<ExecutionKey> {
        if !execution.run_id.is_empty() {
            return Ok(ExecutionKey::from_execution(domain_id, execution));
        }
        let current = self
            .shard
            .execution_manager()
            .get_current_execution(domain_id, &execution.workflow_id)
            .await?;
        Ok(ExecutionKey::new(
            domain_id,
            execution.workflow_id.clone(),
            current.run_id,
        ))
    }

    // Workflow lifecycle

    pub async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<StartWorkflowExecutionResponse> {
        self.instrument(Scope::HistoryStartWorkflowExecution, async move {
            validate_start(&request)?;

            let key = ExecutionKey::new(
                request.domain_id.clone(),
                request.workflow_id.clone(),
                new_run_id(),
            );
            let mut state = MutableState::new(&key, self.shard.time_source().clone());
            let has_parent = request.parent.is_some();
            state.add_workflow_execution_started_event(StartWorkflowParams {
                workflow_type: request.workflow_type,
                task_list: request.task_list,
                input: request.input,
                execution_start_to_close_timeout_secs: request.execution_start_to_close_timeout_secs,
                task_start_to_close_timeout_secs: request.task_start_to_close_timeout_secs,
                identity: request.identity,
                request_id: request.request_id.clone(),
                parent: request.parent,
            })?;
            // A child's first decision is scheduled once its parent has
            // recorded the start.
            if !has_parent {
                state.add_decision_task_scheduled_event()?;
            }

            let mut handle = self.cache.get_or_create(&key).await?;
            match handle.create(request.request_id.clone(), state).await {
                Ok(()) => {
                    info!(execution = %key, "Workflow execution started");
                    Ok(StartWorkflowExecutionResponse { run_id: key.run_id })
                }
                Err(HistoryError::WorkflowExecutionAlreadyStarted {
                    start_request_id,
                    run_id,
                }) if start_request_id == request.request_id => {
                    debug!(workflow_id = %key.workflow_id, run_id = %run_id, "Duplicate start request");
                    Ok(StartWorkflowExecutionResponse { run_id })
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    pub async fn get_workflow_execution_next_event_id(
        &self,
        request: GetWorkflowExecutionNextEventIdRequest,
    ) -> Result<GetWorkflowExecutionNextEventIdResponse> {
        self.instrument(Scope::HistoryGetWorkflowExecutionNextEventId, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            let mut handle = self.cache.get_or_create(&key).await?;
            let state = match request.expected_next_event_id {
                Some(expected) => handle.load_fresh(expected - 1).await?,
                None => handle.load().await?,
            };
            Ok(GetWorkflowExecutionNextEventIdResponse {
                run_id: key.run_id.clone(),
                next_event_id: state.next_event_id(),
                is_running: state.is_running(),
            })
        })
        .await
    }

    pub async fn signal_workflow_execution(&self, request: SignalWorkflowExecutionRequest) -> Result<()> {
        self.instrument(Scope::HistorySignalWorkflowExecution, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            self.cache
                .update_with_retry(&key, |state| {
                    ensure_running(state)?;
                    state.add_workflow_execution_signaled(
                        request.signal_name.clone(),
                        request.input.clone(),
                        request.identity.clone(),
                    )?;
                    state.schedule_decision_if_needed()?;
                    Ok(())
                })
                .await
        })
        .await
    }

    pub async fn request_cancel_workflow_execution(
        &self,
        request: RequestCancelWorkflowExecutionRequest,
    ) -> Result<()> {
        self.instrument(Scope::HistoryRequestCancelWorkflowExecution, async move {
            let execution = WorkflowExecution::new(
                request.workflow_id.clone(),
                request.run_id.clone().unwrap_or_default(),
            );
            let key = self.resolve(&request.domain_id, &execution).await?;
            self.cache
                .update_with_retry(&key, |state| {
                    if !state.is_running() {
                        return Err(HistoryError::invalid(format!(
                            "workflow execution {} already completed",
                            state.key()
                        )));
                    }
                    let info = state.execution_info();
                    if info.cancel_requested {
                        if info.cancel_request_id.as_deref() == Some(request.request_id.as_str()) {
                            return Ok(());
                        }
                        return Err(HistoryError::CancellationAlreadyRequested(state.key().to_string()));
                    }
                    state.add_workflow_execution_cancel_requested_event(
                        request.cause.clone(),
                        request.request_id.clone(),
                        request.identity.clone(),
                    )?;
                    state.schedule_decision_if_needed()?;
                    Ok(())
                })
                .await
        })
        .await
    }

    pub async fn terminate_workflow_execution(
        &self,
        request: TerminateWorkflowExecutionRequest,
    ) -> Result<()> {
        self.instrument(Scope::HistoryTerminateWorkflowExecution, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            self.cache
                .update_with_retry(&key, |state| {
                    ensure_running(state)?;
                    state.add_workflow_terminated_event(
                        request.reason.clone(),
                        request.details.clone(),
                    )?;
                    Ok(())
                })
                .await?;
            info!(execution = %key, reason = %request.reason, "Workflow execution terminated");
            Ok(())
        })
        .await
    }

    // Decision tasks

    pub async fn schedule_decision_task(&self, request: ScheduleDecisionTaskRequest) -> Result<()> {
        self.instrument(Scope::HistoryScheduleDecisionTask, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            self.cache
                .update_with_retry(&key, |state| {
                    ensure_running(state)?;
                    state.schedule_decision_if_needed()?;
                    Ok(())
                })
                .await
        })
        .await
    }

    pub async fn record_decision_task_started(
        &self,
        request: RecordDecisionTaskStartedRequest,
    ) -> Result<RecordDecisionTaskStartedResponse> {
        self.instrument(Scope::HistoryRecordDecisionTaskStarted, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            let schedule_id = request.schedule_id;
            self.cache
                .update_with_retry(&key, |state| {
                    ensure_running(state)?;
                    ensure_fresh(self, state, schedule_id)?;
                    let decision = state
                        .pending_decision()
                        .filter(|d| d.schedule_id == schedule_id)
                        .ok_or_else(|| {
                            HistoryError::not_exists(format!("decision task {}", schedule_id))
                        })?;

                    let started_event_id = match decision.started_id {
                        Some(started) if decision.request_id.as_deref() == Some(request.request_id.as_str()) => {
                            started
                        }
                        Some(started) => {
                            return Err(HistoryError::EventAlreadyStarted(format!(
                                "decision task {} started as event {}",
                                schedule_id, started
                            )))
                        }
                        None => {
                            state
                                .add_decision_task_started_event(
                                    schedule_id,
                                    request.request_id.clone(),
                                    request.identity.clone(),
                                )?
                                .event_id
                        }
                    };

                    let info = state.execution_info();
                    Ok(RecordDecisionTaskStartedResponse {
                        workflow_type: info.workflow_type.clone(),
                        started_event_id,
                        previous_started_event_id: info.last_processed_event_id,
                        next_event_id: state.next_event_id(),
                        attempt: decision.attempt,
                    })
                })
                .await
        })
        .await
    }

    pub async fn respond_decision_task_completed(
        &self,
        request: RespondDecisionTaskCompletedRequest,
    ) -> Result<()> {
        self.instrument(Scope::HistoryRespondDecisionTaskCompleted, async move {
            let metrics = self.shard.metrics();
            let completions = request
                .decisions
                .iter()
                .filter(|d| d.decision_type().is_completion())
                .count();
            if completions > 1 {
                metrics.inc_counter(
                    Scope::HistoryRespondDecisionTaskCompleted,
                    Counter::MultipleCompletionDecisions,
                );
                metrics.inc_counter(Scope::HistoryRespondDecisionTaskCompleted, Counter::FailedDecisions);
                return Err(HistoryError::bad_request(format!(
                    "{} decisions close the workflow",
                    completions
                )));
            }

            let key = self.resolve(&request.domain_id, &request.execution).await?;
            let result = self
                .cache
                .update_with_retry(&key, |state| complete_decision(self, state, &request))
                .await;

            match &result {
                Ok(()) => {
                    for decision in &request.decisions {
                        metrics.inc_counter(
                            Scope::HistoryRespondDecisionTaskCompleted,
                            decision_counter(decision.decision_type()),
                        );
                    }
                }
                Err(HistoryError::BadRequest(_)) | Err(HistoryError::InvalidStateTransition(_)) => {
                    metrics.inc_counter(Scope::HistoryRespondDecisionTaskCompleted, Counter::FailedDecisions);
                }
                Err(_) => {}
            }
            result
        })
        .await
    }

    // Activity tasks

    pub async fn record_activity_task_started(
        &self,
        request: RecordActivityTaskStartedRequest,
    ) -> Result<RecordActivityTaskStartedResponse> {
        self.instrument(Scope::HistoryRecordActivityTaskStarted, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            let schedule_id = request.schedule_id;
            self.cache
                .update_with_retry(&key, |state| {
                    ensure_running(state)?;
                    ensure_fresh(self, state, schedule_id)?;
                    let (started_id, started_request) = state
                        .activity(schedule_id)
                        .map(|ai| (ai.started_id, ai.request_id.clone()))
                        .ok_or_else(|| HistoryError::not_exists(format!("activity {}", schedule_id)))?;

                    let started_event_id = match started_id {
                        Some(started) if started_request.as_deref() == Some(request.request_id.as_str()) => {
                            started
                        }
                        Some(started) => {
                            return Err(HistoryError::EventAlreadyStarted(format!(
                                "activity {} started as event {}",
                                schedule_id, started
                            )))
                        }
                        None => {
                            state
                                .add_activity_task_started_event(
                                    schedule_id,
                                    request.request_id.clone(),
                                    request.identity.clone(),
                                )?
                                .event_id
                        }
                    };

                    let activity = state
                        .activity(schedule_id)
                        .cloned()
                        .ok_or_else(|| HistoryError::not_exists(format!("activity {}", schedule_id)))?;
                    Ok(RecordActivityTaskStartedResponse {
                        started_event_id,
                        activity,
                    })
                })
                .await
        })
        .await
    }

    pub async fn record_activity_task_heartbeat(
        &self,
        request: RecordActivityTaskHeartbeatRequest,
    ) -> Result<RecordActivityTaskHeartbeatResponse> {
        self.instrument(Scope::HistoryRecordActivityTaskHeartbeat, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            let cancel_requested = self
                .cache
                .update_with_retry(&key, |state| {
                    ensure_running(state)?;
                    ensure_fresh(self, state, request.schedule_id)?;
                    state.record_activity_heartbeat(request.schedule_id, request.details.clone())
                })
                .await?;
            Ok(RecordActivityTaskHeartbeatResponse { cancel_requested })
        })
        .await
    }

    /// Completed, failed and canceled activities all report here.
    pub async fn respond_activity_task(&self, request: RespondActivityTaskRequest) -> Result<()> {
        let scope = match request.outcome {
            ActivityOutcome::Completed { .. } => Scope::HistoryRespondActivityTaskCompleted,
            ActivityOutcome::Failed { .. } => Scope::HistoryRespondActivityTaskFailed,
            ActivityOutcome::Canceled { .. } => Scope::HistoryRespondActivityTaskCanceled,
        };
        self.instrument(scope, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            let schedule_id = request.schedule_id;
            self.cache
                .update_with_retry(&key, |state| {
                    ensure_running(state)?;
                    ensure_fresh(self, state, schedule_id)?;
                    let started_id = state
                        .activity(schedule_id)
                        .ok_or_else(|| HistoryError::not_exists(format!("activity {}", schedule_id)))?
                        .started_id
                        .ok_or_else(|| {
                            HistoryError::invalid(format!("activity {} has not started", schedule_id))
                        })?;

                    match &request.outcome {
                        ActivityOutcome::Completed { result } => {
                            state.add_activity_task_completed_event(
                                schedule_id,
                                started_id,
                                result.clone(),
                                request.identity.clone(),
                            )?;
                        }
                        ActivityOutcome::Failed { reason, details } => {
                            state.add_activity_task_failed_event(
                                schedule_id,
                                started_id,
                                reason.clone(),
                                details.clone(),
                                request.identity.clone(),
                            )?;
                        }
                        ActivityOutcome::Canceled { details } => {
                            state.add_activity_task_canceled_event(
                                schedule_id,
                                details.clone(),
                                request.identity.clone(),
                            )?;
                        }
                    }
                    state.schedule_decision_if_needed()?;
                    Ok(())
                })
                .await
        })
        .await
    }

    pub async fn respond_activity_task_completed(
        &self,
        domain_id: String,
        execution: WorkflowExecution,
        schedule_id: i64,
        result: history_types::Payload,
        identity: String,
    ) -> Result<()> {
        self.respond_activity_task(RespondActivityTaskRequest {
            domain_id,
            execution,
            schedule_id,
            outcome: ActivityOutcome::Completed { result },
            identity,
        })
        .await
    }

    pub async fn respond_activity_task_failed(
        &self,
        domain_id: String,
        execution: WorkflowExecution,
        schedule_id: i64,
        reason: String,
        details: history_types::Payload,
        identity: String,
    ) -> Result<()> {
        self.respond_activity_task(RespondActivityTaskRequest {
            domain_id,
            execution,
            schedule_id,
            outcome: ActivityOutcome::Failed { reason, details },
            identity,
        })
        .await
    }

    pub async fn respond_activity_task_canceled(
        &self,
        domain_id: String,
        execution: WorkflowExecution,
        schedule_id: i64,
        details: history_types::Payload,
        identity: String,
    ) -> Result<()> {
        self.respond_activity_task(RespondActivityTaskRequest {
            domain_id,
            execution,
            schedule_id,
            outcome: ActivityOutcome::Canceled { details },
            identity,
        })
        .await
    }

    // Child workflows

    pub async fn record_child_execution_completed(
        &self,
        request: RecordChildExecutionCompletedRequest,
    ) -> Result<()> {
        self.instrument(Scope::HistoryRecordChildExecutionCompleted, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            let initiated_id = request.initiated_id;
            self.cache
                .update_with_retry(&key, |state| {
                    ensure_running(state)?;
                    ensure_fresh(self, state, initiated_id)?;
                    let child = state
                        .child_execution(initiated_id)
                        .ok_or_else(|| HistoryError::not_exists(format!("child {}", initiated_id)))?;
                    match child.run_id.as_deref() {
                        Some(run_id) if run_id == request.completed_execution.run_id => {}
                        Some(_) => {
                            return Err(HistoryError::not_exists(format!(
                                "child {} is run {}",
                                initiated_id, request.completed_execution.run_id
                            )))
                        }
                        // The parent has not recorded the start yet; the
                        // start-child task will, so try again.
                        None => {
                            return Err(HistoryError::ConcurrentUpdate(format!(
                                "child {} not yet started",
                                initiated_id
                            )))
                        }
                    }
                    state.add_child_workflow_execution_closed_event(
                        initiated_id,
                        request.outcome.clone(),
                    )?;
                    state.schedule_decision_if_needed()?;
                    Ok(())
                })
                .await
        })
        .await
    }

    // History

    pub async fn get_workflow_execution_history(
        &self,
        request: GetWorkflowExecutionHistoryRequest,
    ) -> Result<Vec<HistoryEvent>> {
        self.instrument(Scope::HistoryGetWorkflowExecutionHistory, async move {
            let key = self.resolve(&request.domain_id, &request.execution).await?;
            let next_event_id = match request.next_event_id {
                Some(next) => next,
                None => {
                    let mut handle = self.cache.get_or_create(&key).await?;
                    handle.load().await?.next_event_id()
                }
            };
            if request.first_event_id >= next_event_id {
                return Ok(Vec::new());
            }
            let events = self
                .shard
                .history_manager()
                .get_workflow_execution_history(&key, request.first_event_id, next_event_id)
                .await?;
            Ok(events)
        })
        .await
    }
}

#[async_trait]
impl HistoryClient for HistoryEngine {
    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<StartWorkflowExecutionResponse> {
        HistoryEngine::start_workflow_execution(self, request).await
    }

    async fn schedule_decision_task(&self, request: ScheduleDecisionTaskRequest) -> Result<()> {
        HistoryEngine::schedule_decision_task(self, request).await
    }

    async fn request_cancel_workflow_execution(
        &self,
        request: RequestCancelWorkflowExecutionRequest,
    ) -> Result<()> {
        HistoryEngine::request_cancel_workflow_execution(self, request).await
    }

    async fn record_child_execution_completed(
        &self,
        request: RecordChildExecutionCompletedRequest,
    ) -> Result<()> {
        HistoryEngine::record_child_execution_completed(self, request).await
    }
}

impl std::fmt::Debug for HistoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryEngine")
            .field("shard", &self.shard)
            .field("cached_executions", &self.cache.len())
            .finish()
    }
}

fn validate_start(request: &StartWorkflowExecutionRequest) -> Result<()> {
    if request.workflow_id.is_empty() {
        return Err(HistoryError::bad_request("missing workflow id"));
    }
    if request.workflow_type.is_empty() {
        return Err(HistoryError::bad_request("missing workflow type"));
    }
    if request.task_list.is_empty() {
        return Err(HistoryError::bad_request("missing task list"));
    }
    if request.task_start_to_close_timeout_secs == 0 {
        return Err(HistoryError::bad_request("missing decision task timeout"));
    }
    Ok(())
}

/// Closed runs look absent to API callers.
fn ensure_running(state: &MutableState) -> Result<()> {
    if !state.is_running() {
        return Err(HistoryError::not_exists(format!(
            "workflow execution {} already completed",
            state.key()
        )));
    }
    Ok(())
}

/// A request naming an event the cached state has not seen means the cache
/// is behind the store. Failing with a conflict makes the retry reload it.
fn ensure_fresh(engine: &HistoryEngine, state: &MutableState, event_id: i64) -> Result<()> {
    if event_id >= state.next_event_id() {
        engine
            .shard
            .metrics()
            .inc_counter(Scope::ExecutionCache, Counter::StaleMutableState);
        return Err(HistoryError::ConcurrentUpdate(format!(
            "event {} is past next event {}",
            event_id,
            state.next_event_id()
        )));
    }
    Ok(())
}

fn complete_decision(
    engine: &HistoryEngine,
    state: &mut MutableState,
    request: &RespondDecisionTaskCompletedRequest,
) -> Result<()> {
    ensure_running(state)?;
    ensure_fresh(engine, state, request.started_id)?;
    let matches = state.pending_decision().is_some_and(|d| {
        d.schedule_id == request.schedule_id && d.started_id == Some(request.started_id)
    });
    if !matches {
        return Err(HistoryError::not_exists(format!(
            "decision task {} started as {}",
            request.schedule_id, request.started_id
        )));
    }

    let completed = state.add_decision_task_completed_event(
        request.schedule_id,
        request.started_id,
        request.identity.clone(),
        request.execution_context.clone(),
    )?;
    let dcid = completed.event_id;

    for decision in &request.decisions {
        apply_decision(state, dcid, decision, &request.identity)?;
    }

    // Events that arrived while the decision was in flight need another one.
    let arrived_meanwhile = dcid > request.started_id + 1;
    if state.is_running() && arrived_meanwhile {
        state.schedule_decision_if_needed()?;
    }
    Ok(())
}

fn apply_decision(
    state: &mut MutableState,
    dcid: i64,
    decision: &Decision,
    identity: &str,
) -> Result<()> {
    match decision {
        Decision::ScheduleActivityTask {
            activity_id,
            activity_type,
            task_list,
            input,
            schedule_to_close_timeout_secs,
            schedule_to_start_timeout_secs,
            start_to_close_timeout_secs,
            heartbeat_timeout_secs,
        } => {
            if state.activity_by_id(activity_id).is_some() {
                return Err(HistoryError::bad_request(format!(
                    "activity id {} is already in use",
                    activity_id
                )));
            }
            let task_list = task_list
                .clone()
                .unwrap_or_else(|| state.execution_info().task_list.clone());
            state.add_activity_task_scheduled_event(
                dcid,
                ScheduleActivityParams {
                    activity_id: activity_id.clone(),
                    activity_type: activity_type.clone(),
                    task_list,
                    input: input.clone(),
                    schedule_to_close_timeout_secs: *schedule_to_close_timeout_secs,
                    schedule_to_start_timeout_secs: *schedule_to_start_timeout_secs,
                    start_to_close_timeout_secs: *start_to_close_timeout_secs,
                    heartbeat_timeout_secs: *heartbeat_timeout_secs,
                },
            )?;
        }
        Decision::RequestCancelActivityTask { activity_id } => {
            let pending = state
                .activity_by_id(activity_id)
                .map(|ai| (ai.schedule_id, ai.started_id));
            match pending {
                None => {
                    state.add_request_cancel_activity_task_failed_event(
                        dcid,
                        activity_id.clone(),
                        "ACTIVITY_ID_UNKNOWN",
                    )?;
                }
                Some((schedule_id, started_id)) => {
                    state.add_activity_task_cancel_requested_event(dcid, activity_id.clone())?;
                    // Nobody holds an unstarted activity; cancel it outright.
                    if started_id.is_none() {
                        state.add_activity_task_canceled_event(schedule_id, Vec::new(), identity)?;
                    }
                }
            }
        }
        Decision::StartTimer {
            timer_id,
            start_to_fire_timeout_secs,
        } => {
            if state.timer(timer_id).is_some() {
                return Err(HistoryError::bad_request(format!(
                    "timer id {} is already in use",
                    timer_id
                )));
            }
            state.add_timer_started_event(dcid, timer_id.clone(), *start_to_fire_timeout_secs)?;
        }
        Decision::CancelTimer { timer_id } => {
            if state.timer(timer_id).is_some() {
                state.add_timer_canceled_event(dcid, timer_id, identity)?;
            } else {
                state.add_cancel_timer_failed_event(dcid, timer_id.clone(), "TIMER_ID_UNKNOWN")?;
            }
        }
        Decision::CompleteWorkflowExecution { result } => {
            state.add_completed_workflow_event(dcid, result.clone())?;
        }
        Decision::FailWorkflowExecution { reason, details } => {
            state.add_fail_workflow_event(dcid, reason.clone(), details.clone())?;
        }
        Decision::CancelWorkflowExecution { details } => {
            state.add_workflow_canceled_event(dcid, details.clone())?;
        }
        Decision::StartChildWorkflowExecution {
            domain_id,
            workflow_id,
            workflow_type,
            task_list,
            input,
            execution_start_to_close_timeout_secs,
            task_start_to_close_timeout_secs,
        } => {
            let info = state.execution_info();
            let params = StartChildParams {
                domain_id: domain_id.clone().unwrap_or_else(|| info.domain_id.clone()),
                workflow_id: workflow_id.clone(),
                workflow_type: workflow_type.clone(),
                task_list: task_list.clone().unwrap_or_else(|| info.task_list.clone()),
                input: input.clone(),
                execution_start_to_close_timeout_secs: *execution_start_to_close_timeout_secs,
                task_start_to_close_timeout_secs: *task_start_to_close_timeout_secs,
            };
            state.add_start_child_workflow_execution_initiated_event(
                dcid,
                params,
                uuid::Uuid::new_v4().to_string(),
            )?;
        }
        Decision::RequestCancelExternalWorkflowExecution {
            domain_id,
            workflow_id,
            run_id,
        } => {
            let domain_id = domain_id
                .clone()
                .unwrap_or_else(|| state.execution_info().domain_id.clone());
            state.add_request_cancel_external_workflow_execution_initiated_event(
                dcid,
                domain_id,
                workflow_id.clone(),
                run_id.clone(),
                uuid::Uuid::new_v4().to_string(),
            )?;
        }
    }
    Ok(())
}

fn decision_counter(decision_type: DecisionType) -> Counter {
    match decision_type {
        DecisionType::ScheduleActivityTask => Counter::DecisionTypeScheduleActivity,
        DecisionType::RequestCancelActivityTask => Counter::DecisionTypeRequestCancelActivity,
        DecisionType::StartTimer => Counter::DecisionTypeStartTimer,
        DecisionType::CancelTimer => Counter::DecisionTypeCancelTimer,
        DecisionType::CompleteWorkflowExecution => Counter::DecisionTypeCompleteWorkflow,
        DecisionType::FailWorkflowExecution => Counter::DecisionTypeFailWorkflow,
        DecisionType::CancelWorkflowExecution => Counter::DecisionTypeCancelWorkflow,
        DecisionType::StartChildWorkflowExecution => Counter::DecisionTypeChildWorkflow,
        DecisionType::RequestCancelExternalWorkflowExecution => {
            Counter::DecisionTypeCancelExternalWorkflow
        }
    }
}
