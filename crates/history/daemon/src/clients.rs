//! Collaborators wired into a standalone history node.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use history_engine::api::{
    RecordChildExecutionCompletedRequest, RequestCancelWorkflowExecutionRequest,
    ScheduleDecisionTaskRequest, StartWorkflowExecutionRequest, StartWorkflowExecutionResponse,
};
use history_engine::{
    AddActivityTaskRequest, AddDecisionTaskRequest, HistoryClient, HistoryEngine, HistoryError,
    MatchingClient, Result,
};
use parking_lot::Mutex;
use tracing::info;

/// Routes cross-workflow calls back into this node's engine.
///
/// Bound after the engine is built; calls made before binding or after the
/// engine is dropped fail as retryable dispatch errors.
#[derive(Default)]
pub struct LoopbackHistoryClient {
    engine: OnceLock<Weak<HistoryEngine>>,
}

impl LoopbackHistoryClient {
    pub fn bind(&self, engine: &Arc<HistoryEngine>) {
        if self.engine.set(Arc::downgrade(engine)).is_err() {
            tracing::warn!("Loopback history client already bound");
        }
    }

    fn engine(&self) -> Result<Arc<HistoryEngine>> {
        self.engine
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| HistoryError::Dispatch("history engine unavailable".into()))
    }
}

#[async_trait]
impl HistoryClient for LoopbackHistoryClient {
    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<StartWorkflowExecutionResponse> {
        self.engine()?.start_workflow_execution(request).await
    }

    async fn schedule_decision_task(&self, request: ScheduleDecisionTaskRequest) -> Result<()> {
        self.engine()?.schedule_decision_task(request).await
    }

    async fn request_cancel_workflow_execution(
        &self,
        request: RequestCancelWorkflowExecutionRequest,
    ) -> Result<()> {
        self.engine()?.request_cancel_workflow_execution(request).await
    }

    async fn record_child_execution_completed(
        &self,
        request: RecordChildExecutionCompletedRequest,
    ) -> Result<()> {
        self.engine()?.record_child_execution_completed(request).await
    }
}

/// A task handed to matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchedTask {
    Decision(AddDecisionTaskRequest),
    Activity(AddActivityTaskRequest),
}

/// Matching stand-in that logs and keeps every dispatched task.
#[derive(Debug, Default)]
pub struct LoggingMatchingClient {
    dispatched: Mutex<Vec<DispatchedTask>>,
}

impl LoggingMatchingClient {
    pub fn dispatched(&self) -> Vec<DispatchedTask> {
        self.dispatched.lock().clone()
    }
}

#[async_trait]
impl MatchingClient for LoggingMatchingClient {
    async fn add_decision_task(&self, request: AddDecisionTaskRequest) -> Result<()> {
        info!(
            workflow_id = %request.execution.workflow_id,
            run_id = %request.execution.run_id,
            task_list = %request.task_list,
            schedule_id = request.schedule_id,
            "Decision task dispatched"
        );
        self.dispatched.lock().push(DispatchedTask::Decision(request));
        Ok(())
    }

    async fn add_activity_task(&self, request: AddActivityTaskRequest) -> Result<()> {
        info!(
            workflow_id = %request.execution.workflow_id,
            run_id = %request.execution.run_id,
            task_list = %request.task_list,
            schedule_id = request.schedule_id,
            "Activity task dispatched"
        );
        self.dispatched.lock().push(DispatchedTask::Activity(request));
        Ok(())
    }
}
