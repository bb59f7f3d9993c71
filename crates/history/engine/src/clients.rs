//! Downstream collaborators the queue processors dispatch to.
//!
//! Every call may be repeated for the same logical task; implementations must
//! treat a duplicate as success.

use async_trait::async_trait;
use history_types::WorkflowExecution;

use crate::api::{
    RecordChildExecutionCompletedRequest, RequestCancelWorkflowExecutionRequest,
    ScheduleDecisionTaskRequest, StartWorkflowExecutionRequest, StartWorkflowExecutionResponse,
};
use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddDecisionTaskRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub task_list: String,
    pub schedule_id: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddActivityTaskRequest {
    /// Domain of the workflow that scheduled the activity.
    pub source_domain_id: String,
    /// Domain whose task list receives it.
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub task_list: String,
    pub schedule_id: i64,
    pub schedule_to_start_timeout_secs: u32,
}

/// Task-list dispatch.
#[async_trait]
pub trait MatchingClient: Send + Sync {
    async fn add_decision_task(&self, request: AddDecisionTaskRequest) -> Result<()>;

    async fn add_activity_task(&self, request: AddActivityTaskRequest) -> Result<()>;
}

/// Workflow-to-workflow calls, routed to whichever shard owns the target.
#[async_trait]
pub trait HistoryClient: Send + Sync {
    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<StartWorkflowExecutionResponse>;

    async fn schedule_decision_task(&self, request: ScheduleDecisionTaskRequest) -> Result<()>;

    async fn request_cancel_workflow_execution(
        &self,
        request: RequestCancelWorkflowExecutionRequest,
    ) -> Result<()>;

    async fn record_child_execution_completed(
        &self,
        request: RecordChildExecutionCompletedRequest,
    ) -> Result<()>;
}
