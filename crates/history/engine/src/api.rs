//! Request and response shapes of the history engine API.

use history_types::{
    ActivityInfo, Decision, ParentExecutionInfo, Payload, WorkflowCloseOutcome, WorkflowExecution,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartWorkflowExecutionRequest {
    pub domain_id: String,
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_list: String,
    #[serde(default)]
    pub input: Payload,
    pub execution_start_to_close_timeout_secs: u32,
    pub task_start_to_close_timeout_secs: u32,
    pub identity: String,
    /// Retrying with the same request id returns the run it started.
    pub request_id: String,
    #[serde(default)]
    pub parent: Option<ParentExecutionInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartWorkflowExecutionResponse {
    pub run_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetWorkflowExecutionNextEventIdRequest {
    pub domain_id: String,
    /// An empty run id addresses the current run.
    pub execution: WorkflowExecution,
    /// Reload if the cached state has not reached this event yet.
    #[serde(default)]
    pub expected_next_event_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetWorkflowExecutionNextEventIdResponse {
    pub run_id: String,
    pub next_event_id: i64,
    pub is_running: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecisionTaskStartedRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub schedule_id: i64,
    pub request_id: String,
    pub identity: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecisionTaskStartedResponse {
    pub workflow_type: String,
    pub started_event_id: i64,
    /// Started event of the last decision that completed, if any.
    pub previous_started_event_id: Option<i64>,
    pub next_event_id: i64,
    pub attempt: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondDecisionTaskCompletedRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub schedule_id: i64,
    pub started_id: i64,
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub execution_context: Payload,
    pub identity: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordActivityTaskStartedRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub schedule_id: i64,
    pub request_id: String,
    pub identity: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordActivityTaskStartedResponse {
    pub started_event_id: i64,
    pub activity: ActivityInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordActivityTaskHeartbeatRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub schedule_id: i64,
    #[serde(default)]
    pub details: Payload,
    pub identity: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordActivityTaskHeartbeatResponse {
    pub cancel_requested: bool,
}

/// How a worker finished an activity attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityOutcome {
    Completed { result: Payload },
    Failed { reason: String, details: Payload },
    Canceled { details: Payload },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondActivityTaskRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub schedule_id: i64,
    pub outcome: ActivityOutcome,
    pub identity: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalWorkflowExecutionRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub signal_name: String,
    #[serde(default)]
    pub input: Payload,
    pub identity: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCancelWorkflowExecutionRequest {
    pub domain_id: String,
    pub workflow_id: String,
    /// `None` addresses the current run.
    pub run_id: Option<String>,
    /// Repeating a request id that already took effect is a no-op.
    pub request_id: String,
    pub identity: String,
    #[serde(default)]
    pub cause: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateWorkflowExecutionRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub reason: String,
    #[serde(default)]
    pub details: Payload,
    pub identity: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDecisionTaskRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordChildExecutionCompletedRequest {
    pub domain_id: String,
    /// The parent run.
    pub execution: WorkflowExecution,
    pub initiated_id: i64,
    pub completed_execution: WorkflowExecution,
    pub outcome: WorkflowCloseOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetWorkflowExecutionHistoryRequest {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    #[serde(default = "first_event_id")]
    pub first_event_id: i64,
    /// Defaults to the execution's next event id.
    #[serde(default)]
    pub next_event_id: Option<i64>,
}

fn first_event_id() -> i64 {
    history_types::FIRST_EVENT_ID
}
