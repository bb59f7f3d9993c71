use serde::{Deserialize, Serialize};

use crate::Payload;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionType {
    ScheduleActivityTask,
    RequestCancelActivityTask,
    StartTimer,
    CancelTimer,
    CompleteWorkflowExecution,
    FailWorkflowExecution,
    CancelWorkflowExecution,
    StartChildWorkflowExecution,
    RequestCancelExternalWorkflowExecution,
}

impl DecisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::ScheduleActivityTask => "schedule_activity_task",
            DecisionType::RequestCancelActivityTask => "request_cancel_activity_task",
            DecisionType::StartTimer => "start_timer",
            DecisionType::CancelTimer => "cancel_timer",
            DecisionType::CompleteWorkflowExecution => "complete_workflow_execution",
            DecisionType::FailWorkflowExecution => "fail_workflow_execution",
            DecisionType::CancelWorkflowExecution => "cancel_workflow_execution",
            DecisionType::StartChildWorkflowExecution => "start_child_workflow_execution",
            DecisionType::RequestCancelExternalWorkflowExecution => {
                "request_cancel_external_workflow_execution"
            }
        }
    }

    /// Decisions that close the workflow run.
    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            DecisionType::CompleteWorkflowExecution
                | DecisionType::FailWorkflowExecution
                | DecisionType::CancelWorkflowExecution
        )
    }
}

/// A command returned by a worker when it completes a decision task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    ScheduleActivityTask {
        activity_id: String,
        activity_type: String,
        /// Defaults to the workflow's task list.
        task_list: Option<String>,
        #[serde(default)]
        input: Payload,
        schedule_to_close_timeout_secs: u32,
        schedule_to_start_timeout_secs: u32,
        start_to_close_timeout_secs: u32,
        #[serde(default)]
        heartbeat_timeout_secs: u32,
    },
    RequestCancelActivityTask {
        activity_id: String,
    },
    StartTimer {
        timer_id: String,
        start_to_fire_timeout_secs: u32,
    },
    CancelTimer {
        timer_id: String,
    },
    CompleteWorkflowExecution {
        #[serde(default)]
        result: Payload,
    },
    FailWorkflowExecution {
        reason: String,
        #[serde(default)]
        details: Payload,
    },
    CancelWorkflowExecution {
        #[serde(default)]
        details: Payload,
    },
    StartChildWorkflowExecution {
        /// Defaults to the parent's domain.
        domain_id: Option<String>,
        workflow_id: String,
        workflow_type: String,
        task_list: Option<String>,
        #[serde(default)]
        input: Payload,
        execution_start_to_close_timeout_secs: u32,
        task_start_to_close_timeout_secs: u32,
    },
    RequestCancelExternalWorkflowExecution {
        domain_id: Option<String>,
        workflow_id: String,
        run_id: Option<String>,
    },
}

impl Decision {
    pub fn decision_type(&self) -> DecisionType {
        match self {
            Decision::ScheduleActivityTask { .. } => DecisionType::ScheduleActivityTask,
            Decision::RequestCancelActivityTask { .. } => DecisionType::RequestCancelActivityTask,
            Decision::StartTimer { .. } => DecisionType::StartTimer,
            Decision::CancelTimer { .. } => DecisionType::CancelTimer,
            Decision::CompleteWorkflowExecution { .. } => DecisionType::CompleteWorkflowExecution,
            Decision::FailWorkflowExecution { .. } => DecisionType::FailWorkflowExecution,
            Decision::CancelWorkflowExecution { .. } => DecisionType::CancelWorkflowExecution,
            Decision::StartChildWorkflowExecution { .. } => {
                DecisionType::StartChildWorkflowExecution
            }
            Decision::RequestCancelExternalWorkflowExecution { .. } => {
                DecisionType::RequestCancelExternalWorkflowExecution
            }
        }
    }
}
