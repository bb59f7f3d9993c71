use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::{CloseStatus, ParentExecutionInfo};
use crate::ids::WorkflowExecution;
use crate::Payload;

/// Which bound of a task's lifetime expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutType {
    StartToClose,
    ScheduleToStart,
    ScheduleToClose,
    Heartbeat,
}

impl TimeoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutType::StartToClose => "start_to_close",
            TimeoutType::ScheduleToStart => "schedule_to_start",
            TimeoutType::ScheduleToClose => "schedule_to_close",
            TimeoutType::Heartbeat => "heartbeat",
        }
    }
}

/// How a workflow run ended. Carried by close events and reported to parents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowCloseOutcome {
    Completed { result: Payload },
    Failed { reason: String, details: Payload },
    Canceled { details: Payload },
    Terminated { reason: String, details: Payload },
    TimedOut,
}

impl WorkflowCloseOutcome {
    pub fn close_status(&self) -> CloseStatus {
        match self {
            WorkflowCloseOutcome::Completed { .. } => CloseStatus::Completed,
            WorkflowCloseOutcome::Failed { .. } => CloseStatus::Failed,
            WorkflowCloseOutcome::Canceled { .. } => CloseStatus::Canceled,
            WorkflowCloseOutcome::Terminated { .. } => CloseStatus::Terminated,
            WorkflowCloseOutcome::TimedOut => CloseStatus::TimedOut,
        }
    }
}

/// One entry of a workflow's append-only history.
///
/// Event ids are dense and start at [`crate::FIRST_EVENT_ID`]; the mutable state
/// assigns them, the store only persists them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_id: i64,
    pub timestamp: DateTime<Utc>,
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    pub fn new(event_id: i64, timestamp: DateTime<Utc>, attributes: EventAttributes) -> Self {
        Self {
            event_id,
            timestamp,
            attributes,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.attributes.event_type()
    }
}

/// Event attributes, one variant per event type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventAttributes {
    // Workflow lifecycle
    WorkflowExecutionStarted {
        workflow_type: String,
        task_list: String,
        #[serde(default)]
        input: Payload,
        execution_start_to_close_timeout_secs: u32,
        task_start_to_close_timeout_secs: u32,
        identity: String,
        request_id: String,
        parent: Option<ParentExecutionInfo>,
    },
    WorkflowExecutionClosed {
        outcome: WorkflowCloseOutcome,
        /// Decision completion that closed the run, if a decision did.
        decision_task_completed_event_id: Option<i64>,
    },
    WorkflowExecutionCancelRequested {
        cause: String,
        request_id: String,
        identity: String,
    },
    WorkflowExecutionSignaled {
        signal_name: String,
        #[serde(default)]
        input: Payload,
        identity: String,
    },

    // Decision tasks
    DecisionTaskScheduled {
        task_list: String,
        start_to_close_timeout_secs: u32,
        attempt: u32,
    },
    DecisionTaskStarted {
        scheduled_event_id: i64,
        identity: String,
        request_id: String,
    },
    DecisionTaskCompleted {
        scheduled_event_id: i64,
        started_event_id: i64,
        identity: String,
        #[serde(default)]
        execution_context: Payload,
    },
    DecisionTaskTimedOut {
        scheduled_event_id: i64,
        started_event_id: i64,
        timeout_type: TimeoutType,
    },

    // Activity tasks
    ActivityTaskScheduled {
        activity_id: String,
        activity_type: String,
        task_list: String,
        #[serde(default)]
        input: Payload,
        schedule_to_close_timeout_secs: u32,
        schedule_to_start_timeout_secs: u32,
        start_to_close_timeout_secs: u32,
        heartbeat_timeout_secs: u32,
        decision_task_completed_event_id: i64,
    },
    ActivityTaskStarted {
        scheduled_event_id: i64,
        identity: String,
        request_id: String,
    },
    ActivityTaskCompleted {
        scheduled_event_id: i64,
        started_event_id: i64,
        #[serde(default)]
        result: Payload,
        identity: String,
    },
    ActivityTaskFailed {
        scheduled_event_id: i64,
        started_event_id: i64,
        reason: String,
        #[serde(default)]
        details: Payload,
        identity: String,
    },
    ActivityTaskTimedOut {
        scheduled_event_id: i64,
        started_event_id: Option<i64>,
        timeout_type: TimeoutType,
        #[serde(default)]
        details: Payload,
    },
    ActivityTaskCancelRequested {
        activity_id: String,
        decision_task_completed_event_id: i64,
    },
    RequestCancelActivityTaskFailed {
        activity_id: String,
        cause: String,
        decision_task_completed_event_id: i64,
    },
    ActivityTaskCanceled {
        scheduled_event_id: i64,
        started_event_id: Option<i64>,
        latest_cancel_requested_event_id: Option<i64>,
        #[serde(default)]
        details: Payload,
        identity: String,
    },

    // User timers
    TimerStarted {
        timer_id: String,
        start_to_fire_timeout_secs: u32,
        decision_task_completed_event_id: i64,
    },
    TimerFired {
        timer_id: String,
        started_event_id: i64,
    },
    TimerCanceled {
        timer_id: String,
        started_event_id: i64,
        decision_task_completed_event_id: i64,
        identity: String,
    },
    CancelTimerFailed {
        timer_id: String,
        cause: String,
        decision_task_completed_event_id: i64,
    },

    // Child workflows
    StartChildWorkflowExecutionInitiated {
        domain_id: String,
        workflow_id: String,
        workflow_type: String,
        task_list: String,
        #[serde(default)]
        input: Payload,
        execution_start_to_close_timeout_secs: u32,
        task_start_to_close_timeout_secs: u32,
        decision_task_completed_event_id: i64,
        create_request_id: String,
    },
    ChildWorkflowExecutionStarted {
        initiated_event_id: i64,
        domain_id: String,
        execution: WorkflowExecution,
    },
    StartChildWorkflowExecutionFailed {
        initiated_event_id: i64,
        domain_id: String,
        workflow_id: String,
        cause: String,
    },
    ChildWorkflowExecutionClosed {
        initiated_event_id: i64,
        started_event_id: i64,
        domain_id: String,
        execution: WorkflowExecution,
        outcome: WorkflowCloseOutcome,
    },

    // Cross-workflow cancellation
    RequestCancelExternalWorkflowExecutionInitiated {
        domain_id: String,
        workflow_id: String,
        run_id: Option<String>,
        decision_task_completed_event_id: i64,
        cancel_request_id: String,
    },
    ExternalWorkflowExecutionCancelRequested {
        initiated_event_id: i64,
        domain_id: String,
        workflow_id: String,
        run_id: Option<String>,
    },
    RequestCancelExternalWorkflowExecutionFailed {
        initiated_event_id: i64,
        domain_id: String,
        workflow_id: String,
        run_id: Option<String>,
        cause: String,
    },
}

impl EventAttributes {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventAttributes::WorkflowExecutionStarted { .. } => "WorkflowExecutionStarted",
            EventAttributes::WorkflowExecutionClosed { .. } => "WorkflowExecutionClosed",
            EventAttributes::WorkflowExecutionCancelRequested { .. } => {
                "WorkflowExecutionCancelRequested"
            }
            EventAttributes::WorkflowExecutionSignaled { .. } => "WorkflowExecutionSignaled",
            EventAttributes::DecisionTaskScheduled { .. } => "DecisionTaskScheduled",
            EventAttributes::DecisionTaskStarted { .. } => "DecisionTaskStarted",
            EventAttributes::DecisionTaskCompleted { .. } => "DecisionTaskCompleted",
            EventAttributes::DecisionTaskTimedOut { .. } => "DecisionTaskTimedOut",
            EventAttributes::ActivityTaskScheduled { .. } => "ActivityTaskScheduled",
            EventAttributes::ActivityTaskStarted { .. } => "ActivityTaskStarted",
            EventAttributes::ActivityTaskCompleted { .. } => "ActivityTaskCompleted",
            EventAttributes::ActivityTaskFailed { .. } => "ActivityTaskFailed",
            EventAttributes::ActivityTaskTimedOut { .. } => "ActivityTaskTimedOut",
            EventAttributes::ActivityTaskCancelRequested { .. } => "ActivityTaskCancelRequested",
            EventAttributes::RequestCancelActivityTaskFailed { .. } => {
                "RequestCancelActivityTaskFailed"
            }
            EventAttributes::ActivityTaskCanceled { .. } => "ActivityTaskCanceled",
            EventAttributes::TimerStarted { .. } => "TimerStarted",
            EventAttributes::TimerFired { .. } => "TimerFired",
            EventAttributes::TimerCanceled { .. } => "TimerCanceled",
            EventAttributes::CancelTimerFailed { .. } => "CancelTimerFailed",
            EventAttributes::StartChildWorkflowExecutionInitiated { .. } => {
                "StartChildWorkflowExecutionInitiated"
            }
            EventAttributes::ChildWorkflowExecutionStarted { .. } => {
                "ChildWorkflowExecutionStarted"
            }
            EventAttributes::StartChildWorkflowExecutionFailed { .. } => {
                "StartChildWorkflowExecutionFailed"
            }
            EventAttributes::ChildWorkflowExecutionClosed { .. } => "ChildWorkflowExecutionClosed",
            EventAttributes::RequestCancelExternalWorkflowExecutionInitiated { .. } => {
                "RequestCancelExternalWorkflowExecutionInitiated"
            }
            EventAttributes::ExternalWorkflowExecutionCancelRequested { .. } => {
                "ExternalWorkflowExecutionCancelRequested"
            }
            EventAttributes::RequestCancelExternalWorkflowExecutionFailed { .. } => {
                "RequestCancelExternalWorkflowExecutionFailed"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = HistoryEvent::new(
            3,
            Utc::now(),
            EventAttributes::TimerFired {
                timer_id: "t1".into(),
                started_event_id: 2,
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["attributes"]["type"], "timer_fired");
        assert_eq!(event.event_type(), "TimerFired");

        let back: HistoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn close_outcome_maps_to_status() {
        assert_eq!(
            WorkflowCloseOutcome::TimedOut.close_status(),
            CloseStatus::TimedOut
        );
        assert_eq!(
            WorkflowCloseOutcome::Completed { result: vec![] }.close_status(),
            CloseStatus::Completed
        );
    }
}
