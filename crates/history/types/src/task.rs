use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::TimeoutType;
use crate::ids::ExecutionKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferTaskType {
    ActivityTask,
    DecisionTask,
    DeleteExecution,
    CancelExecution,
    StartChildExecution,
}

impl TransferTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferTaskType::ActivityTask => "activity_task",
            TransferTaskType::DecisionTask => "decision_task",
            TransferTaskType::DeleteExecution => "delete_execution",
            TransferTaskType::CancelExecution => "cancel_execution",
            TransferTaskType::StartChildExecution => "start_child_execution",
        }
    }
}

/// A deferred side effect produced by a commit, before the shard assigns its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferTaskKind {
    ActivityTask {
        target_domain_id: String,
        task_list: String,
        schedule_id: i64,
    },
    DecisionTask {
        target_domain_id: String,
        task_list: String,
        schedule_id: i64,
    },
    DeleteExecution,
    CancelExecution {
        target_domain_id: String,
        target_workflow_id: String,
        target_run_id: Option<String>,
        initiated_id: i64,
    },
    StartChildExecution {
        target_domain_id: String,
        target_workflow_id: String,
        initiated_id: i64,
    },
}

impl TransferTaskKind {
    pub fn task_type(&self) -> TransferTaskType {
        match self {
            TransferTaskKind::ActivityTask { .. } => TransferTaskType::ActivityTask,
            TransferTaskKind::DecisionTask { .. } => TransferTaskType::DecisionTask,
            TransferTaskKind::DeleteExecution => TransferTaskType::DeleteExecution,
            TransferTaskKind::CancelExecution { .. } => TransferTaskType::CancelExecution,
            TransferTaskKind::StartChildExecution { .. } => TransferTaskType::StartChildExecution,
        }
    }
}

/// Persisted transfer task row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTaskInfo {
    pub execution: ExecutionKey,
    pub task_id: i64,
    pub kind: TransferTaskKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerTaskType {
    DecisionTimeout,
    ActivityTimeout,
    UserTimer,
    WorkflowTimeout,
}

impl TimerTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerTaskType::DecisionTimeout => "decision_timeout",
            TimerTaskType::ActivityTimeout => "activity_timeout",
            TimerTaskType::UserTimer => "user_timer",
            TimerTaskType::WorkflowTimeout => "workflow_timeout",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerTaskKind {
    DecisionTimeout {
        schedule_id: i64,
        timeout_type: TimeoutType,
    },
    ActivityTimeout {
        schedule_id: i64,
        timeout_type: TimeoutType,
    },
    UserTimer {
        started_event_id: i64,
    },
    WorkflowTimeout,
}

impl TimerTaskKind {
    pub fn task_type(&self) -> TimerTaskType {
        match self {
            TimerTaskKind::DecisionTimeout { .. } => TimerTaskType::DecisionTimeout,
            TimerTaskKind::ActivityTimeout { .. } => TimerTaskType::ActivityTimeout,
            TimerTaskKind::UserTimer { .. } => TimerTaskType::UserTimer,
            TimerTaskKind::WorkflowTimeout => TimerTaskType::WorkflowTimeout,
        }
    }

    /// History event the timer refers to.
    pub fn event_id(&self) -> Option<i64> {
        match self {
            TimerTaskKind::DecisionTimeout { schedule_id, .. }
            | TimerTaskKind::ActivityTimeout { schedule_id, .. } => Some(*schedule_id),
            TimerTaskKind::UserTimer { started_event_id } => Some(*started_event_id),
            TimerTaskKind::WorkflowTimeout => None,
        }
    }
}

/// A timer task produced by a commit, before the shard assigns its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTimerTask {
    pub visibility_timestamp: DateTime<Utc>,
    pub kind: TimerTaskKind,
}

/// Total order of the timer queue: visibility timestamp, then task id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerSequenceId {
    pub visibility_timestamp: DateTime<Utc>,
    pub task_id: i64,
}

impl TimerSequenceId {
    pub fn new(visibility_timestamp: DateTime<Utc>, task_id: i64) -> Self {
        Self {
            visibility_timestamp,
            task_id,
        }
    }
}

impl std::fmt::Display for TimerSequenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.visibility_timestamp.to_rfc3339(), self.task_id)
    }
}

/// Persisted timer task row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerTaskInfo {
    pub execution: ExecutionKey,
    pub visibility_timestamp: DateTime<Utc>,
    pub task_id: i64,
    pub kind: TimerTaskKind,
}

impl TimerTaskInfo {
    pub fn sequence_id(&self) -> TimerSequenceId {
        TimerSequenceId::new(self.visibility_timestamp, self.task_id)
    }
}
