use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ExecutionKey, ShardId, WorkflowExecution, FIRST_EVENT_ID};
use crate::Payload;

/// Ownership lease over a partition of workflow executions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub shard_id: ShardId,
    pub owner: String,
    /// Fencing token. Strictly increases on every ownership change or range renewal.
    pub range_id: i64,
    /// Diagnostic counter: ownership changes observed since the last renewal by the same owner.
    pub stolen_since_renew: u32,
    pub updated_at: DateTime<Utc>,
    /// Highest transfer task id below which every task is complete.
    pub transfer_ack_level: i64,
    /// Visibility timestamp below which every timer task is complete.
    pub timer_ack_level: DateTime<Utc>,
}

impl ShardInfo {
    pub fn new(shard_id: ShardId, owner: impl Into<String>) -> Self {
        Self {
            shard_id,
            owner: owner.into(),
            range_id: 0,
            stolen_since_renew: 0,
            updated_at: Utc::now(),
            transfer_ack_level: 0,
            timer_ack_level: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Created,
    Running,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseStatus {
    None,
    Completed,
    Failed,
    Canceled,
    Terminated,
    TimedOut,
}

/// Link from a child run back to the decision that started it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentExecutionInfo {
    pub domain_id: String,
    pub execution: WorkflowExecution,
    pub initiated_id: i64,
}

/// Execution row: the scalar part of a workflow's mutable state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecutionInfo {
    pub domain_id: String,
    pub workflow_id: String,
    pub run_id: String,
    pub parent: Option<ParentExecutionInfo>,
    pub task_list: String,
    pub workflow_type: String,
    pub execution_start_to_close_timeout_secs: u32,
    pub decision_start_to_close_timeout_secs: u32,
    pub execution_context: Payload,
    pub state: WorkflowState,
    pub close_status: CloseStatus,
    pub next_event_id: i64,
    pub last_processed_event_id: Option<i64>,
    pub start_time: DateTime<Utc>,
    pub last_updated_time: DateTime<Utc>,
    pub create_request_id: String,
    pub decision_schedule_id: Option<i64>,
    pub decision_started_id: Option<i64>,
    pub decision_request_id: Option<String>,
    pub decision_timeout_secs: u32,
    pub decision_attempt: u32,
    pub cancel_requested: bool,
    pub cancel_request_id: Option<String>,
}

impl WorkflowExecutionInfo {
    pub fn new(key: &ExecutionKey, now: DateTime<Utc>) -> Self {
        Self {
            domain_id: key.domain_id.clone(),
            workflow_id: key.workflow_id.clone(),
            run_id: key.run_id.clone(),
            parent: None,
            task_list: String::new(),
            workflow_type: String::new(),
            execution_start_to_close_timeout_secs: 0,
            decision_start_to_close_timeout_secs: 0,
            execution_context: Vec::new(),
            state: WorkflowState::Created,
            close_status: CloseStatus::None,
            next_event_id: FIRST_EVENT_ID,
            last_processed_event_id: None,
            start_time: now,
            last_updated_time: now,
            create_request_id: String::new(),
            decision_schedule_id: None,
            decision_started_id: None,
            decision_request_id: None,
            decision_timeout_secs: 0,
            decision_attempt: 0,
            cancel_requested: false,
            cancel_request_id: None,
        }
    }

    pub fn key(&self) -> ExecutionKey {
        ExecutionKey::new(
            self.domain_id.clone(),
            self.workflow_id.clone(),
            self.run_id.clone(),
        )
    }

    pub fn is_running(&self) -> bool {
        self.state != WorkflowState::Completed
    }
}

/// An activity scheduled by a decision and not yet closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInfo {
    pub schedule_id: i64,
    pub scheduled_time: DateTime<Utc>,
    pub started_id: Option<i64>,
    pub started_time: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub activity_id: String,
    pub activity_type: String,
    pub task_list: String,
    pub schedule_to_start_timeout_secs: u32,
    pub schedule_to_close_timeout_secs: u32,
    pub start_to_close_timeout_secs: u32,
    pub heartbeat_timeout_secs: u32,
    pub cancel_requested: bool,
    pub cancel_request_id: Option<i64>,
    pub last_heartbeat_time: Option<DateTime<Utc>>,
    pub details: Payload,
}

/// A user timer started by a decision and not yet fired or canceled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerInfo {
    pub timer_id: String,
    pub started_event_id: i64,
    pub expiry_time: DateTime<Utc>,
    /// Id of the timer task that wakes this timer, once the shard has assigned it.
    pub task_id: Option<i64>,
}

/// A child workflow initiated by a decision and not yet closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildExecutionInfo {
    pub initiated_id: i64,
    pub started_id: Option<i64>,
    pub domain_id: String,
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub workflow_type: String,
    pub task_list: String,
    pub input: Payload,
    pub execution_start_to_close_timeout_secs: u32,
    pub task_start_to_close_timeout_secs: u32,
    pub create_request_id: String,
}

/// A cancellation request sent to another workflow and not yet acknowledged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCancelInfo {
    pub initiated_id: i64,
    pub domain_id: String,
    pub workflow_id: String,
    pub run_id: Option<String>,
    pub cancel_request_id: String,
}

/// Persisted execution family: the execution row plus every embedded pending map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMutableState {
    pub execution_info: WorkflowExecutionInfo,
    pub activity_infos: HashMap<i64, ActivityInfo>,
    pub timer_infos: HashMap<String, TimerInfo>,
    pub child_execution_infos: HashMap<i64, ChildExecutionInfo>,
    pub request_cancel_infos: HashMap<i64, RequestCancelInfo>,
}

impl WorkflowMutableState {
    pub fn new(execution_info: WorkflowExecutionInfo) -> Self {
        Self {
            execution_info,
            activity_infos: HashMap::new(),
            timer_infos: HashMap::new(),
            child_execution_infos: HashMap::new(),
            request_cancel_infos: HashMap::new(),
        }
    }
}
