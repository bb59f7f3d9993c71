//! Request and response shapes for the persistence managers.

use history_types::{
    ActivityInfo, ChildExecutionInfo, CloseStatus, ExecutionKey, HistoryEvent,
    RequestCancelInfo, TimerInfo, TimerTaskInfo, TransferTaskInfo, WorkflowMutableState,
    WorkflowState,
};
use serde::{Deserialize, Serialize};

/// Pointer from (domain, workflow id) to the latest run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentExecution {
    pub run_id: String,
    pub start_request_id: String,
    pub state: WorkflowState,
    pub close_status: CloseStatus,
}

#[derive(Clone, Debug)]
pub struct CreateWorkflowExecutionRequest {
    pub request_id: String,
    pub range_id: i64,
    pub state: WorkflowMutableState,
    pub transfer_tasks: Vec<TransferTaskInfo>,
    pub timer_tasks: Vec<TimerTaskInfo>,
}

/// Atomic update of one execution family.
///
/// Applied only if the stored `next_event_id` equals `condition` and the
/// shard still holds `range_id`.
#[derive(Clone, Debug)]
pub struct UpdateWorkflowExecutionRequest {
    pub execution_info: history_types::WorkflowExecutionInfo,
    pub condition: i64,
    pub range_id: i64,
    pub transfer_tasks: Vec<TransferTaskInfo>,
    pub timer_tasks: Vec<TimerTaskInfo>,
    pub upsert_activity_infos: Vec<ActivityInfo>,
    pub delete_activity_infos: Vec<i64>,
    pub upsert_timer_infos: Vec<TimerInfo>,
    pub delete_timer_infos: Vec<String>,
    pub upsert_child_execution_infos: Vec<ChildExecutionInfo>,
    pub delete_child_execution_infos: Vec<i64>,
    pub upsert_request_cancel_infos: Vec<RequestCancelInfo>,
    pub delete_request_cancel_infos: Vec<i64>,
}

impl UpdateWorkflowExecutionRequest {
    pub fn new(
        execution_info: history_types::WorkflowExecutionInfo,
        condition: i64,
        range_id: i64,
    ) -> Self {
        Self {
            execution_info,
            condition,
            range_id,
            transfer_tasks: Vec::new(),
            timer_tasks: Vec::new(),
            upsert_activity_infos: Vec::new(),
            delete_activity_infos: Vec::new(),
            upsert_timer_infos: Vec::new(),
            delete_timer_infos: Vec::new(),
            upsert_child_execution_infos: Vec::new(),
            delete_child_execution_infos: Vec::new(),
            upsert_request_cancel_infos: Vec::new(),
            delete_request_cancel_infos: Vec::new(),
        }
    }

    pub fn execution(&self) -> ExecutionKey {
        self.execution_info.key()
    }
}

/// One history batch.
///
/// Batches are keyed by (execution, first event id). Re-appending the same key
/// with a higher `transaction_id` replaces an orphan left by a failed attempt.
#[derive(Clone, Debug)]
pub struct AppendHistoryEventsRequest {
    pub execution: ExecutionKey,
    pub first_event_id: i64,
    pub range_id: i64,
    pub transaction_id: i64,
    pub events: Vec<HistoryEvent>,
}
