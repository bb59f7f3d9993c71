//! Shared data model for the workflow history service.
//!
//! Everything persisted by a shard lives here:
//! - Shard rows carrying the fencing token (`range_id`) and queue ack levels
//! - Execution rows with their embedded pending-entity maps
//! - History events, the append-only log a mutable state is rebuilt from
//! - Transfer and timer tasks, the deferred side effects of a commit
//!
//! The types carry no behavior beyond small accessors; mutation rules live in
//! the engine crate.

pub mod decision;
pub mod event;
pub mod execution;
pub mod ids;
pub mod task;

pub use decision::{Decision, DecisionType};
pub use event::{EventAttributes, HistoryEvent, TimeoutType, WorkflowCloseOutcome};
pub use execution::{
    ActivityInfo, ChildExecutionInfo, CloseStatus, ParentExecutionInfo, RequestCancelInfo,
    ShardInfo, TimerInfo, WorkflowExecutionInfo, WorkflowMutableState, WorkflowState,
};
pub use ids::{new_run_id, ExecutionKey, ShardId, WorkflowExecution, FIRST_EVENT_ID};
pub use task::{
    NewTimerTask, TimerSequenceId, TimerTaskInfo, TimerTaskKind, TimerTaskType, TransferTaskInfo,
    TransferTaskKind, TransferTaskType,
};

/// Opaque user payload (workflow input, activity result, heartbeat details, ...).
pub type Payload = Vec<u8>;
