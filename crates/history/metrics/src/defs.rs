//! Scope and metric catalog.

/// Operation scope; becomes the `operation` label of every sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    // Persistence
    PersistenceCreateShard,
    PersistenceGetShard,
    PersistenceUpdateShard,
    PersistenceCreateWorkflowExecution,
    PersistenceGetWorkflowExecution,
    PersistenceUpdateWorkflowExecution,
    PersistenceDeleteWorkflowExecution,
    PersistenceGetCurrentExecution,
    PersistenceGetTransferTasks,
    PersistenceCompleteTransferTask,
    PersistenceGetTimerIndexTasks,
    PersistenceCompleteTimerTask,
    PersistenceAppendHistoryEvents,
    PersistenceGetWorkflowExecutionHistory,
    PersistenceDeleteWorkflowExecutionHistory,

    // Outbound clients
    MatchingClientAddActivityTask,
    MatchingClientAddDecisionTask,
    HistoryClientStartWorkflowExecution,
    HistoryClientScheduleDecisionTask,
    HistoryClientRequestCancelWorkflowExecution,
    HistoryClientRecordChildExecutionCompleted,

    // History engine API
    HistoryStartWorkflowExecution,
    HistoryGetWorkflowExecutionNextEventId,
    HistoryRecordDecisionTaskStarted,
    HistoryRespondDecisionTaskCompleted,
    HistoryRecordActivityTaskStarted,
    HistoryRecordActivityTaskHeartbeat,
    HistoryRespondActivityTaskCompleted,
    HistoryRespondActivityTaskFailed,
    HistoryRespondActivityTaskCanceled,
    HistorySignalWorkflowExecution,
    HistoryRequestCancelWorkflowExecution,
    HistoryTerminateWorkflowExecution,
    HistoryScheduleDecisionTask,
    HistoryRecordChildExecutionCompleted,
    HistoryGetWorkflowExecutionHistory,

    // Queue processors
    TransferQueueProcessor,
    TransferTaskActivity,
    TransferTaskDecision,
    TransferTaskDeleteExecution,
    TransferTaskCancelExecution,
    TransferTaskStartChildExecution,
    TimerQueueProcessor,
    TimerTaskDecisionTimeout,
    TimerTaskActivityTimeout,
    TimerTaskUserTimer,
    TimerTaskWorkflowTimeout,

    // Shard lifecycle
    ShardContext,
    ExecutionCache,
}

impl Scope {
    pub fn operation(&self) -> &'static str {
        match self {
            Scope::PersistenceCreateShard => "CreateShard",
            Scope::PersistenceGetShard => "GetShard",
            Scope::PersistenceUpdateShard => "UpdateShard",
            Scope::PersistenceCreateWorkflowExecution => "CreateWorkflowExecution",
            Scope::PersistenceGetWorkflowExecution => "GetWorkflowExecution",
            Scope::PersistenceUpdateWorkflowExecution => "UpdateWorkflowExecution",
            Scope::PersistenceDeleteWorkflowExecution => "DeleteWorkflowExecution",
            Scope::PersistenceGetCurrentExecution => "GetCurrentExecution",
            Scope::PersistenceGetTransferTasks => "GetTransferTasks",
            Scope::PersistenceCompleteTransferTask => "CompleteTransferTask",
            Scope::PersistenceGetTimerIndexTasks => "GetTimerIndexTasks",
            Scope::PersistenceCompleteTimerTask => "CompleteTimerTask",
            Scope::PersistenceAppendHistoryEvents => "AppendHistoryEvents",
            Scope::PersistenceGetWorkflowExecutionHistory => "GetWorkflowExecutionHistory",
            Scope::PersistenceDeleteWorkflowExecutionHistory => "DeleteWorkflowExecutionHistory",
            Scope::MatchingClientAddActivityTask => "MatchingClientAddActivityTask",
            Scope::MatchingClientAddDecisionTask => "MatchingClientAddDecisionTask",
            Scope::HistoryClientStartWorkflowExecution => "HistoryClientStartWorkflowExecution",
            Scope::HistoryClientScheduleDecisionTask => "HistoryClientScheduleDecisionTask",
            Scope::HistoryClientRequestCancelWorkflowExecution => {
                "HistoryClientRequestCancelWorkflowExecution"
            }
            Scope::HistoryClientRecordChildExecutionCompleted => {
                "HistoryClientRecordChildExecutionCompleted"
            }
            Scope::HistoryStartWorkflowExecution => "StartWorkflowExecution",
            Scope::HistoryGetWorkflowExecutionNextEventId => "GetWorkflowExecutionNextEventID",
            Scope::HistoryRecordDecisionTaskStarted => "RecordDecisionTaskStarted",
            Scope::HistoryRespondDecisionTaskCompleted => "RespondDecisionTaskCompleted",
            Scope::HistoryRecordActivityTaskStarted => "RecordActivityTaskStarted",
            Scope::HistoryRecordActivityTaskHeartbeat => "RecordActivityTaskHeartbeat",
            Scope::HistoryRespondActivityTaskCompleted => "RespondActivityTaskCompleted",
            Scope::HistoryRespondActivityTaskFailed => "RespondActivityTaskFailed",
            Scope::HistoryRespondActivityTaskCanceled => "RespondActivityTaskCanceled",
            Scope::HistorySignalWorkflowExecution => "SignalWorkflowExecution",
            Scope::HistoryRequestCancelWorkflowExecution => "RequestCancelWorkflowExecution",
            Scope::HistoryTerminateWorkflowExecution => "TerminateWorkflowExecution",
            Scope::HistoryScheduleDecisionTask => "ScheduleDecisionTask",
            Scope::HistoryRecordChildExecutionCompleted => "RecordChildExecutionCompleted",
            Scope::HistoryGetWorkflowExecutionHistory => "GetWorkflowExecutionHistory",
            Scope::TransferQueueProcessor => "TransferQueueProcessor",
            Scope::TransferTaskActivity => "TransferTaskActivity",
            Scope::TransferTaskDecision => "TransferTaskDecision",
            Scope::TransferTaskDeleteExecution => "TransferTaskDeleteExecution",
            Scope::TransferTaskCancelExecution => "TransferTaskCancelExecution",
            Scope::TransferTaskStartChildExecution => "TransferTaskStartChildExecution",
            Scope::TimerQueueProcessor => "TimerQueueProcessor",
            Scope::TimerTaskDecisionTimeout => "TimerTaskDecisionTimeout",
            Scope::TimerTaskActivityTimeout => "TimerTaskActivityTimeout",
            Scope::TimerTaskUserTimer => "TimerTaskUserTimer",
            Scope::TimerTaskWorkflowTimeout => "TimerTaskWorkflowTimeout",
            Scope::ShardContext => "ShardContext",
            Scope::ExecutionCache => "ExecutionCache",
        }
    }
}

/// Counter metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Counter {
    HistoryRequests,
    HistoryFailures,
    ErrBadRequest,
    ErrEntityNotExists,
    ErrExecutionAlreadyStarted,
    ErrEventAlreadyStarted,
    ErrShardOwnershipLost,

    PersistenceRequests,
    PersistenceFailures,
    PersistenceErrShardExists,
    PersistenceErrShardOwnershipLost,
    PersistenceErrConditionFailed,
    PersistenceErrTimeout,

    TaskRequests,
    TaskFailures,
    AckLevelUpdate,
    AckLevelUpdateFailed,

    DecisionTypeScheduleActivity,
    DecisionTypeRequestCancelActivity,
    DecisionTypeStartTimer,
    DecisionTypeCancelTimer,
    DecisionTypeCompleteWorkflow,
    DecisionTypeFailWorkflow,
    DecisionTypeCancelWorkflow,
    DecisionTypeChildWorkflow,
    DecisionTypeCancelExternalWorkflow,
    MultipleCompletionDecisions,
    FailedDecisions,

    StaleMutableState,
    ConcurrencyUpdateFailure,
}

impl Counter {
    pub(crate) const ALL: [Counter; 30] = [
        Counter::HistoryRequests,
        Counter::HistoryFailures,
        Counter::ErrBadRequest,
        Counter::ErrEntityNotExists,
        Counter::ErrExecutionAlreadyStarted,
        Counter::ErrEventAlreadyStarted,
        Counter::ErrShardOwnershipLost,
        Counter::PersistenceRequests,
        Counter::PersistenceFailures,
        Counter::PersistenceErrShardExists,
        Counter::PersistenceErrShardOwnershipLost,
        Counter::PersistenceErrConditionFailed,
        Counter::PersistenceErrTimeout,
        Counter::TaskRequests,
        Counter::TaskFailures,
        Counter::AckLevelUpdate,
        Counter::AckLevelUpdateFailed,
        Counter::DecisionTypeScheduleActivity,
        Counter::DecisionTypeRequestCancelActivity,
        Counter::DecisionTypeStartTimer,
        Counter::DecisionTypeCancelTimer,
        Counter::DecisionTypeCompleteWorkflow,
        Counter::DecisionTypeFailWorkflow,
        Counter::DecisionTypeCancelWorkflow,
        Counter::DecisionTypeChildWorkflow,
        Counter::DecisionTypeCancelExternalWorkflow,
        Counter::MultipleCompletionDecisions,
        Counter::FailedDecisions,
        Counter::StaleMutableState,
        Counter::ConcurrencyUpdateFailure,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Counter::HistoryRequests => "history_requests_total",
            Counter::HistoryFailures => "history_errors_total",
            Counter::ErrBadRequest => "history_errors_bad_request_total",
            Counter::ErrEntityNotExists => "history_errors_entity_not_exists_total",
            Counter::ErrExecutionAlreadyStarted => {
                "history_errors_execution_already_started_total"
            }
            Counter::ErrEventAlreadyStarted => "history_errors_event_already_started_total",
            Counter::ErrShardOwnershipLost => "history_errors_shard_ownership_lost_total",
            Counter::PersistenceRequests => "persistence_requests_total",
            Counter::PersistenceFailures => "persistence_errors_total",
            Counter::PersistenceErrShardExists => "persistence_errors_shard_exists_total",
            Counter::PersistenceErrShardOwnershipLost => {
                "persistence_errors_shard_ownership_lost_total"
            }
            Counter::PersistenceErrConditionFailed => "persistence_errors_condition_failed_total",
            Counter::PersistenceErrTimeout => "persistence_errors_timeout_total",
            Counter::TaskRequests => "task_requests_total",
            Counter::TaskFailures => "task_errors_total",
            Counter::AckLevelUpdate => "ack_level_update_total",
            Counter::AckLevelUpdateFailed => "ack_level_update_failed_total",
            Counter::DecisionTypeScheduleActivity => "schedule_activity_decision_total",
            Counter::DecisionTypeRequestCancelActivity => "cancel_activity_decision_total",
            Counter::DecisionTypeStartTimer => "start_timer_decision_total",
            Counter::DecisionTypeCancelTimer => "cancel_timer_decision_total",
            Counter::DecisionTypeCompleteWorkflow => "complete_workflow_decision_total",
            Counter::DecisionTypeFailWorkflow => "fail_workflow_decision_total",
            Counter::DecisionTypeCancelWorkflow => "cancel_workflow_decision_total",
            Counter::DecisionTypeChildWorkflow => "child_workflow_decision_total",
            Counter::DecisionTypeCancelExternalWorkflow => {
                "cancel_external_workflow_decision_total"
            }
            Counter::MultipleCompletionDecisions => "multiple_completion_decisions_total",
            Counter::FailedDecisions => "failed_decisions_total",
            Counter::StaleMutableState => "stale_mutable_state_total",
            Counter::ConcurrencyUpdateFailure => "concurrency_update_failure_total",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Counter::HistoryRequests => "History engine requests",
            Counter::HistoryFailures => "History engine requests that failed",
            Counter::ErrBadRequest => "Requests rejected as invalid",
            Counter::ErrEntityNotExists => "Requests for executions or tasks that do not exist",
            Counter::ErrExecutionAlreadyStarted => "Start requests for running workflows",
            Counter::ErrEventAlreadyStarted => "Start requests for already started tasks",
            Counter::ErrShardOwnershipLost => "Requests failed because the shard was stolen",
            Counter::PersistenceRequests => "Persistence requests",
            Counter::PersistenceFailures => "Persistence requests that failed",
            Counter::PersistenceErrShardExists => "Shard creations that found an existing row",
            Counter::PersistenceErrShardOwnershipLost => "Writes fenced by a newer range id",
            Counter::PersistenceErrConditionFailed => "Conditional writes that lost the race",
            Counter::PersistenceErrTimeout => "Persistence requests that timed out",
            Counter::TaskRequests => "Queue tasks processed",
            Counter::TaskFailures => "Queue task attempts that failed",
            Counter::AckLevelUpdate => "Ack level advances persisted",
            Counter::AckLevelUpdateFailed => "Ack level advances that failed to persist",
            Counter::DecisionTypeScheduleActivity => "Schedule activity decisions",
            Counter::DecisionTypeRequestCancelActivity => "Request cancel activity decisions",
            Counter::DecisionTypeStartTimer => "Start timer decisions",
            Counter::DecisionTypeCancelTimer => "Cancel timer decisions",
            Counter::DecisionTypeCompleteWorkflow => "Complete workflow decisions",
            Counter::DecisionTypeFailWorkflow => "Fail workflow decisions",
            Counter::DecisionTypeCancelWorkflow => "Cancel workflow decisions",
            Counter::DecisionTypeChildWorkflow => "Start child workflow decisions",
            Counter::DecisionTypeCancelExternalWorkflow => "Cancel external workflow decisions",
            Counter::MultipleCompletionDecisions => "Decision batches closing the run twice",
            Counter::FailedDecisions => "Decision batches rejected",
            Counter::StaleMutableState => "Cached mutable states reloaded as stale",
            Counter::ConcurrencyUpdateFailure => "Execution updates rejected by a concurrent writer",
        }
    }
}

/// Latency histograms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timer {
    HistoryLatency,
    PersistenceLatency,
    TaskLatency,
}

impl Timer {
    pub(crate) const ALL: [Timer; 3] = [
        Timer::HistoryLatency,
        Timer::PersistenceLatency,
        Timer::TaskLatency,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Timer::HistoryLatency => "history_latency_seconds",
            Timer::PersistenceLatency => "persistence_latency_seconds",
            Timer::TaskLatency => "task_latency_seconds",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Timer::HistoryLatency => "History engine request latency",
            Timer::PersistenceLatency => "Persistence request latency",
            Timer::TaskLatency => "Queue task processing latency",
        }
    }
}
