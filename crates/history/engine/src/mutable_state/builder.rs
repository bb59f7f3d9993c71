//! Typed mutators. Each one validates, appends one event and derives tasks.

use chrono::{DateTime, Duration, Utc};
use history_types::{
    ActivityInfo, ChildExecutionInfo, EventAttributes, HistoryEvent, NewTimerTask,
    ParentExecutionInfo, Payload, RequestCancelInfo, TimeoutType, TimerInfo, TimerTaskKind,
    TransferTaskKind, WorkflowCloseOutcome, WorkflowExecution,
};

use super::{DecisionInfo, MutableState};
use crate::error::{HistoryError, Result};

#[derive(Clone, Debug)]
pub struct StartWorkflowParams {
    pub workflow_type: String,
    pub task_list: String,
    pub input: Payload,
    pub execution_start_to_close_timeout_secs: u32,
    pub task_start_to_close_timeout_secs: u32,
    pub identity: String,
    pub request_id: String,
    pub parent: Option<ParentExecutionInfo>,
}

#[derive(Clone, Debug)]
pub struct ScheduleActivityParams {
    pub activity_id: String,
    pub activity_type: String,
    pub task_list: String,
    pub input: Payload,
    pub schedule_to_close_timeout_secs: u32,
    pub schedule_to_start_timeout_secs: u32,
    pub start_to_close_timeout_secs: u32,
    pub heartbeat_timeout_secs: u32,
}

#[derive(Clone, Debug)]
pub struct StartChildParams {
    pub domain_id: String,
    pub workflow_id: String,
    pub workflow_type: String,
    pub task_list: String,
    pub input: Payload,
    pub execution_start_to_close_timeout_secs: u32,
    pub task_start_to_close_timeout_secs: u32,
}

fn after(ts: DateTime<Utc>, secs: u32) -> DateTime<Utc> {
    ts + Duration::seconds(i64::from(secs))
}

impl MutableState {
    fn append(&mut self, attributes: EventAttributes) -> Result<HistoryEvent> {
        let event = HistoryEvent::new(
            self.execution_info.next_event_id,
            self.clock.now(),
            attributes,
        );
        self.apply(&event)?;
        self.history_buffer.push(event.clone());
        Ok(event)
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.is_running() {
            return Err(HistoryError::invalid(format!(
                "workflow execution {} already completed",
                self.key()
            )));
        }
        Ok(())
    }

    /// Decision-driven events must reference the decision completion being applied.
    fn ensure_decision_window(&self, decision_completed_id: i64) -> Result<()> {
        if self.decision_completion != Some(decision_completed_id) {
            return Err(HistoryError::invalid(format!(
                "event {} is not an open decision completion",
                decision_completed_id
            )));
        }
        Ok(())
    }

    fn add_timer_task(&mut self, visibility_timestamp: DateTime<Utc>, kind: TimerTaskKind) {
        self.timer_tasks.push(NewTimerTask {
            visibility_timestamp,
            kind,
        });
    }

    // Workflow lifecycle

    pub fn add_workflow_execution_started_event(
        &mut self,
        params: StartWorkflowParams,
    ) -> Result<HistoryEvent> {
        let timeout = params.execution_start_to_close_timeout_secs;
        let event = self.append(EventAttributes::WorkflowExecutionStarted {
            workflow_type: params.workflow_type,
            task_list: params.task_list,
            input: params.input,
            execution_start_to_close_timeout_secs: timeout,
            task_start_to_close_timeout_secs: params.task_start_to_close_timeout_secs,
            identity: params.identity,
            request_id: params.request_id,
            parent: params.parent,
        })?;
        if timeout > 0 {
            self.add_timer_task(after(event.timestamp, timeout), TimerTaskKind::WorkflowTimeout);
        }
        Ok(event)
    }

    pub fn add_workflow_execution_cancel_requested_event(
        &mut self,
        cause: impl Into<String>,
        request_id: impl Into<String>,
        identity: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        if self.execution_info.cancel_requested {
            return Err(HistoryError::invalid("cancellation already requested"));
        }
        self.append(EventAttributes::WorkflowExecutionCancelRequested {
            cause: cause.into(),
            request_id: request_id.into(),
            identity: identity.into(),
        })
    }

    pub fn add_workflow_execution_signaled(
        &mut self,
        signal_name: impl Into<String>,
        input: Payload,
        identity: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        self.append(EventAttributes::WorkflowExecutionSignaled {
            signal_name: signal_name.into(),
            input,
            identity: identity.into(),
        })
    }

    pub fn add_completed_workflow_event(
        &mut self,
        decision_completed_id: i64,
        result: Payload,
    ) -> Result<HistoryEvent> {
        self.close(
            WorkflowCloseOutcome::Completed { result },
            Some(decision_completed_id),
        )
    }

    pub fn add_fail_workflow_event(
        &mut self,
        decision_completed_id: i64,
        reason: impl Into<String>,
        details: Payload,
    ) -> Result<HistoryEvent> {
        self.close(
            WorkflowCloseOutcome::Failed {
                reason: reason.into(),
                details,
            },
            Some(decision_completed_id),
        )
    }

    pub fn add_workflow_canceled_event(
        &mut self,
        decision_completed_id: i64,
        details: Payload,
    ) -> Result<HistoryEvent> {
        if !self.execution_info.cancel_requested {
            return Err(HistoryError::invalid("workflow cancellation was not requested"));
        }
        self.close(
            WorkflowCloseOutcome::Canceled { details },
            Some(decision_completed_id),
        )
    }

    pub fn add_workflow_terminated_event(
        &mut self,
        reason: impl Into<String>,
        details: Payload,
    ) -> Result<HistoryEvent> {
        self.close(
            WorkflowCloseOutcome::Terminated {
                reason: reason.into(),
                details,
            },
            None,
        )
    }

    pub fn add_timeout_workflow_event(&mut self) -> Result<HistoryEvent> {
        self.close(WorkflowCloseOutcome::TimedOut, None)
    }

    fn close(
        &mut self,
        outcome: WorkflowCloseOutcome,
        decision_completed_id: Option<i64>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        if let Some(id) = decision_completed_id {
            self.ensure_decision_window(id)?;
        }
        let event = self.append(EventAttributes::WorkflowExecutionClosed {
            outcome,
            decision_task_completed_event_id: decision_completed_id,
        })?;
        self.transfer_tasks.push(TransferTaskKind::DeleteExecution);
        Ok(event)
    }

    // Decision tasks

    pub fn add_decision_task_scheduled_event(&mut self) -> Result<DecisionInfo> {
        self.ensure_running()?;
        if let Some(existing) = self.execution_info.decision_schedule_id {
            return Err(HistoryError::invalid(format!(
                "decision task {} is already outstanding",
                existing
            )));
        }
        let task_list = self.execution_info.task_list.clone();
        let event = self.append(EventAttributes::DecisionTaskScheduled {
            task_list: task_list.clone(),
            start_to_close_timeout_secs: self.execution_info.decision_start_to_close_timeout_secs,
            attempt: self.execution_info.decision_attempt,
        })?;
        self.transfer_tasks.push(TransferTaskKind::DecisionTask {
            target_domain_id: self.execution_info.domain_id.clone(),
            task_list,
            schedule_id: event.event_id,
        });
        self.pending_decision()
            .ok_or_else(|| HistoryError::invalid("decision task was not recorded"))
    }

    /// Schedule a decision unless one is already outstanding.
    pub fn schedule_decision_if_needed(&mut self) -> Result<Option<DecisionInfo>> {
        if self.has_pending_decision() || !self.is_running() {
            return Ok(None);
        }
        self.add_decision_task_scheduled_event().map(Some)
    }

    pub fn add_decision_task_started_event(
        &mut self,
        schedule_id: i64,
        request_id: impl Into<String>,
        identity: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let timeout = self.execution_info.decision_timeout_secs;
        let event = self.append(EventAttributes::DecisionTaskStarted {
            scheduled_event_id: schedule_id,
            identity: identity.into(),
            request_id: request_id.into(),
        })?;
        self.add_timer_task(
            after(event.timestamp, timeout),
            TimerTaskKind::DecisionTimeout {
                schedule_id,
                timeout_type: TimeoutType::StartToClose,
            },
        );
        Ok(event)
    }

    /// Opens the decision window: until the next commit, decision-driven
    /// events may reference the returned event id.
    pub fn add_decision_task_completed_event(
        &mut self,
        schedule_id: i64,
        started_id: i64,
        identity: impl Into<String>,
        execution_context: Payload,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let event = self.append(EventAttributes::DecisionTaskCompleted {
            scheduled_event_id: schedule_id,
            started_event_id: started_id,
            identity: identity.into(),
            execution_context,
        })?;
        self.decision_completion = Some(event.event_id);
        Ok(event)
    }

    pub fn add_decision_task_timed_out_event(
        &mut self,
        schedule_id: i64,
        started_id: i64,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        self.append(EventAttributes::DecisionTaskTimedOut {
            scheduled_event_id: schedule_id,
            started_event_id: started_id,
            timeout_type: TimeoutType::StartToClose,
        })
    }

    // Activity tasks

    pub fn add_activity_task_scheduled_event(
        &mut self,
        decision_completed_id: i64,
        params: ScheduleActivityParams,
    ) -> Result<ActivityInfo> {
        self.ensure_running()?;
        self.ensure_decision_window(decision_completed_id)?;
        let event = self.append(EventAttributes::ActivityTaskScheduled {
            activity_id: params.activity_id,
            activity_type: params.activity_type,
            task_list: params.task_list.clone(),
            input: params.input,
            schedule_to_close_timeout_secs: params.schedule_to_close_timeout_secs,
            schedule_to_start_timeout_secs: params.schedule_to_start_timeout_secs,
            start_to_close_timeout_secs: params.start_to_close_timeout_secs,
            heartbeat_timeout_secs: params.heartbeat_timeout_secs,
            decision_task_completed_event_id: decision_completed_id,
        })?;
        let schedule_id = event.event_id;

        self.transfer_tasks.push(TransferTaskKind::ActivityTask {
            target_domain_id: self.execution_info.domain_id.clone(),
            task_list: params.task_list,
            schedule_id,
        });
        if params.schedule_to_start_timeout_secs > 0 {
            self.add_timer_task(
                after(event.timestamp, params.schedule_to_start_timeout_secs),
                TimerTaskKind::ActivityTimeout {
                    schedule_id,
                    timeout_type: TimeoutType::ScheduleToStart,
                },
            );
        }
        if params.schedule_to_close_timeout_secs > 0 {
            self.add_timer_task(
                after(event.timestamp, params.schedule_to_close_timeout_secs),
                TimerTaskKind::ActivityTimeout {
                    schedule_id,
                    timeout_type: TimeoutType::ScheduleToClose,
                },
            );
        }

        self.activity(schedule_id)
            .cloned()
            .ok_or_else(|| HistoryError::invalid("activity was not recorded"))
    }

    pub fn add_activity_task_started_event(
        &mut self,
        schedule_id: i64,
        request_id: impl Into<String>,
        identity: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let (start_to_close, heartbeat) = self
            .activity(schedule_id)
            .map(|ai| (ai.start_to_close_timeout_secs, ai.heartbeat_timeout_secs))
            .ok_or_else(|| HistoryError::not_exists(format!("activity {}", schedule_id)))?;

        let event = self.append(EventAttributes::ActivityTaskStarted {
            scheduled_event_id: schedule_id,
            identity: identity.into(),
            request_id: request_id.into(),
        })?;

        if start_to_close > 0 {
            self.add_timer_task(
                after(event.timestamp, start_to_close),
                TimerTaskKind::ActivityTimeout {
                    schedule_id,
                    timeout_type: TimeoutType::StartToClose,
                },
            );
        }
        if heartbeat > 0 {
            self.add_timer_task(
                after(event.timestamp, heartbeat),
                TimerTaskKind::ActivityTimeout {
                    schedule_id,
                    timeout_type: TimeoutType::Heartbeat,
                },
            );
        }
        Ok(event)
    }

    pub fn add_activity_task_completed_event(
        &mut self,
        schedule_id: i64,
        started_id: i64,
        result: Payload,
        identity: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        self.append(EventAttributes::ActivityTaskCompleted {
            scheduled_event_id: schedule_id,
            started_event_id: started_id,
            result,
            identity: identity.into(),
        })
    }

    pub fn add_activity_task_failed_event(
        &mut self,
        schedule_id: i64,
        started_id: i64,
        reason: impl Into<String>,
        details: Payload,
        identity: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        self.append(EventAttributes::ActivityTaskFailed {
            scheduled_event_id: schedule_id,
            started_event_id: started_id,
            reason: reason.into(),
            details,
            identity: identity.into(),
        })
    }

    pub fn add_activity_task_timed_out_event(
        &mut self,
        schedule_id: i64,
        timeout_type: TimeoutType,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let (started_id, details) = self
            .activity(schedule_id)
            .map(|ai| (ai.started_id, ai.details.clone()))
            .ok_or_else(|| HistoryError::not_exists(format!("activity {}", schedule_id)))?;
        self.append(EventAttributes::ActivityTaskTimedOut {
            scheduled_event_id: schedule_id,
            started_event_id: started_id,
            timeout_type,
            details,
        })
    }

    pub fn add_activity_task_cancel_requested_event(
        &mut self,
        decision_completed_id: i64,
        activity_id: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        self.ensure_decision_window(decision_completed_id)?;
        self.append(EventAttributes::ActivityTaskCancelRequested {
            activity_id: activity_id.into(),
            decision_task_completed_event_id: decision_completed_id,
        })
    }

    pub fn add_request_cancel_activity_task_failed_event(
        &mut self,
        decision_completed_id: i64,
        activity_id: impl Into<String>,
        cause: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        self.ensure_decision_window(decision_completed_id)?;
        self.append(EventAttributes::RequestCancelActivityTaskFailed {
            activity_id: activity_id.into(),
            cause: cause.into(),
            decision_task_completed_event_id: decision_completed_id,
        })
    }

    pub fn add_activity_task_canceled_event(
        &mut self,
        schedule_id: i64,
        details: Payload,
        identity: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let (started_id, cancel_request_id) = self
            .activity(schedule_id)
            .map(|ai| (ai.started_id, ai.cancel_request_id))
            .ok_or_else(|| HistoryError::not_exists(format!("activity {}", schedule_id)))?;
        if cancel_request_id.is_none() {
            return Err(HistoryError::invalid(format!(
                "activity {} has no cancellation request",
                schedule_id
            )));
        }
        self.append(EventAttributes::ActivityTaskCanceled {
            scheduled_event_id: schedule_id,
            started_event_id: started_id,
            latest_cancel_requested_event_id: cancel_request_id,
            details,
            identity: identity.into(),
        })
    }

    /// Record a heartbeat. Returns whether cancellation has been requested.
    pub fn record_activity_heartbeat(&mut self, schedule_id: i64, details: Payload) -> Result<bool> {
        self.ensure_running()?;
        let now = self.clock.now();
        let ai = self
            .activity_infos
            .get_mut(&schedule_id)
            .ok_or_else(|| HistoryError::not_exists(format!("activity {}", schedule_id)))?;
        if ai.started_id.is_none() {
            return Err(HistoryError::invalid(format!(
                "activity {} has not started",
                schedule_id
            )));
        }
        ai.last_heartbeat_time = Some(now);
        ai.details = details;
        let cancel_requested = ai.cancel_requested;
        self.dirty_activities.touch(schedule_id);
        Ok(cancel_requested)
    }

    /// Re-arm the heartbeat timeout of a started activity.
    pub fn create_activity_heartbeat_timer(&mut self, schedule_id: i64, deadline: DateTime<Utc>) {
        self.add_timer_task(
            deadline,
            TimerTaskKind::ActivityTimeout {
                schedule_id,
                timeout_type: TimeoutType::Heartbeat,
            },
        );
    }

    // User timers

    pub fn add_timer_started_event(
        &mut self,
        decision_completed_id: i64,
        timer_id: impl Into<String>,
        start_to_fire_timeout_secs: u32,
    ) -> Result<TimerInfo> {
        self.ensure_running()?;
        self.ensure_decision_window(decision_completed_id)?;
        let timer_id = timer_id.into();
        let event = self.append(EventAttributes::TimerStarted {
            timer_id: timer_id.clone(),
            start_to_fire_timeout_secs,
            decision_task_completed_event_id: decision_completed_id,
        })?;

        let info = self
            .timer(&timer_id)
            .cloned()
            .ok_or_else(|| HistoryError::invalid("timer was not recorded"))?;
        self.add_timer_task(
            info.expiry_time,
            TimerTaskKind::UserTimer {
                started_event_id: event.event_id,
            },
        );
        Ok(info)
    }

    pub fn add_timer_fired_event(&mut self, timer_id: &str) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let started_event_id = self
            .timer(timer_id)
            .map(|t| t.started_event_id)
            .ok_or_else(|| HistoryError::not_exists(format!("timer {}", timer_id)))?;
        self.append(EventAttributes::TimerFired {
            timer_id: timer_id.to_string(),
            started_event_id,
        })
    }

    pub fn add_timer_canceled_event(
        &mut self,
        decision_completed_id: i64,
        timer_id: &str,
        identity: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        self.ensure_decision_window(decision_completed_id)?;
        let started_event_id = self
            .timer(timer_id)
            .map(|t| t.started_event_id)
            .ok_or_else(|| HistoryError::not_exists(format!("timer {}", timer_id)))?;
        self.append(EventAttributes::TimerCanceled {
            timer_id: timer_id.to_string(),
            started_event_id,
            decision_task_completed_event_id: decision_completed_id,
            identity: identity.into(),
        })
    }

    pub fn add_cancel_timer_failed_event(
        &mut self,
        decision_completed_id: i64,
        timer_id: impl Into<String>,
        cause: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        self.ensure_decision_window(decision_completed_id)?;
        self.append(EventAttributes::CancelTimerFailed {
            timer_id: timer_id.into(),
            cause: cause.into(),
            decision_task_completed_event_id: decision_completed_id,
        })
    }

    // Child workflows

    pub fn add_start_child_workflow_execution_initiated_event(
        &mut self,
        decision_completed_id: i64,
        params: StartChildParams,
        create_request_id: impl Into<String>,
    ) -> Result<ChildExecutionInfo> {
        self.ensure_running()?;
        self.ensure_decision_window(decision_completed_id)?;
        let domain_id = params.domain_id.clone();
        let workflow_id = params.workflow_id.clone();
        let event = self.append(EventAttributes::StartChildWorkflowExecutionInitiated {
            domain_id: params.domain_id,
            workflow_id: params.workflow_id,
            workflow_type: params.workflow_type,
            task_list: params.task_list,
            input: params.input,
            execution_start_to_close_timeout_secs: params.execution_start_to_close_timeout_secs,
            task_start_to_close_timeout_secs: params.task_start_to_close_timeout_secs,
            decision_task_completed_event_id: decision_completed_id,
            create_request_id: create_request_id.into(),
        })?;
        self.transfer_tasks.push(TransferTaskKind::StartChildExecution {
            target_domain_id: domain_id,
            target_workflow_id: workflow_id,
            initiated_id: event.event_id,
        });
        self.child_execution(event.event_id)
            .cloned()
            .ok_or_else(|| HistoryError::invalid("child execution was not recorded"))
    }

    pub fn add_child_workflow_execution_started_event(
        &mut self,
        initiated_id: i64,
        domain_id: impl Into<String>,
        execution: WorkflowExecution,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        self.append(EventAttributes::ChildWorkflowExecutionStarted {
            initiated_event_id: initiated_id,
            domain_id: domain_id.into(),
            execution,
        })
    }

    pub fn add_start_child_workflow_execution_failed_event(
        &mut self,
        initiated_id: i64,
        cause: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let child = self
            .child_execution(initiated_id)
            .cloned()
            .ok_or_else(|| HistoryError::not_exists(format!("child {}", initiated_id)))?;
        self.append(EventAttributes::StartChildWorkflowExecutionFailed {
            initiated_event_id: initiated_id,
            domain_id: child.domain_id,
            workflow_id: child.workflow_id,
            cause: cause.into(),
        })
    }

    /// Completed, failed, canceled, terminated and timed-out children all close here.
    pub fn add_child_workflow_execution_closed_event(
        &mut self,
        initiated_id: i64,
        outcome: WorkflowCloseOutcome,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let child = self
            .child_execution(initiated_id)
            .cloned()
            .ok_or_else(|| HistoryError::not_exists(format!("child {}", initiated_id)))?;
        let (started_id, run_id) = match (child.started_id, child.run_id) {
            (Some(started_id), Some(run_id)) => (started_id, run_id),
            _ => {
                return Err(HistoryError::invalid(format!(
                    "child {} has not started",
                    initiated_id
                )))
            }
        };
        self.append(EventAttributes::ChildWorkflowExecutionClosed {
            initiated_event_id: initiated_id,
            started_event_id: started_id,
            domain_id: child.domain_id,
            execution: WorkflowExecution::new(child.workflow_id, run_id),
            outcome,
        })
    }

    // Cross-workflow cancellation

    pub fn add_request_cancel_external_workflow_execution_initiated_event(
        &mut self,
        decision_completed_id: i64,
        domain_id: impl Into<String>,
        workflow_id: impl Into<String>,
        run_id: Option<String>,
        cancel_request_id: impl Into<String>,
    ) -> Result<RequestCancelInfo> {
        self.ensure_running()?;
        self.ensure_decision_window(decision_completed_id)?;
        let domain_id = domain_id.into();
        let workflow_id = workflow_id.into();
        let event = self.append(EventAttributes::RequestCancelExternalWorkflowExecutionInitiated {
            domain_id: domain_id.clone(),
            workflow_id: workflow_id.clone(),
            run_id: run_id.clone(),
            decision_task_completed_event_id: decision_completed_id,
            cancel_request_id: cancel_request_id.into(),
        })?;
        self.transfer_tasks.push(TransferTaskKind::CancelExecution {
            target_domain_id: domain_id,
            target_workflow_id: workflow_id,
            target_run_id: run_id,
            initiated_id: event.event_id,
        });
        self.request_cancel(event.event_id)
            .cloned()
            .ok_or_else(|| HistoryError::invalid("cancel request was not recorded"))
    }

    pub fn add_external_workflow_execution_cancel_requested_event(
        &mut self,
        initiated_id: i64,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let info = self
            .request_cancel(initiated_id)
            .cloned()
            .ok_or_else(|| HistoryError::not_exists(format!("cancel request {}", initiated_id)))?;
        self.append(EventAttributes::ExternalWorkflowExecutionCancelRequested {
            initiated_event_id: initiated_id,
            domain_id: info.domain_id,
            workflow_id: info.workflow_id,
            run_id: info.run_id,
        })
    }

    pub fn add_request_cancel_external_workflow_execution_failed_event(
        &mut self,
        initiated_id: i64,
        cause: impl Into<String>,
    ) -> Result<HistoryEvent> {
        self.ensure_running()?;
        let info = self
            .request_cancel(initiated_id)
            .cloned()
            .ok_or_else(|| HistoryError::not_exists(format!("cancel request {}", initiated_id)))?;
        self.append(EventAttributes::RequestCancelExternalWorkflowExecutionFailed {
            initiated_event_id: initiated_id,
            domain_id: info.domain_id,
            workflow_id: info.workflow_id,
            run_id: info.run_id,
            cause: cause.into(),
        })
    }
}
