//! State transitions shared by live appends and replay.

use chrono::Duration;
use history_types::{
    ActivityInfo, ChildExecutionInfo, EventAttributes, HistoryEvent, RequestCancelInfo,
    TimerInfo, WorkflowState,
};

use super::MutableState;
use crate::error::{HistoryError, Result};

impl MutableState {
    /// Apply one event to the in-memory state.
    ///
    /// Derives no tasks: replaying a history must not re-issue side effects.
    pub fn apply(&mut self, event: &HistoryEvent) -> Result<()> {
        let expected = self.execution_info.next_event_id;
        if event.event_id != expected {
            return Err(HistoryError::invalid(format!(
                "{} event {} applied at next event id {}",
                event.event_type(),
                event.event_id,
                expected
            )));
        }

        let is_start = matches!(
            event.attributes,
            EventAttributes::WorkflowExecutionStarted { .. }
        );
        match (self.execution_info.state, is_start) {
            (WorkflowState::Created, true) | (WorkflowState::Running, false) => {}
            (WorkflowState::Completed, _) => {
                return Err(HistoryError::invalid(format!(
                    "{} applied to completed execution {}",
                    event.event_type(),
                    self.key()
                )))
            }
            (_, true) => return Err(HistoryError::invalid("workflow already started")),
            (_, false) => {
                return Err(HistoryError::invalid(format!(
                    "{} applied before workflow start",
                    event.event_type()
                )))
            }
        }

        let id = event.event_id;
        let ts = event.timestamp;

        match &event.attributes {
            // Workflow lifecycle
            EventAttributes::WorkflowExecutionStarted {
                workflow_type,
                task_list,
                execution_start_to_close_timeout_secs,
                task_start_to_close_timeout_secs,
                request_id,
                parent,
                ..
            } => {
                let info = &mut self.execution_info;
                info.workflow_type = workflow_type.clone();
                info.task_list = task_list.clone();
                info.execution_start_to_close_timeout_secs = *execution_start_to_close_timeout_secs;
                info.decision_start_to_close_timeout_secs = *task_start_to_close_timeout_secs;
                info.create_request_id = request_id.clone();
                info.parent = parent.clone();
                info.start_time = ts;
                info.state = WorkflowState::Running;
            }
            EventAttributes::WorkflowExecutionClosed { outcome, .. } => {
                let info = &mut self.execution_info;
                info.state = WorkflowState::Completed;
                info.close_status = outcome.close_status();
            }
            EventAttributes::WorkflowExecutionCancelRequested { request_id, .. } => {
                self.execution_info.cancel_requested = true;
                self.execution_info.cancel_request_id = Some(request_id.clone());
            }
            EventAttributes::WorkflowExecutionSignaled { .. } => {}

            // Decision tasks
            EventAttributes::DecisionTaskScheduled {
                start_to_close_timeout_secs,
                attempt,
                ..
            } => {
                if let Some(existing) = self.execution_info.decision_schedule_id {
                    return Err(HistoryError::invalid(format!(
                        "decision task {} is already outstanding",
                        existing
                    )));
                }
                let info = &mut self.execution_info;
                info.decision_schedule_id = Some(id);
                info.decision_started_id = None;
                info.decision_request_id = None;
                info.decision_timeout_secs = *start_to_close_timeout_secs;
                info.decision_attempt = *attempt;
            }
            EventAttributes::DecisionTaskStarted {
                scheduled_event_id,
                request_id,
                ..
            } => {
                self.expect_decision(*scheduled_event_id, None)?;
                self.execution_info.decision_started_id = Some(id);
                self.execution_info.decision_request_id = Some(request_id.clone());
            }
            EventAttributes::DecisionTaskCompleted {
                scheduled_event_id,
                started_event_id,
                execution_context,
                ..
            } => {
                self.expect_decision(*scheduled_event_id, Some(*started_event_id))?;
                self.clear_decision();
                self.execution_info.decision_attempt = 0;
                self.execution_info.last_processed_event_id = Some(*started_event_id);
                self.execution_info.execution_context = execution_context.clone();
            }
            EventAttributes::DecisionTaskTimedOut {
                scheduled_event_id,
                started_event_id,
                ..
            } => {
                self.expect_decision(*scheduled_event_id, Some(*started_event_id))?;
                self.clear_decision();
                self.execution_info.decision_attempt += 1;
            }

            // Activity tasks
            EventAttributes::ActivityTaskScheduled {
                activity_id,
                activity_type,
                task_list,
                schedule_to_close_timeout_secs,
                schedule_to_start_timeout_secs,
                start_to_close_timeout_secs,
                heartbeat_timeout_secs,
                ..
            } => {
                if self.activity_ids.contains_key(activity_id) {
                    return Err(HistoryError::invalid(format!(
                        "activity id {} is already in use",
                        activity_id
                    )));
                }
                self.activity_infos.insert(
                    id,
                    ActivityInfo {
                        schedule_id: id,
                        scheduled_time: ts,
                        started_id: None,
                        started_time: None,
                        request_id: None,
                        activity_id: activity_id.clone(),
                        activity_type: activity_type.clone(),
                        task_list: task_list.clone(),
                        schedule_to_start_timeout_secs: *schedule_to_start_timeout_secs,
                        schedule_to_close_timeout_secs: *schedule_to_close_timeout_secs,
                        start_to_close_timeout_secs: *start_to_close_timeout_secs,
                        heartbeat_timeout_secs: *heartbeat_timeout_secs,
                        cancel_requested: false,
                        cancel_request_id: None,
                        last_heartbeat_time: None,
                        details: Vec::new(),
                    },
                );
                self.activity_ids.insert(activity_id.clone(), id);
                self.dirty_activities.touch(id);
            }
            EventAttributes::ActivityTaskStarted {
                scheduled_event_id,
                request_id,
                ..
            } => {
                let ai = self.activity_mut(*scheduled_event_id)?;
                if let Some(started) = ai.started_id {
                    return Err(HistoryError::invalid(format!(
                        "activity {} already started as event {}",
                        scheduled_event_id, started
                    )));
                }
                ai.started_id = Some(id);
                ai.started_time = Some(ts);
                ai.request_id = Some(request_id.clone());
                self.dirty_activities.touch(*scheduled_event_id);
            }
            EventAttributes::ActivityTaskCompleted {
                scheduled_event_id,
                started_event_id,
                ..
            }
            | EventAttributes::ActivityTaskFailed {
                scheduled_event_id,
                started_event_id,
                ..
            } => {
                let ai = self.activity_mut(*scheduled_event_id)?;
                if ai.started_id != Some(*started_event_id) {
                    return Err(HistoryError::invalid(format!(
                        "activity {} was not started as event {}",
                        scheduled_event_id, started_event_id
                    )));
                }
                self.remove_activity(*scheduled_event_id);
            }
            EventAttributes::ActivityTaskTimedOut {
                scheduled_event_id,
                ..
            }
            | EventAttributes::ActivityTaskCanceled {
                scheduled_event_id,
                ..
            } => {
                self.activity_mut(*scheduled_event_id)?;
                self.remove_activity(*scheduled_event_id);
            }
            EventAttributes::ActivityTaskCancelRequested { activity_id, .. } => {
                let schedule_id = *self.activity_ids.get(activity_id).ok_or_else(|| {
                    HistoryError::invalid(format!("no pending activity {}", activity_id))
                })?;
                let ai = self.activity_mut(schedule_id)?;
                ai.cancel_requested = true;
                ai.cancel_request_id = Some(id);
                self.dirty_activities.touch(schedule_id);
            }
            EventAttributes::RequestCancelActivityTaskFailed { .. } => {}

            // User timers
            EventAttributes::TimerStarted {
                timer_id,
                start_to_fire_timeout_secs,
                ..
            } => {
                if self.timer_infos.contains_key(timer_id) {
                    return Err(HistoryError::invalid(format!(
                        "timer {} is already pending",
                        timer_id
                    )));
                }
                self.timer_infos.insert(
                    timer_id.clone(),
                    TimerInfo {
                        timer_id: timer_id.clone(),
                        started_event_id: id,
                        expiry_time: ts + Duration::seconds(i64::from(*start_to_fire_timeout_secs)),
                        task_id: None,
                    },
                );
                self.dirty_timers.touch(timer_id.clone());
            }
            EventAttributes::TimerFired { timer_id, .. }
            | EventAttributes::TimerCanceled { timer_id, .. } => {
                if self.timer_infos.remove(timer_id).is_none() {
                    return Err(HistoryError::invalid(format!(
                        "no pending timer {}",
                        timer_id
                    )));
                }
                self.dirty_timers.delete(timer_id.clone());
            }
            EventAttributes::CancelTimerFailed { .. } => {}

            // Child workflows
            EventAttributes::StartChildWorkflowExecutionInitiated {
                domain_id,
                workflow_id,
                workflow_type,
                task_list,
                input,
                execution_start_to_close_timeout_secs,
                task_start_to_close_timeout_secs,
                create_request_id,
                ..
            } => {
                self.child_execution_infos.insert(
                    id,
                    ChildExecutionInfo {
                        initiated_id: id,
                        started_id: None,
                        domain_id: domain_id.clone(),
                        workflow_id: workflow_id.clone(),
                        run_id: None,
                        workflow_type: workflow_type.clone(),
                        task_list: task_list.clone(),
                        input: input.clone(),
                        execution_start_to_close_timeout_secs:
                            *execution_start_to_close_timeout_secs,
                        task_start_to_close_timeout_secs: *task_start_to_close_timeout_secs,
                        create_request_id: create_request_id.clone(),
                    },
                );
                self.dirty_children.touch(id);
            }
            EventAttributes::ChildWorkflowExecutionStarted {
                initiated_event_id,
                execution,
                ..
            } => {
                let child = self.child_mut(*initiated_event_id)?;
                if child.started_id.is_some() {
                    return Err(HistoryError::invalid(format!(
                        "child {} already started",
                        initiated_event_id
                    )));
                }
                child.started_id = Some(id);
                child.run_id = Some(execution.run_id.clone());
                self.dirty_children.touch(*initiated_event_id);
            }
            EventAttributes::StartChildWorkflowExecutionFailed {
                initiated_event_id,
                ..
            } => {
                let child = self.child_mut(*initiated_event_id)?;
                if child.started_id.is_some() {
                    return Err(HistoryError::invalid(format!(
                        "child {} already started",
                        initiated_event_id
                    )));
                }
                self.remove_child(*initiated_event_id);
            }
            EventAttributes::ChildWorkflowExecutionClosed {
                initiated_event_id,
                ..
            } => {
                let child = self.child_mut(*initiated_event_id)?;
                if child.started_id.is_none() {
                    return Err(HistoryError::invalid(format!(
                        "child {} closed before it started",
                        initiated_event_id
                    )));
                }
                self.remove_child(*initiated_event_id);
            }

            // Cross-workflow cancellation
            EventAttributes::RequestCancelExternalWorkflowExecutionInitiated {
                domain_id,
                workflow_id,
                run_id,
                cancel_request_id,
                ..
            } => {
                self.request_cancel_infos.insert(
                    id,
                    RequestCancelInfo {
                        initiated_id: id,
                        domain_id: domain_id.clone(),
                        workflow_id: workflow_id.clone(),
                        run_id: run_id.clone(),
                        cancel_request_id: cancel_request_id.clone(),
                    },
                );
                self.dirty_request_cancels.touch(id);
            }
            EventAttributes::ExternalWorkflowExecutionCancelRequested {
                initiated_event_id,
                ..
            }
            | EventAttributes::RequestCancelExternalWorkflowExecutionFailed {
                initiated_event_id,
                ..
            } => {
                if self.request_cancel_infos.remove(initiated_event_id).is_none() {
                    return Err(HistoryError::invalid(format!(
                        "no pending cancel request {}",
                        initiated_event_id
                    )));
                }
                self.dirty_request_cancels.delete(*initiated_event_id);
            }
        }

        self.execution_info.next_event_id = id + 1;
        self.execution_info.last_updated_time = ts;
        Ok(())
    }

    fn expect_decision(&self, schedule_id: i64, started_id: Option<i64>) -> Result<()> {
        let info = &self.execution_info;
        if info.decision_schedule_id != Some(schedule_id) || info.decision_started_id != started_id
        {
            return Err(HistoryError::invalid(format!(
                "decision {}/{:?} does not match outstanding decision {:?}/{:?}",
                schedule_id, started_id, info.decision_schedule_id, info.decision_started_id
            )));
        }
        Ok(())
    }

    fn clear_decision(&mut self) {
        let info = &mut self.execution_info;
        info.decision_schedule_id = None;
        info.decision_started_id = None;
        info.decision_request_id = None;
        info.decision_timeout_secs = 0;
    }

    fn activity_mut(&mut self, schedule_id: i64) -> Result<&mut ActivityInfo> {
        self.activity_infos
            .get_mut(&schedule_id)
            .ok_or_else(|| HistoryError::invalid(format!("no pending activity {}", schedule_id)))
    }

    fn remove_activity(&mut self, schedule_id: i64) {
        if let Some(ai) = self.activity_infos.remove(&schedule_id) {
            self.activity_ids.remove(&ai.activity_id);
        }
        self.dirty_activities.delete(schedule_id);
    }

    fn child_mut(&mut self, initiated_id: i64) -> Result<&mut ChildExecutionInfo> {
        self.child_execution_infos
            .get_mut(&initiated_id)
            .ok_or_else(|| HistoryError::invalid(format!("no pending child {}", initiated_id)))
    }

    fn remove_child(&mut self, initiated_id: i64) {
        self.child_execution_infos.remove(&initiated_id);
        self.dirty_children.delete(initiated_id);
    }
}
