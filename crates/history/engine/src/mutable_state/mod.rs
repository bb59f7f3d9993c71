//! Mutable state
//!
//! In-memory projection of one workflow execution. Events enter through the
//! typed mutators in `builder.rs`, which validate the transition, assign the
//! next event id, apply the event (the same transition `replay` uses) and
//! derive the transfer and timer tasks the commit must persist alongside it.
//!
//! Nothing here performs I/O. The execution cache drains the pending commit
//! with [`MutableState::prepare_commit`] and writes it through the shard.

mod apply;
mod builder;


use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use history_persistence::UpdateWorkflowExecutionRequest;
use history_types::{
    ActivityInfo, ChildExecutionInfo, CloseStatus, ExecutionKey, HistoryEvent, NewTimerTask,
    RequestCancelInfo, TimerInfo, TimerTaskInfo, TransferTaskKind, WorkflowExecutionInfo,
    WorkflowMutableState, WorkflowState, FIRST_EVENT_ID,
};

use crate::error::Result;
use crate::shard::link_user_timers;
use crate::time::TimeSource;

pub use builder::{ScheduleActivityParams, StartChildParams, StartWorkflowParams};

/// The outstanding decision task, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionInfo {
    pub schedule_id: i64,
    pub started_id: Option<i64>,
    pub request_id: Option<String>,
    pub attempt: u32,
    pub timeout_secs: u32,
}

/// Everything one commit must write.
#[derive(Debug)]
pub struct PendingCommit {
    /// Id of the first buffered event; also the update's `next_event_id` condition.
    pub first_event_id: i64,
    pub events: Vec<HistoryEvent>,
    pub request: UpdateWorkflowExecutionRequest,
    pub transfer_tasks: Vec<TransferTaskKind>,
    pub timer_tasks: Vec<NewTimerTask>,
}

/// Order-independent view of the pending entities, for comparing states.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub state: WorkflowState,
    pub close_status: CloseStatus,
    pub next_event_id: i64,
    pub decision: Option<DecisionInfo>,
    pub cancel_requested: bool,
    pub activities: BTreeMap<i64, ActivityInfo>,
    pub timers: BTreeMap<String, TimerInfo>,
    pub children: BTreeMap<i64, ChildExecutionInfo>,
    pub request_cancels: BTreeMap<i64, RequestCancelInfo>,
}

#[derive(Default, Debug)]
struct DirtySet<K: std::hash::Hash + Eq> {
    updated: HashSet<K>,
    deleted: HashSet<K>,
}

impl<K: std::hash::Hash + Eq + Clone> DirtySet<K> {
    fn touch(&mut self, key: K) {
        self.deleted.remove(&key);
        self.updated.insert(key);
    }

    fn delete(&mut self, key: K) {
        self.updated.remove(&key);
        self.deleted.insert(key);
    }

    fn is_dirty(&self) -> bool {
        !self.updated.is_empty() || !self.deleted.is_empty()
    }

    fn take(&mut self) -> (HashSet<K>, HashSet<K>) {
        (
            std::mem::take(&mut self.updated),
            std::mem::take(&mut self.deleted),
        )
    }
}

pub struct MutableState {
    execution_info: WorkflowExecutionInfo,
    activity_infos: HashMap<i64, ActivityInfo>,
    /// activity_id -> schedule_id of the pending activity using it.
    activity_ids: HashMap<String, i64>,
    timer_infos: HashMap<String, TimerInfo>,
    child_execution_infos: HashMap<i64, ChildExecutionInfo>,
    request_cancel_infos: HashMap<i64, RequestCancelInfo>,

    history_buffer: Vec<HistoryEvent>,
    transfer_tasks: Vec<TransferTaskKind>,
    timer_tasks: Vec<NewTimerTask>,
    dirty_activities: DirtySet<i64>,
    dirty_timers: DirtySet<String>,
    dirty_children: DirtySet<i64>,
    dirty_request_cancels: DirtySet<i64>,

    /// `next_event_id` as last persisted; guards the conditional update.
    condition: i64,
    /// DecisionTaskCompleted event id of the decision batch being applied.
    decision_completion: Option<i64>,
    clock: Arc<dyn TimeSource>,
}

impl MutableState {
    /// Empty state for a run that does not exist yet.
    pub fn new(key: &ExecutionKey, clock: Arc<dyn TimeSource>) -> Self {
        let now = clock.now();
        Self {
            execution_info: WorkflowExecutionInfo::new(key, now),
            activity_infos: HashMap::new(),
            activity_ids: HashMap::new(),
            timer_infos: HashMap::new(),
            child_execution_infos: HashMap::new(),
            request_cancel_infos: HashMap::new(),
            history_buffer: Vec::new(),
            transfer_tasks: Vec::new(),
            timer_tasks: Vec::new(),
            dirty_activities: DirtySet::default(),
            dirty_timers: DirtySet::default(),
            dirty_children: DirtySet::default(),
            dirty_request_cancels: DirtySet::default(),
            condition: FIRST_EVENT_ID,
            decision_completion: None,
            clock,
        }
    }

    /// Rebuild from the persisted execution family.
    pub fn from_persisted(persisted: WorkflowMutableState, clock: Arc<dyn TimeSource>) -> Self {
        let mut state = Self::new(&persisted.execution_info.key(), clock);
        state.condition = persisted.execution_info.next_event_id;
        state.execution_info = persisted.execution_info;
        state.activity_ids = persisted
            .activity_infos
            .values()
            .map(|ai| (ai.activity_id.clone(), ai.schedule_id))
            .collect();
        state.activity_infos = persisted.activity_infos;
        state.timer_infos = persisted.timer_infos;
        state.child_execution_infos = persisted.child_execution_infos;
        state.request_cancel_infos = persisted.request_cancel_infos;
        state
    }

    /// Rebuild by applying a stored history from the first event.
    pub fn replay(
        key: &ExecutionKey,
        events: &[HistoryEvent],
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        let mut state = Self::new(key, clock);
        for event in events {
            state.apply(event)?;
        }
        state.condition = state.execution_info.next_event_id;
        state.clear_dirty();
        Ok(state)
    }

    pub fn to_persisted(&self) -> WorkflowMutableState {
        WorkflowMutableState {
            execution_info: self.execution_info.clone(),
            activity_infos: self.activity_infos.clone(),
            timer_infos: self.timer_infos.clone(),
            child_execution_infos: self.child_execution_infos.clone(),
            request_cancel_infos: self.request_cancel_infos.clone(),
        }
    }

    // Accessors

    pub fn key(&self) -> ExecutionKey {
        self.execution_info.key()
    }

    pub fn execution_info(&self) -> &WorkflowExecutionInfo {
        &self.execution_info
    }

    pub fn next_event_id(&self) -> i64 {
        self.execution_info.next_event_id
    }

    /// `next_event_id` as last persisted.
    pub fn condition(&self) -> i64 {
        self.condition
    }

    pub fn is_running(&self) -> bool {
        self.execution_info.is_running()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn pending_decision(&self) -> Option<DecisionInfo> {
        let info = &self.execution_info;
        info.decision_schedule_id.map(|schedule_id| DecisionInfo {
            schedule_id,
            started_id: info.decision_started_id,
            request_id: info.decision_request_id.clone(),
            attempt: info.decision_attempt,
            timeout_secs: info.decision_timeout_secs,
        })
    }

    pub fn has_pending_decision(&self) -> bool {
        self.execution_info.decision_schedule_id.is_some()
    }

    pub fn has_in_flight_decision(&self) -> bool {
        self.execution_info.decision_started_id.is_some()
    }

    pub fn activity(&self, schedule_id: i64) -> Option<&ActivityInfo> {
        self.activity_infos.get(&schedule_id)
    }

    pub fn activity_by_id(&self, activity_id: &str) -> Option<&ActivityInfo> {
        self.activity_ids
            .get(activity_id)
            .and_then(|schedule_id| self.activity_infos.get(schedule_id))
    }

    pub fn pending_activities(&self) -> impl Iterator<Item = &ActivityInfo> {
        self.activity_infos.values()
    }

    pub fn timer(&self, timer_id: &str) -> Option<&TimerInfo> {
        self.timer_infos.get(timer_id)
    }

    pub fn pending_timers(&self) -> impl Iterator<Item = &TimerInfo> {
        self.timer_infos.values()
    }

    pub fn child_execution(&self, initiated_id: i64) -> Option<&ChildExecutionInfo> {
        self.child_execution_infos.get(&initiated_id)
    }

    pub fn request_cancel(&self, initiated_id: i64) -> Option<&RequestCancelInfo> {
        self.request_cancel_infos.get(&initiated_id)
    }

    pub fn buffered_events(&self) -> &[HistoryEvent] {
        &self.history_buffer
    }

    pub fn has_buffered_events(&self) -> bool {
        !self.history_buffer.is_empty()
    }

    /// Whether a commit would write anything.
    pub fn has_pending_changes(&self) -> bool {
        !self.history_buffer.is_empty()
            || !self.transfer_tasks.is_empty()
            || !self.timer_tasks.is_empty()
            || self.dirty_activities.is_dirty()
            || self.dirty_timers.is_dirty()
            || self.dirty_children.is_dirty()
            || self.dirty_request_cancels.is_dirty()
    }

    pub fn pending_snapshot(&self) -> PendingSnapshot {
        PendingSnapshot {
            state: self.execution_info.state,
            close_status: self.execution_info.close_status,
            next_event_id: self.execution_info.next_event_id,
            decision: self.pending_decision(),
            cancel_requested: self.execution_info.cancel_requested,
            activities: self
                .activity_infos
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            timers: self
                .timer_infos
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            children: self
                .child_execution_infos
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            request_cancels: self
                .request_cancel_infos
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        }
    }

    // Commit

    /// Drain everything buffered since the last commit.
    pub fn prepare_commit(&mut self) -> PendingCommit {
        let mut request = UpdateWorkflowExecutionRequest::new(
            self.execution_info.clone(),
            self.condition,
            0,
        );

        let (updated, deleted) = self.dirty_activities.take();
        request.upsert_activity_infos = updated
            .iter()
            .filter_map(|id| self.activity_infos.get(id).cloned())
            .collect();
        request.delete_activity_infos = deleted.into_iter().collect();

        let (updated, deleted) = self.dirty_timers.take();
        request.upsert_timer_infos = updated
            .iter()
            .filter_map(|id| self.timer_infos.get(id).cloned())
            .collect();
        request.delete_timer_infos = deleted.into_iter().collect();

        let (updated, deleted) = self.dirty_children.take();
        request.upsert_child_execution_infos = updated
            .iter()
            .filter_map(|id| self.child_execution_infos.get(id).cloned())
            .collect();
        request.delete_child_execution_infos = deleted.into_iter().collect();

        let (updated, deleted) = self.dirty_request_cancels.take();
        request.upsert_request_cancel_infos = updated
            .iter()
            .filter_map(|id| self.request_cancel_infos.get(id).cloned())
            .collect();
        request.delete_request_cancel_infos = deleted.into_iter().collect();

        self.decision_completion = None;

        PendingCommit {
            first_event_id: self.condition,
            events: std::mem::take(&mut self.history_buffer),
            request,
            transfer_tasks: std::mem::take(&mut self.transfer_tasks),
            timer_tasks: std::mem::take(&mut self.timer_tasks),
        }
    }

    /// Acknowledge a successful write of the last prepared commit.
    pub fn committed(&mut self, timer_tasks: &[TimerTaskInfo]) {
        self.condition = self.execution_info.next_event_id;
        link_user_timers(self.timer_infos.values_mut(), timer_tasks);
    }

    fn clear_dirty(&mut self) {
        self.dirty_activities.take();
        self.dirty_timers.take();
        self.dirty_children.take();
        self.dirty_request_cancels.take();
        self.history_buffer.clear();
        self.transfer_tasks.clear();
        self.timer_tasks.clear();
    }
}

impl std::fmt::Debug for MutableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableState")
            .field("execution", &self.key())
            .field("state", &self.execution_info.state)
            .field("next_event_id", &self.execution_info.next_event_id)
            .field("condition", &self.condition)
            .field("buffered", &self.history_buffer.len())
            .finish()
    }
}
