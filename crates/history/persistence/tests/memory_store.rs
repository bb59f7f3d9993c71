use chrono::{Duration, Utc};
use history_persistence::{
    AppendHistoryEventsRequest, CreateWorkflowExecutionRequest, ExecutionManager, HistoryManager,
    InMemoryStore, PersistenceError, ShardManager, UpdateWorkflowExecutionRequest,
};
use history_types::{
    EventAttributes, ExecutionKey, HistoryEvent, ShardId, ShardInfo, TimeoutType, TimerInfo,
    TimerTaskInfo, TimerTaskKind, TransferTaskInfo, TransferTaskKind, WorkflowExecutionInfo,
    WorkflowMutableState, WorkflowState,
};

const SHARD: ShardId = ShardId(3);

async fn store_with_shard(range_id: i64) -> InMemoryStore {
    let store = InMemoryStore::new();
    let mut info = ShardInfo::new(SHARD, "host-a");
    info.range_id = range_id;
    store.create_shard(info).await.unwrap();
    store
}

fn new_state(key: &ExecutionKey) -> WorkflowMutableState {
    let mut info = WorkflowExecutionInfo::new(key, Utc::now());
    info.state = WorkflowState::Running;
    info.next_event_id = 3;
    WorkflowMutableState::new(info)
}

fn create_request(key: &ExecutionKey, range_id: i64) -> CreateWorkflowExecutionRequest {
    CreateWorkflowExecutionRequest {
        request_id: "req-1".into(),
        range_id,
        state: new_state(key),
        transfer_tasks: vec![TransferTaskInfo {
            execution: key.clone(),
            task_id: 10,
            kind: TransferTaskKind::DecisionTask {
                target_domain_id: key.domain_id.clone(),
                task_list: "tl".into(),
                schedule_id: 2,
            },
        }],
        timer_tasks: Vec::new(),
    }
}

fn event(id: i64) -> HistoryEvent {
    HistoryEvent::new(
        id,
        Utc::now(),
        EventAttributes::WorkflowExecutionSignaled {
            signal_name: format!("s{}", id),
            input: vec![],
            identity: "test".into(),
        },
    )
}

#[tokio::test]
async fn update_shard_is_fenced_by_previous_range() {
    let store = store_with_shard(5).await;

    let mut info = store.get_shard(SHARD).await.unwrap();
    info.range_id = 6;
    store.update_shard(info.clone(), 5).await.unwrap();

    info.range_id = 7;
    let err = store.update_shard(info, 5).await.unwrap_err();
    assert!(err.is_ownership_lost());
    assert_eq!(store.get_shard(SHARD).await.unwrap().range_id, 6);
}

#[tokio::test]
async fn create_rejects_second_running_run() {
    let store = store_with_shard(1).await;
    let executions = store.execution_manager(SHARD);

    let first = ExecutionKey::new("d", "wf", "run-1");
    executions
        .create_workflow_execution(create_request(&first, 1))
        .await
        .unwrap();

    let second = ExecutionKey::new("d", "wf", "run-2");
    let err = executions
        .create_workflow_execution(create_request(&second, 1))
        .await
        .unwrap_err();
    match err {
        PersistenceError::WorkflowExecutionAlreadyStarted {
            run_id,
            start_request_id,
            ..
        } => {
            assert_eq!(run_id, "run-1");
            assert_eq!(start_request_id, "req-1");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let current = executions.get_current_execution("d", "wf").await.unwrap();
    assert_eq!(current.run_id, "run-1");
}

#[tokio::test]
async fn writes_with_stale_range_are_rejected() {
    let store = store_with_shard(4).await;
    let executions = store.execution_manager(SHARD);
    let key = ExecutionKey::new("d", "wf", "run");

    let err = executions
        .create_workflow_execution(create_request(&key, 3))
        .await
        .unwrap_err();
    assert!(err.is_ownership_lost());
    assert!(executions.get_workflow_execution(&key).await.is_err());
}

#[tokio::test]
async fn update_is_conditional_on_next_event_id() {
    let store = store_with_shard(1).await;
    let executions = store.execution_manager(SHARD);
    let key = ExecutionKey::new("d", "wf", "run");
    executions
        .create_workflow_execution(create_request(&key, 1))
        .await
        .unwrap();

    let mut info = executions
        .get_workflow_execution(&key)
        .await
        .unwrap()
        .execution_info;
    info.next_event_id = 5;

    let mut stale = UpdateWorkflowExecutionRequest::new(info.clone(), 2, 1);
    stale.upsert_timer_infos.push(TimerInfo {
        timer_id: "t".into(),
        started_event_id: 4,
        expiry_time: Utc::now(),
        task_id: Some(11),
    });
    let err = executions
        .update_workflow_execution(stale)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::ConditionFailed(_)));

    let mut fresh = UpdateWorkflowExecutionRequest::new(info, 3, 1);
    fresh.upsert_timer_infos.push(TimerInfo {
        timer_id: "t".into(),
        started_event_id: 4,
        expiry_time: Utc::now(),
        task_id: Some(11),
    });
    executions.update_workflow_execution(fresh).await.unwrap();

    let state = executions.get_workflow_execution(&key).await.unwrap();
    assert_eq!(state.execution_info.next_event_id, 5);
    assert!(state.timer_infos.contains_key("t"));
}

#[tokio::test]
async fn transfer_tasks_page_by_read_level() {
    let store = store_with_shard(1).await;
    let executions = store.execution_manager(SHARD);
    let key = ExecutionKey::new("d", "wf", "run");
    executions
        .create_workflow_execution(create_request(&key, 1))
        .await
        .unwrap();

    let mut info = executions
        .get_workflow_execution(&key)
        .await
        .unwrap()
        .execution_info;
    info.next_event_id = 4;
    let mut update = UpdateWorkflowExecutionRequest::new(info, 3, 1);
    for task_id in [11, 12, 13] {
        update.transfer_tasks.push(TransferTaskInfo {
            execution: key.clone(),
            task_id,
            kind: TransferTaskKind::DeleteExecution,
        });
    }
    executions.update_workflow_execution(update).await.unwrap();

    let page = executions.get_transfer_tasks(10, 12, 10).await.unwrap();
    assert_eq!(
        page.iter().map(|t| t.task_id).collect::<Vec<_>>(),
        vec![11, 12]
    );
    let page = executions.get_transfer_tasks(0, 100, 2).await.unwrap();
    assert_eq!(
        page.iter().map(|t| t.task_id).collect::<Vec<_>>(),
        vec![10, 11]
    );
    assert!(executions.get_transfer_tasks(13, 13, 10).await.unwrap().is_empty());

    executions.complete_transfer_task(10, 1).await.unwrap();
    executions.complete_transfer_task(10, 1).await.unwrap();
    assert_eq!(store.transfer_tasks(SHARD).len(), 3);
}

#[tokio::test]
async fn timer_tasks_are_ordered_by_time_then_id() {
    let store = store_with_shard(1).await;
    let executions = store.execution_manager(SHARD);
    let key = ExecutionKey::new("d", "wf", "run");
    let now = Utc::now();

    let mut request = create_request(&key, 1);
    for (offset, task_id) in [(5, 20), (1, 30), (1, 21)] {
        request.timer_tasks.push(TimerTaskInfo {
            execution: key.clone(),
            visibility_timestamp: now + Duration::seconds(offset),
            task_id,
            kind: TimerTaskKind::DecisionTimeout {
                schedule_id: 2,
                timeout_type: TimeoutType::StartToClose,
            },
        });
    }
    executions.create_workflow_execution(request).await.unwrap();

    let due = executions
        .get_timer_index_tasks(now, now + Duration::seconds(2), 10)
        .await
        .unwrap();
    assert_eq!(due.iter().map(|t| t.task_id).collect::<Vec<_>>(), vec![21, 30]);

    let all = executions
        .get_timer_index_tasks(now, now + Duration::days(1), 10)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    executions
        .complete_timer_task(now + Duration::seconds(1), 21, 1)
        .await
        .unwrap();
    assert_eq!(store.timer_tasks(SHARD).len(), 2);
}

#[tokio::test]
async fn history_batch_overwrite_requires_higher_transaction() {
    let store = store_with_shard(1).await;
    let key = ExecutionKey::new("d", "wf", "run");

    let append = |transaction_id: i64, ids: Vec<i64>| AppendHistoryEventsRequest {
        execution: key.clone(),
        first_event_id: ids[0],
        range_id: 1,
        transaction_id,
        events: ids.into_iter().map(event).collect(),
    };

    store.append_history_events(append(100, vec![1, 2])).await.unwrap();
    store.append_history_events(append(101, vec![3, 4, 5])).await.unwrap();

    let err = store
        .append_history_events(append(100, vec![3, 4]))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::ConditionFailed(_)));

    store.append_history_events(append(102, vec![3, 4])).await.unwrap();
    assert_eq!(store.history_batch_count(&key), 2);

    let events = store
        .get_workflow_execution_history(&key, 1, 5)
        .await
        .unwrap();
    assert_eq!(
        events.iter().map(|e| e.event_id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );

    store.delete_workflow_execution_history(&key).await.unwrap();
    assert!(matches!(
        store.get_workflow_execution_history(&key, 1, 5).await,
        Err(PersistenceError::NotFound(_))
    ));
}
