mod common;

use common::*;
use history_engine::api::*;
use history_engine::HistoryError;
use history_metrics::{Counter, Scope};
use history_types::{Decision, EventAttributes, WorkflowExecution};

fn cancel_request(workflow_id: &str, request_id: &str) -> RequestCancelWorkflowExecutionRequest {
    RequestCancelWorkflowExecutionRequest {
        domain_id: DOMAIN.into(),
        workflow_id: workflow_id.into(),
        run_id: None,
        request_id: request_id.into(),
        identity: "client".into(),
        cause: "operator".into(),
    }
}

fn signal(execution: &WorkflowExecution, name: &str) -> SignalWorkflowExecutionRequest {
    SignalWorkflowExecutionRequest {
        domain_id: DOMAIN.into(),
        execution: execution.clone(),
        signal_name: name.into(),
        input: Vec::new(),
        identity: "client".into(),
    }
}

#[tokio::test]
async fn start_is_idempotent_per_request_id() {
    let h = Harness::new().await;
    let first = h
        .engine
        .start_workflow_execution(start_request("wf", "req-1"))
        .await
        .unwrap();
    let retried = h
        .engine
        .start_workflow_execution(start_request("wf", "req-1"))
        .await
        .unwrap();
    assert_eq!(first.run_id, retried.run_id);

    let err = h
        .engine
        .start_workflow_execution(start_request("wf", "req-2"))
        .await
        .unwrap_err();
    match err {
        HistoryError::WorkflowExecutionAlreadyStarted { run_id, start_request_id } => {
            assert_eq!(run_id, first.run_id);
            assert_eq!(start_request_id, "req-1");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn start_rejects_incomplete_requests() {
    let h = Harness::new().await;
    let mut request = start_request("wf", "req-1");
    request.task_list.clear();
    let err = h.engine.start_workflow_execution(request).await.unwrap_err();
    assert!(matches!(err, HistoryError::BadRequest(_)));

    let mut request = start_request("wf", "req-1");
    request.task_start_to_close_timeout_secs = 0;
    let err = h.engine.start_workflow_execution(request).await.unwrap_err();
    assert!(matches!(err, HistoryError::BadRequest(_)));
}

#[tokio::test]
async fn decision_start_is_idempotent_for_the_same_poll() {
    let h = Harness::new().await;
    let wf = h.start_workflow("wf").await;
    let first = h.start_decision(&wf, 2).await;
    let again = h.start_decision(&wf, 2).await;
    assert_eq!(first, again);

    let err = h
        .engine
        .record_decision_task_started(RecordDecisionTaskStartedRequest {
            domain_id: DOMAIN.into(),
            execution: wf.clone(),
            schedule_id: 2,
            request_id: "another-poller".into(),
            identity: "worker-2".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::EventAlreadyStarted(_)));
    assert_eq!(count_events(&h.history(&wf).await, |a| matches!(a, EventAttributes::DecisionTaskStarted { .. })), 1);
}

#[tokio::test]
async fn two_completion_decisions_are_rejected() {
    let h = Harness::new().await;
    let wf = h.start_workflow("wf").await;
    let started = h.start_decision(&wf, 2).await;

    let err = h
        .engine
        .respond_decision_task_completed(RespondDecisionTaskCompletedRequest {
            domain_id: DOMAIN.into(),
            execution: wf.clone(),
            schedule_id: 2,
            started_id: started,
            decisions: vec![
                Decision::CompleteWorkflowExecution { result: Vec::new() },
                Decision::FailWorkflowExecution {
                    reason: "nope".into(),
                    details: Vec::new(),
                },
            ],
            execution_context: Vec::new(),
            identity: "worker".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::BadRequest(_)));

    let metrics = h.engine.shard().metrics();
    assert_eq!(
        metrics.counter_value(
            Scope::HistoryRespondDecisionTaskCompleted,
            Counter::MultipleCompletionDecisions
        ),
        1
    );
    assert_eq!(
        event_types(&h.history(&wf).await),
        vec![
            "WorkflowExecutionStarted",
            "DecisionTaskScheduled",
            "DecisionTaskStarted"
        ]
    );
}

#[tokio::test]
async fn signals_land_until_the_run_is_terminated() {
    let h = Harness::new().await;
    let wf = h.start_workflow("wf").await;
    h.engine.signal_workflow_execution(signal(&wf, "ping")).await.unwrap();

    // The first decision is still pending, so no second one is scheduled.
    let history = h.history(&wf).await;
    assert_eq!(
        event_types(&history),
        vec![
            "WorkflowExecutionStarted",
            "DecisionTaskScheduled",
            "WorkflowExecutionSignaled"
        ]
    );

    h.engine
        .terminate_workflow_execution(TerminateWorkflowExecutionRequest {
            domain_id: DOMAIN.into(),
            execution: wf.clone(),
            reason: "operator".into(),
            details: Vec::new(),
            identity: "client".into(),
        })
        .await
        .unwrap();

    let err = h
        .engine
        .signal_workflow_execution(signal(&wf, "late"))
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::EntityNotExists(_)));

    let next = h
        .engine
        .get_workflow_execution_next_event_id(GetWorkflowExecutionNextEventIdRequest {
            domain_id: DOMAIN.into(),
            execution: WorkflowExecution::new("wf", ""),
            expected_next_event_id: None,
        })
        .await
        .unwrap();
    assert_eq!(next.run_id, wf.run_id);
    assert!(!next.is_running);
}

#[tokio::test]
async fn cancel_requests_are_idempotent_per_request_id() {
    let h = Harness::new().await;
    let wf = h.start_workflow("wf").await;

    h.engine
        .request_cancel_workflow_execution(cancel_request("wf", "cancel-1"))
        .await
        .unwrap();
    h.engine
        .request_cancel_workflow_execution(cancel_request("wf", "cancel-1"))
        .await
        .unwrap();
    let err = h
        .engine
        .request_cancel_workflow_execution(cancel_request("wf", "cancel-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::CancellationAlreadyRequested(_)));

    let history = h.history(&wf).await;
    assert_eq!(
        count_events(&history, |a| matches!(
            a,
            EventAttributes::WorkflowExecutionCancelRequested { .. }
        )),
        1
    );
}

#[tokio::test]
async fn heartbeat_reports_requested_cancellation() {
    let h = Harness::new().await;
    let wf = h.start_workflow("wf").await;
    let started = h.start_decision(&wf, 2).await;
    h.engine
        .respond_decision_task_completed(RespondDecisionTaskCompletedRequest {
            domain_id: DOMAIN.into(),
            execution: wf.clone(),
            schedule_id: 2,
            started_id: started,
            decisions: vec![Decision::ScheduleActivityTask {
                activity_id: "upload".into(),
                activity_type: "upload-file".into(),
                task_list: None,
                input: Vec::new(),
                schedule_to_close_timeout_secs: 600,
                schedule_to_start_timeout_secs: 60,
                start_to_close_timeout_secs: 300,
                heartbeat_timeout_secs: 30,
            }],
            execution_context: Vec::new(),
            identity: "worker".into(),
        })
        .await
        .unwrap();

    // 4: DecisionTaskCompleted, 5: ActivityTaskScheduled
    h.engine
        .record_activity_task_started(RecordActivityTaskStartedRequest {
            domain_id: DOMAIN.into(),
            execution: wf.clone(),
            schedule_id: 5,
            request_id: "activity-poll".into(),
            identity: "worker".into(),
        })
        .await
        .unwrap();

    let heartbeat = |details: &str| RecordActivityTaskHeartbeatRequest {
        domain_id: DOMAIN.into(),
        execution: wf.clone(),
        schedule_id: 5,
        details: details.as_bytes().to_vec(),
        identity: "worker".into(),
    };
    let response = h
        .engine
        .record_activity_task_heartbeat(heartbeat("10%"))
        .await
        .unwrap();
    assert!(!response.cancel_requested);

    // Activity started is event 6, so the next decision is scheduled at 7.
    h.engine
        .signal_workflow_execution(signal(&wf, "stop-upload"))
        .await
        .unwrap();
    let history = h.history(&wf).await;
    let scheduled = history
        .iter()
        .rev()
        .find(|e| matches!(e.attributes, EventAttributes::DecisionTaskScheduled { .. }))
        .map(|e| e.event_id)
        .unwrap();
    let started = h.start_decision(&wf, scheduled).await;
    h.engine
        .respond_decision_task_completed(RespondDecisionTaskCompletedRequest {
            domain_id: DOMAIN.into(),
            execution: wf.clone(),
            schedule_id: scheduled,
            started_id: started,
            decisions: vec![Decision::RequestCancelActivityTask {
                activity_id: "upload".into(),
            }],
            execution_context: Vec::new(),
            identity: "worker".into(),
        })
        .await
        .unwrap();

    let response = h
        .engine
        .record_activity_task_heartbeat(heartbeat("20%"))
        .await
        .unwrap();
    assert!(response.cancel_requested);
}

#[tokio::test]
async fn next_event_id_follows_the_current_run() {
    let h = Harness::new().await;
    let wf = h.start_workflow("wf").await;
    let response = h
        .engine
        .get_workflow_execution_next_event_id(GetWorkflowExecutionNextEventIdRequest {
            domain_id: DOMAIN.into(),
            execution: WorkflowExecution::new("wf", ""),
            expected_next_event_id: Some(3),
        })
        .await
        .unwrap();
    assert_eq!(response.run_id, wf.run_id);
    assert_eq!(response.next_event_id, 3);
    assert!(response.is_running);

    let err = h
        .engine
        .get_workflow_execution_next_event_id(GetWorkflowExecutionNextEventIdRequest {
            domain_id: DOMAIN.into(),
            execution: WorkflowExecution::new("unknown", ""),
            expected_next_event_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::EntityNotExists(_)));
}
