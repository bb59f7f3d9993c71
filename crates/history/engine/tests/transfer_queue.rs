mod common;

use common::*;
use history_engine::api::{
    GetWorkflowExecutionNextEventIdRequest, RecordActivityTaskStartedRequest,
    RespondDecisionTaskCompletedRequest,
};
use history_types::{Decision, EventAttributes, WorkflowCloseOutcome, WorkflowExecution};

async fn complete_decision(
    h: &Harness,
    execution: &WorkflowExecution,
    schedule_id: i64,
    started_id: i64,
    decisions: Vec<Decision>,
) {
    h.engine
        .respond_decision_task_completed(RespondDecisionTaskCompletedRequest {
            domain_id: DOMAIN.into(),
            execution: execution.clone(),
            schedule_id,
            started_id,
            decisions,
            execution_context: Vec::new(),
            identity: "worker".into(),
        })
        .await
        .unwrap();
}

async fn current_run(h: &Harness, workflow_id: &str) -> Option<WorkflowExecution> {
    h.engine
        .get_workflow_execution_next_event_id(GetWorkflowExecutionNextEventIdRequest {
            domain_id: DOMAIN.into(),
            execution: WorkflowExecution::new(workflow_id, ""),
            expected_next_event_id: None,
        })
        .await
        .ok()
        .map(|r| WorkflowExecution::new(workflow_id, r.run_id))
}

#[tokio::test]
async fn decision_task_is_dispatched_and_acked() {
    let h = &Harness::new().await;
    h.engine.start();
    let wf = &h.start_workflow("wf-dispatch").await;

    let dispatched = eventually(move || async move { h.matching.decisions.lock().len() == 1 }).await;
    assert!(dispatched);
    {
        let decisions = h.matching.decisions.lock();
        assert_eq!(decisions[0].execution, *wf);
        assert_eq!(decisions[0].task_list, "orders");
        assert_eq!(decisions[0].schedule_id, 2);
    }

    let acked = eventually(move || async move {
        h.store.transfer_tasks(SHARD).is_empty() && h.engine.shard().transfer_ack_level().await > 0
    })
    .await;
    h.engine.stop().await;
    assert!(acked);
}

#[tokio::test]
async fn scheduled_activity_reaches_matching_and_completion_schedules_a_decision() {
    let h = &Harness::new().await;
    h.engine.start();
    let wf = &h.start_workflow("wf-activity").await;
    let started = h.start_decision(wf, 2).await;
    complete_decision(
        h,
        wf,
        2,
        started,
        vec![Decision::ScheduleActivityTask {
            activity_id: "charge".into(),
            activity_type: "charge-card".into(),
            task_list: None,
            input: b"order-1".to_vec(),
            schedule_to_close_timeout_secs: 60,
            schedule_to_start_timeout_secs: 20,
            start_to_close_timeout_secs: 30,
            heartbeat_timeout_secs: 0,
        }],
    )
    .await;

    let dispatched =
        eventually(move || async move { h.matching.activities.lock().len() == 1 }).await;
    assert!(dispatched);
    let schedule_id = {
        let activities = h.matching.activities.lock();
        assert_eq!(activities[0].task_list, "orders");
        assert_eq!(activities[0].schedule_to_start_timeout_secs, 20);
        activities[0].schedule_id
    };
    assert_eq!(schedule_id, 5);

    h.engine
        .record_activity_task_started(RecordActivityTaskStartedRequest {
            domain_id: DOMAIN.into(),
            execution: wf.clone(),
            schedule_id,
            request_id: "activity-poll".into(),
            identity: "worker".into(),
        })
        .await
        .unwrap();
    h.engine
        .respond_activity_task_completed(
            DOMAIN.into(),
            wf.clone(),
            schedule_id,
            b"charged".to_vec(),
            "worker".into(),
        )
        .await
        .unwrap();

    let redispatched =
        eventually(move || async move { h.matching.decisions.lock().len() == 2 }).await;
    h.engine.stop().await;
    assert!(redispatched);
}

#[tokio::test]
async fn child_workflow_runs_and_reports_back_to_parent() {
    let h = &Harness::new().await;
    h.engine.start();
    let parent = &h.start_workflow("parent").await;
    let started = h.start_decision(parent, 2).await;
    complete_decision(
        h,
        parent,
        2,
        started,
        vec![Decision::StartChildWorkflowExecution {
            domain_id: None,
            workflow_id: "child".into(),
            workflow_type: "child-type".into(),
            task_list: Some("children".into()),
            input: Vec::new(),
            execution_start_to_close_timeout_secs: 600,
            task_start_to_close_timeout_secs: 10,
        }],
    )
    .await;

    let child_scheduled = eventually(move || async move {
        h.matching
            .decisions
            .lock()
            .iter()
            .any(|d| d.execution.workflow_id == "child" && d.task_list == "children")
    })
    .await;
    assert!(child_scheduled);

    let child = &current_run(h, "child").await.expect("child started");
    let parent_history = h.history(parent).await;
    assert_eq!(
        count_events(&parent_history, |a| matches!(
            a,
            EventAttributes::ChildWorkflowExecutionStarted { execution, .. } if execution == child
        )),
        1
    );

    let child_started = h.start_decision(child, 2).await;
    complete_decision(
        h,
        child,
        2,
        child_started,
        vec![Decision::CompleteWorkflowExecution {
            result: b"done".to_vec(),
        }],
    )
    .await;

    let reported = eventually(move || async move {
        let history = h.history(parent).await;
        count_events(&history, |a| {
            matches!(
                a,
                EventAttributes::ChildWorkflowExecutionClosed {
                    outcome: WorkflowCloseOutcome::Completed { result },
                    ..
                } if result.as_slice() == b"done"
            )
        }) == 1
    })
    .await;
    assert!(reported);

    let deleted = eventually(move || async move { current_run(h, "child").await.is_none() }).await;
    h.engine.stop().await;
    assert!(deleted);
}

#[tokio::test]
async fn external_cancellation_is_delivered_or_reported_as_failed() {
    let h = &Harness::new().await;
    h.engine.start();
    let target = &h.start_workflow("target").await;
    let requester = &h.start_workflow("requester").await;
    let started = h.start_decision(requester, 2).await;
    complete_decision(
        h,
        requester,
        2,
        started,
        vec![
            Decision::RequestCancelExternalWorkflowExecution {
                domain_id: None,
                workflow_id: "target".into(),
                run_id: None,
            },
            Decision::RequestCancelExternalWorkflowExecution {
                domain_id: None,
                workflow_id: "missing".into(),
                run_id: None,
            },
        ],
    )
    .await;

    let settled = eventually(move || async move {
        let history = h.history(requester).await;
        let delivered = count_events(&history, |a| {
            matches!(a, EventAttributes::ExternalWorkflowExecutionCancelRequested { workflow_id, .. } if workflow_id == "target")
        });
        let failed = count_events(&history, |a| {
            matches!(a, EventAttributes::RequestCancelExternalWorkflowExecutionFailed { workflow_id, .. } if workflow_id == "missing")
        });
        delivered == 1 && failed == 1
    })
    .await;
    assert!(settled);

    let target_history = h.history(target).await;
    h.engine.stop().await;
    assert_eq!(
        count_events(&target_history, |a| matches!(
            a,
            EventAttributes::WorkflowExecutionCancelRequested { .. }
        )),
        1
    );
}
