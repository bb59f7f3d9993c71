use std::sync::Arc;
use std::time::Duration;

use history_daemon::{DaemonConfig, DispatchedTask, HistoryNode};
use history_engine::api::{SignalWorkflowExecutionRequest, StartWorkflowExecutionRequest};
use history_engine::SystemTimeSource;
use history_persistence::InMemoryStore;

fn start_request(workflow_id: &str) -> StartWorkflowExecutionRequest {
    StartWorkflowExecutionRequest {
        domain_id: "domain".into(),
        workflow_id: workflow_id.into(),
        workflow_type: "order".into(),
        task_list: "orders".into(),
        input: Vec::new(),
        execution_start_to_close_timeout_secs: 3600,
        task_start_to_close_timeout_secs: 10,
        identity: "client".into(),
        request_id: format!("start-{workflow_id}"),
        parent: None,
    }
}

fn fast_config(owner: &str) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.owner = owner.into();
    config.history.transfer.poll_interval_ms = 20;
    config
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn started_workflow_is_dispatched_to_matching() {
    let node = HistoryNode::start(&fast_config("node-a")).await.unwrap();
    let run = node
        .engine()
        .start_workflow_execution(start_request("wf-1"))
        .await
        .unwrap();

    let dispatched = wait_until(|| {
        node.matching().dispatched().iter().any(|task| {
            matches!(task, DispatchedTask::Decision(d) if d.execution.run_id == run.run_id)
        })
    })
    .await;
    assert!(dispatched);

    let metrics = node.render_metrics();
    assert!(metrics.contains("StartWorkflowExecution"));
    node.shutdown().await;
}

#[tokio::test]
async fn a_second_node_takes_the_shard_over() {
    let store = InMemoryStore::new();
    let first = HistoryNode::start_with(&fast_config("node-a"), store.clone(), Arc::new(SystemTimeSource))
        .await
        .unwrap();
    let run = first
        .engine()
        .start_workflow_execution(start_request("wf-1"))
        .await
        .unwrap();

    let second = HistoryNode::start_with(&fast_config("node-b"), store.clone(), Arc::new(SystemTimeSource))
        .await
        .unwrap();
    assert!(second.engine().shard().current_range_id() > first.engine().shard().current_range_id());

    let signal = SignalWorkflowExecutionRequest {
        domain_id: "domain".into(),
        execution: history_types::WorkflowExecution::new("wf-1", run.run_id.clone()),
        signal_name: "ping".into(),
        input: Vec::new(),
        identity: "client".into(),
    };
    let err = first
        .engine()
        .signal_workflow_execution(signal.clone())
        .await
        .unwrap_err();
    assert!(err.is_shard_fatal());
    assert!(first.engine().shard().is_closed());

    second.engine().signal_workflow_execution(signal).await.unwrap();

    first.shutdown().await;
    second.shutdown().await;
}
