mod common;

use common::{graph, id, registry, retry, server, slow_provider};
use serde_json::{Map, Value, json};
use stackflow_cloud::{CallKind, CloudError};
use stackflow_core::{NodeState, ResourceCategory};
use stackflow_engine::{CancellationHandle, EngineConfig, FailureReason, ProvisioningEngine};
use std::time::Duration;
use tokio::time::Instant;

/// Security groups `sg0 <- sg1 <- ... <- sg{n-1}`, each referencing the previous one
fn chain(n: usize) -> Value {
    let mut groups = Map::new();
    groups.insert("sg0".to_string(), json!({"provider": "mem"}));
    for i in 1..n {
        groups.insert(
            format!("sg{}", i),
            json!({"provider": "mem", "rules": [{"source": format!("sg{}", i - 1)}]}),
        );
    }
    json!({"name": "shop", "version": "1", "security_groups": groups})
}

fn independent(n: usize, provider: &str) -> Value {
    let queues: Map<String, Value> = (0..n)
        .map(|i| (format!("q{}", i), json!({"provider": provider})))
        .collect();
    json!({"name": "shop", "version": "1", "queues": queues})
}

#[tokio::test(start_paused = true)]
async fn test_chain_order_is_respected_with_many_workers() {
    let mem = slow_provider("mem", 100);
    let g = graph(chain(4));
    let engine = ProvisioningEngine::new(EngineConfig::default().with_workers(4));

    let started = Instant::now();
    let report = engine.run(&g, &registry(&[&mem])).await.unwrap();
    assert!(report.is_success());

    let calls = mem.calls();
    for i in 1..4 {
        let previous = format!("sg{}", i - 1);
        let current = format!("sg{}", i);
        let previous_done = calls
            .iter()
            .filter(|c| c.resource == previous)
            .map(|c| c.finished_at)
            .max()
            .unwrap();
        let current_start = calls
            .iter()
            .filter(|c| c.resource == current)
            .map(|c| c.started_at)
            .min()
            .unwrap();
        assert!(
            current_start >= previous_done,
            "{current} started before {previous} finished"
        );
    }
    // exists + create per node, strictly one node at a time
    assert!(started.elapsed() >= Duration::from_millis(800));
    assert_eq!(mem.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_more_workers_never_slower() {
    let mut elapsed = Vec::new();
    for workers in [1, 2, 4, 8] {
        let mem = slow_provider("mem", 50);
        let g = graph(independent(8, "mem"));
        let engine = ProvisioningEngine::new(EngineConfig::default().with_workers(workers));

        let started = Instant::now();
        let report = engine.run(&g, &registry(&[&mem])).await.unwrap();
        assert!(report.is_success());
        assert!(mem.max_in_flight() <= workers);
        elapsed.push(started.elapsed());
    }

    for pair in elapsed.windows(2) {
        assert!(pair[1] <= pair[0], "{:?}", elapsed);
    }
    // one worker runs the eight nodes back to back, eight run them together
    assert!(elapsed[0] >= Duration::from_millis(800));
    assert!(elapsed[3] < Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_provider_limit_caps_concurrency() {
    let capped = slow_provider("capped", 100);
    let free = slow_provider("free", 100);

    let mut tree = independent(6, "capped");
    let servers: Map<String, Value> = (0..3)
        .map(|i| (format!("s{}", i), json!({"provider": "free"})))
        .collect();
    tree["servers"] = Value::Object(servers);
    let g = graph(tree);

    let engine = ProvisioningEngine::new(
        EngineConfig::default()
            .with_workers(9)
            .with_provider_limit("capped", 2),
    );
    let report = engine.run(&g, &registry(&[&capped, &free])).await.unwrap();

    assert!(report.is_success());
    assert_eq!(capped.max_in_flight(), 2);
    assert_eq!(free.max_in_flight(), 3);
    assert_eq!(capped.count(CallKind::Create), 6);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_lets_in_flight_finish_and_starts_nothing_new() {
    let mem = slow_provider("mem", 100);
    let g = graph(chain(3));
    let cancel = CancellationHandle::new();
    let engine = ProvisioningEngine::new(EngineConfig::default()).with_cancellation(cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let report = engine.run(&g, &registry(&[&mem])).await.unwrap();

    assert!(report.cancelled);
    let sg0 = report.get(&id(ResourceCategory::SecurityGroups, "sg0")).unwrap();
    assert_eq!(sg0.state, NodeState::Provisioned);
    for name in ["sg1", "sg2"] {
        let result = report.get(&id(ResourceCategory::SecurityGroups, name)).unwrap();
        assert_eq!(result.state, NodeState::Failed);
        assert_eq!(result.error, Some(FailureReason::Cancelled));
        assert_eq!(mem.count_for(CallKind::Exists, name), 0);
    }
    assert_eq!(report.summary().cancelled, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let mem = slow_provider("mem", 10);
    mem.fail_create("web", 3, CloudError::RateLimited("throttled".into()));
    let g = graph(json!({
        "name": "shop", "version": "1",
        "servers": {"web": {"provider": "mem"}}
    }));
    let engine = ProvisioningEngine::new(EngineConfig::default().with_retry(retry(5, 1_000)));
    let cancel = engine.cancellation_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();
    });
    let started = Instant::now();
    let report = engine.run(&g, &registry(&[&mem])).await.unwrap();

    let web = report.get(&server("web")).unwrap();
    assert_eq!(web.error, Some(FailureReason::Cancelled));
    assert_eq!(web.attempts, 1);
    assert!(started.elapsed() < Duration::from_millis(1_000));
}

#[tokio::test]
async fn test_cancelled_before_start_calls_nothing() {
    let mem = slow_provider("mem", 0);
    let g = graph(chain(2));
    let engine = ProvisioningEngine::default();
    engine.cancellation_handle().cancel();

    let report = engine.run(&g, &registry(&[&mem])).await.unwrap();
    assert!(report.cancelled);
    assert!(mem.calls().is_empty());
    assert!(report
        .results
        .values()
        .all(|r| r.error == Some(FailureReason::Cancelled)));
}
