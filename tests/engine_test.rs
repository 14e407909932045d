/// End-to-end engine tests
///
/// Each test stands up a local axum server as the downstream micro-service,
/// installs a workflow, and runs the engine with millisecond-scale polling
/// so the coordination loops finish quickly. Step completion order and
/// counts are asserted through the in-memory run log.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use stepway::config::EngineConfig;
use stepway::runtime::{Engine, EventHub, MemoryRunLog, RunOptions};
use stepway::state::StateStore;
use stepway::workflow::{StepRegistry, ROOT_STEP};
use stepway::{Step, SubStep, Workflow};

/// Everything a test needs to run workflows against a recording target.
struct Harness {
    engine: Arc<Engine>,
    log: Arc<MemoryRunLog>,
    store: Arc<StateStore>,
    registry: Arc<StepRegistry>,
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        pause_poll_initial_ms: 20,
        pause_poll_increment_ms: 5,
        pause_poll_max_ms: 50,
        pause_horizon_ms: 30_000,
        admission_poll_initial_ms: 10,
        admission_poll_increment_ms: 5,
        admission_poll_max_ms: 30,
        admission_horizon_ms: 30_000,
        capacity_recheck_every: 5,
        stop_abandons_branch: false,
    }
}

fn harness() -> Harness {
    let registry = Arc::new(StepRegistry::new());
    let store = Arc::new(StateStore::new());
    let log = Arc::new(MemoryRunLog::new());
    let engine = Arc::new(Engine::new(
        registry.clone(),
        store.clone(),
        Arc::new(EventHub::new()),
        log.clone(),
        fast_config(),
    ));
    Harness {
        engine,
        log,
        store,
        registry,
    }
}

/// Spawn an axum router on an ephemeral port, returning its address.
async fn spawn_target(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Target recording which step numbers were called, in order.
async fn recording_target(hits: Arc<Mutex<Vec<i32>>>) -> SocketAddr {
    let router = Router::new().route(
        "/hit/{step}",
        post(
            |Path(step): Path<i32>, State(hits): State<Arc<Mutex<Vec<i32>>>>| async move {
                hits.lock().unwrap().push(step);
                StatusCode::OK
            },
        ),
    );
    spawn_target(router.with_state(hits)).await
}

fn step(number: i32, addr: SocketAddr, children: &[i32]) -> Step {
    Step {
        number,
        step_id: format!("s{number}"),
        callout_url: Some(format!("http://{addr}/hit/{{step}}")),
        method: Default::default(),
        callout_timeout_secs: 5,
        sub_steps: children.iter().map(|&c| SubStep::new(c)).collect(),
        retry: None,
        callback: None,
        webhook: None,
        scale_group: None,
        stop_on_action_failed: false,
        stop_on_webhook_failed: false,
        forward_response_data: false,
    }
}

fn workflow(name: &str, steps: Vec<Step>) -> Workflow {
    Workflow {
        name: name.to_string(),
        description: String::new(),
        steps,
    }
}

/// StepEnd entries excluding the synthetic root.
fn completed(log: &MemoryRunLog) -> Vec<i32> {
    log.completed_steps()
        .into_iter()
        .filter(|&s| s != ROOT_STEP)
        .collect()
}

#[tokio::test]
async fn diamond_runs_in_dependency_order() {
    let h = harness();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let addr = recording_target(hits.clone()).await;

    // 1 -> (2, 3) -> 4, with 4 requiring both parents
    h.registry
        .install(workflow(
            "diamond",
            vec![
                step(1, addr, &[2, 3]),
                step(2, addr, &[4]),
                step(3, addr, &[4]),
                step(4, addr, &[]),
            ],
        ))
        .unwrap();

    h.engine
        .run("diamond", RunOptions::default())
        .await
        .unwrap();

    let done = completed(&h.log);
    assert_eq!(done.len(), 4, "every step finishes exactly once: {done:?}");
    assert_eq!(done[0], 1);
    assert_eq!(done[3], 4);
    assert!(done[1..3].contains(&2) && done[1..3].contains(&3));
    assert_eq!(hits.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn double_fan_in_waits_for_all_ten_parents() {
    let h = harness();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let addr = recording_target(hits.clone()).await;

    // 1 -> (2, 8); 2 -> 3..7; 8 -> 9..13; all ten leaves -> 14
    let mut steps = vec![
        step(1, addr, &[2, 8]),
        step(2, addr, &[3, 4, 5, 6, 7]),
        step(8, addr, &[9, 10, 11, 12, 13]),
        step(14, addr, &[]),
    ];
    for n in (3..=7).chain(9..=13) {
        steps.push(step(n, addr, &[14]));
    }
    h.registry.install(workflow("fan", steps)).unwrap();

    h.engine.run("fan", RunOptions::default()).await.unwrap();

    let done = completed(&h.log);
    assert_eq!(done.len(), 14);
    assert_eq!(*done.last().unwrap(), 14, "fan-in step finishes last");
    assert_eq!(hits.lock().unwrap().iter().filter(|&&s| s == 14).count(), 1);
}

#[tokio::test]
async fn root_container_fans_out_to_all_parentless_steps() {
    let h = harness();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let addr = recording_target(hits.clone()).await;

    h.registry
        .install(workflow(
            "parallel",
            vec![step(1, addr, &[]), step(2, addr, &[]), step(3, addr, &[])],
        ))
        .unwrap();

    h.engine
        .run("parallel", RunOptions::default())
        .await
        .unwrap();

    let mut done = completed(&h.log);
    done.sort_unstable();
    assert_eq!(done, vec![1, 2, 3]);
}

/// Target recording wall-clock execution intervals per call.
async fn interval_target(
    spans: Arc<Mutex<Vec<(Instant, Instant)>>>,
    work: Duration,
) -> SocketAddr {
    let router = Router::new().route(
        "/hit/{step}",
        post(
            move |Path(_step): Path<i32>,
                  State(spans): State<Arc<Mutex<Vec<(Instant, Instant)>>>>| async move {
                let started = Instant::now();
                tokio::time::sleep(work).await;
                spans.lock().unwrap().push((started, Instant::now()));
                StatusCode::OK
            },
        ),
    );
    spawn_target(router.with_state(spans)).await
}

fn overlapping_pairs(spans: &[(Instant, Instant)]) -> usize {
    let mut overlaps = 0;
    for (i, a) in spans.iter().enumerate() {
        for b in &spans[i + 1..] {
            if a.0 < b.1 && b.0 < a.1 {
                overlaps += 1;
            }
        }
    }
    overlaps
}

#[tokio::test]
async fn scale_group_capacity_one_serializes_execution() {
    let h = harness();
    let spans = Arc::new(Mutex::new(Vec::new()));
    let addr = interval_target(spans.clone(), Duration::from_millis(60)).await;

    let mut steps = vec![
        step(1, addr, &[]),
        step(2, addr, &[]),
        step(3, addr, &[]),
    ];
    for s in &mut steps {
        s.scale_group = Some("serial".to_string());
    }
    h.registry.install(workflow("scaled", steps)).unwrap();
    h.store.set_capacity("serial", 1).await.unwrap();

    h.engine.run("scaled", RunOptions::default()).await.unwrap();

    let spans = spans.lock().unwrap();
    assert_eq!(spans.len(), 3);
    assert_eq!(overlapping_pairs(&spans), 0, "capacity 1 must not overlap");
}

#[tokio::test]
async fn scale_group_wide_capacity_allows_overlap() {
    let h = harness();
    let spans = Arc::new(Mutex::new(Vec::new()));
    let addr = interval_target(spans.clone(), Duration::from_millis(80)).await;

    let mut steps = vec![
        step(1, addr, &[]),
        step(2, addr, &[]),
        step(3, addr, &[]),
    ];
    for s in &mut steps {
        s.scale_group = Some("wide".to_string());
    }
    h.registry.install(workflow("scaled", steps)).unwrap();
    h.store.set_capacity("wide", 3).await.unwrap();

    h.engine.run("scaled", RunOptions::default()).await.unwrap();

    let spans = spans.lock().unwrap();
    assert_eq!(spans.len(), 3);
    assert!(overlapping_pairs(&spans) > 0, "capacity 3 should overlap");
}

#[tokio::test]
async fn paused_workflow_blocks_steps_until_resumed() {
    use stepway::runtime::RunStateCoordinator;
    use stepway::workflow::types::RunState;

    let h = harness();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let addr = recording_target(hits.clone()).await;

    h.registry
        .install(workflow("pausable", vec![step(1, addr, &[2]), step(2, addr, &[])]))
        .unwrap();

    let key = RunStateCoordinator::workflow_key("pausable");
    h.store.set_run_state(&key, RunState::Paused).await.unwrap();

    let run = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.run("pausable", RunOptions::default()).await })
    };

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(hits.lock().unwrap().is_empty(), "paused run must not dispatch");

    h.store.set_run_state(&key, RunState::Ready).await.unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(completed(&h.log), vec![1, 2]);
}

#[tokio::test]
async fn retry_policy_makes_exactly_three_attempts() {
    use stepway::workflow::types::RetryPolicy;

    let h = harness();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new().route(
        "/hit/{step}",
        post(
            |Path(step): Path<i32>, State(hits): State<Arc<Mutex<Vec<i32>>>>| async move {
                hits.lock().unwrap().push(step);
                StatusCode::INTERNAL_SERVER_ERROR
            },
        ),
    );
    let addr = spawn_target(router.with_state(hits.clone())).await;

    let mut s = step(1, addr, &[]);
    s.retry = Some(RetryPolicy {
        delay_secs: 0,
        max_delay_secs: 1,
        max_retries: 2,
        backoff_coefficient: 2.0,
        timeout_secs: 30,
    });
    h.registry.install(workflow("retrying", vec![s])).unwrap();

    h.engine
        .run("retrying", RunOptions::default())
        .await
        .unwrap();

    // 1 attempt + 2 retries, then a failed (not errored) step outcome
    assert_eq!(hits.lock().unwrap().len(), 3);
    assert_eq!(completed(&h.log), vec![1]);
}

#[tokio::test]
async fn failed_step_still_fans_out_unless_flagged() {
    let h = harness();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new().route(
        "/hit/{step}",
        post(
            |Path(step): Path<i32>, State(hits): State<Arc<Mutex<Vec<i32>>>>| async move {
                hits.lock().unwrap().push(step);
                // Step 1 fails, everything else succeeds
                if step == 1 {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::OK
                }
            },
        ),
    );
    let addr = spawn_target(router.with_state(hits.clone())).await;

    h.registry
        .install(workflow("lenient", vec![step(1, addr, &[2]), step(2, addr, &[])]))
        .unwrap();

    h.engine.run("lenient", RunOptions::default()).await.unwrap();

    // The failed step is recorded unsuccessful but its child still runs
    assert_eq!(completed(&h.log), vec![1, 2]);
    assert!(hits.lock().unwrap().contains(&2));
}

#[tokio::test]
async fn stop_on_action_failed_halts_the_branch() {
    use stepway::runtime::RunLogEntry;

    let h = harness();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new().route(
        "/hit/{step}",
        post(
            |Path(step): Path<i32>, State(hits): State<Arc<Mutex<Vec<i32>>>>| async move {
                hits.lock().unwrap().push(step);
                if step == 1 {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::OK
                }
            },
        ),
    );
    let addr = spawn_target(router.with_state(hits.clone())).await;

    let mut first = step(1, addr, &[2]);
    first.stop_on_action_failed = true;
    h.registry
        .install(workflow("strict", vec![first, step(2, addr, &[])]))
        .unwrap();

    h.engine.run("strict", RunOptions::default()).await.unwrap();

    // Branch stopped: the child never dispatched, the failure was logged
    assert!(!hits.lock().unwrap().contains(&2));
    assert!(completed(&h.log).is_empty());
    let entries = h.log.entries();
    assert!(entries
        .iter()
        .any(|e| matches!(e, RunLogEntry::StepFailed { step: 1, .. })));
    assert!(entries
        .iter()
        .any(|e| matches!(e, RunLogEntry::RunError { timeout: false, .. })));
}

#[tokio::test]
async fn loop_count_runs_separate_iterations() {
    let h = harness();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let addr = recording_target(hits.clone()).await;

    h.registry
        .install(workflow("looped", vec![step(1, addr, &[])]))
        .unwrap();

    h.engine
        .run(
            "looped",
            RunOptions {
                loop_count: 3,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(hits.lock().unwrap().len(), 3);

    // Each iteration ran under its own run id
    let run_ids: std::collections::HashSet<String> = h
        .log
        .entries()
        .iter()
        .filter_map(|e| match e {
            stepway::runtime::RunLogEntry::OrchestrationStart { run_id } => Some(run_id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(run_ids.len(), 3);
}
