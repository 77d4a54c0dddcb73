//! End-to-end engine tests against scripted adapters.

use super::*;
use crate::adapter::DeployAck;
use crate::config::{presets, Environment, StageAction};
use crate::core::ArtifactKind;
use crate::events::CollectingEventSink;
use crate::store::MemoryArtifactStore;
use crate::testing::ScriptedAdapter;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::time::Duration;

fn fetch_stage(name: &str) -> StageConfig {
    StageConfig::new(
        name,
        StageAction::FetchSource {
            owner: "acme".to_string(),
            repo: "platform".to_string(),
            branch: "main".to_string(),
        },
        ArtifactKind::SourceTree,
    )
}

fn build_stage(name: &str, dep: &str) -> StageConfig {
    StageConfig::new(
        name,
        StageAction::RunBuild {
            commands: vec!["test".to_string()],
            env: BTreeMap::new(),
        },
        ArtifactKind::BuildOutput,
    )
    .with_dependency(dep)
    .with_input(ArtifactKind::SourceTree)
}

fn deploy_stage(dep: &str, input: ArtifactKind) -> StageConfig {
    StageConfig::new(
        "deploy",
        StageAction::ApplyDeployment {
            target: Environment::Dev,
            require_approval: false,
        },
        ArtifactKind::DeploymentRecord,
    )
    .with_dependency(dep)
    .with_input(input)
}

fn three_stage_no_retry() -> PipelineConfig {
    PipelineConfig::new("delivery", Environment::Dev)
        .with_stage(fetch_stage("source"))
        .with_stage(build_stage("build", "source"))
        .with_stage(deploy_stage("build", ArtifactKind::BuildOutput))
}

struct Harness {
    engine: PipelineEngine,
    adapter: Arc<ScriptedAdapter>,
    store: Arc<MemoryArtifactStore>,
}

fn harness(configs: Vec<PipelineConfig>) -> Harness {
    let adapter = Arc::new(ScriptedAdapter::new());
    let store = Arc::new(MemoryArtifactStore::new());
    let engine = PipelineEngine::new(configs, adapter.clone(), store.clone()).unwrap();
    Harness {
        engine,
        adapter,
        store,
    }
}

#[tokio::test]
async fn test_three_stage_run_succeeds() {
    let h = harness(vec![presets::source_build_deploy(
        Environment::Dev,
        "acme",
        "platform",
        "main",
    )]);

    let run = h.engine.start("dev-delivery").unwrap();
    let snapshot = h.engine.wait(run).await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Succeeded);
    for stage in &snapshot.stages {
        assert_eq!(stage.status, StageStatus::Succeeded, "{}", stage.name);
        assert_eq!(stage.attempts, 1);
    }
    assert_eq!(h.adapter.fetch_calls(), 1);
    assert_eq!(h.adapter.build_calls(), 1);
    assert_eq!(h.adapter.deploy_calls(), 1);

    // the deployment record is in the store and decodes as an ack
    let deploy_ref = snapshot.stage("deploy").unwrap().artifact.clone().unwrap();
    let payload = h.store.get(&deploy_ref).await.unwrap();
    let ack: DeployAck = serde_json::from_slice(&payload).unwrap();
    assert_eq!(ack.environment, Environment::Dev);
}

#[tokio::test]
async fn test_stages_start_after_predecessors_finish() {
    let h = harness(vec![three_stage_no_retry()]);

    let run = h.engine.start("delivery").unwrap();
    let snapshot = h.engine.wait(run).await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Succeeded);
    let source = snapshot.stage("source").unwrap();
    let build = snapshot.stage("build").unwrap();
    let deploy = snapshot.stage("deploy").unwrap();

    assert!(build.started_at.unwrap() >= source.finished_at.unwrap());
    assert!(deploy.started_at.unwrap() >= build.finished_at.unwrap());
}

#[tokio::test]
async fn test_failed_build_skips_deploy() {
    let h = harness(vec![three_stage_no_retry()]);
    h.adapter.fail_next_build("compile error");

    let run = h.engine.start("delivery").unwrap();
    let snapshot = h.engine.wait(run).await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert_eq!(snapshot.stage("source").unwrap().status, StageStatus::Succeeded);

    let build = snapshot.stage("build").unwrap();
    assert_eq!(build.status, StageStatus::Failed);
    assert!(build.last_error.as_deref().unwrap().contains("compile error"));

    assert_eq!(snapshot.stage("deploy").unwrap().status, StageStatus::Skipped);
    assert_eq!(h.adapter.deploy_calls(), 0);
    assert!(h.store.lookup(run, "deploy").is_none());
}

#[tokio::test]
async fn test_retry_succeeds_after_transient_failures() {
    let mut config = three_stage_no_retry();
    config.stages[1].retry = RetryPolicy::new()
        .with_max_attempts(3)
        .with_base_delay_ms(1)
        .without_jitter();
    let h = harness(vec![config]);
    h.adapter.fail_next_build("flaky");
    h.adapter.fail_next_build("flaky again");

    let run = h.engine.start("delivery").unwrap();
    let snapshot = h.engine.wait(run).await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Succeeded);
    assert_eq!(snapshot.stage("build").unwrap().attempts, 3);
    assert_eq!(h.adapter.build_calls(), 3);
}

#[tokio::test]
async fn test_retries_exhausted_fail_the_run() {
    let mut config = three_stage_no_retry();
    config.stages[1].retry = RetryPolicy::new()
        .with_max_attempts(2)
        .with_base_delay_ms(1)
        .without_jitter();
    config.stages[1].timeout_ms = 20;
    let h = harness(vec![config]);
    h.adapter.hang_next_build();
    h.adapter.hang_next_build();

    let run = h.engine.start("delivery").unwrap();
    let snapshot = h.engine.wait(run).await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    let build = snapshot.stage("build").unwrap();
    assert_eq!(build.status, StageStatus::Failed);
    assert_eq!(build.attempts, 2);
    assert!(build.last_error.as_deref().unwrap().contains("timed out"));
    assert_eq!(h.adapter.build_calls(), 2);
}

#[tokio::test]
async fn test_single_flight_per_pipeline_name() {
    let h = harness(vec![three_stage_no_retry()]);
    h.adapter.set_delay(Duration::from_millis(100));

    let run = h.engine.start("delivery").unwrap();
    let second = h.engine.start("delivery");
    assert!(matches!(second, Err(EngineError::AlreadyRunning(_))));

    h.engine.wait(run).await.unwrap();

    // the lock is released on terminal state
    let rerun = h.engine.start("delivery").unwrap();
    assert!(rerun > run);
    h.engine.wait(rerun).await.unwrap();
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let h = harness(vec![three_stage_no_retry()]);
    h.adapter.set_delay(Duration::from_millis(200));

    let run = h.engine.start("delivery").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.engine.cancel(run).unwrap();
    h.engine.cancel(run).unwrap();

    let first = h.engine.wait(run).await.unwrap();
    h.engine.cancel(run).unwrap();
    let second = h.engine.status(run).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.status, ExecutionStatus::Failed);
    assert_eq!(first.cancel_reason.as_deref(), Some("cancelled by caller"));
    assert_eq!(first.stage("source").unwrap().status, StageStatus::Cancelled);
    assert_eq!(first.stage("deploy").unwrap().status, StageStatus::Skipped);
    assert!(h.store.lookup(run, "source").is_none());
}

#[tokio::test]
async fn test_independent_stages_fan_in() {
    let config = PipelineConfig::new("fan", Environment::Dev)
        .with_stage(fetch_stage("source"))
        .with_stage(build_stage("build-api", "source"))
        .with_stage(build_stage("build-ui", "source"))
        .with_stage(
            deploy_stage("build-api", ArtifactKind::BuildOutput).with_dependency("build-ui"),
        );
    let h = harness(vec![config]);

    let run = h.engine.start("fan").unwrap();
    let snapshot = h.engine.wait(run).await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Succeeded);
    assert_eq!(h.adapter.build_calls(), 2);

    let deploy = snapshot.stage("deploy").unwrap();
    for name in ["build-api", "build-ui"] {
        let build = snapshot.stage(name).unwrap();
        assert_eq!(build.status, StageStatus::Succeeded);
        assert!(deploy.started_at.unwrap() >= build.finished_at.unwrap());
    }
}

#[tokio::test]
async fn test_unknown_pipeline_and_run() {
    let h = harness(vec![three_stage_no_retry()]);

    assert!(matches!(
        h.engine.start("nope"),
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        h.engine.status(RunId(999)),
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        h.engine.wait(RunId(999)).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        h.engine.cancel(RunId(999)),
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_clear_lifecycle() {
    let h = harness(vec![three_stage_no_retry()]);
    h.adapter.set_delay(Duration::from_millis(100));

    let run = h.engine.start("delivery").unwrap();
    assert!(matches!(
        h.engine.clear(run),
        Err(EngineError::StillRunning(_))
    ));

    h.engine.wait(run).await.unwrap();
    h.engine.clear(run).unwrap();

    assert!(matches!(
        h.engine.status(run),
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(h.engine.clear(run), Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_failed_run_stays_queryable_until_cleared() {
    let h = harness(vec![three_stage_no_retry()]);
    h.adapter.fail_next_build("broken");

    let run = h.engine.start("delivery").unwrap();
    h.engine.wait(run).await.unwrap();

    // still queryable with the failing stage and cause
    let snapshot = h.engine.status(run).unwrap();
    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert!(snapshot
        .stage("build")
        .unwrap()
        .last_error
        .as_deref()
        .unwrap()
        .contains("broken"));

    h.engine.clear(run).unwrap();
    assert!(h.engine.status(run).is_err());
}

#[tokio::test]
async fn test_event_stream() {
    let sink = Arc::new(CollectingEventSink::new());
    let adapter = Arc::new(ScriptedAdapter::new());
    let store = Arc::new(MemoryArtifactStore::new());
    let engine = PipelineEngine::new(vec![three_stage_no_retry()], adapter, store)
        .unwrap()
        .with_event_sink(sink.clone());

    let run = engine.start("delivery").unwrap();
    engine.wait(run).await.unwrap();

    let names = sink.event_names();
    assert_eq!(names.first().map(String::as_str), Some("run.started"));
    assert_eq!(names.last().map(String::as_str), Some("run.succeeded"));
    assert_eq!(names.iter().filter(|n| *n == "stage.succeeded").count(), 3);
}

#[tokio::test]
async fn test_duplicate_pipeline_names_rejected() {
    let adapter = Arc::new(ScriptedAdapter::new());
    let store = Arc::new(MemoryArtifactStore::new());

    let result = PipelineEngine::new(
        vec![three_stage_no_retry(), three_stage_no_retry()],
        adapter,
        store,
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_run_ids_are_monotonic() {
    let h = harness(vec![three_stage_no_retry()]);

    let first = h.engine.start("delivery").unwrap();
    h.engine.wait(first).await.unwrap();
    let second = h.engine.start("delivery").unwrap();
    h.engine.wait(second).await.unwrap();

    assert!(second > first);
    assert_eq!(h.engine.pipeline_names(), vec!["delivery"]);
}
