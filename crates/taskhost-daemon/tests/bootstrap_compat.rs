//! End-to-end bootstrap compatibility scenarios.
//!
//! Drives the full startup state machine with the in-memory state store
//! and a recording engine factory: capability reconciliation outcomes,
//! load-failure policy, and the startup load timeout.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskhost_core::config::{AgentConfig, LoadFailurePolicy, RequestedState};
use taskhost_core::engine::{EngineError, ResolvedCapabilities, TaskEngine, TaskEngineFactory};
use taskhost_core::state::{InMemoryStateStore, TaskRecord, TaskSnapshot};
use taskhost_daemon::bootstrap::{AgentBootstrap, BootstrapError, BootstrapPhase};

/// Engine handle recording what it was constructed with.
struct RecordingEngine {
    capabilities: ResolvedCapabilities,
    resumed: Vec<String>,
}

impl TaskEngine for RecordingEngine {
    fn capabilities(&self) -> ResolvedCapabilities {
        self.capabilities
    }

    fn resumed_tasks(&self) -> &[String] {
        &self.resumed
    }
}

/// Factory recording every construction call.
#[derive(Clone, Default)]
struct RecordingFactory {
    constructed: Arc<Mutex<Vec<ResolvedCapabilities>>>,
    fail: bool,
}

impl RecordingFactory {
    fn failing() -> Self {
        Self {
            constructed: Arc::default(),
            fail: true,
        }
    }

    fn construction_count(&self) -> usize {
        self.constructed.lock().unwrap().len()
    }
}

impl TaskEngineFactory for RecordingFactory {
    type Engine = RecordingEngine;

    fn construct(
        &self,
        capabilities: ResolvedCapabilities,
        snapshot: TaskSnapshot,
    ) -> Result<Self::Engine, EngineError> {
        if self.fail {
            return Err(EngineError("injected construction failure".to_string()));
        }
        self.constructed.lock().unwrap().push(capabilities);
        Ok(RecordingEngine {
            capabilities,
            resumed: snapshot.task_ids(),
        })
    }
}

fn config(task_resource_limits: RequestedState) -> AgentConfig {
    AgentConfig {
        task_resource_limits,
        startup_load_timeout: Duration::from_secs(5),
        ..AgentConfig::default()
    }
}

fn mixed_snapshot() -> TaskSnapshot {
    TaskSnapshot::new(vec![
        TaskRecord::running("legacy", false),
        TaskRecord::running("current", true),
    ])
}

/// Scenario A: empty snapshot, flag not set with default-true polarity.
/// The engine constructs with the capability enabled.
#[tokio::test]
async fn fresh_host_takes_natural_default() {
    let factory = RecordingFactory::default();
    let agent = AgentBootstrap::new(
        config(RequestedState::NotSet),
        InMemoryStateStore::new(),
        factory.clone(),
    )
    .run()
    .await
    .unwrap();

    assert!(agent.capabilities.task_resource_limits);
    assert_eq!(agent.engine.capabilities(), agent.capabilities);
    assert!(agent.engine.resumed_tasks().is_empty());
    assert_eq!(factory.construction_count(), 1);
}

/// Scenario B: one legacy task, flag not set. Startup succeeds with the
/// capability silently degraded to disabled.
#[tokio::test]
async fn legacy_task_degrades_unset_flag_without_failing() {
    let factory = RecordingFactory::default();
    let agent = AgentBootstrap::new(
        config(RequestedState::NotSet),
        InMemoryStateStore::with_snapshot(mixed_snapshot()),
        factory.clone(),
    )
    .run()
    .await
    .unwrap();

    assert!(!agent.capabilities.task_resource_limits);
    assert_eq!(agent.engine.resumed_tasks(), ["legacy", "current"]);
    assert_eq!(factory.construction_count(), 1);
}

/// Scenario C: one legacy task, flag explicitly enabled. Bootstrap fails
/// before any engine is constructed.
#[tokio::test]
async fn legacy_task_refuses_explicit_enable_before_engine_construction() {
    let factory = RecordingFactory::default();
    let err = AgentBootstrap::new(
        config(RequestedState::ExplicitlyEnabled),
        InMemoryStateStore::with_snapshot(mixed_snapshot()),
        factory.clone(),
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.failed_after(), BootstrapPhase::StateLoaded);
    let reason = err.to_string();
    assert!(reason.contains("task-resource-limits"), "{reason}");
    assert!(reason.contains("predate"), "{reason}");
    assert_eq!(
        factory.construction_count(),
        0,
        "no engine may exist after a refusal"
    );
}

/// Scenario D: only legacy tasks, flag explicitly disabled. No conflict,
/// capability disabled.
#[tokio::test]
async fn explicit_disable_over_legacy_tasks_proceeds() {
    let snapshot = TaskSnapshot::new(vec![TaskRecord::running("legacy", false)]);
    let agent = AgentBootstrap::new(
        config(RequestedState::ExplicitlyDisabled),
        InMemoryStateStore::with_snapshot(snapshot),
        RecordingFactory::default(),
    )
    .run()
    .await
    .unwrap();

    assert!(!agent.capabilities.task_resource_limits);
}

/// Scenario E: all tasks compatible, flag not set. The capability keeps
/// its natural default; no degrade.
#[tokio::test]
async fn all_compatible_tasks_keep_natural_default() {
    let snapshot = TaskSnapshot::new(vec![
        TaskRecord::running("a", true),
        TaskRecord::running("b", true),
    ]);
    let agent = AgentBootstrap::new(
        config(RequestedState::NotSet),
        InMemoryStateStore::with_snapshot(snapshot),
        RecordingFactory::default(),
    )
    .run()
    .await
    .unwrap();

    assert!(agent.capabilities.task_resource_limits);
}

/// A load failure aborts under the default fail policy.
#[tokio::test]
async fn load_failure_aborts_under_fail_policy() {
    let factory = RecordingFactory::default();
    let err = AgentBootstrap::new(
        config(RequestedState::NotSet),
        InMemoryStateStore::failing_load("checkpoint unreadable"),
        factory.clone(),
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.failed_after(), BootstrapPhase::Init);
    assert!(err.to_string().contains("checkpoint unreadable"));
    assert_eq!(factory.construction_count(), 0);
}

/// A load failure proceeds with an empty snapshot under start-clean.
#[tokio::test]
async fn load_failure_starts_clean_when_configured() {
    let mut cfg = config(RequestedState::NotSet);
    cfg.on_load_failure = LoadFailurePolicy::StartClean;

    let agent = AgentBootstrap::new(
        cfg,
        InMemoryStateStore::failing_load("checkpoint unreadable"),
        RecordingFactory::default(),
    )
    .run()
    .await
    .unwrap();

    assert!(agent.engine.resumed_tasks().is_empty());
    // Empty snapshot: the capability takes its natural default.
    assert!(agent.capabilities.task_resource_limits);
}

/// A load exceeding the startup timeout aborts even under start-clean: a
/// hung store must not masquerade as a fresh host.
#[tokio::test]
async fn load_timeout_always_aborts() {
    let mut cfg = config(RequestedState::NotSet);
    cfg.startup_load_timeout = Duration::from_millis(50);
    cfg.on_load_failure = LoadFailurePolicy::StartClean;

    let factory = RecordingFactory::default();
    let err = AgentBootstrap::new(
        cfg,
        InMemoryStateStore::new().with_load_delay(Duration::from_secs(2)),
        factory.clone(),
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, BootstrapError::LoadTimeout { .. }), "{err:?}");
    assert_eq!(err.failed_after(), BootstrapPhase::Init);
    assert_eq!(factory.construction_count(), 0);
}

/// The same refusal path, driven through a real checkpoint file the way
/// the binary drives it.
#[tokio::test]
async fn refusal_from_real_checkpoint_file() {
    use taskhost_core::state::CheckpointStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");
    std::fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "saved_at": "2025-10-01T00:00:00Z",
            "tasks": [
                {
                    "task_id": "legacy",
                    "created_at": "2025-09-30T00:00:00Z",
                    "desired_status": "RUNNING"
                }
            ]
        }"#,
    )
    .unwrap();

    let factory = RecordingFactory::default();
    let err = AgentBootstrap::new(
        config(RequestedState::ExplicitlyEnabled),
        CheckpointStore::new(&path),
        factory.clone(),
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.failed_after(), BootstrapPhase::StateLoaded);
    assert_eq!(factory.construction_count(), 0);
}

/// An engine construction failure is fatal and reported against the
/// reconciled phase.
#[tokio::test]
async fn engine_construction_failure_is_fatal() {
    let err = AgentBootstrap::new(
        config(RequestedState::NotSet),
        InMemoryStateStore::new(),
        RecordingFactory::failing(),
    )
    .run()
    .await
    .unwrap_err();

    assert_eq!(err.failed_after(), BootstrapPhase::Reconciled);
    assert!(err.to_string().contains("injected construction failure"));
}
