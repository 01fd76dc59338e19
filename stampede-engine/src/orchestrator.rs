//! Run orchestration: setup, schedulers, teardown and the final verdict

use crate::error::{EngineError, EngineResult};
use crate::router::ScenarioRouter;
use crate::scenario::Scenario;
use crate::scheduler::{ScenarioSource, SchedulerReport, StageScheduler};
use crate::settings::ExecutionSettings;
use crate::stage::RampProfile;
use crate::threshold::{evaluate, Threshold, ThresholdResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use stampede_http::{HttpClient, RequestResult, RequestSpec};
use stampede_metrics::{MetricsRegistry, MetricsSnapshot};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What setup and teardown hooks get to work with
pub struct HookContext {
    client: Arc<dyn HttpClient>,
    metrics: Arc<MetricsRegistry>,
    cancel: CancellationToken,
}

impl HookContext {
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub async fn request(&self, spec: RequestSpec) -> RequestResult {
        self.client.execute(spec, &self.cancel).await
    }

    /// Fires when the run is aborted
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Code run once before any virtual user starts and once after all stopped
#[async_trait::async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// The returned value is shared read-only with every virtual user
    async fn setup(&self, _ctx: &HookContext) -> anyhow::Result<JsonValue> {
        Ok(JsonValue::Null)
    }

    async fn teardown(&self, _ctx: &HookContext, _data: &JsonValue) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

/// External control over a running test
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stop: CancellationToken,
    abort: CancellationToken,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop starting iterations and drain within the graceful stop window
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Kill every virtual user immediately
    pub fn abort(&self) {
        self.abort.cancel();
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }
}

/// Final result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub total_duration: Duration,
    pub metrics: MetricsSnapshot,
    pub thresholds: Vec<ThresholdResult>,
    pub schedulers: Vec<SchedulerReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
    /// Stopped early by a signal or an abort-on-fail threshold
    pub interrupted: bool,
    pub passed: bool,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    scenarios: Vec<Scenario>,
    stages: Option<RampProfile>,
    thresholds: Vec<Threshold>,
    hooks: Option<Arc<dyn LifecycleHooks>>,
    client: Option<Arc<dyn HttpClient>>,
    registry: Option<Arc<MetricsRegistry>>,
    settings: ExecutionSettings,
    control: Option<RunControl>,
}

impl OrchestratorBuilder {
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn scenarios(mut self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        self.scenarios.extend(scenarios);
        self
    }

    /// Ramp profile of the shared pool
    pub fn stages(mut self, stages: RampProfile) -> Self {
        self.stages = Some(stages);
        self
    }

    pub fn thresholds(mut self, thresholds: impl IntoIterator<Item = Threshold>) -> Self {
        self.thresholds.extend(thresholds);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn registry(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn control(mut self, control: RunControl) -> Self {
        self.control = Some(control);
        self
    }

    pub fn build(self) -> EngineResult<Orchestrator> {
        let client = self
            .client
            .ok_or_else(|| EngineError::Config("an HTTP client is required".to_string()))?;

        if self.scenarios.is_empty() {
            return Err(EngineError::NoRoutableScenario("no scenarios configured".to_string()));
        }
        if self.settings.tick_interval.is_zero() {
            return Err(EngineError::Config("tick_interval must be greater than 0".to_string()));
        }
        if self.settings.threshold_check_interval.is_some_and(|d| d.is_zero()) {
            return Err(EngineError::Config(
                "threshold_check_interval must be greater than 0".to_string(),
            ));
        }

        let (own, shared): (Vec<_>, Vec<_>) = self.scenarios.into_iter().partition(|s| s.stages().is_some());

        let mut pools = Vec::new();
        if !shared.is_empty() {
            let stages = self.stages.ok_or_else(|| {
                EngineError::InvalidStage(format!(
                    "scenario '{}' has no stages of its own and no shared stages are set",
                    shared[0].name()
                ))
            })?;
            let router = ScenarioRouter::new(shared, self.settings.seed)?;
            pools.push(Pool {
                name: "shared".to_string(),
                profile: stages,
                source: ScenarioSource::Routed(Arc::new(router)),
            });
        }
        for scenario in own {
            if let Some(profile) = scenario.stages().cloned() {
                pools.push(Pool {
                    name: scenario.name().to_string(),
                    profile,
                    source: ScenarioSource::Fixed(scenario),
                });
            }
        }

        Ok(Orchestrator {
            pools,
            thresholds: self.thresholds,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoopHooks)),
            client,
            registry: self.registry.unwrap_or_default(),
            settings: self.settings,
            control: self.control.unwrap_or_default(),
        })
    }
}

/// One scheduler's worth of work
struct Pool {
    name: String,
    profile: RampProfile,
    source: ScenarioSource,
}

/// Runs a complete load test
pub struct Orchestrator {
    pools: Vec<Pool>,
    thresholds: Vec<Threshold>,
    hooks: Arc<dyn LifecycleHooks>,
    client: Arc<dyn HttpClient>,
    registry: Arc<MetricsRegistry>,
    settings: ExecutionSettings,
    control: RunControl,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn registry(&self) -> Arc<MetricsRegistry> {
        self.registry.clone()
    }

    fn hook_context(&self, cancel: CancellationToken) -> HookContext {
        HookContext {
            client: self.client.clone(),
            metrics: self.registry.clone(),
            cancel,
        }
    }

    /// Setup, run every scheduler to completion, teardown, evaluate.
    ///
    /// Only a failed setup returns an error; everything after it ends in a
    /// [`RunResult`].
    pub async fn run(mut self) -> EngineResult<RunResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!("Starting run with {} scheduler(s)", self.pools.len());

        let setup_ctx = self.hook_context(self.control.abort.child_token());
        let setup_data = match self.hooks.setup(&setup_ctx).await {
            Ok(data) => Arc::new(data),
            Err(e) => {
                error!("Setup failed: {:#}", e);
                return Err(EngineError::Setup(e));
            }
        };

        // Cancelled by the external stop, the max duration deadline or an
        // abort-on-fail threshold
        let stop = self.control.stop.child_token();
        let abort = self.control.abort.clone();
        let threshold_abort = Arc::new(AtomicBool::new(false));
        let done = CancellationToken::new();

        let deadline = self.settings.max_duration.map(|max| {
            let stop = stop.clone();
            let done = done.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = done.cancelled() => {}
                    _ = tokio::time::sleep(max) => {
                        info!("Max duration of {:?} reached, stopping", max);
                        stop.cancel();
                    }
                }
            })
        });

        let poller = self
            .settings
            .threshold_check_interval
            .filter(|_| self.thresholds.iter().any(|t| t.abort_on_fail))
            .map(|interval| {
                let thresholds: Vec<Threshold> =
                    self.thresholds.iter().filter(|t| t.abort_on_fail).cloned().collect();
                tokio::spawn(poll_thresholds(
                    self.registry.clone(),
                    thresholds,
                    interval,
                    stop.clone(),
                    done.clone(),
                    threshold_abort.clone(),
                ))
            });

        let next_vu_id = Arc::new(AtomicU64::new(1));
        let handles: Vec<_> = std::mem::take(&mut self.pools)
            .into_iter()
            .map(|pool| {
                let scheduler = StageScheduler::new(
                    pool.name,
                    pool.profile,
                    pool.source,
                    self.client.clone(),
                    self.registry.clone(),
                )
                .with_settings(self.settings.clone())
                .with_setup_data(setup_data.clone())
                .with_id_source(next_vu_id.clone());
                tokio::spawn(scheduler.run(stop.clone(), abort.clone()))
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for result in futures::future::join_all(handles).await {
            match result {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => error!("Scheduler failed: {}", e),
                Err(e) => error!("Scheduler task panicked: {}", e),
            }
        }

        done.cancel();
        for task in deadline.into_iter().chain(poller) {
            if let Err(e) = task.await {
                warn!("Run supervision task failed: {}", e);
            }
        }

        // A second interrupt must still be able to cut a hanging teardown short
        let teardown_ctx = self.hook_context(self.control.abort.child_token());
        let teardown_error = match self.hooks.teardown(&teardown_ctx, &setup_data).await {
            Ok(()) => None,
            Err(e) => {
                warn!("Teardown failed: {:#}", e);
                Some(format!("{:#}", e))
            }
        };

        let metrics = self.registry.snapshot();
        let thresholds = evaluate(&metrics, &self.thresholds);
        let interrupted =
            self.control.is_stopped() || self.control.is_aborted() || threshold_abort.load(Ordering::Relaxed);
        let passed = !interrupted && !thresholds.iter().any(ThresholdResult::fails_run);

        let total_duration = start.elapsed();
        info!(
            "Run finished in {:?}: {}",
            total_duration,
            if passed { "passed" } else { "failed" }
        );

        Ok(RunResult {
            started_at,
            total_duration,
            metrics,
            thresholds,
            schedulers: reports,
            teardown_error,
            interrupted,
            passed,
        })
    }
}

/// Stop the run as soon as an abort-on-fail threshold fails
async fn poll_thresholds(
    registry: Arc<MetricsRegistry>,
    thresholds: Vec<Threshold>,
    interval: Duration,
    stop: CancellationToken,
    done: CancellationToken,
    aborted: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = done.cancelled() => return,
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let snapshot = registry.snapshot();
        // Nothing recorded yet is not a failure while the run is warming up
        let failing: Vec<_> = evaluate(&snapshot, &thresholds)
            .into_iter()
            .filter(|r| !r.passed && r.reason.as_deref() != Some("no data"))
            .collect();

        if let Some(first) = failing.first() {
            warn!(
                "Threshold {} '{}' failed with abort_on_fail, stopping run",
                first.metric, first.expression
            );
            aborted.store(true, Ordering::Relaxed);
            stop.cancel();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{scenario_fn, ScenarioExecutor};
    use crate::stage::Stage;
    use futures::FutureExt;
    use stampede_config::Severity;
    use stampede_http::{DriverConfig, RequestDriver};
    use stampede_metrics::names;
    use std::sync::atomic::AtomicUsize;

    fn driver(registry: &Arc<MetricsRegistry>) -> Arc<dyn HttpClient> {
        Arc::new(RequestDriver::new(DriverConfig::default(), registry.clone()).unwrap())
    }

    fn sleeper(duration: Duration) -> Arc<dyn ScenarioExecutor> {
        scenario_fn(move |_ctx| {
            async move {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            .boxed()
        })
    }

    struct RecordingHooks {
        fail_setup: bool,
        fail_teardown: bool,
        setups: AtomicUsize,
        teardowns: AtomicUsize,
    }

    impl RecordingHooks {
        fn new(fail_setup: bool, fail_teardown: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_setup,
                fail_teardown,
                setups: AtomicUsize::new(0),
                teardowns: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl LifecycleHooks for RecordingHooks {
        async fn setup(&self, _ctx: &HookContext) -> anyhow::Result<JsonValue> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            if self.fail_setup {
                anyhow::bail!("login service unavailable");
            }
            Ok(serde_json::json!({"token": "abc"}))
        }

        async fn teardown(&self, _ctx: &HookContext, data: &JsonValue) -> anyhow::Result<()> {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
            assert_eq!(data["token"], "abc");
            if self.fail_teardown {
                anyhow::bail!("cleanup endpoint returned 500");
            }
            Ok(())
        }
    }

    fn orchestrator(hooks: Arc<dyn LifecycleHooks>, executor: Arc<dyn ScenarioExecutor>) -> Orchestrator {
        let registry = Arc::new(MetricsRegistry::new());
        Orchestrator::builder()
            .scenario(Scenario::builder("browse", executor).build().unwrap())
            .stages(RampProfile::constant(2, Duration::from_secs(2)).unwrap())
            .thresholds([Threshold::parse(names::ITERATIONS, "count > 0").unwrap()])
            .hooks(hooks)
            .client(driver(&registry))
            .registry(registry)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failure_is_fatal() {
        let hooks = RecordingHooks::new(true, false);
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let executor = scenario_fn(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }.boxed()
        });

        let err = orchestrator(hooks.clone(), executor).run().await.unwrap_err();

        assert!(matches!(err, EngineError::Setup(_)));
        assert!(err.to_string().contains("login service unavailable"));
        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.teardowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_failure_keeps_verdict() {
        let hooks = RecordingHooks::new(false, true);
        let result = orchestrator(hooks.clone(), sleeper(Duration::from_millis(100)))
            .run()
            .await
            .unwrap();

        assert!(result.passed);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(
            result.teardown_error.as_deref(),
            Some("cleanup endpoint returned 500")
        );
        assert_eq!(hooks.setups.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_data_reaches_virtual_users() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let executor = scenario_fn(move |ctx| {
            let counter = counter.clone();
            async move {
                if ctx.setup_data()["token"] == "abc" {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            }
            .boxed()
        });

        let result = orchestrator(RecordingHooks::new(false, false), executor)
            .run()
            .await
            .unwrap();
        assert!(result.passed);
        assert!(seen.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_marks_run_interrupted() {
        let orchestrator = orchestrator(Arc::new(NoopHooks), sleeper(Duration::from_millis(100)));
        let control = orchestrator.control();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            control.stop();
        });

        let result = orchestrator.run().await.unwrap();
        assert!(result.interrupted);
        assert!(!result.passed);
        assert_eq!(result.exit_code(), 1);
        assert!(result.total_duration < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_duration_is_not_an_interruption() {
        let registry = Arc::new(MetricsRegistry::new());
        let settings = ExecutionSettings {
            max_duration: Some(Duration::from_secs(1)),
            ..ExecutionSettings::default()
        };
        let result = Orchestrator::builder()
            .scenario(
                Scenario::builder("browse", sleeper(Duration::from_millis(100)))
                    .build()
                    .unwrap(),
            )
            .stages(RampProfile::constant(1, Duration::from_secs(60)).unwrap())
            .client(driver(&registry))
            .registry(registry)
            .settings(settings)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert!(!result.interrupted);
        assert!(result.passed);
        assert!(result.total_duration < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_on_fail_threshold_stops_run() {
        let registry = Arc::new(MetricsRegistry::new());
        let executor = scenario_fn(|_ctx| {
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err(anyhow::anyhow!("always broken"))
            }
            .boxed()
        });
        let settings = ExecutionSettings {
            threshold_check_interval: Some(Duration::from_secs(1)),
            ..ExecutionSettings::default()
        };

        let result = Orchestrator::builder()
            .scenario(Scenario::builder("broken", executor).build().unwrap())
            .stages(RampProfile::constant(2, Duration::from_secs(60)).unwrap())
            .thresholds([Threshold::parse(names::ITERATION_ERRORS, "count < 1")
                .unwrap()
                .with_abort_on_fail(true)])
            .client(driver(&registry))
            .registry(registry)
            .settings(settings)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        assert!(result.interrupted);
        assert!(!result.passed);
        assert!(result.total_duration < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_stages_get_their_own_scheduler() {
        let registry = Arc::new(MetricsRegistry::new());
        let result = Orchestrator::builder()
            .scenario(
                Scenario::builder("browse", sleeper(Duration::from_millis(100)))
                    .build()
                    .unwrap(),
            )
            .scenario(
                Scenario::builder("spike", sleeper(Duration::from_millis(100)))
                    .weight(0.0)
                    .stages(RampProfile::new(vec![Stage::hold(Duration::from_secs(1), 5)]).unwrap())
                    .build()
                    .unwrap(),
            )
            .stages(RampProfile::constant(1, Duration::from_secs(1)).unwrap())
            .thresholds([Threshold::parse("iterations{scenario:spike}", "count > 0")
                .unwrap()
                .with_severity(Severity::Warning)])
            .client(driver(&registry))
            .registry(registry)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap();

        let names: Vec<_> = result.schedulers.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["shared", "spike"]);
        assert_eq!(result.schedulers[1].peak_vus, 5);
        assert!(result.thresholds[0].passed);
        assert!(result.metrics.counter("iterations{scenario:browse}").unwrap() > 0);
    }

    struct HangingTeardown;

    #[async_trait::async_trait]
    impl LifecycleHooks for HangingTeardown {
        async fn teardown(&self, ctx: &HookContext, _data: &JsonValue) -> anyhow::Result<()> {
            ctx.cancellation().cancelled().await;
            anyhow::bail!("teardown interrupted")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cuts_teardown_short() {
        let orchestrator = orchestrator(Arc::new(HangingTeardown), sleeper(Duration::from_millis(100)));
        let control = orchestrator.control();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            control.abort();
        });

        let result = orchestrator.run().await.unwrap();
        assert_eq!(result.teardown_error.as_deref(), Some("teardown interrupted"));
        assert!(result.interrupted);
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let registry = Arc::new(MetricsRegistry::new());
        let build = |settings: ExecutionSettings| {
            Orchestrator::builder()
                .scenario(Scenario::builder("a", sleeper(Duration::ZERO)).build().unwrap())
                .stages(RampProfile::constant(1, Duration::from_secs(1)).unwrap())
                .client(driver(&registry))
                .settings(settings)
                .build()
        };

        let zero_tick = build(ExecutionSettings {
            tick_interval: Duration::ZERO,
            ..ExecutionSettings::default()
        });
        assert!(matches!(zero_tick, Err(EngineError::Config(_))));

        let zero_check = build(ExecutionSettings {
            threshold_check_interval: Some(Duration::ZERO),
            ..ExecutionSettings::default()
        });
        assert!(matches!(zero_check, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_builder_requirements() {
        let registry = Arc::new(MetricsRegistry::new());
        let no_client = Orchestrator::builder()
            .scenario(Scenario::builder("a", sleeper(Duration::ZERO)).build().unwrap())
            .stages(RampProfile::constant(1, Duration::from_secs(1)).unwrap())
            .build();
        assert!(matches!(no_client, Err(EngineError::Config(_))));

        let no_stages = Orchestrator::builder()
            .scenario(Scenario::builder("a", sleeper(Duration::ZERO)).build().unwrap())
            .client(driver(&registry))
            .build();
        assert!(matches!(no_stages, Err(EngineError::InvalidStage(_))));

        let zero_weight = Orchestrator::builder()
            .scenario(Scenario::builder("a", sleeper(Duration::ZERO)).weight(0.0).build().unwrap())
            .stages(RampProfile::constant(1, Duration::from_secs(1)).unwrap())
            .client(driver(&registry))
            .build();
        assert!(matches!(zero_weight, Err(EngineError::NoRoutableScenario(_))));

        assert!(matches!(
            Orchestrator::builder().client(driver(&registry)).build(),
            Err(EngineError::NoRoutableScenario(_))
        ));
    }
}
