//! Virtual user iteration loop

use crate::context::IterationContext;
use crate::error::EngineResult;
use crate::scenario::ScenarioExecutor;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use stampede_metrics::{names, Counter, Gauge, MetricsRegistry, Trend};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle of a virtual user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VuState {
    Idle,
    Running,
    Sleeping,
    Stopping,
    Terminated,
    /// Force-terminated; the in-flight iteration was discarded
    Killed,
}

impl fmt::Display for VuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            VuState::Idle => "idle",
            VuState::Running => "running",
            VuState::Sleeping => "sleeping",
            VuState::Stopping => "stopping",
            VuState::Terminated => "terminated",
            VuState::Killed => "killed",
        };
        f.write_str(state)
    }
}

/// What a virtual user did before it exited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VuOutcome {
    pub id: u64,
    pub scenario: String,
    /// Iterations that ran to completion and were recorded
    pub iterations: u64,
    pub errors: u64,
    pub state: VuState,
}

/// Iteration metrics of one scenario, overall and tagged
struct IterationMetrics {
    iterations: Counter,
    iterations_tagged: Counter,
    duration: Trend,
    duration_tagged: Trend,
    errors: Counter,
    errors_tagged: Counter,
    vus: Gauge,
}

impl IterationMetrics {
    fn register(registry: &MetricsRegistry, scenario: &str) -> EngineResult<Self> {
        Ok(Self {
            iterations: registry.counter(names::ITERATIONS)?,
            iterations_tagged: registry.counter(&names::tagged(names::ITERATIONS, "scenario", scenario))?,
            duration: registry.trend(names::ITERATION_DURATION)?,
            duration_tagged: registry.trend(&names::tagged(
                names::ITERATION_DURATION,
                "scenario",
                scenario,
            ))?,
            errors: registry.counter(names::ITERATION_ERRORS)?,
            errors_tagged: registry.counter(&names::tagged(names::ITERATION_ERRORS, "scenario", scenario))?,
            vus: registry.gauge(names::VUS)?,
        })
    }

    fn record(&self, started: Instant, failed: bool) {
        let elapsed = started.elapsed();
        self.iterations.inc();
        self.iterations_tagged.inc();
        self.duration.record_duration(elapsed);
        self.duration_tagged.record_duration(elapsed);
        if failed {
            self.errors.inc();
            self.errors_tagged.inc();
        }
    }
}

/// A simulated user looping over one scenario.
///
/// The stop token is honored between iterations and during think time; the
/// kill token (held by the context) also cuts an iteration short, in which
/// case nothing is recorded for it.
pub struct VirtualUser {
    id: u64,
    executor: Arc<dyn ScenarioExecutor>,
    ctx: IterationContext,
    stop: CancellationToken,
    metrics: IterationMetrics,
    iteration_count: u64,
    errors: u64,
    last_iteration_start: Option<Instant>,
    state: VuState,
}

impl VirtualUser {
    pub fn new(
        executor: Arc<dyn ScenarioExecutor>,
        ctx: IterationContext,
        stop: CancellationToken,
    ) -> EngineResult<Self> {
        let metrics = IterationMetrics::register(ctx.metrics(), ctx.scenario())?;
        Ok(Self {
            id: ctx.vu_id(),
            executor,
            ctx,
            stop,
            metrics,
            iteration_count: 0,
            errors: 0,
            last_iteration_start: None,
            state: VuState::Idle,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> VuState {
        self.state
    }

    fn transition(&mut self, state: VuState) {
        if self.state != state {
            debug!(vu = self.id, from = %self.state, to = %state, "VU state change");
            self.state = state;
        }
    }

    fn interrupted(&self) -> bool {
        self.stop.is_cancelled() || self.ctx.kill_token().is_cancelled()
    }

    /// Run iterations until stopped or killed
    pub async fn run(mut self) -> VuOutcome {
        let kill = self.ctx.kill_token().clone();
        self.metrics.vus.add(1.0);
        self.transition(VuState::Running);

        while !self.interrupted() {
            self.ctx.set_iteration(self.iteration_count);
            let started = Instant::now();
            self.last_iteration_start = Some(started);

            let iteration = AssertUnwindSafe(self.executor.iteration(&mut self.ctx)).catch_unwind();
            let outcome = tokio::select! {
                biased;
                _ = kill.cancelled() => None,
                outcome = iteration => Some(outcome),
            };

            let failed = match outcome {
                None => {
                    debug!(vu = self.id, "Iteration {} killed, discarding", self.iteration_count);
                    break;
                }
                Some(Ok(Ok(()))) => false,
                Some(Ok(Err(e))) => {
                    debug!(vu = self.id, scenario = self.ctx.scenario(), "Iteration failed: {:#}", e);
                    true
                }
                Some(Err(panic)) => {
                    warn!(
                        vu = self.id,
                        scenario = self.ctx.scenario(),
                        "Iteration panicked: {}",
                        panic_message(panic.as_ref())
                    );
                    true
                }
            };

            self.metrics.record(started, failed);
            self.iteration_count += 1;
            if failed {
                self.errors += 1;
            }

            self.pause(&kill).await;
        }

        let state = if kill.is_cancelled() {
            VuState::Killed
        } else {
            self.transition(VuState::Stopping);
            VuState::Terminated
        };
        self.transition(state);
        self.metrics.vus.sub(1.0);

        VuOutcome {
            id: self.id,
            scenario: self.ctx.scenario().to_string(),
            iterations: self.iteration_count,
            errors: self.errors,
            state,
        }
    }

    async fn pause(&mut self, kill: &CancellationToken) {
        let think_time = self.ctx.think_time();
        let pause = think_time.sample(self.ctx.rng());
        if pause.is_zero() {
            tokio::task::yield_now().await;
            return;
        }

        self.transition(VuState::Sleeping);
        tokio::select! {
            _ = self.stop.cancelled() => {}
            _ = kill.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }
        if !self.interrupted() {
            self.transition(VuState::Running);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
