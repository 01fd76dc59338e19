//! Stage scheduler: keeps the live virtual user count on its ramp profile

use crate::context::IterationContext;
use crate::error::{EngineError, EngineResult};
use crate::router::ScenarioRouter;
use crate::scenario::Scenario;
use crate::settings::ExecutionSettings;
use crate::stage::RampProfile;
use crate::vu::{VirtualUser, VuOutcome, VuState};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use stampede_http::HttpClient;
use stampede_metrics::MetricsRegistry;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a killed virtual user gets to notice before its task is aborted
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Stand-in for a deadline too far away to represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(window: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(window).unwrap_or(now + FAR_FUTURE)
}

/// Where a scheduler gets the scenario for each new virtual user
#[derive(Debug, Clone)]
pub enum ScenarioSource {
    /// Weighted choice among the shared pool's scenarios
    Routed(Arc<ScenarioRouter>),
    /// Always the same scenario
    Fixed(Scenario),
}

impl ScenarioSource {
    fn next(&self) -> &Scenario {
        match self {
            ScenarioSource::Routed(router) => router.select(),
            ScenarioSource::Fixed(scenario) => scenario,
        }
    }
}

/// Totals of one scheduler after it finished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerReport {
    pub name: String,
    pub vus_started: u64,
    pub vus_killed: u64,
    pub peak_vus: u64,
    pub iterations: u64,
    pub iteration_errors: u64,
}

impl SchedulerReport {
    fn absorb(&mut self, outcome: &VuOutcome) {
        self.iterations += outcome.iterations;
        self.iteration_errors += outcome.errors;
        if outcome.state == VuState::Killed {
            self.vus_killed += 1;
        }
    }
}

struct LiveVu {
    id: u64,
    stop: CancellationToken,
    kill: CancellationToken,
    handle: JoinHandle<VuOutcome>,
}

struct DrainingVu {
    vu: LiveVu,
    deadline: Instant,
    killed: bool,
}

/// Drives one pool of virtual users along a ramp profile
pub struct StageScheduler {
    name: String,
    profile: RampProfile,
    source: ScenarioSource,
    settings: ExecutionSettings,
    client: Arc<dyn HttpClient>,
    metrics: Arc<MetricsRegistry>,
    setup_data: Arc<JsonValue>,
    next_vu_id: Arc<AtomicU64>,
    live: Arc<AtomicUsize>,
}

impl StageScheduler {
    pub fn new(
        name: impl Into<String>,
        profile: RampProfile,
        source: ScenarioSource,
        client: Arc<dyn HttpClient>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            profile,
            source,
            settings: ExecutionSettings::default(),
            client,
            metrics,
            setup_data: Arc::new(JsonValue::Null),
            next_vu_id: Arc::new(AtomicU64::new(1)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_setup_data(mut self, data: Arc<JsonValue>) -> Self {
        self.setup_data = data;
        self
    }

    /// Share virtual user ids with other schedulers of the same run
    pub fn with_id_source(mut self, next_vu_id: Arc<AtomicU64>) -> Self {
        self.next_vu_id = next_vu_id;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live virtual user count, updated by the control loop on every tick
    pub fn live_counter(&self) -> Arc<AtomicUsize> {
        self.live.clone()
    }

    fn spawn_vu(&self, abort: &CancellationToken) -> EngineResult<LiveVu> {
        let scenario = self.source.next();
        let id = self.next_vu_id.fetch_add(1, Ordering::Relaxed);
        let stop = CancellationToken::new();
        let kill = abort.child_token();

        let mut ctx = IterationContext::new(id, scenario.name(), self.client.clone(), self.metrics.clone())
            .with_think_time(scenario.think_time().unwrap_or(self.settings.think_time))
            .with_kill_token(kill.clone())
            .with_setup_data(self.setup_data.clone());
        if let Some(seed) = self.settings.seed {
            ctx = ctx.with_seed(seed);
        }

        let vu = VirtualUser::new(scenario.executor(), ctx, stop.clone())?;
        debug!(scheduler = %self.name, vu = id, scenario = scenario.name(), "Starting VU");
        Ok(LiveVu {
            id,
            stop,
            kill,
            handle: tokio::spawn(vu.run()),
        })
    }

    /// Run the control loop until the profile ends or `stop` fires, then
    /// drain. `abort` kills every virtual user immediately.
    pub async fn run(self, stop: CancellationToken, abort: CancellationToken) -> EngineResult<SchedulerReport> {
        if self.settings.tick_interval.is_zero() {
            return Err(EngineError::Config("tick_interval must be greater than 0".to_string()));
        }
        let total = self.profile.total_duration();
        info!(
            scheduler = %self.name,
            "Starting scheduler: {} stages over {:?}, peak {} VUs",
            self.profile.stages().len(),
            total,
            self.profile.peak()
        );

        let mut report = SchedulerReport {
            name: self.name.clone(),
            ..Default::default()
        };
        let mut active: Vec<LiveVu> = Vec::new();
        let mut draining: Vec<DrainingVu> = Vec::new();

        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = abort.cancelled() => break,
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= total {
                debug!(scheduler = %self.name, "Ramp profile finished");
                break;
            }

            // A VU only exits on its own when killed; collect any that did
            let (finished, running): (Vec<_>, Vec<_>) = active.into_iter().partition(|vu| vu.handle.is_finished());
            active = running;
            for vu in finished {
                collect(&mut report, vu).await;
            }

            let desired = self.profile.desired_at(elapsed) as usize;
            if desired > active.len() {
                for _ in active.len()..desired {
                    match self.spawn_vu(&abort) {
                        Ok(vu) => {
                            report.vus_started += 1;
                            active.push(vu);
                        }
                        Err(e) => {
                            // Registry conflicts affect every VU equally; keep the run going
                            warn!(scheduler = %self.name, "Failed to start VU: {}", e);
                            break;
                        }
                    }
                }
            } else if desired < active.len() {
                let deadline = deadline_after(self.settings.graceful_ramp_down);
                // Newest VUs leave first
                for vu in active.drain(desired..).rev() {
                    debug!(scheduler = %self.name, vu = vu.id, "Stopping VU on ramp-down");
                    vu.stop.cancel();
                    draining.push(DrainingVu {
                        vu,
                        deadline,
                        killed: false,
                    });
                }
            }

            draining = self.reap_draining(draining, &mut report).await;

            self.live.store(active.len(), Ordering::Relaxed);
            report.peak_vus = report.peak_vus.max(active.len() as u64);
        }

        self.shutdown(active, draining, &abort, &mut report).await;
        self.live.store(0, Ordering::Relaxed);

        info!(
            scheduler = %self.name,
            "Scheduler finished: {} VUs started, {} killed, {} iterations ({} failed)",
            report.vus_started,
            report.vus_killed,
            report.iterations,
            report.iteration_errors
        );
        Ok(report)
    }

    /// Collect VUs that have exited; kill those past their drain deadline
    async fn reap_draining(&self, draining: Vec<DrainingVu>, report: &mut SchedulerReport) -> Vec<DrainingVu> {
        let now = Instant::now();
        let mut remaining = Vec::with_capacity(draining.len());
        for mut entry in draining {
            if entry.vu.handle.is_finished() {
                collect(report, entry.vu).await;
                continue;
            }
            if !entry.killed && now >= entry.deadline {
                warn!(scheduler = %self.name, vu = entry.vu.id, "VU exceeded graceful ramp-down, killing");
                entry.vu.kill.cancel();
                entry.killed = true;
                entry.deadline = now + KILL_GRACE;
            } else if entry.killed && now >= entry.deadline {
                entry.vu.handle.abort();
                collect(report, entry.vu).await;
                continue;
            }
            remaining.push(entry);
        }
        remaining
    }

    async fn shutdown(
        &self,
        active: Vec<LiveVu>,
        draining: Vec<DrainingVu>,
        abort: &CancellationToken,
        report: &mut SchedulerReport,
    ) {
        let deadline = deadline_after(self.settings.graceful_stop);
        let mut pending = draining;
        for vu in active {
            vu.stop.cancel();
            pending.push(DrainingVu {
                vu,
                deadline,
                killed: false,
            });
        }

        if pending.is_empty() {
            return;
        }
        if abort.is_cancelled() {
            info!(scheduler = %self.name, "Aborting {} VUs", pending.len());
        } else {
            info!(
                scheduler = %self.name,
                "Stopping {} VUs, waiting up to {:?}",
                pending.len(),
                self.settings.graceful_stop
            );
        }

        let mut overdue = Vec::new();
        for mut entry in pending {
            let deadline = entry.deadline.min(deadline);
            if !entry.killed && !abort.is_cancelled() {
                let waited = tokio::select! {
                    biased;
                    _ = abort.cancelled() => None,
                    result = tokio::time::timeout_at(deadline, &mut entry.vu.handle) => result.ok(),
                };
                if let Some(result) = waited {
                    record_join(report, entry.vu.id, result);
                    continue;
                }
                warn!(scheduler = %self.name, vu = entry.vu.id, "VU did not stop within the grace window, killing");
            }
            entry.vu.kill.cancel();
            overdue.push(entry.vu);
        }

        // Every kill is already issued, so stuck VUs share one grace window
        let kill_deadline = Instant::now() + KILL_GRACE;
        for mut vu in overdue {
            match tokio::time::timeout_at(kill_deadline, &mut vu.handle).await {
                Ok(result) => record_join(report, vu.id, result),
                Err(_) => {
                    vu.handle.abort();
                    report.vus_killed += 1;
                }
            }
        }
    }
}

async fn collect(report: &mut SchedulerReport, vu: LiveVu) {
    let id = vu.id;
    let result = vu.handle.await;
    record_join(report, id, result);
}

fn record_join(report: &mut SchedulerReport, id: u64, result: Result<VuOutcome, tokio::task::JoinError>) {
    match result {
        Ok(outcome) => report.absorb(&outcome),
        Err(e) if e.is_cancelled() => report.vus_killed += 1,
        Err(e) => warn!(vu = id, "VU task failed: {}", e),
    }
}
