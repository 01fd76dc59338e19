//! Scenarios and the executor trait

use crate::context::IterationContext;
use crate::error::{EngineError, EngineResult};
use crate::stage::RampProfile;
use futures::future::BoxFuture;
use rand::Rng;
use stampede_config::ThinkTimeConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Business logic of one scenario iteration
#[async_trait::async_trait]
pub trait ScenarioExecutor: Send + Sync {
    /// Run one iteration. An error marks the iteration as failed; the
    /// virtual user keeps going.
    async fn iteration(&self, ctx: &mut IterationContext) -> anyhow::Result<()>;
}

struct FnExecutor<F>(F);

#[async_trait::async_trait]
impl<F> ScenarioExecutor for FnExecutor<F>
where
    F: for<'a> Fn(&'a mut IterationContext) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync,
{
    async fn iteration(&self, ctx: &mut IterationContext) -> anyhow::Result<()> {
        (self.0)(ctx).await
    }
}

/// Wrap a closure as an executor:
///
/// ```ignore
/// let executor = scenario_fn(|ctx| {
///     async move {
///         ctx.get("/api/products").await.error_for_status()?;
///         Ok(())
///     }
///     .boxed()
/// });
/// ```
pub fn scenario_fn<F>(f: F) -> Arc<dyn ScenarioExecutor>
where
    F: for<'a> Fn(&'a mut IterationContext) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
{
    Arc::new(FnExecutor(f))
}

/// Uniformly random pause between `min` and `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub fn fixed(duration: Duration) -> Self {
        Self {
            min: duration,
            max: duration,
        }
    }

    pub fn range(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }
}

impl From<ThinkTimeConfig> for ThinkTime {
    fn from(config: ThinkTimeConfig) -> Self {
        Self::range(config.min, config.max)
    }
}

/// A named, weighted user journey
#[derive(Clone)]
pub struct Scenario {
    name: String,
    weight: f64,
    executor: Arc<dyn ScenarioExecutor>,
    think_time: Option<ThinkTime>,
    stages: Option<RampProfile>,
}

impl Scenario {
    pub fn builder(name: impl Into<String>, executor: Arc<dyn ScenarioExecutor>) -> ScenarioBuilder {
        ScenarioBuilder {
            name: name.into(),
            weight: 1.0,
            executor,
            think_time: None,
            stages: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn executor(&self) -> Arc<dyn ScenarioExecutor> {
        self.executor.clone()
    }

    pub fn think_time(&self) -> Option<ThinkTime> {
        self.think_time
    }

    /// Own ramp profile; `None` means the scenario is routed through the shared pool
    pub fn stages(&self) -> Option<&RampProfile> {
        self.stages.as_ref()
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("think_time", &self.think_time)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

pub struct ScenarioBuilder {
    name: String,
    weight: f64,
    executor: Arc<dyn ScenarioExecutor>,
    think_time: Option<ThinkTime>,
    stages: Option<RampProfile>,
}

impl ScenarioBuilder {
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = Some(think_time);
        self
    }

    pub fn stages(mut self, stages: RampProfile) -> Self {
        self.stages = Some(stages);
        self
    }

    pub fn build(self) -> EngineResult<Scenario> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidScenario("scenario name cannot be empty".to_string()));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(EngineError::InvalidScenario(format!(
                "scenario '{}' weight must be a finite number >= 0, got {}",
                self.name, self.weight
            )));
        }
        if let Some(think_time) = self.think_time {
            if think_time.min > think_time.max {
                return Err(EngineError::InvalidScenario(format!(
                    "scenario '{}' think time min exceeds max",
                    self.name
                )));
            }
        }

        Ok(Scenario {
            name: self.name,
            weight: self.weight,
            executor: self.executor,
            think_time: self.think_time,
            stages: self.stages,
        })
    }
}
