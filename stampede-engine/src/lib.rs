//! Load generation engine for Stampede
//!
//! A run is a set of [`Scenario`]s driven by [`StageScheduler`]s. Each
//! scheduler follows a [`RampProfile`], growing and shrinking a pool of
//! virtual users to the concurrency the profile asks for at every tick.
//! Virtual users loop over their scenario's iterations until told to stop,
//! writing request and iteration metrics into a shared registry. The
//! [`Orchestrator`] ties it together: setup, schedulers, teardown, then
//! [`threshold`] evaluation into a [`RunResult`].

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod router;
pub mod scenario;
pub mod scheduler;
pub mod settings;
pub mod stage;
pub mod threshold;
pub mod vu;

pub use context::IterationContext;
pub use error::{EngineError, EngineResult};
pub use orchestrator::{
    HookContext, LifecycleHooks, NoopHooks, Orchestrator, OrchestratorBuilder, RunControl, RunResult,
};
pub use router::ScenarioRouter;
pub use scenario::{scenario_fn, Scenario, ScenarioBuilder, ScenarioExecutor, ThinkTime};
pub use scheduler::{ScenarioSource, SchedulerReport, StageScheduler};
pub use settings::ExecutionSettings;
pub use stage::{RampProfile, Stage};
pub use threshold::{evaluate, Aggregate, Comparison, Threshold, ThresholdError, ThresholdResult};
pub use vu::{VirtualUser, VuOutcome, VuState};
