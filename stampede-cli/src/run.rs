//! Turning a run configuration into an orchestrator

use crate::cli::RunArgs;
use crate::flow::{RequestFlow, RequestHooks};
use anyhow::{Context, Result};
use stampede_config::{ConfigLoader, StageConfig, StampedeConfig};
use stampede_engine::{
    ExecutionSettings, LifecycleHooks, NoopHooks, Orchestrator, RampProfile, RunControl, Scenario, ThinkTime,
    Threshold,
};
use stampede_http::{DriverConfig, RequestDriver};
use stampede_metrics::MetricsRegistry;
use std::sync::Arc;
use tracing::info;

/// Load the configuration file and layer the command line on top
pub fn load_run_config(args: &RunArgs) -> Result<StampedeConfig> {
    let mut config = ConfigLoader::new()
        .read_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    apply_overrides(&mut config, args);
    config.validate_all().context("Invalid configuration")?;
    Ok(config)
}

/// Command line flags win over the file and the environment
pub fn apply_overrides(config: &mut StampedeConfig, args: &RunArgs) {
    if let (Some(vus), Some(duration)) = (args.vus, args.duration) {
        config.stages = vec![StageConfig::hold(duration, vus)];
    } else if !args.stages.is_empty() {
        config.stages = args.stages.clone();
    }
    if !args.out.is_empty() {
        config.output.sinks = args.out.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(seed) = args.seed {
        config.execution.seed = Some(seed);
    }
}

/// Parse every threshold expression of the configuration
pub fn parse_thresholds(config: &StampedeConfig) -> Result<Vec<Threshold>> {
    config
        .thresholds
        .iter()
        .map(|threshold| {
            Threshold::from_config(threshold)
                .with_context(|| format!("Invalid threshold on '{}'", threshold.metric))
        })
        .collect()
}

/// Build the orchestrator for a validated configuration
pub fn build_orchestrator(config: &StampedeConfig, control: RunControl) -> Result<Orchestrator> {
    let registry = Arc::new(MetricsRegistry::new());
    let driver = RequestDriver::new(DriverConfig::from_run(config), registry.clone())
        .context("Failed to create HTTP client")?;

    let mut scenarios = Vec::with_capacity(config.scenarios.len());
    for scenario in &config.scenarios {
        let mut builder = Scenario::builder(&scenario.name, Arc::new(RequestFlow::new(scenario.requests.clone())))
            .weight(scenario.weight);
        if let Some(think_time) = scenario.think_time {
            builder = builder.think_time(ThinkTime::from(think_time));
        }
        if let Some(stages) = &scenario.stages {
            builder = builder.stages(RampProfile::from_config(stages)?);
        }
        scenarios.push(builder.build()?);
    }

    let thresholds = parse_thresholds(config)?;

    let hooks: Arc<dyn LifecycleHooks> = if config.setup.is_empty() && config.teardown.is_empty() {
        Arc::new(NoopHooks)
    } else {
        Arc::new(RequestHooks::new(config.setup.clone(), config.teardown.clone()))
    };

    let mut builder = Orchestrator::builder()
        .scenarios(scenarios)
        .thresholds(thresholds)
        .hooks(hooks)
        .client(Arc::new(driver))
        .registry(registry)
        .settings(ExecutionSettings::from(&config.execution))
        .control(control);
    if !config.stages.is_empty() {
        builder = builder.stages(RampProfile::from_config(&config.stages)?);
    }

    info!(
        "Prepared run against {}: {} scenario(s), {} threshold(s)",
        config.base_url,
        config.scenarios.len(),
        config.thresholds.len()
    );
    Ok(builder.build()?)
}
