//! Declarative request flows: scenarios, setup and teardown described as
//! ordered request steps in the run configuration

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::{Map, Value as JsonValue};
use stampede_config::RequestStepConfig;
use stampede_engine::{HookContext, IterationContext, LifecycleHooks, ScenarioExecutor};
use stampede_http::{HttpMethod, RequestResult, RequestSpec};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Values captured from earlier responses, by capture name
type CaptureMap = HashMap<String, String>;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"))
}

/// Replace `${name}` with captured values; an unknown name is an error
fn substitute(input: &str, captures: &CaptureMap) -> Result<String> {
    let mut missing = None;
    let output = placeholder_regex().replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        match captures.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                caps[0].to_string()
            }
        }
    });
    match missing {
        Some(name) => bail!("no captured value for '${{{}}}'", name),
        None => Ok(output.into_owned()),
    }
}

fn substitute_json(value: &JsonValue, captures: &CaptureMap) -> Result<JsonValue> {
    Ok(match value {
        JsonValue::String(s) => JsonValue::String(substitute(s, captures)?),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| substitute_json(item, captures))
                .collect::<Result<_>>()?,
        ),
        JsonValue::Object(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), substitute_json(v, captures)?)))
                .collect::<Result<Map<_, _>>>()?,
        ),
        other => other.clone(),
    })
}

/// Turn a step into a request, filling in captured values
pub fn build_request(step: &RequestStepConfig, captures: &CaptureMap) -> Result<RequestSpec> {
    let method: HttpMethod = step.method.parse()?;
    let mut spec = RequestSpec::new(method, substitute(&step.path, captures)?).tag(&step.name);
    for (name, value) in &step.headers {
        spec = spec.header(name, substitute(value, captures)?);
    }
    if let Some(body) = &step.body {
        spec = spec.json(substitute_json(body, captures)?);
    }
    if let Some(timeout) = step.timeout {
        spec = spec.timeout(timeout);
    }
    Ok(spec)
}

/// Check a response against the step's expectations and record its capture
pub fn check_response(step: &RequestStepConfig, result: &RequestResult, captures: &mut CaptureMap) -> Result<()> {
    if let Some(error) = result.error() {
        if result.status == 0 {
            bail!("step '{}' failed: {}", step.name, error);
        }
    }

    match step.expect_status {
        Some(expected) if result.status != expected => {
            bail!("step '{}' expected status {}, got {}", step.name, expected, result.status)
        }
        None if result.is_failure() => bail!("step '{}' failed with status {}", step.name, result.status),
        _ => {}
    }

    if let Some(field) = &step.capture {
        let value = result
            .json_field(field)
            .ok_or_else(|| anyhow!("step '{}' response has no '{}' field to capture", step.name, field))?;
        let value = match value {
            JsonValue::String(s) => s,
            other => other.to_string(),
        };
        captures.insert(field.clone(), value);
    }
    Ok(())
}

/// What a flow sends its requests through
#[async_trait]
trait StepRunner: Send + Sync {
    async fn send(&self, spec: RequestSpec) -> RequestResult;

    /// Returns `false` when the pause was cut short
    async fn pause(&self, duration: Duration) -> bool;
}

#[async_trait]
impl StepRunner for IterationContext {
    async fn send(&self, spec: RequestSpec) -> RequestResult {
        self.request(spec).await
    }

    async fn pause(&self, duration: Duration) -> bool {
        self.sleep(duration).await
    }
}

#[async_trait]
impl StepRunner for HookContext {
    async fn send(&self, spec: RequestSpec) -> RequestResult {
        self.request(spec).await
    }

    async fn pause(&self, duration: Duration) -> bool {
        tokio::time::sleep(duration).await;
        true
    }
}

async fn run_steps(runner: &dyn StepRunner, steps: &[RequestStepConfig], captures: &mut CaptureMap) -> Result<()> {
    for step in steps {
        let spec = build_request(step, captures).with_context(|| format!("step '{}'", step.name))?;
        let result = runner.send(spec).await;
        debug!(step = %step.name, status = result.status, "Step completed in {:?}", result.duration);
        check_response(step, &result, captures)?;

        if let Some(pause) = step.pause {
            if !runner.pause(pause).await {
                break;
            }
        }
    }
    Ok(())
}

/// Captured values carried in setup data
fn captures_from(data: &JsonValue) -> CaptureMap {
    data.as_object()
        .map(|fields| {
            fields
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        JsonValue::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Runs a scenario's request steps in order on every iteration
pub struct RequestFlow {
    steps: Vec<RequestStepConfig>,
}

impl RequestFlow {
    pub fn new(steps: Vec<RequestStepConfig>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl ScenarioExecutor for RequestFlow {
    async fn iteration(&self, ctx: &mut IterationContext) -> Result<()> {
        // Setup captures are visible to every iteration
        let mut captures = captures_from(ctx.setup_data());
        run_steps(&*ctx, &self.steps, &mut captures).await
    }
}

/// Setup and teardown request lists from the run configuration.
///
/// Values captured during setup become the run's setup data and are
/// available to scenarios and teardown as `${name}`.
pub struct RequestHooks {
    setup: Vec<RequestStepConfig>,
    teardown: Vec<RequestStepConfig>,
}

impl RequestHooks {
    pub fn new(setup: Vec<RequestStepConfig>, teardown: Vec<RequestStepConfig>) -> Self {
        Self { setup, teardown }
    }
}

#[async_trait]
impl LifecycleHooks for RequestHooks {
    async fn setup(&self, ctx: &HookContext) -> Result<JsonValue> {
        let mut captures = CaptureMap::new();
        run_steps(ctx, &self.setup, &mut captures).await?;
        Ok(JsonValue::Object(
            captures
                .into_iter()
                .map(|(k, v)| (k, JsonValue::String(v)))
                .collect(),
        ))
    }

    async fn teardown(&self, ctx: &HookContext, data: &JsonValue) -> Result<()> {
        let mut captures = captures_from(data);
        run_steps(ctx, &self.teardown, &mut captures).await
    }
}
