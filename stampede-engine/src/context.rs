//! Per virtual user iteration context

use crate::scenario::ThinkTime;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value as JsonValue;
use stampede_http::{HttpClient, RequestResult, RequestSpec};
use stampede_metrics::MetricsRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a scenario executor can see and use while running an iteration.
///
/// One context lives as long as its virtual user; the iteration number is
/// advanced before every iteration.
pub struct IterationContext {
    vu_id: u64,
    scenario: String,
    iteration: u64,
    client: Arc<dyn HttpClient>,
    metrics: Arc<MetricsRegistry>,
    rng: StdRng,
    think_time: ThinkTime,
    kill: CancellationToken,
    setup_data: Arc<JsonValue>,
}

impl IterationContext {
    pub fn new(
        vu_id: u64,
        scenario: impl Into<String>,
        client: Arc<dyn HttpClient>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            vu_id,
            scenario: scenario.into(),
            iteration: 0,
            client,
            metrics,
            rng: StdRng::from_os_rng(),
            think_time: ThinkTime::default(),
            kill: CancellationToken::new(),
            setup_data: Arc::new(JsonValue::Null),
        }
    }

    /// Deterministic randomness derived from the run seed and the VU id
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed ^ self.vu_id.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        self
    }

    pub fn with_think_time(mut self, think_time: ThinkTime) -> Self {
        self.think_time = think_time;
        self
    }

    pub fn with_kill_token(mut self, kill: CancellationToken) -> Self {
        self.kill = kill;
        self
    }

    pub fn with_setup_data(mut self, data: Arc<JsonValue>) -> Self {
        self.setup_data = data;
        self
    }

    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Zero-based iteration number of this virtual user
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn set_iteration(&mut self, iteration: u64) {
        self.iteration = iteration;
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Value returned by the run's setup hook, shared read-only
    pub fn setup_data(&self) -> &JsonValue {
        &self.setup_data
    }

    /// Fires when the virtual user is force-terminated
    pub fn kill_token(&self) -> &CancellationToken {
        &self.kill
    }

    pub(crate) fn think_time(&self) -> ThinkTime {
        self.think_time
    }

    pub async fn request(&self, spec: RequestSpec) -> RequestResult {
        self.client.execute(spec, &self.kill).await
    }

    pub async fn get(&self, url: impl Into<String>) -> RequestResult {
        self.request(RequestSpec::get(url)).await
    }

    pub async fn post_json(&self, url: impl Into<String>, body: JsonValue) -> RequestResult {
        self.request(RequestSpec::post_json(url, body)).await
    }

    /// Sleep unless the virtual user is killed first; returns `false` when
    /// the sleep was cut short
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.kill.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Pause for a random think time drawn from the scenario's bounds
    pub async fn think(&mut self) -> bool {
        let pause = self.think_time.sample(&mut self.rng);
        self.sleep(pause).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use stampede_http::{DriverConfig, RequestDriver};

    fn context(vu_id: u64) -> IterationContext {
        let metrics = Arc::new(MetricsRegistry::new());
        let driver = RequestDriver::new(DriverConfig::default(), metrics.clone()).unwrap();
        IterationContext::new(vu_id, "browse", Arc::new(driver), metrics)
    }

    #[test]
    fn test_seeded_rng_is_per_vu() {
        let mut a = context(1).with_seed(42);
        let mut a_again = context(1).with_seed(42);
        let mut b = context(2).with_seed(42);

        let first: u64 = a.rng().random();
        assert_eq!(first, a_again.rng().random::<u64>());
        assert_ne!(first, b.rng().random::<u64>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_cut_short_by_kill() {
        let kill = CancellationToken::new();
        let ctx = context(1).with_kill_token(kill.clone());

        assert!(ctx.sleep(Duration::from_millis(10)).await);

        kill.cancel();
        assert!(!ctx.sleep(Duration::from_secs(3600)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_think_uses_bounds() {
        let mut ctx = context(3)
            .with_seed(1)
            .with_think_time(ThinkTime::fixed(Duration::from_secs(2)));
        let before = tokio::time::Instant::now();
        assert!(ctx.think().await);
        assert_eq!(before.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn test_setup_data() {
        let ctx = context(1).with_setup_data(Arc::new(serde_json::json!({"token": "abc"})));
        assert_eq!(ctx.setup_data()["token"], "abc");
        assert_eq!(ctx.scenario(), "browse");
        assert_eq!(ctx.iteration(), 0);
    }
}
