//! Weighted scenario selection for the shared virtual user pool

use crate::error::{EngineError, EngineResult};
use crate::scenario::Scenario;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks a scenario for each new virtual user with probability
/// proportional to its weight
#[derive(Debug)]
pub struct ScenarioRouter {
    scenarios: Vec<Scenario>,
    cumulative: Vec<f64>,
    total: f64,
    rng: Mutex<StdRng>,
}

impl ScenarioRouter {
    /// Build a router; with a seed the sequence of choices is reproducible
    pub fn new(scenarios: Vec<Scenario>, seed: Option<u64>) -> EngineResult<Self> {
        if scenarios.is_empty() {
            return Err(EngineError::NoRoutableScenario(
                "no scenarios to route to".to_string(),
            ));
        }

        let mut total = 0.0;
        let cumulative = scenarios
            .iter()
            .map(|s| {
                total += s.weight();
                total
            })
            .collect();

        if total <= 0.0 {
            return Err(EngineError::NoRoutableScenario(
                "total scenario weight is 0".to_string(),
            ));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            scenarios,
            cumulative,
            total,
            rng: Mutex::new(rng),
        })
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Draw `r` from `[0, total)` and take the first scenario with non-zero
    /// weight whose cumulative weight reaches `r`
    pub fn select(&self) -> &Scenario {
        let r = self.rng.lock().random_range(0.0..self.total);
        self.pick(r)
    }

    fn pick(&self, r: f64) -> &Scenario {
        self.scenarios
            .iter()
            .zip(&self.cumulative)
            .find(|(scenario, cumulative)| scenario.weight() > 0.0 && **cumulative >= r)
            .map(|(scenario, _)| scenario)
            // Float rounding can leave r a hair above the last sum
            .or_else(|| self.scenarios.iter().rev().find(|s| s.weight() > 0.0))
            .unwrap_or(&self.scenarios[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{scenario_fn, ScenarioExecutor};
    use futures::FutureExt;
    use std::sync::Arc;

    fn noop() -> Arc<dyn ScenarioExecutor> {
        scenario_fn(|_ctx| async { Ok(()) }.boxed())
    }

    fn scenario(name: &str, weight: f64) -> Scenario {
        Scenario::builder(name, noop()).weight(weight).build().unwrap()
    }

    #[test]
    fn test_selection_converges_to_weights() {
        let router = ScenarioRouter::new(vec![scenario("a", 1.0), scenario("b", 3.0)], Some(42)).unwrap();

        let draws = 100_000;
        let a = (0..draws).filter(|_| router.select().name() == "a").count();
        let ratio_a = a as f64 / draws as f64;
        let ratio_b = 1.0 - ratio_a;

        assert!((ratio_a - 0.25).abs() < 0.01, "a selected {}", ratio_a);
        assert!((ratio_b - 0.75).abs() < 0.01, "b selected {}", ratio_b);
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let router = ScenarioRouter::new(
            vec![scenario("idle", 0.0), scenario("busy", 2.0), scenario("spare", 0.0)],
            Some(1),
        )
        .unwrap();

        for _ in 0..10_000 {
            assert_eq!(router.select().name(), "busy");
        }
        assert_eq!(router.pick(0.0).name(), "busy");
        assert_eq!(router.pick(2.0 + 1e-12).name(), "busy");
    }

    #[test]
    fn test_seeded_router_is_deterministic() {
        let scenarios = || vec![scenario("a", 1.0), scenario("b", 1.0), scenario("c", 1.0)];
        let first = ScenarioRouter::new(scenarios(), Some(7)).unwrap();
        let second = ScenarioRouter::new(scenarios(), Some(7)).unwrap();

        let picks = |router: &ScenarioRouter| -> Vec<String> {
            (0..50).map(|_| router.select().name().to_string()).collect()
        };
        assert_eq!(picks(&first), picks(&second));
    }

    #[test]
    fn test_unroutable() {
        assert!(matches!(
            ScenarioRouter::new(Vec::new(), None),
            Err(EngineError::NoRoutableScenario(_))
        ));
        assert!(matches!(
            ScenarioRouter::new(vec![scenario("a", 0.0), scenario("b", 0.0)], None),
            Err(EngineError::NoRoutableScenario(_))
        ));
    }
}
