// Connectivity test
//
// The shipped tester simulates a network round trip: a random delay followed by
// independent draws against a table of failure scenarios. A real driver-backed
// tester plugs in through `ConnectionTester`.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::config::TesterConfig;
use crate::models::{ConnectionFormData, TestErrorCode};

/// A failed connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}:{message}")]
pub struct TestFailure {
    pub code: TestErrorCode,
    pub message: String,
}

impl TestFailure {
    pub fn new(code: TestErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Checks whether a connection description is reachable
#[async_trait]
pub trait ConnectionTester: Send + Sync {
    async fn check(&self, form: &ConnectionFormData) -> Result<(), TestFailure>;
}

/// One simulated failure mode and its probability
#[derive(Debug, Clone, PartialEq)]
pub struct FailureScenario {
    pub code: TestErrorCode,
    pub chance: f64,
    pub message: &'static str,
}

/// Failure table used by default
pub fn default_scenarios() -> Vec<FailureScenario> {
    vec![
        FailureScenario {
            code: TestErrorCode::Timeout,
            chance: 0.10,
            message: "Connection timed out",
        },
        FailureScenario {
            code: TestErrorCode::AuthFailed,
            chance: 0.10,
            message: "Authentication failed",
        },
        FailureScenario {
            code: TestErrorCode::HostNotFound,
            chance: 0.05,
            message: "Host not found",
        },
        FailureScenario {
            code: TestErrorCode::DatabaseNotFound,
            chance: 0.05,
            message: "Database not found",
        },
    ]
}

/// Tester that fakes latency and failures
pub struct SimulatedTester {
    min_latency: Duration,
    max_latency: Duration,
    scenarios: Vec<FailureScenario>,
    // std Mutex: never held across an await
    rng: Mutex<StdRng>,
}

impl SimulatedTester {
    pub fn new() -> Self {
        Self {
            min_latency: Duration::from_millis(1000),
            max_latency: Duration::from_millis(3000),
            scenarios: default_scenarios(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn from_config(config: &TesterConfig) -> Self {
        let tester = Self::new().with_latency(
            Duration::from_millis(config.min_latency_ms),
            Duration::from_millis(config.max_latency_ms),
        );
        if config.failure_injection {
            tester
        } else {
            tester.with_scenarios(Vec::new())
        }
    }

    /// Deterministic tester for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..Self::new()
        }
    }

    /// No delay, never fails
    pub fn reliable() -> Self {
        Self::new()
            .with_latency(Duration::ZERO, Duration::ZERO)
            .with_scenarios(Vec::new())
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    pub fn with_scenarios(mut self, scenarios: Vec<FailureScenario>) -> Self {
        self.scenarios = scenarios;
        self
    }

    /// Draw the delay and the outcome in one lock scope
    fn draw(&self) -> (Duration, Option<TestFailure>) {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let delay = if self.max_latency > self.min_latency {
            rng.gen_range(self.min_latency..=self.max_latency)
        } else {
            self.min_latency
        };

        let failure = self
            .scenarios
            .iter()
            .find(|scenario| rng.gen_bool(scenario.chance.clamp(0.0, 1.0)))
            .map(|scenario| TestFailure::new(scenario.code, scenario.message));

        (delay, failure)
    }
}

impl Default for SimulatedTester {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionTester for SimulatedTester {
    async fn check(&self, form: &ConnectionFormData) -> Result<(), TestFailure> {
        let (delay, failure) = self.draw();
        tracing::debug!(
            "Simulating connection test for {} ({:?})",
            form.name,
            delay
        );

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> ConnectionFormData {
        ConnectionFormData {
            name: "db".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reliable_tester_always_succeeds() {
        let tester = SimulatedTester::reliable();
        for _ in 0..20 {
            assert!(tester.check(&form()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_certain_failure() {
        let tester = SimulatedTester::reliable().with_scenarios(vec![FailureScenario {
            code: TestErrorCode::AuthFailed,
            chance: 1.0,
            message: "Authentication failed",
        }]);
        let failure = tester.check(&form()).await.unwrap_err();
        assert_eq!(failure.code, TestErrorCode::AuthFailed);
        assert_eq!(failure.to_string(), "AUTH_FAILED:Authentication failed");
    }

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let a = SimulatedTester::seeded(7);
        let b = SimulatedTester::seeded(7);
        for _ in 0..10 {
            assert_eq!(a.draw(), b.draw());
        }
    }

    #[test]
    fn test_delay_within_range() {
        let tester = SimulatedTester::seeded(1)
            .with_latency(Duration::from_millis(10), Duration::from_millis(20));
        for _ in 0..50 {
            let (delay, _) = tester.draw();
            assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(20));
        }
    }

    #[test]
    fn test_failure_rate_roughly_matches_table() {
        let tester = SimulatedTester::seeded(42);
        let failures = (0..10_000).filter(|_| tester.draw().1.is_some()).count();
        // 1 - 0.9 * 0.9 * 0.95 * 0.95 ≈ 0.269
        assert!((2300..3100).contains(&failures), "failures = {}", failures);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let tester = SimulatedTester::reliable()
            .with_latency(Duration::from_millis(1500), Duration::from_millis(1500));
        let start = tokio::time::Instant::now();
        tester.check(&form()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }
}
