//! Circuit breaker to skip chain entries that keep failing.
//!
//! Circuits are keyed by name; the chain uses one per `provider/model`
//! entry. While a circuit is open the chain skips that entry and moves
//! straight to the next one.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time before attempting recovery (in seconds)
    #[serde(with = "duration_secs")]
    pub recovery_timeout: Duration,

    /// Successes needed to close circuit
    pub success_threshold: u32,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// All calls skip this circuit
    Open { opened_at: Instant },

    /// Letting trial calls through
    HalfOpen { successes: u32 },
}

/// Circuit breaker keyed by circuit name.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls through `circuit` should be skipped.
    ///
    /// An open circuit whose recovery timeout has elapsed moves to
    /// half-open and lets the call through.
    pub fn is_open(&self, circuit: &str) -> bool {
        let mut states = self.states.write();
        match states.get(circuit) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    states.insert(circuit.to_string(), CircuitState::HalfOpen { successes: 0 });
                    tracing::info!(circuit, "Circuit half-open, allowing a trial call");
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, circuit: &str) {
        let mut states = self.states.write();
        match states.get(circuit).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(circuit.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(circuit, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        circuit.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(circuit.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, circuit: &str) {
        let mut states = self.states.write();
        let failures = match states.get(circuit) {
            Some(CircuitState::Closed { failures }) => failures + 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    circuit.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(circuit, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
            None => 1,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                circuit.to_string(),
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(circuit, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(circuit.to_string(), CircuitState::Closed { failures });
        }
    }

    pub fn state(&self, circuit: &str) -> CircuitState {
        self.states
            .read()
            .get(circuit)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
