//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Population-search settings shared by the evolutionary strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Individuals per generation
    pub population_size: usize,
    /// Maximum generations
    pub generations: usize,
    /// Per-parameter mutation probability
    pub mutation_rate: f64,
    /// Per-parameter probability of inheriting from the second parent
    pub crossover_rate: f64,
    /// Contestants per tournament
    pub tournament_size: usize,
    /// Best individuals copied unchanged into the next generation
    pub elitism: usize,
    /// Fitness variance below which a generation counts as converged
    pub convergence_epsilon: f64,
    /// Generations without a new best before stopping
    pub patience: usize,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 10,
            mutation_rate: 0.1,
            crossover_rate: 0.7,
            tournament_size: 3,
            elitism: 1,
            convergence_epsilon: 1e-9,
            patience: 2,
        }
    }
}

/// Settings of the narrowing (Bayesian-style) search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesianConfig {
    /// Uniform samples taken before narrowing starts
    pub initial_samples: usize,
    /// Iterations over which progress is measured
    pub window: usize,
    /// Relative improvement over `window` below which the search stops
    pub min_relative_improvement: f64,
    /// Factor applied to the sampling window after each iteration
    pub shrink: f64,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            initial_samples: 10,
            window: 10,
            min_relative_improvement: 0.01,
            shrink: 0.85,
        }
    }
}

/// Thresholds of the cross-algorithm transfer pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Insights at or below this potential are dropped
    pub surface_threshold: f64,
    /// Insights above this potential are reported as synergies
    pub synergy_threshold: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            surface_threshold: 0.5,
            synergy_threshold: 0.7,
        }
    }
}

/// Configuration for the optimization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum candidate evaluations per optimization call
    pub optimization_budget: usize,
    /// Evaluate the individuals of a generation concurrently
    pub parallel_optimization: bool,
    /// Seed for reproducible searches (None = entropy)
    pub seed: Option<u64>,
    /// Wall-clock limit per call in milliseconds; best-so-far is returned on expiry
    pub deadline_ms: Option<u64>,
    /// Metric optimized when the caller does not name one
    pub default_metric: String,
    /// Population search settings
    pub evolution: EvolutionConfig,
    /// Narrowing search settings
    pub bayesian: BayesianConfig,
    /// Allowed predicted regression of a learning-rate schedule below the best score
    pub learning_rate_tolerance: f64,
    /// Transfer thresholds
    pub transfer: TransferConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimization_budget: 200,
            parallel_optimization: true,
            seed: None,
            deadline_ms: None,
            default_metric: "accuracy".to_string(),
            evolution: EvolutionConfig::default(),
            bayesian: BayesianConfig::default(),
            learning_rate_tolerance: 0.05,
            transfer: TransferConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON configuration file; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the evaluation budget.
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.optimization_budget = budget;
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the wall-clock deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis() as u64);
        self
    }

    /// Enable or disable concurrent evaluation.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel_optimization = parallel;
        self
    }

    /// Replace the evolution settings.
    pub fn with_evolution(mut self, evolution: EvolutionConfig) -> Self {
        self.evolution = evolution;
        self
    }

    /// Deadline as a duration.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Reject settings no search can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.optimization_budget == 0 {
            return invalid("optimization_budget must be positive");
        }
        if self.evolution.population_size < 2 {
            return invalid("evolution.population_size must be at least 2");
        }
        if self.evolution.generations == 0 {
            return invalid("evolution.generations must be positive");
        }
        if !(0.0..=1.0).contains(&self.evolution.mutation_rate)
            || !(0.0..=1.0).contains(&self.evolution.crossover_rate)
        {
            return invalid("evolution rates must lie in [0, 1]");
        }
        if !(0.0..1.0).contains(&self.bayesian.shrink) || self.bayesian.shrink == 0.0 {
            return invalid("bayesian.shrink must lie in (0, 1)");
        }
        Ok(())
    }
}

/// Errors loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid JSON for this schema
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Values out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.evolution.population_size, 20);
        assert_eq!(config.evolution.generations, 10);
        assert_eq!(config.default_metric, "accuracy");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"seed": 7, "evolution": {"generations": 4}}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.evolution.generations, 4);
        assert_eq!(config.evolution.population_size, 20);
        assert_eq!(config.optimization_budget, 200);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"optimization_budget": 0}"#).unwrap();
        assert!(matches!(EngineConfig::from_file(&path), Err(ConfigError::Invalid(_))));
    }
}
