//! Hyperparameter optimization results.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::id::AlgorithmId;
use crate::search::ParameterSet;

/// Search strategy for hyperparameter optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMethod {
    /// Exhaustive enumeration of a discretized space
    Grid,
    /// Uniform sampling
    Random,
    /// Sampling narrowed around the incumbent
    Bayesian,
    /// Genetic population search
    Evolutionary,
    /// Evolutionary search seeded from previous runs
    MetaLearned,
}

impl OptimizationMethod {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationMethod::Grid => "grid",
            OptimizationMethod::Random => "random",
            OptimizationMethod::Bayesian => "bayesian",
            OptimizationMethod::Evolutionary => "evolutionary",
            OptimizationMethod::MetaLearned => "meta_learned",
        }
    }
}

impl std::fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OptimizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "grid" => Ok(OptimizationMethod::Grid),
            "random" => Ok(OptimizationMethod::Random),
            "bayesian" => Ok(OptimizationMethod::Bayesian),
            "evolutionary" => Ok(OptimizationMethod::Evolutionary),
            "meta_learned" => Ok(OptimizationMethod::MetaLearned),
            other => Err(format!("unknown optimization method: {}", other)),
        }
    }
}

/// Why a search loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The strategy ran to its natural end
    Completed,
    /// Progress stalled
    Converged,
    /// The evaluation budget was used up
    BudgetExhausted,
    /// The wall-clock deadline passed
    DeadlineReached,
}

/// Outcome of one hyperparameter optimization call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperparameterResult {
    /// Optimized algorithm
    pub algorithm_id: AlgorithmId,
    /// Configuration before the call
    pub prior_parameters: ParameterSet,
    /// Best configuration found
    pub new_parameters: ParameterSet,
    /// Score recorded before the call
    pub prior_score: f64,
    /// Best score found by the search
    pub best_score: f64,
    /// Relative improvement; non-positive means the prior configuration is kept
    pub improvement: f64,
    /// Confidence in the result, in [0, 1]
    pub confidence: f64,
    /// Re-score of the best configuration
    pub validation_score: f64,
    /// Strategy used
    pub method: OptimizationMethod,
    /// Candidate evaluations performed
    pub iterations: usize,
    /// Evaluations that failed and were discarded
    pub failed_evaluations: usize,
    /// Why the search stopped
    pub termination: Termination,
    /// Whether the registry now holds `new_parameters`
    pub applied: bool,
    /// Wall-clock time spent
    pub elapsed: Duration,
}

/// Confidence of an optimization result.
///
/// The mean of `min(1, 2 * improvement)` (floored at 0) and `min(1, iterations / 100)`.
pub fn confidence(improvement: f64, iterations: usize) -> f64 {
    let gain = (2.0 * improvement).clamp(0.0, 1.0);
    let effort = (iterations as f64 / 100.0).min(1.0);
    (gain + effort) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_formula() {
        assert!((confidence(0.1714, 50) - (0.3428 + 0.5) / 2.0).abs() < 1e-12);
        assert_eq!(confidence(0.8, 300), 1.0);
        assert_eq!(confidence(-0.3, 0), 0.0);
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("meta-learned".parse(), Ok(OptimizationMethod::MetaLearned));
        assert_eq!(OptimizationMethod::Bayesian.to_string(), "bayesian");
        assert!("annealing".parse::<OptimizationMethod>().is_err());
    }
}
