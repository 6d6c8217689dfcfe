//! Self-optimization core data models.
//!
//! This crate defines the records the optimization engine reads and writes:
//! algorithm records, search spaces, results, architectures, schedules,
//! features, evolution lineage and transfer insights.

#![warn(missing_docs)]

// Identities
mod id;

// Registry state
mod algorithm;
mod architecture;
mod schedule;

// Search and results
mod search;
mod optimization;
mod evolution;
mod transfer;

// Re-exports
pub use id::*;

pub use algorithm::{changed_parameters, AlgorithmRecord, AlgorithmType, ImprovementEvent, ImprovementKind};
pub use architecture::{
    Activation, ArchitectureSpec, Connection, ConnectionKind, Layer, LayerKind, OptimizerKind,
    OptimizerSettings, Regularization,
};
pub use schedule::{FeatureKind, FeatureSpec, LearningRateSchedule, ScheduleKind};
pub use search::{
    Constraint, Direction, Objective, ParamValue, ParameterKind, ParameterRange, ParameterSet,
    ParameterSpec, Scale, SearchSpace, SearchSpaceError,
};
pub use optimization::{confidence, HyperparameterResult, OptimizationMethod, Termination};
pub use evolution::{Crossover, EvolutionRecord, Lineage, Mutation};
pub use transfer::TransferInsight;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Floor for the denominator of relative improvements.
pub const EPSILON: f64 = 1e-9;

/// Relative improvement from `old` to `new`: `(new - old) / max(old, EPSILON)`.
pub fn improvement(old: f64, new: f64) -> f64 {
    (new - old) / old.max(EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_improvement_formula() {
        assert_eq!(improvement(0.7, 0.7), 0.0);
        assert!((improvement(0.7, 0.82) - 0.171428).abs() < 1e-5);
        assert!(improvement(0.8, 0.6) < 0.0);
        // no division by zero
        assert!((improvement(0.0, 0.5) - 0.5 / EPSILON).abs() < 1.0);
    }
}
