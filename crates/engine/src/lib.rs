//! Self-optimization engine.
//!
//! Searches configurations of registered algorithms and commits the ones that
//! score better:
//!
//! - hyperparameter search (grid, random, narrowing, evolutionary, meta-learned)
//! - architecture search for neural algorithms, with rollback
//! - learning-rate schedule adaptation from a score trajectory
//! - feature engineering
//! - population evolution with a persisted lineage
//! - cross-algorithm transfer and per-algorithm insights
//!
//! Scoring is delegated to an [`Evaluator`]; persistence to a
//! [`PerformanceStore`](selfopt_storage::PerformanceStore).

#![warn(missing_docs)]

pub mod error;
pub mod config;
pub mod evaluator;
pub mod search_space;
pub mod strategy;

mod runner;
mod genetic;
mod hyperparameter;

pub mod architecture;
pub mod learning_rate;
pub mod features;
pub mod evolution;
pub mod transfer;
pub mod insights;
pub mod engine;

pub use error::{error_codes, ErrorReport, EvaluationError, OptimizationError, Result};
pub use config::{BayesianConfig, ConfigError, EngineConfig, EvolutionConfig, TransferConfig};
pub use evaluator::{Evaluator, FnEvaluator, HashEvaluator};
pub use search_space::{GridIter, SearchSpaceBuilder};
pub use strategy::{select_strategy, MetaStatistics};
pub use hyperparameter::GRID_LEVELS;
pub use architecture::{ArchitectureOptimization, ArchitectureSearchMethod};
pub use learning_rate::{AdaptationMethod, LearningDynamics, LearningRateAdaptation};
pub use features::{FeatureEngineering, FeatureMethod};
pub use evolution::{BatchEvolution, EvolutionApplication, EvolutionCandidate, EvolutionRun};
pub use transfer::{TransferApplication, TransferReport};
pub use insights::{OptimizationInsights, Trend};
pub use engine::SelfOptimizationEngine;
