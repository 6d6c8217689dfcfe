//! Error taxonomy of the optimization engine.

use selfopt_core::{AlgorithmId, AlgorithmType, SearchSpaceError};
use selfopt_storage::StorageError;
use serde::{Deserialize, Serialize};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, OptimizationError>;

/// Failure of the injected scoring function for one candidate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    /// The evaluator reported an error
    #[error("evaluator failed: {0}")]
    Failed(String),

    /// The evaluator returned NaN or infinity
    #[error("evaluator returned a non-finite score")]
    NonFinite,
}

/// Errors surfaced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum OptimizationError {
    /// Unknown algorithm id
    #[error("Algorithm not found: {0}")]
    NotFound(AlgorithmId),

    /// Operation does not apply to this algorithm type
    #[error("{operation} is not applicable to {algorithm_type} algorithm {algorithm}")]
    NotApplicable {
        /// Algorithm id
        algorithm: AlgorithmId,
        /// Its type
        algorithm_type: AlgorithmType,
        /// Requested operation
        operation: &'static str,
    },

    /// Another optimization holds the lease for this id
    #[error("Algorithm {0} is already being optimized")]
    AlreadyOptimizing(AlgorithmId),

    /// Every candidate of a batch failed to evaluate
    #[error("Optimization of {algorithm} failed: {cause}")]
    OptimizationFailed {
        /// Algorithm id
        algorithm: AlgorithmId,
        /// Last evaluation error seen
        cause: EvaluationError,
    },

    /// The derived search space is inconsistent
    #[error("Invalid search space: {0}")]
    InvalidSearchSpace(#[from] SearchSpaceError),

    /// `apply_best_evolution` without a preceding run
    #[error("No pending evolution for {0}")]
    NoPendingEvolution(AlgorithmId),

    /// Nothing to roll back to
    #[error("No previous architecture recorded for {0}")]
    NothingToRollBack(AlgorithmId),

    /// Registry failure
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for OptimizationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => OptimizationError::NotFound(id),
            other => OptimizationError::Storage(other),
        }
    }
}

/// Error codes reported to callers.
pub mod error_codes {
    /// Generic business error
    pub const BUSINESS_ERROR: i32 = -32000;
    /// Concurrency conflict (optimization already running)
    pub const STATE_CONFLICT: i32 = -32001;
    /// Resource not found
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
    /// Operation not applicable to the algorithm type
    pub const NOT_APPLICABLE: i32 = -32005;
    /// Every candidate evaluation failed
    pub const OPTIMIZATION_FAILED: i32 = -32006;
    /// Invalid input or configuration
    pub const INVALID_INPUT: i32 = -32007;
}

/// Structured error returned at the engine boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error code (see [`error_codes`])
    pub code: i32,
    /// Error message
    pub message: String,
    /// Hint for the caller
    pub hint: Option<String>,
    /// Whether retrying may succeed
    pub retryable: bool,
}

impl OptimizationError {
    /// Whether the caller may retry the operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OptimizationError::AlreadyOptimizing(_) | OptimizationError::OptimizationFailed { .. }
        )
    }

    /// Convert into a structured report.
    pub fn report(&self) -> ErrorReport {
        use error_codes::*;

        let (code, hint) = match self {
            OptimizationError::NotFound(_) => (
                RESOURCE_NOT_FOUND,
                Some("Register the algorithm before optimizing it.".to_string()),
            ),
            OptimizationError::NotApplicable { .. } => (
                NOT_APPLICABLE,
                Some("Use an operation supported by this algorithm type.".to_string()),
            ),
            OptimizationError::AlreadyOptimizing(_) => (
                STATE_CONFLICT,
                Some("Retry after the running optimization completes.".to_string()),
            ),
            OptimizationError::OptimizationFailed { .. } => (
                OPTIMIZATION_FAILED,
                Some("Check the evaluator; every candidate failed to score.".to_string()),
            ),
            OptimizationError::InvalidSearchSpace(_) => (INVALID_INPUT, None),
            OptimizationError::NoPendingEvolution(_) => (
                STATE_CONFLICT,
                Some("Run an evolution before applying its best candidate.".to_string()),
            ),
            OptimizationError::NothingToRollBack(_) => (STATE_CONFLICT, None),
            OptimizationError::Storage(_) => (BUSINESS_ERROR, None),
        };

        ErrorReport {
            code,
            message: self.to_string(),
            hint,
            retryable: self.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let err: OptimizationError = StorageError::NotFound("x".into()).into();
        assert!(matches!(err, OptimizationError::NotFound(ref id) if id.as_str() == "x"));
        assert_eq!(err.report().code, error_codes::RESOURCE_NOT_FOUND);
        assert!(!err.report().retryable);
    }

    #[test]
    fn test_conflict_is_retryable() {
        let report = OptimizationError::AlreadyOptimizing("ga".into()).report();
        assert_eq!(report.code, error_codes::STATE_CONFLICT);
        assert!(report.retryable);
        assert!(report.message.contains("ga"));
    }
}
