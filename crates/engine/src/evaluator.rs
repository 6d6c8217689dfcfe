//! Evaluation seam - how candidate configurations are scored.
//!
//! The engine never trains models itself. It asks an [`Evaluator`] for a
//! score in [0, 1] and treats it as expensive and fallible.

use async_trait::async_trait;
use selfopt_core::{AlgorithmId, ParamValue, ParameterSet};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::EvaluationError;

/// Scores a configuration of an algorithm against a metric.
///
/// Implementations must be pure for fixed inputs (and fixed seed) so
/// searches are reproducible.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Score `parameters` for `algorithm` on `metric`, in [0, 1].
    async fn evaluate(
        &self,
        algorithm: &AlgorithmId,
        parameters: &ParameterSet,
        metric: &str,
    ) -> Result<f64, EvaluationError>;
}

/// Evaluator backed by a synchronous closure.
pub struct FnEvaluator<F> {
    func: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&AlgorithmId, &ParameterSet, &str) -> Result<f64, EvaluationError> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&AlgorithmId, &ParameterSet, &str) -> Result<f64, EvaluationError> + Send + Sync,
{
    async fn evaluate(
        &self,
        algorithm: &AlgorithmId,
        parameters: &ParameterSet,
        metric: &str,
    ) -> Result<f64, EvaluationError> {
        (self.func)(algorithm, parameters, metric)
    }
}

/// Deterministic stand-in for a real trainer.
///
/// Each numeric parameter has a hidden optimum derived from the seed; the
/// score rewards values close to it on a log-ish scale. Categorical values
/// get a fixed pseudo-random merit.
#[derive(Debug, Clone, Copy)]
pub struct HashEvaluator {
    seed: u64,
}

impl HashEvaluator {
    /// Create an evaluator for a seed.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn unit(&self, parts: &[&str]) -> f64 {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        for part in parts {
            part.hash(&mut hasher);
        }
        (hasher.finish() % 1_000_000) as f64 / 1_000_000.0
    }

    /// Score without the async wrapper.
    pub fn score(&self, algorithm: &AlgorithmId, parameters: &ParameterSet, metric: &str) -> f64 {
        if parameters.is_empty() {
            return 0.5;
        }
        let merits: f64 = parameters
            .iter()
            .map(|(name, value)| match value {
                ParamValue::Category(choice) => self.unit(&[algorithm.as_str(), metric, name, choice]),
                numeric => {
                    let x = numeric.as_f64().unwrap_or(0.0);
                    let position = if x > 0.0 { sigmoid(x.log10()) } else { sigmoid(x) };
                    let target = 0.05 + 0.9 * self.unit(&[algorithm.as_str(), metric, name]);
                    1.0 - (position - target).abs()
                }
            })
            .sum();
        0.2 + 0.75 * merits / parameters.len() as f64
    }
}

#[async_trait]
impl Evaluator for HashEvaluator {
    async fn evaluate(
        &self,
        algorithm: &AlgorithmId,
        parameters: &ParameterSet,
        metric: &str,
    ) -> Result<f64, EvaluationError> {
        Ok(self.score(algorithm, parameters, metric))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Call the evaluator and enforce the [0, 1] contract.
pub(crate) async fn checked_evaluate(
    evaluator: &dyn Evaluator,
    algorithm: &AlgorithmId,
    parameters: &ParameterSet,
    metric: &str,
) -> Result<f64, EvaluationError> {
    let score = evaluator.evaluate(algorithm, parameters, metric).await?;
    if !score.is_finite() {
        return Err(EvaluationError::NonFinite);
    }
    Ok(score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(lr: f64, opt: &str) -> ParameterSet {
        ParameterSet::from([
            ("learning_rate".to_string(), ParamValue::Float(lr)),
            ("optimizer".to_string(), ParamValue::Category(opt.to_string())),
        ])
    }

    #[tokio::test]
    async fn test_hash_evaluator_is_deterministic_and_bounded() {
        let eval = HashEvaluator::new(42);
        let id = AlgorithmId::from("net");
        let a = eval.evaluate(&id, &params(0.01, "adam"), "accuracy").await.unwrap();
        let b = eval.evaluate(&id, &params(0.01, "adam"), "accuracy").await.unwrap();
        assert_eq!(a, b);
        for lr in [1e-6, 1e-3, 0.5, 10.0, -3.0] {
            let s = eval.score(&id, &params(lr, "sgd"), "accuracy");
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[tokio::test]
    async fn test_seed_changes_landscape() {
        let id = AlgorithmId::from("net");
        let p = params(0.01, "adam");
        let a = HashEvaluator::new(1).score(&id, &p, "accuracy");
        let b = HashEvaluator::new(2).score(&id, &p, "accuracy");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_checked_evaluate_rejects_nan_and_clamps() {
        let nan = FnEvaluator::new(|_: &AlgorithmId, _: &ParameterSet, _: &str| Ok(f64::NAN));
        let big = FnEvaluator::new(|_: &AlgorithmId, _: &ParameterSet, _: &str| Ok(1.7));
        let id = AlgorithmId::from("x");
        let p = ParameterSet::new();

        assert_eq!(
            checked_evaluate(&nan, &id, &p, "accuracy").await,
            Err(EvaluationError::NonFinite)
        );
        assert_eq!(checked_evaluate(&big, &id, &p, "accuracy").await, Ok(1.0));
    }
}
