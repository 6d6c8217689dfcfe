//! Budgeted evaluation shared by every search strategy.

use futures::future::join_all;
use selfopt_core::{AlgorithmId, ParameterSet};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{EvaluationError, OptimizationError, Result};
use crate::evaluator::{checked_evaluate, Evaluator};

/// State of one search: budget, deadline, and the best candidate so far.
pub(crate) struct SearchRun<'a> {
    algorithm: &'a AlgorithmId,
    metric: &'a str,
    evaluator: &'a dyn Evaluator,
    budget: usize,
    deadline: Option<Instant>,
    parallel: bool,
    evaluations: usize,
    failures: usize,
    best: Option<(ParameterSet, f64)>,
    trace: Vec<f64>,
}

impl<'a> SearchRun<'a> {
    pub(crate) fn new(
        algorithm: &'a AlgorithmId,
        metric: &'a str,
        evaluator: &'a dyn Evaluator,
        budget: usize,
    ) -> Self {
        Self {
            algorithm,
            metric,
            evaluator,
            budget,
            deadline: None,
            parallel: true,
            evaluations: 0,
            failures: 0,
            best: None,
            trace: Vec::new(),
        }
    }

    pub(crate) fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub(crate) fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Evaluations left in the budget.
    pub(crate) fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.evaluations)
    }

    pub(crate) fn deadline_passed(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Evaluations performed, failed ones included.
    pub(crate) fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub(crate) fn failures(&self) -> usize {
        self.failures
    }

    pub(crate) fn best(&self) -> Option<&(ParameterSet, f64)> {
        self.best.as_ref()
    }

    pub(crate) fn best_score(&self) -> Option<f64> {
        self.best.as_ref().map(|(_, s)| *s)
    }

    /// Best score after each evaluation (0 until something succeeded).
    pub(crate) fn trace(&self) -> &[f64] {
        &self.trace
    }

    /// Score a batch of candidates, truncated to the remaining budget.
    ///
    /// Failed candidates come back as `None`. If every candidate of a
    /// non-empty batch fails, the run fails with the last cause.
    pub(crate) async fn evaluate_batch(&mut self, candidates: &[ParameterSet]) -> Result<Vec<Option<f64>>> {
        let take = candidates.len().min(self.remaining());
        let batch = &candidates[..take];
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let (evaluator, algorithm, metric) = (self.evaluator, self.algorithm, self.metric);
        let outcomes: Vec<std::result::Result<f64, EvaluationError>> = if self.parallel {
            join_all(batch.iter().map(|p| checked_evaluate(evaluator, algorithm, p, metric))).await
        } else {
            let mut outcomes = Vec::with_capacity(batch.len());
            for p in batch {
                outcomes.push(checked_evaluate(evaluator, algorithm, p, metric).await);
            }
            outcomes
        };

        let mut last_error = None;
        let mut scores = Vec::with_capacity(outcomes.len());
        for (params, outcome) in batch.iter().zip(outcomes) {
            self.evaluations += 1;
            match outcome {
                Ok(score) => {
                    if self.best_score().map_or(true, |best| score > best) {
                        debug!(algorithm = %self.algorithm, score, "new best candidate");
                        self.best = Some((params.clone(), score));
                    }
                    scores.push(Some(score));
                }
                Err(err) => {
                    warn!(algorithm = %self.algorithm, error = %err, "candidate evaluation failed");
                    self.failures += 1;
                    last_error = Some(err);
                    scores.push(None);
                }
            }
            self.trace.push(self.best_score().unwrap_or(0.0));
        }

        if scores.iter().all(Option::is_none) {
            return Err(OptimizationError::OptimizationFailed {
                algorithm: self.algorithm.clone(),
                cause: last_error.unwrap_or(EvaluationError::NonFinite),
            });
        }
        Ok(scores)
    }

    /// Score a single configuration outside the budget (validation passes).
    pub(crate) async fn rescore(&self, params: &ParameterSet) -> std::result::Result<f64, EvaluationError> {
        checked_evaluate(self.evaluator, self.algorithm, params, self.metric).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::FnEvaluator;
    use selfopt_core::ParamValue;

    fn candidate(x: i64) -> ParameterSet {
        ParameterSet::from([("x".to_string(), ParamValue::Int(x))])
    }

    fn x_of(p: &ParameterSet) -> i64 {
        match p.get("x") {
            Some(ParamValue::Int(x)) => *x,
            _ => 0,
        }
    }

    #[tokio::test]
    async fn test_batch_truncated_to_budget_and_tracks_best() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, p: &ParameterSet, _: &str| Ok(x_of(p) as f64 / 10.0));
        let id = AlgorithmId::from("a");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 3);

        let batch: Vec<ParameterSet> = (1..=5).map(candidate).collect();
        let scores = run.evaluate_batch(&batch).await.unwrap();
        assert_eq!(scores.len(), 3);
        assert_eq!(run.remaining(), 0);
        assert_eq!(run.best_score(), Some(0.3));
        assert_eq!(run.trace(), &[0.1, 0.2, 0.3]);
        assert!(run.evaluate_batch(&batch).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_skipped_unless_whole_batch_fails() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, p: &ParameterSet, _: &str| {
            if x_of(p) % 2 == 0 {
                Err(EvaluationError::Failed("boom".into()))
            } else {
                Ok(0.5)
            }
        });
        let id = AlgorithmId::from("a");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 100).with_parallel(false);

        let scores = run.evaluate_batch(&[candidate(1), candidate(2)]).await.unwrap();
        assert_eq!(scores, vec![Some(0.5), None]);
        assert_eq!(run.failures(), 1);

        let err = run.evaluate_batch(&[candidate(2), candidate(4)]).await.unwrap_err();
        assert!(matches!(err, OptimizationError::OptimizationFailed { .. }));
        assert_eq!(run.evaluations(), 4);
    }
}
