//! Hyperparameter search strategies.

use rand::rngs::StdRng;
use selfopt_core::{improvement, OptimizationMethod, ParameterSet, SearchSpace, Termination};
use tracing::debug;

use crate::config::{BayesianConfig, EngineConfig};
use crate::error::Result;
use crate::genetic::{self, Origin};
use crate::runner::SearchRun;
use crate::search_space::{narrow, sample, GridIter};

/// Points per numeric axis of the grid.
pub const GRID_LEVELS: usize = 3;

/// Candidates per narrowing round.
const ROUND_SIZE: usize = 5;

/// Narrowest sampling window, in unit space.
const MIN_WIDTH: f64 = 0.02;

/// Run `method` until it finishes, converges, or the budget or deadline runs out.
///
/// `seeds` only matter for the meta-learned strategy.
pub(crate) async fn run_strategy(
    run: &mut SearchRun<'_>,
    space: &SearchSpace,
    method: OptimizationMethod,
    config: &EngineConfig,
    origin: &Origin,
    seeds: Vec<ParameterSet>,
    rng: &mut StdRng,
) -> Result<Termination> {
    let batch = config.evolution.population_size.max(1);
    let termination = match method {
        OptimizationMethod::Random => random_search(run, space, batch, rng).await?,
        OptimizationMethod::Grid => grid_search(run, space, batch).await?,
        OptimizationMethod::Bayesian => bayesian_search(run, space, &config.bayesian, rng).await?,
        OptimizationMethod::Evolutionary => {
            genetic::evolve(run, space, &config.evolution, origin, Vec::new(), rng)
                .await?
                .termination
        }
        OptimizationMethod::MetaLearned => {
            genetic::evolve(run, space, &config.evolution, origin, seeds, rng)
                .await?
                .termination
        }
    };
    debug!(%method, ?termination, evaluations = run.evaluations(), "strategy finished");
    Ok(termination)
}

/// Uniform sampling until the budget is spent.
pub(crate) async fn random_search(
    run: &mut SearchRun<'_>,
    space: &SearchSpace,
    batch_size: usize,
    rng: &mut StdRng,
) -> Result<Termination> {
    while run.remaining() > 0 {
        if run.deadline_passed() {
            return Ok(Termination::DeadlineReached);
        }
        let batch: Vec<ParameterSet> = (0..batch_size.min(run.remaining()))
            .map(|_| sample(space, rng))
            .collect();
        run.evaluate_batch(&batch).await?;
    }
    Ok(Termination::Completed)
}

/// Walk the grid in importance order; the budget caps the points evaluated.
pub(crate) async fn grid_search(run: &mut SearchRun<'_>, space: &SearchSpace, batch_size: usize) -> Result<Termination> {
    let mut grid = GridIter::new(space, GRID_LEVELS).peekable();
    while grid.peek().is_some() {
        if run.deadline_passed() {
            return Ok(Termination::DeadlineReached);
        }
        if run.remaining() == 0 {
            return Ok(Termination::BudgetExhausted);
        }
        let batch: Vec<ParameterSet> = grid.by_ref().take(batch_size.min(run.remaining())).collect();
        run.evaluate_batch(&batch).await?;
    }
    Ok(Termination::Completed)
}

/// Successive narrowing around the incumbent.
///
/// After `initial_samples` uniform draws, each round samples around the best
/// configuration within a window that shrinks geometrically. Stops once the
/// best score improved by less than `min_relative_improvement` over the last
/// `window` evaluations.
pub(crate) async fn bayesian_search(
    run: &mut SearchRun<'_>,
    space: &SearchSpace,
    config: &BayesianConfig,
    rng: &mut StdRng,
) -> Result<Termination> {
    let initial: Vec<ParameterSet> = (0..config.initial_samples.max(1).min(run.remaining()))
        .map(|_| sample(space, rng))
        .collect();
    run.evaluate_batch(&initial).await?;
    narrowing_rounds(run, space, config, config.initial_samples + config.window, rng).await
}

/// Local refinement starting from a known configuration.
pub(crate) async fn local_search(
    run: &mut SearchRun<'_>,
    space: &SearchSpace,
    start: ParameterSet,
    config: &BayesianConfig,
    rng: &mut StdRng,
) -> Result<Termination> {
    run.evaluate_batch(&[start]).await?;
    narrowing_rounds(run, space, config, 1 + config.window, rng).await
}

async fn narrowing_rounds(
    run: &mut SearchRun<'_>,
    space: &SearchSpace,
    config: &BayesianConfig,
    warmup: usize,
    rng: &mut StdRng,
) -> Result<Termination> {
    let mut width: f64 = 0.5;
    while run.remaining() > 0 {
        if run.deadline_passed() {
            return Ok(Termination::DeadlineReached);
        }
        let center = match run.best() {
            Some((params, _)) => params.clone(),
            None => sample(space, rng),
        };
        let batch: Vec<ParameterSet> = (0..ROUND_SIZE.min(run.remaining()))
            .map(|_| narrow(space, &center, width, rng))
            .collect();
        run.evaluate_batch(&batch).await?;
        width = (width * config.shrink).max(MIN_WIDTH);

        let trace = run.trace();
        if trace.len() >= warmup && trace.len() > config.window {
            let before = trace[trace.len() - 1 - config.window];
            let now = trace[trace.len() - 1];
            if improvement(before, now) < config.min_relative_improvement {
                return Ok(Termination::Converged);
            }
        }
    }
    Ok(Termination::BudgetExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EvaluationError, OptimizationError};
    use crate::evaluator::FnEvaluator;
    use rand::SeedableRng;
    use selfopt_core::{AlgorithmId, ParamValue, ParameterSpec, VersionId};

    fn space() -> SearchSpace {
        SearchSpace {
            parameters: vec![
                ParameterSpec::continuous("x", 0.0, 1.0).with_importance(0.9),
                ParameterSpec::discrete("n", 1, 4).with_importance(0.5),
                ParameterSpec::categorical("mode", ["a", "b"]).with_importance(0.2),
            ],
            constraints: vec![],
            objectives: vec![],
        }
    }

    fn x(p: &ParameterSet) -> f64 {
        p.get("x").and_then(ParamValue::as_f64).unwrap_or(0.0)
    }

    fn origin() -> Origin {
        Origin {
            version: VersionId::new(),
            parameters: ParameterSet::new(),
            fitness: None,
        }
    }

    #[tokio::test]
    async fn test_random_search_spends_exact_budget() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, p: &ParameterSet, _: &str| Ok(x(p)));
        let id = AlgorithmId::from("a");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 50);
        let mut rng = StdRng::seed_from_u64(11);

        let termination = random_search(&mut run, &space(), 20, &mut rng).await.unwrap();
        assert_eq!(termination, Termination::Completed);
        assert_eq!(run.evaluations(), 50);
        assert!(run.best_score().unwrap() > 0.8);
    }

    #[tokio::test]
    async fn test_grid_search_capped_by_budget() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, p: &ParameterSet, _: &str| Ok(x(p)));
        let id = AlgorithmId::from("a");

        // 3 x-levels * 3 n-levels (1, 3, 4) * 2 modes
        let mut run = SearchRun::new(&id, "accuracy", &eval, 100);
        assert_eq!(grid_search(&mut run, &space(), 7).await.unwrap(), Termination::Completed);
        assert_eq!(run.evaluations(), 18);
        assert_eq!(run.best_score(), Some(1.0));

        let mut run = SearchRun::new(&id, "accuracy", &eval, 10);
        assert_eq!(grid_search(&mut run, &space(), 7).await.unwrap(), Termination::BudgetExhausted);
        assert_eq!(run.evaluations(), 10);
    }

    #[tokio::test]
    async fn test_bayesian_stops_on_plateau() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, _: &ParameterSet, _: &str| Ok(0.6));
        let id = AlgorithmId::from("a");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 200);
        let mut rng = StdRng::seed_from_u64(2);

        let termination = bayesian_search(&mut run, &space(), &BayesianConfig::default(), &mut rng)
            .await
            .unwrap();
        assert_eq!(termination, Termination::Converged);
        assert!(run.evaluations() < 200);
    }

    #[tokio::test]
    async fn test_bayesian_moves_toward_optimum() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, p: &ParameterSet, _: &str| Ok(1.0 - (x(p) - 0.8).abs()));
        let id = AlgorithmId::from("a");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 200);
        let mut rng = StdRng::seed_from_u64(4);

        bayesian_search(&mut run, &space(), &BayesianConfig::default(), &mut rng)
            .await
            .unwrap();
        assert!(run.best_score().unwrap() > 0.85);
        assert!(run.evaluations() <= 200);
    }

    #[tokio::test]
    async fn test_strategy_fails_when_everything_fails() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, _: &ParameterSet, _: &str| {
            Err(EvaluationError::Failed("no trainer".into()))
        });
        let id = AlgorithmId::from("a");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 50);
        let mut rng = StdRng::seed_from_u64(1);

        let err = run_strategy(
            &mut run,
            &space(),
            OptimizationMethod::Evolutionary,
            &EngineConfig::default(),
            &origin(),
            Vec::new(),
            &mut rng,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OptimizationError::OptimizationFailed { .. }));
    }
}
