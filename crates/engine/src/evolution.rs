//! Algorithm-level evolutionary driver.
//!
//! A run searches whole configurations of one algorithm over several
//! generations and records every evaluated individual as an
//! [`EvolutionRecord`]. The best individual is kept as a pending candidate;
//! committing it is a separate step.

use chrono::Utc;
use rand::rngs::StdRng;
use selfopt_core::{
    AlgorithmId, AlgorithmRecord, Crossover, EvolutionId, EvolutionRecord, Mutation, ParameterSet, SearchSpace,
    Termination, VersionId,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::{EngineConfig, EvolutionConfig};
use crate::error::{ErrorReport, Result};
use crate::evaluator::Evaluator;
use crate::genetic::{self, Individual, Origin};
use crate::runner::SearchRun;

/// Best individual of a run, awaiting an explicit apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionCandidate {
    /// Version of the individual in the lineage
    pub version: VersionId,
    /// Its configuration
    pub parameters: ParameterSet,
    /// Its fitness
    pub fitness: f64,
    /// Generation it was born in
    pub generation: usize,
}

/// Outcome of one evolutionary run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionRun {
    /// Evolved algorithm
    pub algorithm_id: AlgorithmId,
    /// Lineage appended by this run, in generation order
    pub records: Vec<EvolutionRecord>,
    /// Best individual across all generations
    pub best: Option<EvolutionCandidate>,
    /// Score recorded before the run
    pub prior_score: f64,
    /// Generations evaluated
    pub generations: usize,
    /// Why the run stopped
    pub termination: Termination,
    /// Evaluations performed
    pub evaluations: usize,
    /// Evaluations that failed
    pub failed_evaluations: usize,
    /// Wall-clock time spent
    pub elapsed: Duration,
}

impl EvolutionRun {
    /// Whether the best candidate beats the recorded score.
    pub fn is_improvement(&self) -> bool {
        self.best.as_ref().map_or(false, |b| b.fitness > self.prior_score)
    }
}

/// Result of committing a pending candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionApplication {
    /// Algorithm
    pub algorithm_id: AlgorithmId,
    /// Candidate that was considered
    pub candidate: EvolutionCandidate,
    /// Score before
    pub prior_score: f64,
    /// Relative improvement of the candidate
    pub improvement: f64,
    /// Whether the registry now holds the candidate
    pub applied: bool,
}

/// Outcome of evolving several algorithms at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchEvolution {
    /// Successful runs
    pub runs: Vec<EvolutionRun>,
    /// Failed ids with the reason
    pub failures: Vec<(AlgorithmId, ErrorReport)>,
}

/// Turn evaluated individuals into immutable lineage records.
pub(crate) fn lineage_records(algorithm: &AlgorithmId, individuals: &[Individual]) -> Vec<EvolutionRecord> {
    let now = Utc::now();
    individuals
        .iter()
        .map(|ind| {
            let impact = ind.parent_fitness.map_or(0.0, |p| ind.fitness - p);
            let parent_version = ind.parents.first().copied().unwrap_or(ind.version);
            let crossovers = if ind.parents.len() > 1 {
                vec![Crossover {
                    parents: ind.parents.clone(),
                    inherited_traits: ind.inherited.clone(),
                }]
            } else {
                Vec::new()
            };
            EvolutionRecord {
                evolution_id: EvolutionId::new(),
                algorithm_id: algorithm.clone(),
                parent_version,
                evolved_version: ind.version,
                mutations: ind
                    .changes
                    .iter()
                    .map(|(target, change)| Mutation {
                        target: target.clone(),
                        change: change.clone(),
                        measured_impact: impact,
                    })
                    .collect(),
                crossovers,
                fitness: ind.fitness,
                generation: ind.generation,
                created_at: now,
            }
        })
        .collect()
}

/// Run the generational loop for one algorithm.
///
/// The budget is `population_size * generations` evaluations; the current
/// configuration is seeded into the first generation so it competes. Zero
/// generations yields an empty, completed run.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn evolve_algorithm(
    record: &AlgorithmRecord,
    space: &SearchSpace,
    evaluator: &dyn Evaluator,
    config: &EngineConfig,
    population_size: usize,
    generations: usize,
    metric: &str,
    rng: &mut StdRng,
) -> Result<EvolutionRun> {
    let started = Instant::now();
    let settings = EvolutionConfig {
        population_size: population_size.max(2),
        generations,
        ..config.evolution.clone()
    };
    let prior_score = record.score(metric).unwrap_or(0.0);
    let deadline = config.deadline().map(|d| started + d);

    let mut run = SearchRun::new(
        &record.id,
        metric,
        evaluator,
        settings.population_size * settings.generations,
    )
    .with_deadline(deadline)
    .with_parallel(config.parallel_optimization);

    let origin = Origin {
        version: record.version,
        parameters: record.parameters.clone(),
        fitness: record.score(metric),
    };
    let seeds = if record.parameters.is_empty() {
        Vec::new()
    } else {
        vec![record.parameters.clone()]
    };
    let outcome = genetic::evolve(&mut run, space, &settings, &origin, seeds, rng).await?;

    let best = outcome
        .individuals
        .iter()
        .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
        .map(|ind| EvolutionCandidate {
            version: ind.version,
            parameters: ind.parameters.clone(),
            fitness: ind.fitness,
            generation: ind.generation,
        });

    Ok(EvolutionRun {
        algorithm_id: record.id.clone(),
        records: lineage_records(&record.id, &outcome.individuals),
        best,
        prior_score,
        generations: outcome.generations,
        termination: outcome.termination,
        evaluations: run.evaluations(),
        failed_evaluations: run.failures(),
        elapsed: started.elapsed(),
    })
}
