//! Generational population search.
//!
//! Tournament selection with elitism, uniform crossover and per-parameter
//! mutation. Used both for evolutionary hyperparameter search and for the
//! algorithm-level evolutionary driver, which additionally keeps the lineage.

use rand::rngs::StdRng;
use rand::Rng;
use selfopt_core::{ParameterSet, SearchSpace, Termination, VersionId};
use tracing::debug;

use crate::config::EvolutionConfig;
use crate::error::Result;
use crate::runner::SearchRun;
use crate::search_space::{enforce_constraints, perturb, sample, sample_param};

/// Improvements smaller than this do not reset the patience counter.
const MIN_PROGRESS: f64 = 1e-12;

/// Configuration the population descends from.
#[derive(Debug, Clone)]
pub(crate) struct Origin {
    pub version: VersionId,
    pub parameters: ParameterSet,
    pub fitness: Option<f64>,
}

/// An evaluated member of some generation.
#[derive(Debug, Clone)]
pub(crate) struct Individual {
    pub version: VersionId,
    pub parameters: ParameterSet,
    pub fitness: f64,
    pub generation: usize,
    pub parents: Vec<VersionId>,
    pub parent_fitness: Option<f64>,
    /// (parameter, "old -> new") for each mutated parameter
    pub changes: Vec<(String, String)>,
    /// Parameters taken from the second parent
    pub inherited: Vec<String>,
}

struct Offspring {
    parameters: ParameterSet,
    parents: Vec<VersionId>,
    parent_fitness: Option<f64>,
    changes: Vec<(String, String)>,
    inherited: Vec<String>,
}

impl Offspring {
    fn evaluated(self, fitness: f64, generation: usize) -> Individual {
        Individual {
            version: VersionId::new(),
            parameters: self.parameters,
            fitness,
            generation,
            parents: self.parents,
            parent_fitness: self.parent_fitness,
            changes: self.changes,
            inherited: self.inherited,
        }
    }
}

/// Result of a population search.
pub(crate) struct GeneticOutcome {
    pub termination: Termination,
    pub generations: usize,
    /// Every successfully evaluated individual, in generation order
    pub individuals: Vec<Individual>,
}

/// Run up to `config.generations` generations of `config.population_size`.
///
/// `seeds` take the first slots of the initial population; the rest is sampled.
pub(crate) async fn evolve(
    run: &mut SearchRun<'_>,
    space: &SearchSpace,
    config: &EvolutionConfig,
    origin: &Origin,
    seeds: Vec<ParameterSet>,
    rng: &mut StdRng,
) -> Result<GeneticOutcome> {
    let population_size = config.population_size.max(2);
    let mut offspring = initial_population(space, origin, seeds, population_size, rng);
    let mut population: Vec<Individual> = Vec::new();
    let mut individuals = Vec::new();
    let mut global_best = f64::NEG_INFINITY;
    let mut stale = 0;
    let mut generations = 0;

    for generation in 1..=config.generations {
        if run.deadline_passed() {
            return Ok(outcome(Termination::DeadlineReached, generations, individuals));
        }
        if run.remaining() == 0 {
            return Ok(outcome(Termination::BudgetExhausted, generations, individuals));
        }

        let batch: Vec<ParameterSet> = offspring.iter().map(|o| o.parameters.clone()).collect();
        let scores = run.evaluate_batch(&batch).await?;
        generations = generation;

        // Failed candidates are dropped here and never selected.
        let fresh: Vec<Individual> = offspring
            .into_iter()
            .zip(scores)
            .filter_map(|(o, score)| score.map(|f| o.evaluated(f, generation)))
            .collect();

        let elites = config.elitism.min(population.len());
        population.truncate(elites);
        population.extend(fresh.iter().cloned());
        population.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));

        let generation_best = fresh.iter().map(|i| i.fitness).fold(f64::NEG_INFINITY, f64::max);
        if generation_best > global_best + MIN_PROGRESS {
            global_best = generation_best;
            stale = 0;
        } else {
            stale += 1;
        }
        let spread = variance(fresh.iter().map(|i| i.fitness));
        debug!(generation, best = global_best, spread, survivors = fresh.len(), "generation evaluated");
        individuals.extend(fresh);

        if spread.map_or(false, |v| v < config.convergence_epsilon) || stale >= config.patience.max(1) {
            return Ok(outcome(Termination::Converged, generations, individuals));
        }
        if generation == config.generations || population.is_empty() {
            break;
        }

        let elites = config.elitism.min(population.len());
        offspring = (0..population_size.saturating_sub(elites))
            .map(|_| breed(&population, space, config, rng))
            .collect();
    }

    Ok(outcome(Termination::Completed, generations, individuals))
}

fn outcome(termination: Termination, generations: usize, individuals: Vec<Individual>) -> GeneticOutcome {
    GeneticOutcome {
        termination,
        generations,
        individuals,
    }
}

fn initial_population(
    space: &SearchSpace,
    origin: &Origin,
    seeds: Vec<ParameterSet>,
    size: usize,
    rng: &mut StdRng,
) -> Vec<Offspring> {
    let mut members: Vec<ParameterSet> = seeds
        .into_iter()
        .take(size)
        .map(|seed| fit_to_space(space, &seed, rng))
        .collect();
    while members.len() < size {
        members.push(sample(space, rng));
    }

    members
        .into_iter()
        .map(|parameters| Offspring {
            changes: describe_changes(&origin.parameters, &parameters),
            parameters,
            parents: vec![origin.version],
            parent_fitness: origin.fitness,
            inherited: Vec::new(),
        })
        .collect()
}

/// Keep the admissible values of `seed` and sample the rest.
pub(crate) fn fit_to_space(space: &SearchSpace, seed: &ParameterSet, rng: &mut StdRng) -> ParameterSet {
    let mut params: ParameterSet = space
        .parameters
        .iter()
        .map(|spec| {
            let value = match seed.get(&spec.name) {
                Some(v) if spec.contains(v) => v.clone(),
                _ => sample_param(spec, rng),
            };
            (spec.name.clone(), value)
        })
        .collect();
    enforce_constraints(space, &mut params);
    params
}

fn tournament<'p>(population: &'p [Individual], size: usize, rng: &mut StdRng) -> &'p Individual {
    let mut best = &population[rng.gen_range(0..population.len())];
    for _ in 1..size.max(1) {
        let contender = &population[rng.gen_range(0..population.len())];
        if contender.fitness > best.fitness {
            best = contender;
        }
    }
    best
}

fn breed(population: &[Individual], space: &SearchSpace, config: &EvolutionConfig, rng: &mut StdRng) -> Offspring {
    let first = tournament(population, config.tournament_size, rng);
    let second = tournament(population, config.tournament_size, rng);

    let mut parameters = first.parameters.clone();
    let mut inherited = Vec::new();
    let parents = if first.version == second.version {
        vec![first.version]
    } else {
        for (name, value) in &second.parameters {
            if parameters.get(name) != Some(value) && rng.gen_range(0.0..1.0) < config.crossover_rate {
                parameters.insert(name.clone(), value.clone());
                inherited.push(name.clone());
            }
        }
        vec![first.version, second.version]
    };

    let (mutated, _) = perturb(space, &parameters, config.mutation_rate, rng);
    Offspring {
        changes: describe_changes(&parameters, &mutated),
        parameters: mutated,
        parents,
        parent_fitness: Some(first.fitness.max(second.fitness)),
        inherited,
    }
}

fn describe_changes(before: &ParameterSet, after: &ParameterSet) -> Vec<(String, String)> {
    after
        .iter()
        .filter(|(name, value)| before.get(*name) != Some(*value))
        .map(|(name, value)| {
            let old = before.get(name).map_or_else(|| "unset".to_string(), |v| v.to_string());
            (name.clone(), format!("{} -> {}", old, value))
        })
        .collect()
}

/// Population variance; `None` for fewer than two samples.
fn variance(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::evaluator::FnEvaluator;
    use rand::SeedableRng;
    use selfopt_core::{AlgorithmId, ParamValue, ParameterSpec};

    fn space() -> SearchSpace {
        SearchSpace {
            parameters: vec![
                ParameterSpec::continuous("x", 0.0, 1.0).with_importance(1.0),
                ParameterSpec::continuous("y", 0.0, 1.0).with_importance(1.0),
            ],
            constraints: vec![],
            objectives: vec![],
        }
    }

    fn origin() -> Origin {
        Origin {
            version: VersionId::new(),
            parameters: ParameterSet::new(),
            fitness: None,
        }
    }

    fn x(p: &ParameterSet) -> f64 {
        p.get("x").and_then(ParamValue::as_f64).unwrap_or(0.0)
    }

    #[tokio::test]
    async fn test_constant_fitness_converges_after_first_generation() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, _: &ParameterSet, _: &str| Ok(0.5));
        let id = AlgorithmId::from("flat");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 1000);
        let mut rng = StdRng::seed_from_u64(1);

        let out = evolve(&mut run, &space(), &EvolutionConfig::default(), &origin(), vec![], &mut rng)
            .await
            .unwrap();
        assert_eq!(out.termination, Termination::Converged);
        assert!(out.generations <= 2);
        assert!(out.individuals.len() <= 40);
    }

    #[tokio::test]
    async fn test_runs_at_most_configured_generations() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, p: &ParameterSet, _: &str| Ok(x(p)));
        let id = AlgorithmId::from("a");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 10_000);
        let mut rng = StdRng::seed_from_u64(3);
        let config = EvolutionConfig {
            patience: 100,
            ..EvolutionConfig::default()
        };

        let out = evolve(&mut run, &space(), &config, &origin(), vec![], &mut rng).await.unwrap();
        assert!(out.generations <= config.generations);
        assert!(run.evaluations() <= config.generations * config.population_size);
        // elitism keeps the best alive, so the global best never regresses
        let best = out.individuals.iter().map(|i| i.fitness).fold(0.0, f64::max);
        assert_eq!(run.best_score(), Some(best));
        assert!(out.individuals.iter().all(|i| (0.0..=1.0).contains(&x(&i.parameters))));
    }

    #[tokio::test]
    async fn test_failed_individuals_excluded() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, p: &ParameterSet, _: &str| {
            if x(p) < 0.15 {
                Err(EvaluationError::Failed("diverged".into()))
            } else {
                Ok(x(p))
            }
        });
        let id = AlgorithmId::from("a");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 10_000);
        let mut rng = StdRng::seed_from_u64(9);

        let out = evolve(&mut run, &space(), &EvolutionConfig::default(), &origin(), vec![], &mut rng)
            .await
            .unwrap();
        assert_eq!(out.individuals.len() + run.failures(), run.evaluations());
        assert!(out.individuals.iter().all(|i| x(&i.parameters) >= 0.15));
    }

    #[tokio::test]
    async fn test_seeds_fill_first_slots() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, _: &ParameterSet, _: &str| Ok(0.5));
        let id = AlgorithmId::from("a");
        let mut run = SearchRun::new(&id, "accuracy", &eval, 1000);
        let mut rng = StdRng::seed_from_u64(5);
        let seed = ParameterSet::from([
            ("x".to_string(), ParamValue::Float(0.25)),
            ("y".to_string(), ParamValue::Float(0.75)),
        ]);

        let out = evolve(&mut run, &space(), &EvolutionConfig::default(), &origin(), vec![seed.clone()], &mut rng)
            .await
            .unwrap();
        assert_eq!(out.individuals[0].parameters, seed);
        assert_eq!(out.individuals[0].generation, 1);
    }

    #[test]
    fn test_variance() {
        assert_eq!(variance([1.0].into_iter()), None);
        assert_eq!(variance([2.0, 2.0, 2.0].into_iter()), Some(0.0));
        assert_eq!(variance([1.0, 3.0].into_iter()), Some(1.0));
    }
}
