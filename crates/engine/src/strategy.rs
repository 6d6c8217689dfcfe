//! Strategy selection and cross-run statistics.

use selfopt_core::{AlgorithmRecord, AlgorithmType, ImprovementKind, OptimizationMethod, ParameterSet, SearchSpace};
use std::collections::HashMap;

/// Spaces with more parameters than this are searched with the narrowing strategy.
pub const LARGE_SPACE: usize = 10;

/// Budgets below this are spent on random search.
pub const SMALL_BUDGET: usize = 100;

/// Best parameter sets kept per algorithm type.
pub const META_CAPACITY: usize = 10;

/// Choose the search strategy for a call.
///
/// An explicit request always wins. Otherwise:
/// 1. more than [`LARGE_SPACE`] parameters: bayesian
/// 2. budget below [`SMALL_BUDGET`]: random
/// 3. evolutionary
pub fn select_strategy(
    space: &SearchSpace,
    budget: usize,
    requested: Option<OptimizationMethod>,
) -> OptimizationMethod {
    if let Some(method) = requested {
        return method;
    }
    if space.parameters.len() > LARGE_SPACE {
        OptimizationMethod::Bayesian
    } else if budget < SMALL_BUDGET {
        OptimizationMethod::Random
    } else {
        OptimizationMethod::Evolutionary
    }
}

/// Best configurations of past successful runs, per algorithm type.
///
/// Seeds the initial population of meta-learned searches.
#[derive(Debug, Clone, Default)]
pub struct MetaStatistics {
    best: HashMap<AlgorithmType, Vec<(f64, ParameterSet)>>,
}

impl MetaStatistics {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a successful configuration; keeps the top [`META_CAPACITY`] by score.
    pub fn record(&mut self, algorithm_type: AlgorithmType, score: f64, parameters: ParameterSet) {
        let entries = self.best.entry(algorithm_type).or_default();
        if entries.iter().any(|(_, p)| *p == parameters) {
            return;
        }
        entries.push((score, parameters));
        entries.sort_by(|a, b| b.0.total_cmp(&a.0));
        entries.truncate(META_CAPACITY);
    }

    /// Seed configurations for a type, best first.
    pub fn seeds(&self, algorithm_type: AlgorithmType) -> Vec<ParameterSet> {
        self.best
            .get(&algorithm_type)
            .map(|entries| entries.iter().map(|(_, p)| p.clone()).collect())
            .unwrap_or_default()
    }

    /// Remember the current configuration of every record whose parameters
    /// came from an applied hyperparameter search or evolution. Returns the
    /// number of records taken.
    pub fn absorb(&mut self, records: &[AlgorithmRecord], metric: &str) -> usize {
        let mut taken = 0;
        for record in records {
            if record.parameters.is_empty() {
                continue;
            }
            let last_tuned = record.improvement_history.iter().rev().find(|e| {
                e.applied && matches!(e.kind, ImprovementKind::Hyperparameter | ImprovementKind::Evolution)
            });
            let Some(event) = last_tuned else { continue };
            let score = record.score(metric).unwrap_or(event.score_after);
            self.record(record.algorithm_type, score, record.parameters.clone());
            taken += 1;
        }
        taken
    }

    /// Number of remembered configurations for a type.
    pub fn len(&self, algorithm_type: AlgorithmType) -> usize {
        self.best.get(&algorithm_type).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfopt_core::{ImprovementEvent, ParamValue, ParameterSpec};

    fn space_with(n: usize) -> SearchSpace {
        SearchSpace {
            parameters: (0..n)
                .map(|i| ParameterSpec::continuous(format!("p{}", i), 0.0, 1.0))
                .collect(),
            constraints: vec![],
            objectives: vec![],
        }
    }

    #[test]
    fn test_selection_rule_order() {
        assert_eq!(select_strategy(&space_with(11), 50, None), OptimizationMethod::Bayesian);
        assert_eq!(select_strategy(&space_with(10), 50, None), OptimizationMethod::Random);
        assert_eq!(select_strategy(&space_with(10), 99, None), OptimizationMethod::Random);
        assert_eq!(select_strategy(&space_with(10), 100, None), OptimizationMethod::Evolutionary);
        assert_eq!(
            select_strategy(&space_with(11), 500, Some(OptimizationMethod::Grid)),
            OptimizationMethod::Grid
        );
    }

    #[test]
    fn test_meta_statistics_bounded_and_sorted() {
        let mut meta = MetaStatistics::new();
        for i in 0..15 {
            let params = ParameterSet::from([("x".to_string(), ParamValue::Int(i))]);
            meta.record(AlgorithmType::Heuristic, i as f64 / 15.0, params);
        }
        assert_eq!(meta.len(AlgorithmType::Heuristic), META_CAPACITY);
        assert_eq!(meta.seeds(AlgorithmType::Heuristic)[0]["x"], ParamValue::Int(14));
        assert!(meta.seeds(AlgorithmType::Neural).is_empty());
    }

    #[test]
    fn test_absorb_takes_tuned_records_only() {
        let mut tuned = AlgorithmRecord::new("ga", AlgorithmType::Heuristic)
            .with_metric("accuracy", 0.82)
            .with_parameter("mutation_rate", ParamValue::Float(0.1));
        tuned.record_event(ImprovementEvent::new(ImprovementKind::Hyperparameter, "random", 0.7, 0.82).applied(true));

        let mut rejected = AlgorithmRecord::new("ga2", AlgorithmType::Heuristic)
            .with_parameter("mutation_rate", ParamValue::Float(0.4));
        rejected.record_event(ImprovementEvent::new(ImprovementKind::Evolution, "evolutionary", 0.7, 0.6));

        let mut featured = AlgorithmRecord::new("net", AlgorithmType::Neural)
            .with_parameter("dropout", ParamValue::Float(0.2));
        featured.record_event(ImprovementEvent::new(ImprovementKind::Features, "selection", 0.5, 0.6).applied(true));

        let mut meta = MetaStatistics::new();
        assert_eq!(meta.absorb(&[tuned.clone(), rejected, featured], "accuracy"), 1);
        assert_eq!(meta.seeds(AlgorithmType::Heuristic), vec![tuned.parameters]);
        assert_eq!(meta.len(AlgorithmType::Neural), 0);
    }
}
