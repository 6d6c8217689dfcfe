//! Evolution lineage - append-only records of evolved configurations.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::id::{AlgorithmId, EvolutionId, VersionId};
use crate::Time;

/// A single parameter change applied to an offspring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Mutated parameter
    pub target: String,
    /// Human-readable change, e.g. `0.1 -> 0.12`
    pub change: String,
    /// Fitness delta relative to the parent, once measured
    pub measured_impact: f64,
}

/// Recombination of several parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crossover {
    /// Parent versions
    pub parents: Vec<VersionId>,
    /// Parameters inherited from the second parent
    pub inherited_traits: Vec<String>,
}

/// One evolved individual. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionRecord {
    /// Unique identifier
    pub evolution_id: EvolutionId,
    /// Evolved algorithm
    pub algorithm_id: AlgorithmId,
    /// Primary parent
    pub parent_version: VersionId,
    /// Version of this individual
    pub evolved_version: VersionId,
    /// Mutations applied
    pub mutations: Vec<Mutation>,
    /// Crossovers applied
    pub crossovers: Vec<Crossover>,
    /// Measured fitness
    pub fitness: f64,
    /// Generation, starting at 1
    pub generation: usize,
    /// When the record was created
    pub created_at: Time,
}

impl EvolutionRecord {
    /// All distinct parents of this individual.
    pub fn parents(&self) -> Vec<VersionId> {
        let mut parents = vec![self.parent_version];
        for crossover in &self.crossovers {
            for p in &crossover.parents {
                if !parents.contains(p) {
                    parents.push(*p);
                }
            }
        }
        parents
    }
}

/// Arena of evolution records indexed by evolved version.
///
/// Crossovers give individuals several parents, so the lineage is a DAG.
#[derive(Debug, Clone, Default)]
pub struct Lineage {
    records: Vec<EvolutionRecord>,
    by_version: HashMap<VersionId, usize>,
}

impl Lineage {
    /// Create an empty lineage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a lineage from records in creation order.
    pub fn from_records(records: impl IntoIterator<Item = EvolutionRecord>) -> Self {
        let mut lineage = Self::new();
        for record in records {
            lineage.push(record);
        }
        lineage
    }

    /// Append a record. Returns false if its version is already present.
    pub fn push(&mut self, record: EvolutionRecord) -> bool {
        if self.by_version.contains_key(&record.evolved_version) {
            return false;
        }
        self.by_version.insert(record.evolved_version, self.records.len());
        self.records.push(record);
        true
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the lineage is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[EvolutionRecord] {
        &self.records
    }

    /// Record for a version.
    pub fn get(&self, version: VersionId) -> Option<&EvolutionRecord> {
        self.by_version.get(&version).map(|&i| &self.records[i])
    }

    /// Highest-fitness record.
    pub fn best(&self) -> Option<&EvolutionRecord> {
        self.records
            .iter()
            .max_by(|a, b| a.fitness.partial_cmp(&b.fitness).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Last generation recorded.
    pub fn generations(&self) -> usize {
        self.records.iter().map(|r| r.generation).max().unwrap_or(0)
    }

    /// Every ancestor version reachable from `version`, nearest first.
    ///
    /// Versions outside the arena (e.g. the registry's starting version) are
    /// included but not expanded.
    pub fn ancestors(&self, version: VersionId) -> Vec<VersionId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();

        if let Some(record) = self.get(version) {
            queue.extend(record.parents());
        }
        while let Some(v) = queue.pop_front() {
            if v == version || !seen.insert(v) {
                continue;
            }
            order.push(v);
            if let Some(record) = self.get(v) {
                queue.extend(record.parents());
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(parent: VersionId, version: VersionId, other: Option<VersionId>, fitness: f64, generation: usize) -> EvolutionRecord {
        EvolutionRecord {
            evolution_id: EvolutionId::new(),
            algorithm_id: AlgorithmId::from("ga"),
            parent_version: parent,
            evolved_version: version,
            mutations: vec![],
            crossovers: other
                .map(|o| vec![Crossover { parents: vec![parent, o], inherited_traits: vec!["x".into()] }])
                .unwrap_or_default(),
            fitness,
            generation,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_ancestors_follow_both_parents() {
        let root = VersionId::new();
        let (a, b, c) = (VersionId::new(), VersionId::new(), VersionId::new());

        let lineage = Lineage::from_records([
            record(root, a, None, 0.5, 1),
            record(root, b, None, 0.6, 1),
            record(a, c, Some(b), 0.7, 2),
        ]);

        let ancestors = lineage.ancestors(c);
        assert_eq!(ancestors.len(), 3);
        assert!(ancestors.contains(&a));
        assert!(ancestors.contains(&b));
        assert!(ancestors.contains(&root));
        assert_eq!(lineage.best().map(|r| r.evolved_version), Some(c));
        assert_eq!(lineage.generations(), 2);
    }

    #[test]
    fn test_push_rejects_duplicate_versions() {
        let root = VersionId::new();
        let a = VersionId::new();
        let mut lineage = Lineage::new();
        assert!(lineage.push(record(root, a, None, 0.5, 1)));
        assert!(!lineage.push(record(root, a, None, 0.9, 1)));
        assert_eq!(lineage.len(), 1);
    }
}
