//! Cross-algorithm transfer analysis.

use selfopt_core::{AlgorithmId, AlgorithmRecord, AlgorithmType, TransferInsight, EPSILON};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::ErrorReport;

/// Capability name for copying a whole architecture.
pub const ARCHITECTURE_CAPABILITY: &str = "architecture";

/// Capability name for copying a learning-rate schedule.
pub const SCHEDULE_CAPABILITY: &str = "learning_rate_schedule";

/// How readily knowledge moves between two algorithm families, in [0, 1].
pub fn type_affinity(a: AlgorithmType, b: AlgorithmType) -> f64 {
    use AlgorithmType::*;
    match (a, b) {
        _ if a == b => 1.0,
        (Neural, Ensemble) | (Ensemble, Neural) => 0.6,
        (Statistical, Ensemble) | (Ensemble, Statistical) => 0.6,
        (Heuristic, Statistical) | (Statistical, Heuristic) => 0.4,
        _ => 0.3,
    }
}

/// Jaccard similarity of the parameter names of two records.
pub fn parameter_overlap(a: &AlgorithmRecord, b: &AlgorithmRecord) -> f64 {
    let left: BTreeSet<&String> = a.parameters.keys().collect();
    let right: BTreeSet<&String> = b.parameters.keys().collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// `1 - mean |a - b|` over the metrics both records carry; 0 if none.
pub fn metric_similarity(a: &AlgorithmRecord, b: &AlgorithmRecord) -> f64 {
    let gaps: Vec<f64> = a
        .performance_metrics
        .iter()
        .filter_map(|(name, va)| b.performance_metrics.get(name).map(|vb| (va - vb).abs().min(1.0)))
        .collect();
    if gaps.is_empty() {
        return 0.0;
    }
    1.0 - gaps.iter().sum::<f64>() / gaps.len() as f64
}

/// Insight for one unordered pair.
///
/// The record scoring higher on `metric` is the source (ties: smaller id).
/// Potential is `0.4 * type affinity + 0.3 * parameter overlap + 0.3 *
/// metric similarity`.
pub fn analyze_pair(a: &AlgorithmRecord, b: &AlgorithmRecord, metric: &str) -> TransferInsight {
    let score = |r: &AlgorithmRecord| r.score(metric).unwrap_or(0.0);
    let a_first = score(a) > score(b) || (score(a) == score(b) && a.id <= b.id);
    let (source, target) = if a_first { (a, b) } else { (b, a) };

    let affinity = type_affinity(source.algorithm_type, target.algorithm_type);
    let potential = (0.4 * affinity + 0.3 * parameter_overlap(source, target) + 0.3 * metric_similarity(source, target))
        .clamp(0.0, 1.0);

    let mut shared_patterns = Vec::new();
    if source.algorithm_type == target.algorithm_type {
        shared_patterns.push(format!("type:{}", source.algorithm_type));
    }
    let mut capabilities = Vec::new();
    for (name, value) in &source.parameters {
        if let Some(other) = target.parameters.get(name) {
            shared_patterns.push(format!("param:{}", name));
            if other != value {
                capabilities.push(name.clone());
            }
        }
    }
    for name in source.performance_metrics.keys() {
        if target.performance_metrics.contains_key(name) {
            shared_patterns.push(format!("metric:{}", name));
        }
    }
    if source.algorithm_type == AlgorithmType::Neural
        && target.algorithm_type == AlgorithmType::Neural
        && source.architecture.is_some()
        && source.architecture != target.architecture
    {
        capabilities.push(ARCHITECTURE_CAPABILITY.to_string());
    }
    if source.learning_rate_schedule.is_some() && source.learning_rate_schedule != target.learning_rate_schedule {
        capabilities.push(SCHEDULE_CAPABILITY.to_string());
    }

    let gap = ((score(source) - score(target)) / score(target).max(EPSILON)).max(0.0);
    TransferInsight {
        source_algorithm: source.id.clone(),
        target_algorithm: target.id.clone(),
        transfer_potential: potential,
        shared_patterns,
        expected_improvement: (potential * gap).clamp(0.0, 1.0),
        implementation_complexity: (capabilities.len() as f64 / 10.0 + (1.0 - affinity) * 0.5).clamp(0.0, 1.0),
        transferable_capabilities: capabilities,
    }
}

/// Insights above `threshold` for every unordered pair, strongest first.
pub fn analyze_all(records: &[AlgorithmRecord], metric: &str, threshold: f64) -> Vec<TransferInsight> {
    let mut insights = Vec::new();
    for (i, a) in records.iter().enumerate() {
        for b in &records[i + 1..] {
            let insight = analyze_pair(a, b, metric);
            if insight.transfer_potential > threshold {
                insights.push(insight);
            }
        }
    }
    insights.sort_by(|x, y| y.transfer_potential.total_cmp(&x.transfer_potential));
    insights
}

/// Result of a transfer analysis pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferReport {
    /// Insights above the surfacing threshold
    pub insights: Vec<TransferInsight>,
    /// Insights above the synergy threshold
    pub synergies: Vec<TransferInsight>,
    /// Ids that could not be loaded
    pub failures: Vec<(AlgorithmId, ErrorReport)>,
}

/// Result of applying one insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferApplication {
    /// The insight
    pub insight_key: String,
    /// Receiving algorithm
    pub target_algorithm: AlgorithmId,
    /// Score before
    pub score_before: f64,
    /// Score of the transferred configuration (equals `score_before` when skipped)
    pub score_after: f64,
    /// Relative improvement recorded for this application
    pub improvement: f64,
    /// Whether the target's configuration changed
    pub applied: bool,
    /// The insight had been applied before; nothing was done
    pub already_applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfopt_core::ParamValue;

    fn ga(id: &str, score: f64, rate: f64) -> AlgorithmRecord {
        AlgorithmRecord::new(id, AlgorithmType::Heuristic)
            .with_metric("accuracy", score)
            .with_parameter("mutation_rate", ParamValue::Float(rate))
            .with_parameter("population_size", ParamValue::Int(50))
    }

    #[test]
    fn test_similar_algorithms_have_high_potential() {
        let a = ga("ga_a", 0.9, 0.05);
        let b = ga("ga_b", 0.7, 0.2);
        let insight = analyze_pair(&b, &a, "accuracy");

        assert_eq!(insight.source_algorithm.as_str(), "ga_a");
        assert_eq!(insight.target_algorithm.as_str(), "ga_b");
        // 0.4 * 1 + 0.3 * 1 + 0.3 * 0.8
        assert!((insight.transfer_potential - 0.94).abs() < 1e-9);
        assert_eq!(insight.transferable_capabilities, vec!["mutation_rate".to_string()]);
        assert!(insight.shared_patterns.contains(&"type:heuristic".to_string()));
        assert!(insight.expected_improvement > 0.0);
    }

    #[test]
    fn test_unrelated_algorithms_are_filtered() {
        let a = ga("ga", 0.9, 0.05);
        let b = AlgorithmRecord::new("net", AlgorithmType::Neural).with_metric("efficiency", 0.3);
        let insight = analyze_pair(&a, &b, "accuracy");
        assert!((insight.transfer_potential - 0.12).abs() < 1e-9);

        let all = analyze_all(&[a, b, ga("ga2", 0.6, 0.3)], "accuracy", 0.5);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].target_algorithm.as_str(), "ga2");
    }

    #[test]
    fn test_affinity_is_symmetric() {
        use AlgorithmType::*;
        for a in [Neural, Statistical, Heuristic, Ensemble] {
            for b in [Neural, Statistical, Heuristic, Ensemble] {
                assert_eq!(type_affinity(a, b), type_affinity(b, a));
            }
        }
    }
}
