//! Aggregated optimization summaries.

use selfopt_core::{AlgorithmId, AlgorithmRecord, AlgorithmType, EvolutionRecord, ParameterSet, TransferInsight};
use serde::{Deserialize, Serialize};

use crate::learning_rate::{LearningDynamics, PLATEAU_SLOPE};

/// Events considered when estimating the trend.
const TREND_WINDOW: usize = 10;

/// Direction of recent results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Scores are rising
    Improving,
    /// No clear direction
    Stable,
    /// Scores are falling
    Declining,
}

/// Summary of everything known about one algorithm's optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationInsights {
    /// Algorithm
    pub algorithm_id: AlgorithmId,
    /// Its family
    pub algorithm_type: AlgorithmType,
    /// Metric the summary is about
    pub metric: String,
    /// Recorded score
    pub current_score: f64,
    /// Best score ever recorded
    pub best_score: f64,
    /// Current best-known configuration
    pub best_configuration: ParameterSet,
    /// Optimization attempts
    pub total_optimizations: usize,
    /// Attempts whose result was applied
    pub applied_optimizations: usize,
    /// Mean relative improvement of applied attempts
    pub average_improvement: f64,
    /// Direction of recent results
    pub trend: Trend,
    /// Confidence in the summary, in [0, 1]
    pub confidence: f64,
    /// Method of the latest attempt
    pub last_method: Option<String>,
    /// Evolution records in the lineage
    pub lineage_size: usize,
    /// Generations in the lineage
    pub lineage_generations: usize,
    /// High-value synergies involving this algorithm from the last transfer pass
    pub synergies: Vec<TransferInsight>,
}

/// Trend of an ordered score series.
pub fn trend_of(scores: &[f64]) -> Trend {
    let dynamics = LearningDynamics::analyze(scores);
    if dynamics.trend > PLATEAU_SLOPE {
        Trend::Improving
    } else if dynamics.trend < -PLATEAU_SLOPE {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Build the summary.
///
/// Confidence is the mean of the evidence (attempts / 10, capped at 1) and the
/// share of attempts that were applied.
pub fn summarize(
    record: &AlgorithmRecord,
    metric: &str,
    lineage: &[EvolutionRecord],
    synergies: Vec<TransferInsight>,
) -> OptimizationInsights {
    let history = &record.improvement_history;
    let current_score = record.score(metric).unwrap_or(0.0);
    let applied: Vec<_> = history.iter().filter(|e| e.applied).collect();

    let best_score = applied.iter().map(|e| e.score_after).fold(current_score, f64::max);
    let average_improvement = if applied.is_empty() {
        0.0
    } else {
        applied.iter().map(|e| e.improvement).sum::<f64>() / applied.len() as f64
    };

    let recent: Vec<f64> = history
        .iter()
        .rev()
        .take(TREND_WINDOW)
        .rev()
        .map(|e| if e.applied { e.score_after } else { e.score_before })
        .collect();

    let evidence = (history.len() as f64 / 10.0).min(1.0);
    let success = if history.is_empty() {
        0.0
    } else {
        applied.len() as f64 / history.len() as f64
    };

    OptimizationInsights {
        algorithm_id: record.id.clone(),
        algorithm_type: record.algorithm_type,
        metric: metric.to_string(),
        current_score,
        best_score,
        best_configuration: record.parameters.clone(),
        total_optimizations: history.len(),
        applied_optimizations: applied.len(),
        average_improvement,
        trend: trend_of(&recent),
        confidence: (evidence + success) / 2.0,
        last_method: history.last().map(|e| e.method.clone()),
        lineage_size: lineage.len(),
        lineage_generations: lineage.iter().map(|r| r.generation).max().unwrap_or(0),
        synergies: synergies
            .into_iter()
            .filter(|s| s.source_algorithm == record.id || s.target_algorithm == record.id)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfopt_core::{ImprovementEvent, ImprovementKind};

    #[test]
    fn test_trend_classification() {
        assert_eq!(trend_of(&[0.5, 0.6, 0.7]), Trend::Improving);
        assert_eq!(trend_of(&[0.7, 0.6, 0.5]), Trend::Declining);
        assert_eq!(trend_of(&[0.7, 0.7]), Trend::Stable);
        assert_eq!(trend_of(&[]), Trend::Stable);
    }

    #[test]
    fn test_summary_of_history() {
        let mut record = AlgorithmRecord::new("ga", AlgorithmType::Heuristic).with_metric("accuracy", 0.8);
        record.record_event(ImprovementEvent::new(ImprovementKind::Hyperparameter, "random", 0.6, 0.7).applied(true));
        record.record_event(ImprovementEvent::new(ImprovementKind::Hyperparameter, "bayesian", 0.7, 0.65));
        record.record_event(ImprovementEvent::new(ImprovementKind::Evolution, "evolutionary", 0.7, 0.8).applied(true));

        let insights = summarize(&record, "accuracy", &[], Vec::new());
        assert_eq!(insights.total_optimizations, 3);
        assert_eq!(insights.applied_optimizations, 2);
        assert_eq!(insights.best_score, 0.8);
        assert_eq!(insights.last_method.as_deref(), Some("evolutionary"));
        assert_eq!(insights.trend, Trend::Improving);
        // evidence 0.3, success 2/3
        assert!((insights.confidence - (0.3 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
        assert!(insights.average_improvement > 0.0);
    }
}
