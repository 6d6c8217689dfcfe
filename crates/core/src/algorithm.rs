//! Algorithm record - the registry's unit of state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::architecture::ArchitectureSpec;
use crate::id::{AlgorithmId, VersionId};
use crate::schedule::{FeatureSpec, LearningRateSchedule};
use crate::search::{ParamValue, ParameterSet};
use crate::Time;

/// Family an algorithm belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmType {
    /// Network-like learners with an architecture
    Neural,
    /// Classical statistical models
    Statistical,
    /// Search heuristics (genetic algorithms, annealing, ...)
    Heuristic,
    /// Combinations of other learners
    Ensemble,
}

impl AlgorithmType {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmType::Neural => "neural",
            AlgorithmType::Statistical => "statistical",
            AlgorithmType::Heuristic => "heuristic",
            AlgorithmType::Ensemble => "ensemble",
        }
    }
}

impl std::fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "neural" => Ok(AlgorithmType::Neural),
            "statistical" => Ok(AlgorithmType::Statistical),
            "heuristic" => Ok(AlgorithmType::Heuristic),
            "ensemble" => Ok(AlgorithmType::Ensemble),
            other => Err(format!("unknown algorithm type: {}", other)),
        }
    }
}

/// Persisted performance and configuration snapshot of one algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmRecord {
    /// Unique identifier
    pub id: AlgorithmId,

    /// Algorithm family
    pub algorithm_type: AlgorithmType,

    /// Named scores (accuracy, efficiency, learningRate, ...)
    pub performance_metrics: BTreeMap<String, f64>,

    /// Current best-known configuration
    pub parameters: ParameterSet,

    /// Every optimization attempt, oldest first
    pub improvement_history: Vec<ImprovementEvent>,

    /// Version of the current configuration
    pub version: VersionId,

    /// Current architecture (neural algorithms only)
    #[serde(default)]
    pub architecture: Option<ArchitectureSpec>,

    /// Superseded architectures, most recent last
    #[serde(default)]
    pub architecture_history: Vec<ArchitectureSpec>,

    /// Active learning-rate schedule
    #[serde(default)]
    pub learning_rate_schedule: Option<LearningRateSchedule>,

    /// Input features
    #[serde(default)]
    pub features: Vec<FeatureSpec>,

    /// Keys of transfer insights already applied to this record
    #[serde(default)]
    pub applied_insights: Vec<String>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,
}

impl AlgorithmRecord {
    /// Create an empty record.
    pub fn new(id: impl Into<AlgorithmId>, algorithm_type: AlgorithmType) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: id.into(),
            algorithm_type,
            performance_metrics: BTreeMap::new(),
            parameters: ParameterSet::new(),
            improvement_history: Vec::new(),
            version: VersionId::new(),
            architecture: None,
            architecture_history: Vec::new(),
            learning_rate_schedule: None,
            features: Vec::new(),
            applied_insights: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a metric.
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.performance_metrics.insert(name.into(), value);
        self
    }

    /// Set a parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Attach an architecture.
    pub fn with_architecture(mut self, architecture: ArchitectureSpec) -> Self {
        self.architecture = Some(architecture);
        self
    }

    /// Recorded score for a metric.
    pub fn score(&self, metric: &str) -> Option<f64> {
        self.performance_metrics.get(metric).copied()
    }

    /// Append an event to the history.
    pub fn record_event(&mut self, event: ImprovementEvent) {
        self.improvement_history.push(event);
        self.touch();
    }

    /// Whether an insight key was already applied.
    pub fn has_applied(&self, insight_key: &str) -> bool {
        self.applied_insights.iter().any(|k| k == insight_key)
    }

    /// Update the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// What kind of optimization produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementKind {
    /// Hyperparameter search
    Hyperparameter,
    /// Architecture search
    Architecture,
    /// Learning-rate adaptation
    LearningRate,
    /// Feature engineering
    Features,
    /// Population-based evolution
    Evolution,
    /// Cross-algorithm transfer
    Transfer,
    /// Manual rollback
    Rollback,
}

/// One optimization attempt in an algorithm's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementEvent {
    /// When it happened
    pub timestamp: Time,

    /// Which optimizer ran
    pub kind: ImprovementKind,

    /// Method used within that optimizer
    pub method: String,

    /// Score before the attempt
    pub score_before: f64,

    /// Best score found by the attempt
    pub score_after: f64,

    /// Relative improvement
    pub improvement: f64,

    /// Whether the result replaced the current configuration
    pub applied: bool,

    /// Parameters changed by the attempt
    pub changed_parameters: Vec<String>,

    /// Free-form note
    pub note: String,
}

impl ImprovementEvent {
    /// Create an event; the improvement is derived from the two scores.
    pub fn new(kind: ImprovementKind, method: impl Into<String>, score_before: f64, score_after: f64) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            kind,
            method: method.into(),
            score_before,
            score_after,
            improvement: crate::improvement(score_before, score_after),
            applied: false,
            changed_parameters: Vec::new(),
            note: String::new(),
        }
    }

    /// Mark whether the result was applied.
    pub fn applied(mut self, applied: bool) -> Self {
        self.applied = applied;
        self
    }

    /// Record which parameters changed.
    pub fn with_changes(mut self, changed: Vec<String>) -> Self {
        self.changed_parameters = changed;
        self
    }

    /// Attach a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

/// Names of parameters whose value differs between two assignments.
pub fn changed_parameters(before: &ParameterSet, after: &ParameterSet) -> Vec<String> {
    after
        .iter()
        .filter(|(name, value)| before.get(*name) != Some(*value))
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = AlgorithmRecord::new("genetic_algorithm", AlgorithmType::Heuristic)
            .with_metric("accuracy", 0.7)
            .with_parameter("mutation_rate", ParamValue::Float(0.1));

        assert_eq!(record.id.as_str(), "genetic_algorithm");
        assert_eq!(record.score("accuracy"), Some(0.7));
        assert_eq!(record.score("efficiency"), None);
        assert!(record.improvement_history.is_empty());
    }

    #[test]
    fn test_event_improvement_is_relative() {
        let event = ImprovementEvent::new(ImprovementKind::Hyperparameter, "random", 0.5, 0.6);
        assert!((event.improvement - 0.2).abs() < 1e-12);
        assert!(!event.applied);
    }

    #[test]
    fn test_changed_parameters() {
        let mut a = ParameterSet::new();
        a.insert("x".into(), ParamValue::Int(1));
        a.insert("y".into(), ParamValue::Int(2));
        let mut b = a.clone();
        b.insert("y".into(), ParamValue::Int(3));
        b.insert("z".into(), ParamValue::Int(4));
        assert_eq!(changed_parameters(&a, &b), vec!["y".to_string(), "z".to_string()]);
    }

    #[test]
    fn test_algorithm_type_parse() {
        assert_eq!("Neural".parse::<AlgorithmType>(), Ok(AlgorithmType::Neural));
        assert!("quantum".parse::<AlgorithmType>().is_err());
    }

    #[test]
    fn test_record_round_trips_without_optional_fields() {
        let record = AlgorithmRecord::new("lr", AlgorithmType::Statistical);
        let mut json = serde_json::to_value(&record).unwrap();
        json.as_object_mut().unwrap().remove("features");
        json.as_object_mut().unwrap().remove("applied_insights");
        let loaded: AlgorithmRecord = serde_json::from_value(json).unwrap();
        assert!(loaded.features.is_empty());
        assert!(loaded.applied_insights.is_empty());
    }
}
