//! Automated feature engineering.

use selfopt_core::{improvement, AlgorithmId, FeatureKind, FeatureSpec, ParamValue, ParameterSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{OptimizationError, Result};
use crate::evaluator::{checked_evaluate, Evaluator};

/// Importance gap under which two otherwise identical features are redundant.
pub const REDUNDANCY_TOLERANCE: f64 = 0.05;

/// Engineering method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMethod {
    /// Squares of important numerical features
    Polynomial,
    /// Products of the most important pair
    Interaction,
    /// Discretize numerical and temporal features
    Binning,
    /// Standardize numerical features
    Scaling,
    /// Dense embeddings for text and categorical features
    Embedding,
    /// Aggregate of the top features
    AutoFeature,
}

impl FeatureMethod {
    /// Every method, in evaluation tie-break order.
    pub const ALL: [FeatureMethod; 6] = [
        FeatureMethod::Polynomial,
        FeatureMethod::Interaction,
        FeatureMethod::Binning,
        FeatureMethod::Scaling,
        FeatureMethod::Embedding,
        FeatureMethod::AutoFeature,
    ];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureMethod::Polynomial => "polynomial",
            FeatureMethod::Interaction => "interaction",
            FeatureMethod::Binning => "binning",
            FeatureMethod::Scaling => "scaling",
            FeatureMethod::Embedding => "embedding",
            FeatureMethod::AutoFeature => "auto_feature",
        }
    }

    /// Expected impact when fully applicable, in [0, 1].
    pub fn impact(&self) -> f64 {
        match self {
            FeatureMethod::Polynomial => 0.6,
            FeatureMethod::Interaction => 0.5,
            FeatureMethod::Binning => 0.3,
            FeatureMethod::Scaling => 0.3,
            FeatureMethod::Embedding => 0.7,
            FeatureMethod::AutoFeature => 0.4,
        }
    }

    /// Relative computational cost, in [0, 1].
    pub fn cost(&self) -> f64 {
        match self {
            FeatureMethod::Polynomial => 0.3,
            FeatureMethod::Interaction => 0.4,
            FeatureMethod::Binning => 0.1,
            FeatureMethod::Scaling => 0.05,
            FeatureMethod::Embedding => 0.6,
            FeatureMethod::AutoFeature => 0.8,
        }
    }

    /// Fraction of the feature set the method can work on, in [0, 1].
    pub fn applicability(&self, features: &[FeatureSpec]) -> f64 {
        if features.is_empty() {
            return 0.0;
        }
        let share = |pred: &dyn Fn(&FeatureSpec) -> bool| {
            features.iter().filter(|f| pred(f)).count() as f64 / features.len() as f64
        };
        match self {
            FeatureMethod::Polynomial => share(&|f| f.kind == FeatureKind::Numerical),
            FeatureMethod::Interaction => {
                let usable = features
                    .iter()
                    .filter(|f| matches!(f.kind, FeatureKind::Numerical | FeatureKind::Categorical))
                    .count();
                (usable.saturating_sub(1) as f64 / 3.0).min(1.0)
            }
            FeatureMethod::Binning => {
                share(&|f| matches!(f.kind, FeatureKind::Numerical | FeatureKind::Temporal) && !has(f, "binning"))
            }
            FeatureMethod::Scaling => share(&|f| f.kind == FeatureKind::Numerical && !has(f, "standardize")),
            FeatureMethod::Embedding => {
                share(&|f| matches!(f.kind, FeatureKind::Text | FeatureKind::Categorical) && f.encoding != "embedding")
            }
            FeatureMethod::AutoFeature => {
                if features.len() >= 3 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// `impact * applicability - 0.5 * cost`.
    pub fn score(&self, features: &[FeatureSpec]) -> f64 {
        self.impact() * self.applicability(features) - 0.5 * self.cost()
    }
}

impl std::fmt::Display for FeatureMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn has(feature: &FeatureSpec, transformation: &str) -> bool {
    feature.transformations.iter().any(|t| t == transformation)
}

/// Outcome of a feature engineering call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEngineering {
    /// Algorithm the features belong to
    pub algorithm_id: AlgorithmId,
    /// Input feature set
    pub original_features: Vec<FeatureSpec>,
    /// Resulting feature set (the input when nothing helped)
    pub engineered_features: Vec<FeatureSpec>,
    /// Methods whose output was kept, in application order
    pub methods_applied: Vec<FeatureMethod>,
    /// Every method with a positive score, best first
    pub methods_considered: Vec<(FeatureMethod, f64)>,
    /// Features found redundant
    pub redundant_features: Vec<String>,
    /// Held-out score of the input feature set
    pub baseline_score: f64,
    /// Held-out score of the resulting feature set
    pub validation_score: f64,
    /// Relative improvement; 0 when the input set is returned
    pub improvement: f64,
    /// Evaluations performed
    pub evaluations: usize,
    /// Whether the registry now holds `engineered_features`
    pub applied: bool,
}

/// Names of features that duplicate an earlier, kept feature.
pub fn find_redundant(features: &[FeatureSpec]) -> Vec<String> {
    let mut redundant = Vec::new();
    for (i, feature) in features.iter().enumerate() {
        let duplicate = features[..i].iter().any(|other| {
            !redundant.contains(&other.name)
                && other.kind == feature.kind
                && other.encoding == feature.encoding
                && other.transformations == feature.transformations
                && (other.importance - feature.importance).abs() <= REDUNDANCY_TOLERANCE
        });
        if duplicate {
            redundant.push(feature.name.clone());
        }
    }
    redundant
}

/// Apply one method to a feature set. `redundant` features are not used as
/// sources for new derived features.
pub fn apply_method(method: FeatureMethod, features: &[FeatureSpec], redundant: &[String]) -> Vec<FeatureSpec> {
    let mut out = features.to_vec();
    let mut sources: Vec<&FeatureSpec> = features
        .iter()
        .filter(|f| !redundant.contains(&f.name) && f.kind != FeatureKind::Derived)
        .collect();
    sources.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    let exists = |out: &[FeatureSpec], name: &str| out.iter().any(|f| f.name == name);

    match method {
        FeatureMethod::Polynomial => {
            for f in sources.iter().filter(|f| f.kind == FeatureKind::Numerical).take(2) {
                let name = format!("{}_pow2", f.name);
                if !exists(&out, &name) {
                    out.push(FeatureSpec::new(name, FeatureKind::Derived, f.importance * 0.8).with_transformation("square"));
                }
            }
        }
        FeatureMethod::Interaction => {
            let usable: Vec<&&FeatureSpec> = sources
                .iter()
                .filter(|f| matches!(f.kind, FeatureKind::Numerical | FeatureKind::Categorical))
                .take(2)
                .collect();
            if let [a, b] = usable.as_slice() {
                let name = format!("{}_x_{}", a.name, b.name);
                if !exists(&out, &name) {
                    let importance = (a.importance * b.importance).sqrt();
                    out.push(FeatureSpec::new(name, FeatureKind::Derived, importance).with_transformation("product"));
                }
            }
        }
        FeatureMethod::Binning => {
            for f in out
                .iter_mut()
                .filter(|f| matches!(f.kind, FeatureKind::Numerical | FeatureKind::Temporal))
            {
                if !has(f, "binning") {
                    f.transformations.push("binning".to_string());
                    f.encoding = "ordinal".to_string();
                }
            }
        }
        FeatureMethod::Scaling => {
            for f in out.iter_mut().filter(|f| f.kind == FeatureKind::Numerical) {
                if !has(f, "standardize") {
                    f.transformations.push("standardize".to_string());
                }
            }
        }
        FeatureMethod::Embedding => {
            for f in out
                .iter_mut()
                .filter(|f| matches!(f.kind, FeatureKind::Text | FeatureKind::Categorical))
            {
                f.encoding = "embedding".to_string();
            }
        }
        FeatureMethod::AutoFeature => {
            let top: Vec<&str> = sources.iter().take(3).map(|f| f.name.as_str()).collect();
            let name = format!("auto_{}", top.join("_"));
            if top.len() >= 2 && !exists(&out, &name) {
                let importance = sources.iter().take(3).map(|f| f.importance).sum::<f64>() / top.len() as f64;
                out.push(FeatureSpec::new(name, FeatureKind::Derived, importance).with_transformation("aggregate"));
            }
        }
    }
    out
}

/// Parameters seen by the evaluator for a feature set.
pub fn feature_parameters(base: &ParameterSet, features: &[FeatureSpec]) -> ParameterSet {
    let mut params = base.clone();
    params.insert("feature_count".to_string(), ParamValue::Int(features.len() as i64));
    for f in features {
        let mut descriptor = f.encoding.clone();
        for t in &f.transformations {
            descriptor.push('+');
            descriptor.push_str(t);
        }
        params.insert(format!("feature.{}", f.name), ParamValue::Category(descriptor));
    }
    params
}

/// Try every positive-scoring method greedily, keeping each only if it raises
/// the held-out score.
pub(crate) async fn engineer(
    evaluator: &dyn Evaluator,
    algorithm: &AlgorithmId,
    base: &ParameterSet,
    features: Vec<FeatureSpec>,
    metric: &str,
) -> Result<FeatureEngineering> {
    let redundant = find_redundant(&features);
    let baseline = checked_evaluate(evaluator, algorithm, &feature_parameters(base, &features), metric)
        .await
        .map_err(|cause| OptimizationError::OptimizationFailed {
            algorithm: algorithm.clone(),
            cause,
        })?;
    let mut evaluations = 1;

    let mut considered: Vec<(FeatureMethod, f64)> = FeatureMethod::ALL
        .iter()
        .map(|m| (*m, m.score(&features)))
        .filter(|(_, score)| *score > 0.0)
        .collect();
    considered.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut current = features.clone();
    let mut current_score = baseline;
    let mut applied = Vec::new();
    for (method, _) in &considered {
        let candidate = apply_method(*method, &current, &redundant);
        if candidate == current {
            continue;
        }
        evaluations += 1;
        match checked_evaluate(evaluator, algorithm, &feature_parameters(base, &candidate), metric).await {
            Ok(score) if score > current_score => {
                debug!(%method, score, "feature method kept");
                current = candidate;
                current_score = score;
                applied.push(*method);
            }
            Ok(score) => debug!(%method, score, "feature method discarded"),
            Err(err) => warn!(%method, error = %err, "feature candidate evaluation failed"),
        }
    }

    let improvement = if applied.is_empty() {
        0.0
    } else {
        improvement(baseline, current_score)
    };
    Ok(FeatureEngineering {
        algorithm_id: algorithm.clone(),
        engineered_features: if applied.is_empty() { features.clone() } else { current },
        original_features: features,
        methods_applied: applied,
        methods_considered: considered,
        redundant_features: redundant,
        baseline_score: baseline,
        validation_score: current_score,
        improvement,
        evaluations,
        applied: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::evaluator::FnEvaluator;

    fn features() -> Vec<FeatureSpec> {
        vec![
            FeatureSpec::new("age", FeatureKind::Numerical, 0.9),
            FeatureSpec::new("income", FeatureKind::Numerical, 0.7),
            FeatureSpec::new("city", FeatureKind::Categorical, 0.5),
            FeatureSpec::new("review", FeatureKind::Text, 0.4),
        ]
    }

    fn count(p: &ParameterSet) -> f64 {
        p.get("feature_count").and_then(ParamValue::as_f64).unwrap_or(0.0)
    }

    #[test]
    fn test_redundancy_detection() {
        let mut set = features();
        set.push(FeatureSpec::new("age_copy", FeatureKind::Numerical, 0.93));
        set.push(FeatureSpec::new("weight", FeatureKind::Numerical, 0.5));
        assert_eq!(find_redundant(&set), vec!["age_copy".to_string()]);
    }

    #[test]
    fn test_method_scores() {
        let set = features();
        // numerical share 0.5: 0.6 * 0.5 - 0.15
        assert!((FeatureMethod::Polynomial.score(&set) - 0.15).abs() < 1e-12);
        // auto features cost as much as they are expected to give
        assert!(FeatureMethod::AutoFeature.score(&set) <= 0.0);
        assert_eq!(FeatureMethod::AutoFeature.applicability(&set[..2]), 0.0);
    }

    #[test]
    fn test_apply_methods() {
        let set = features();
        let poly = apply_method(FeatureMethod::Polynomial, &set, &[]);
        assert!(poly.iter().any(|f| f.name == "age_pow2" && f.kind == FeatureKind::Derived));
        assert!(poly.iter().any(|f| f.name == "income_pow2"));

        let interaction = apply_method(FeatureMethod::Interaction, &set, &[]);
        assert!(interaction.iter().any(|f| f.name == "age_x_income"));

        let embedded = apply_method(FeatureMethod::Embedding, &set, &[]);
        assert!(embedded.iter().filter(|f| f.encoding == "embedding").count() == 2);

        // redundant features are not expanded
        let poly = apply_method(FeatureMethod::Polynomial, &set, &["income".to_string()]);
        assert!(!poly.iter().any(|f| f.name == "income_pow2"));
    }

    #[tokio::test]
    async fn test_engineer_keeps_only_improving_methods() {
        // more features score better
        let eval = FnEvaluator::new(|_: &AlgorithmId, p: &ParameterSet, _: &str| Ok((count(p) / 10.0).min(1.0)));
        let id = AlgorithmId::from("model");
        let result = engineer(&eval, &id, &ParameterSet::new(), features(), "accuracy").await.unwrap();

        assert!(result.improvement > 0.0);
        assert!(result.methods_applied.contains(&FeatureMethod::Polynomial));
        assert!(!result.methods_applied.contains(&FeatureMethod::Scaling));
        assert!(result.engineered_features.len() > result.original_features.len());
        assert!((result.baseline_score - 0.4).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_engineer_returns_original_when_nothing_helps() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, _: &ParameterSet, _: &str| Ok(0.6));
        let id = AlgorithmId::from("model");
        let result = engineer(&eval, &id, &ParameterSet::new(), features(), "accuracy").await.unwrap();

        assert_eq!(result.improvement, 0.0);
        assert_eq!(result.engineered_features, result.original_features);
        assert!(result.methods_applied.is_empty());
        assert_eq!(result.validation_score, 0.6);
    }

    #[tokio::test]
    async fn test_baseline_failure_is_an_error() {
        let eval = FnEvaluator::new(|_: &AlgorithmId, _: &ParameterSet, _: &str| {
            Err(EvaluationError::Failed("no data".into()))
        });
        let id = AlgorithmId::from("model");
        let err = engineer(&eval, &id, &ParameterSet::new(), features(), "accuracy").await.unwrap_err();
        assert!(matches!(err, OptimizationError::OptimizationFailed { .. }));
    }
}
