//! Architecture search for neural algorithms.
//!
//! Architectures are encoded as parameter sets so the shared search machinery
//! (sampling, narrowing, population search) can explore them. The objective
//! blends accuracy with an efficiency term that penalizes parameter count.

use async_trait::async_trait;
use rand::rngs::StdRng;
use selfopt_core::{
    Activation, AlgorithmId, AlgorithmRecord, ArchitectureSpec, Connection, ConnectionKind, LayerKind,
    OptimizerKind, ParamValue, ParameterSet, ParameterSpec, SearchSpace, Termination,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{EvaluationError, Result};
use crate::evaluator::{checked_evaluate, Evaluator};
use crate::genetic::{self, Origin};
use crate::hyperparameter::{local_search, random_search};
use crate::runner::SearchRun;

/// Parameter count at which normalized complexity reaches 0.5.
pub const REFERENCE_PARAMETERS: f64 = 100_000.0;

/// Weight of accuracy in the search objective; the rest goes to efficiency.
const ACCURACY_WEIGHT: f64 = 0.8;

const DEFAULT_INPUT: usize = 32;
const DEFAULT_OUTPUT: usize = 1;
const MIN_LAYER: usize = 4;

/// How the architecture space is explored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureSearchMethod {
    /// Random sampling of whole architectures
    Nas,
    /// Population search
    Evolutionary,
    /// Local refinement of the current architecture
    GradientBased,
    /// Population search seeded with previous architectures
    MetaLearned,
}

impl ArchitectureSearchMethod {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchitectureSearchMethod::Nas => "nas",
            ArchitectureSearchMethod::Evolutionary => "evolutionary",
            ArchitectureSearchMethod::GradientBased => "gradient_based",
            ArchitectureSearchMethod::MetaLearned => "meta_learned",
        }
    }
}

impl std::fmt::Display for ArchitectureSearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArchitectureSearchMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "nas" => Ok(ArchitectureSearchMethod::Nas),
            "evolutionary" => Ok(ArchitectureSearchMethod::Evolutionary),
            "gradient_based" => Ok(ArchitectureSearchMethod::GradientBased),
            "meta_learned" => Ok(ArchitectureSearchMethod::MetaLearned),
            other => Err(format!("unknown architecture search method: {}", other)),
        }
    }
}

/// Outcome of one architecture optimization call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureOptimization {
    /// Optimized algorithm
    pub algorithm_id: AlgorithmId,
    /// Method used
    pub method: ArchitectureSearchMethod,
    /// Architecture before the call
    pub prior_architecture: Option<ArchitectureSpec>,
    /// Best architecture found
    pub new_architecture: ArchitectureSpec,
    /// Score recorded before the call
    pub prior_score: f64,
    /// Validated score of the best architecture
    pub validation_score: f64,
    /// Relative improvement over `prior_score`
    pub improvement: f64,
    /// Parameter-count proxy of the best architecture
    pub complexity: u64,
    /// Accuracy per unit of complexity, in [0, 1]
    pub efficiency: f64,
    /// Candidate evaluations performed
    pub iterations: usize,
    /// Why the search stopped
    pub termination: Termination,
    /// Whether the registry now holds `new_architecture`
    pub applied: bool,
    /// Wall-clock time spent
    pub elapsed: Duration,
}

/// Pick a method when the caller did not force one.
///
/// Three or more past architectures: meta-learned. A budget of 100 or more:
/// evolutionary. An existing architecture: refine it locally. Otherwise NAS.
pub fn select_architecture_method(
    record: &AlgorithmRecord,
    budget: usize,
    requested: Option<ArchitectureSearchMethod>,
) -> ArchitectureSearchMethod {
    if let Some(method) = requested {
        return method;
    }
    if record.architecture_history.len() >= 3 {
        ArchitectureSearchMethod::MetaLearned
    } else if budget >= 100 {
        ArchitectureSearchMethod::Evolutionary
    } else if record.architecture.is_some() {
        ArchitectureSearchMethod::GradientBased
    } else {
        ArchitectureSearchMethod::Nas
    }
}

/// The encoded architecture space.
pub fn architecture_space() -> SearchSpace {
    SearchSpace {
        parameters: vec![
            ParameterSpec::discrete("arch_layers", 1, 6).with_importance(0.8),
            ParameterSpec::discrete("arch_width", 16, 512)
                .log_scale()
                .with_importance(0.7),
            ParameterSpec::continuous("arch_taper", 0.25, 1.0).with_importance(0.4),
            ParameterSpec::categorical("arch_connections", ["forward", "skip", "recurrent"]).with_importance(0.5),
            ParameterSpec::categorical("arch_activation", Activation::ALL.iter().map(|a| a.as_str()))
                .with_importance(0.5),
            ParameterSpec::categorical("arch_optimizer", OptimizerKind::ALL.iter().map(|o| o.as_str()))
                .with_importance(0.6),
            ParameterSpec::continuous("arch_dropout", 0.0, 0.5).with_importance(0.4),
        ],
        constraints: Vec::new(),
        objectives: Vec::new(),
    }
}

/// Complexity in [0, 1) derived from the parameter count.
pub fn normalized_complexity(parameter_count: u64) -> f64 {
    let p = parameter_count as f64;
    p / (p + REFERENCE_PARAMETERS)
}

/// `accuracy / (1 + normalized complexity)`.
pub fn efficiency(accuracy: f64, parameter_count: u64) -> f64 {
    (accuracy / (1.0 + normalized_complexity(parameter_count))).clamp(0.0, 1.0)
}

/// Input and output widths an architecture must keep.
pub fn io_sizes(current: Option<&ArchitectureSpec>) -> (usize, usize) {
    match current {
        Some(arch) => (
            arch.layers.first().map_or(DEFAULT_INPUT, |l| l.size),
            arch.layers.last().map_or(DEFAULT_OUTPUT, |l| l.size),
        ),
        None => (DEFAULT_INPUT, DEFAULT_OUTPUT),
    }
}

fn int(params: &ParameterSet, name: &str, default: i64) -> i64 {
    params.get(name).and_then(ParamValue::as_f64).map_or(default, |v| v.round() as i64)
}

fn float(params: &ParameterSet, name: &str, default: f64) -> f64 {
    params.get(name).and_then(ParamValue::as_f64).unwrap_or(default)
}

fn category<'p>(params: &'p ParameterSet, name: &str) -> Option<&'p str> {
    params.get(name).and_then(ParamValue::as_category)
}

/// Build the architecture an encoded parameter set describes.
pub fn decode(params: &ParameterSet, input: usize, output: usize) -> ArchitectureSpec {
    let depth = int(params, "arch_layers", 2).clamp(1, 6) as usize;
    let width = int(params, "arch_width", 64).max(MIN_LAYER as i64) as f64;
    let taper = float(params, "arch_taper", 1.0);
    let hidden: Vec<usize> = (0..depth)
        .map(|i| ((width * taper.powi(i as i32)).round() as usize).max(MIN_LAYER))
        .collect();

    let activation = category(params, "arch_activation")
        .and_then(|name| Activation::ALL.iter().copied().find(|a| a.as_str() == name))
        .unwrap_or(Activation::Relu);
    let mut arch = ArchitectureSpec::feed_forward(input, &hidden, output, activation);

    if let Some(kind) = category(params, "arch_optimizer")
        .and_then(|name| OptimizerKind::ALL.iter().copied().find(|o| o.as_str() == name))
    {
        arch.optimizer.kind = kind;
    }
    if let Some(lr) = params.get("learning_rate").and_then(ParamValue::as_f64) {
        arch.optimizer.learning_rate = lr;
    }
    arch.regularization.dropout = float(params, "arch_dropout", arch.regularization.dropout);

    match category(params, "arch_connections") {
        Some("skip") => {
            for from in 1..depth {
                arch.connections.push(Connection {
                    from,
                    to: from + 2,
                    kind: ConnectionKind::Skip,
                });
            }
        }
        Some("recurrent") => {
            for position in 1..=depth {
                arch.layers[position].kind = LayerKind::Recurrent;
                arch.connections.push(Connection {
                    from: position,
                    to: position,
                    kind: ConnectionKind::Recurrent,
                });
            }
        }
        _ => {}
    }
    arch
}

/// Encode an existing architecture into the search space.
pub fn encode(arch: &ArchitectureSpec) -> ParameterSet {
    let hidden = arch.hidden_sizes();
    let depth = hidden.len().clamp(1, 6);
    let first = hidden.first().copied().unwrap_or(64);
    let last = hidden.last().copied().unwrap_or(first);
    let taper = if hidden.len() > 1 {
        (last as f64 / first.max(1) as f64).powf(1.0 / (hidden.len() - 1) as f64)
    } else {
        1.0
    };
    let connections = if arch.connections.iter().any(|c| c.kind == ConnectionKind::Recurrent) {
        "recurrent"
    } else if arch.connections.iter().any(|c| c.kind == ConnectionKind::Skip) {
        "skip"
    } else {
        "forward"
    };
    let activation = arch.activations.first().copied().unwrap_or(Activation::Relu);

    ParameterSet::from([
        ("arch_layers".to_string(), ParamValue::Int(depth as i64)),
        ("arch_width".to_string(), ParamValue::Int((first as i64).clamp(16, 512))),
        ("arch_taper".to_string(), ParamValue::Float(taper.clamp(0.25, 1.0))),
        ("arch_connections".to_string(), ParamValue::Category(connections.to_string())),
        ("arch_activation".to_string(), ParamValue::Category(activation.as_str().to_string())),
        ("arch_optimizer".to_string(), ParamValue::Category(arch.optimizer.kind.as_str().to_string())),
        ("arch_dropout".to_string(), ParamValue::Float(arch.regularization.dropout.clamp(0.0, 0.5))),
    ])
}

/// Scores encoded architectures: the wrapped evaluator sees the algorithm's
/// hyperparameters merged with the encoding, and the returned fitness blends
/// accuracy with efficiency.
pub(crate) struct ArchitectureObjective<'a> {
    inner: &'a dyn Evaluator,
    base: &'a ParameterSet,
    io: (usize, usize),
}

impl<'a> ArchitectureObjective<'a> {
    pub(crate) fn new(inner: &'a dyn Evaluator, base: &'a ParameterSet, io: (usize, usize)) -> Self {
        Self { inner, base, io }
    }

    /// Raw accuracy of an encoded architecture.
    pub(crate) async fn accuracy(
        &self,
        algorithm: &AlgorithmId,
        encoded: &ParameterSet,
        metric: &str,
    ) -> std::result::Result<f64, EvaluationError> {
        let mut merged = self.base.clone();
        merged.extend(encoded.iter().map(|(k, v)| (k.clone(), v.clone())));
        checked_evaluate(self.inner, algorithm, &merged, metric).await
    }
}

#[async_trait]
impl<'a> Evaluator for ArchitectureObjective<'a> {
    async fn evaluate(
        &self,
        algorithm: &AlgorithmId,
        parameters: &ParameterSet,
        metric: &str,
    ) -> std::result::Result<f64, EvaluationError> {
        let accuracy = self.accuracy(algorithm, parameters, metric).await?;
        let count = decode(parameters, self.io.0, self.io.1).parameter_count();
        Ok(ACCURACY_WEIGHT * accuracy + (1.0 - ACCURACY_WEIGHT) * efficiency(accuracy, count))
    }
}

/// Explore the architecture space with `method`.
pub(crate) async fn search_architecture(
    run: &mut SearchRun<'_>,
    method: ArchitectureSearchMethod,
    record: &AlgorithmRecord,
    config: &EngineConfig,
    rng: &mut StdRng,
) -> Result<Termination> {
    let space = architecture_space();
    let origin = Origin {
        version: record.version,
        parameters: record.architecture.as_ref().map(encode).unwrap_or_default(),
        fitness: None,
    };
    match method {
        ArchitectureSearchMethod::Nas => {
            random_search(run, &space, config.evolution.population_size.max(1), rng).await
        }
        ArchitectureSearchMethod::GradientBased => {
            let start = match &record.architecture {
                Some(arch) => genetic::fit_to_space(&space, &encode(arch), rng),
                None => crate::search_space::sample(&space, rng),
            };
            local_search(run, &space, start, &config.bayesian, rng).await
        }
        ArchitectureSearchMethod::Evolutionary => {
            Ok(genetic::evolve(run, &space, &config.evolution, &origin, Vec::new(), rng).await?.termination)
        }
        ArchitectureSearchMethod::MetaLearned => {
            let seeds: Vec<ParameterSet> = record
                .architecture
                .iter()
                .chain(record.architecture_history.iter().rev())
                .map(encode)
                .collect();
            Ok(genetic::evolve(run, &space, &config.evolution, &origin, seeds, rng).await?.termination)
        }
    }
}
