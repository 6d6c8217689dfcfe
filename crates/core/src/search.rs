//! Search space model - what an optimizer is allowed to explore.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A concrete parameter assignment, keyed by parameter name.
pub type ParameterSet = BTreeMap<String, ParamValue>;

/// Value of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value (discrete parameters)
    Int(i64),
    /// Real value (continuous parameters)
    Float(f64),
    /// One of a fixed set of choices
    Category(String),
}

impl ParamValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Category(_) => None,
        }
    }

    /// Categorical view of the value.
    pub fn as_category(&self) -> Option<&str> {
        match self {
            ParamValue::Category(c) => Some(c),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Category(c) => f.write_str(c),
        }
    }
}

/// Kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Real-valued
    Continuous,
    /// Integer-valued
    Discrete,
    /// Unordered set of choices
    Categorical,
}

/// Sampling scale of a numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// Uniform in value space
    Linear,
    /// Uniform in log space (requires a strictly positive range)
    Log,
    /// Uniform over choices
    Uniform,
}

/// Admissible values of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterRange {
    /// Closed real interval
    Continuous {
        /// Lower bound
        low: f64,
        /// Upper bound
        high: f64,
    },
    /// Closed integer interval
    Discrete {
        /// Lower bound
        low: i64,
        /// Upper bound
        high: i64,
    },
    /// Explicit choices
    Categorical {
        /// Allowed values
        choices: Vec<String>,
    },
}

/// Definition of one searchable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name
    pub name: String,
    /// Parameter kind
    pub kind: ParameterKind,
    /// Admissible values
    pub range: ParameterRange,
    /// Sampling scale
    pub scale: Scale,
    /// Expected impact on the objective, in [0, 1]
    pub importance: f64,
}

impl ParameterSpec {
    /// Continuous parameter on a linear scale.
    pub fn continuous(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Continuous,
            range: ParameterRange::Continuous { low, high },
            scale: Scale::Linear,
            importance: 0.5,
        }
    }

    /// Integer parameter on a linear scale.
    pub fn discrete(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Discrete,
            range: ParameterRange::Discrete { low, high },
            scale: Scale::Linear,
            importance: 0.5,
        }
    }

    /// Categorical parameter.
    pub fn categorical<I, S>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: ParameterKind::Categorical,
            range: ParameterRange::Categorical {
                choices: choices.into_iter().map(Into::into).collect(),
            },
            scale: Scale::Uniform,
            importance: 0.5,
        }
    }

    /// Sample on a log scale.
    pub fn log_scale(mut self) -> Self {
        self.scale = Scale::Log;
        self
    }

    /// Set the importance weight (clamped to [0, 1]).
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Whether `value` is admissible for this parameter.
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (&self.range, value) {
            (ParameterRange::Continuous { low, high }, ParamValue::Float(v)) => {
                v.is_finite() && *v >= *low && *v <= *high
            }
            (ParameterRange::Discrete { low, high }, ParamValue::Int(v)) => *v >= *low && *v <= *high,
            (ParameterRange::Categorical { choices }, ParamValue::Category(c)) => choices.contains(c),
            _ => false,
        }
    }

    fn validate(&self) -> Result<(), SearchSpaceError> {
        let invalid = |reason: &str| SearchSpaceError::InvalidParameter {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if !(0.0..=1.0).contains(&self.importance) {
            return Err(invalid("importance must lie in [0, 1]"));
        }
        match (&self.range, self.kind) {
            (ParameterRange::Continuous { low, high }, ParameterKind::Continuous) => {
                if !(low.is_finite() && high.is_finite()) || low > high {
                    return Err(invalid("continuous range must be finite with low <= high"));
                }
                if self.scale == Scale::Log && *low <= 0.0 {
                    return Err(invalid("log scale requires a positive range"));
                }
            }
            (ParameterRange::Discrete { low, high }, ParameterKind::Discrete) => {
                if low > high {
                    return Err(invalid("discrete range must have low <= high"));
                }
                if self.scale == Scale::Log && *low <= 0 {
                    return Err(invalid("log scale requires a positive range"));
                }
            }
            (ParameterRange::Categorical { choices }, ParameterKind::Categorical) => {
                if choices.is_empty() {
                    return Err(invalid("categorical parameter needs at least one choice"));
                }
            }
            _ => return Err(invalid("kind does not match range")),
        }
        Ok(())
    }
}

/// Numeric bound on a parameter that every candidate must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constrained parameter
    pub parameter: String,
    /// Inclusive minimum
    pub min: Option<f64>,
    /// Inclusive maximum
    pub max: Option<f64>,
}

impl Constraint {
    /// Whether the assignment satisfies this constraint.
    ///
    /// Missing or non-numeric parameters are not constrained.
    pub fn is_satisfied(&self, params: &ParameterSet) -> bool {
        let Some(value) = params.get(&self.parameter).and_then(ParamValue::as_f64) else {
            return true;
        };
        self.min.map_or(true, |m| value >= m) && self.max.map_or(true, |m| value <= m)
    }
}

/// Optimization direction of an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Higher is better
    Maximize,
    /// Lower is better
    Minimize,
}

/// A weighted optimization objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Metric name
    pub metric: String,
    /// Direction
    pub direction: Direction,
    /// Weight; the weights of a space sum to 1
    pub weight: f64,
    /// Changes smaller than this are not considered improvements
    pub tolerance: f64,
}

/// Errors raised when validating a search space.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchSpaceError {
    /// No parameters to search
    #[error("search space has no parameters")]
    Empty,

    /// A parameter definition is inconsistent
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Objective weights do not add up to one
    #[error("objective weights sum to {0}, expected 1")]
    ObjectiveWeights(f64),
}

/// The set of parameters an optimizer may explore for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    /// Searchable parameters
    pub parameters: Vec<ParameterSpec>,
    /// Bounds every candidate must satisfy
    pub constraints: Vec<Constraint>,
    /// Objectives the search is scored against
    pub objectives: Vec<Objective>,
}

impl SearchSpace {
    /// Look up a parameter definition by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Minimum relative gain on `metric` that counts as an improvement;
    /// zero when no objective names the metric.
    pub fn tolerance(&self, metric: &str) -> f64 {
        self.objectives
            .iter()
            .find(|o| o.metric == metric)
            .map_or(0.0, |o| o.tolerance)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), SearchSpaceError> {
        if self.parameters.is_empty() {
            return Err(SearchSpaceError::Empty);
        }
        for spec in &self.parameters {
            spec.validate()?;
        }
        if !self.objectives.is_empty() {
            let total: f64 = self.objectives.iter().map(|o| o.weight).sum();
            if (total - 1.0).abs() > 1e-6 {
                return Err(SearchSpaceError::ObjectiveWeights(total));
            }
        }
        Ok(())
    }

    /// Whether an assignment covers every parameter with an admissible value
    /// and satisfies all constraints.
    pub fn contains(&self, params: &ParameterSet) -> bool {
        self.parameters
            .iter()
            .all(|spec| params.get(&spec.name).map_or(false, |v| spec.contains(v)))
            && self.constraints.iter().all(|c| c.is_satisfied(params))
    }

    /// Number of distinct grid points when numeric ranges are cut into `levels`.
    pub fn grid_size(&self, levels: usize) -> usize {
        self.parameters
            .iter()
            .map(|spec| match &spec.range {
                ParameterRange::Continuous { .. } => levels.max(1),
                ParameterRange::Discrete { low, high } => {
                    let span = (*high - *low + 1).max(1) as usize;
                    span.min(levels.max(1))
                }
                ParameterRange::Categorical { choices } => choices.len().max(1),
            })
            .fold(1usize, |acc, n| acc.saturating_mul(n))
    }
}
