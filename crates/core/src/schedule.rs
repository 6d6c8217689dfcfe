//! Learning-rate schedules and feature descriptions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shape of a learning-rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Fixed rate
    Constant,
    /// Exponential or milestone decay
    Decay,
    /// Triangular cycling between two rates
    Cyclic,
    /// Cosine annealing with periodic restarts
    WarmRestart,
    /// Reduce on plateau, driven at training time
    Adaptive,
}

/// A learning-rate schedule.
///
/// Recognised `parameters`: `base_lr`, `gamma`, `min_lr`, `max_lr`, `period`,
/// `patience`, `factor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRateSchedule {
    /// Schedule shape
    pub kind: ScheduleKind,
    /// Numeric parameters of the shape
    pub parameters: BTreeMap<String, f64>,
    /// Steps at which `factors` apply (decay schedules)
    pub milestones: Vec<usize>,
    /// Multiplicative factor for each milestone
    pub factors: Vec<f64>,
}

impl LearningRateSchedule {
    /// Constant schedule at `base_lr`.
    pub fn constant(base_lr: f64) -> Self {
        Self {
            kind: ScheduleKind::Constant,
            parameters: BTreeMap::from([("base_lr".to_string(), base_lr)]),
            milestones: Vec::new(),
            factors: Vec::new(),
        }
    }

    /// Base rate of the schedule.
    pub fn base_lr(&self) -> f64 {
        self.param("base_lr", 1e-3)
    }

    fn param(&self, name: &str, default: f64) -> f64 {
        self.parameters.get(name).copied().unwrap_or(default)
    }

    /// Learning rate at a training step.
    pub fn rate_at(&self, step: usize) -> f64 {
        let base = self.base_lr();
        match self.kind {
            ScheduleKind::Constant | ScheduleKind::Adaptive => base,
            ScheduleKind::Decay => {
                if self.milestones.is_empty() {
                    base * self.param("gamma", 1.0).powi(step as i32)
                } else {
                    self.milestones
                        .iter()
                        .zip(&self.factors)
                        .filter(|(m, _)| step >= **m)
                        .fold(base, |lr, (_, f)| lr * f)
                }
            }
            ScheduleKind::Cyclic => {
                let min = self.param("min_lr", base * 0.1);
                let max = self.param("max_lr", base);
                let period = self.param("period", 10.0).max(1.0);
                let phase = (step as f64 % (2.0 * period)) / period;
                let tri = if phase <= 1.0 { phase } else { 2.0 - phase };
                min + (max - min) * tri
            }
            ScheduleKind::WarmRestart => {
                let min = self.param("min_lr", base * 0.01);
                let period = self.param("period", 10.0).max(1.0);
                let t = step as f64 % period;
                min + 0.5 * (base - min) * (1.0 + (std::f64::consts::PI * t / period).cos())
            }
        }
    }
}

/// Kind of input feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Real-valued input
    Numerical,
    /// Label from a finite set
    Categorical,
    /// Free text
    Text,
    /// Timestamp or duration
    Temporal,
    /// Produced by feature engineering
    Derived,
}

/// An input feature of an algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Feature name
    pub name: String,
    /// Feature kind
    pub kind: FeatureKind,
    /// Estimated importance, in [0, 1]
    pub importance: f64,
    /// Transformations applied in order
    pub transformations: Vec<String>,
    /// Encoding used when fed to the algorithm
    pub encoding: String,
}

impl FeatureSpec {
    /// Create a raw feature with no transformations.
    pub fn new(name: impl Into<String>, kind: FeatureKind, importance: f64) -> Self {
        let encoding = match kind {
            FeatureKind::Categorical => "one_hot",
            FeatureKind::Text => "bag_of_words",
            FeatureKind::Temporal => "timestamp",
            FeatureKind::Numerical | FeatureKind::Derived => "raw",
        };
        Self {
            name: name.into(),
            kind,
            importance: importance.clamp(0.0, 1.0),
            transformations: Vec::new(),
            encoding: encoding.to_string(),
        }
    }

    /// Append a transformation.
    pub fn with_transformation(mut self, transformation: impl Into<String>) -> Self {
        self.transformations.push(transformation.into());
        self
    }
}
