//! Learning-rate adaptation from a performance trajectory.

use selfopt_core::{improvement, AlgorithmId, AlgorithmRecord, LearningRateSchedule, ScheduleKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Volatility above which the adaptive (reduce-on-plateau) method is chosen.
pub const VOLATILITY_THRESHOLD: f64 = 0.05;

/// Absolute slope below which a trajectory counts as flat.
pub const PLATEAU_SLOPE: f64 = 0.002;

/// Steps over which a schedule's effect is projected.
const HORIZON: usize = 20;

/// Rate used when the record carries none.
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;

/// Shape of a performance trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningDynamics {
    /// Number of observations
    pub samples: usize,
    /// Least-squares slope per step
    pub trend: f64,
    /// Standard deviation of step-to-step changes
    pub volatility: f64,
    /// Whether progress has stalled
    pub plateau: bool,
    /// Best observation
    pub best: f64,
    /// Most recent observation
    pub last: f64,
}

impl LearningDynamics {
    /// Analyze an ordered series of scores.
    pub fn analyze(history: &[f64]) -> Self {
        let samples = history.len();
        let last = history.last().copied().unwrap_or(0.0);
        let best = history.iter().copied().fold(0.0, f64::max);
        if samples < 2 {
            return Self {
                samples,
                trend: 0.0,
                volatility: 0.0,
                plateau: false,
                best,
                last,
            };
        }

        let n = samples as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = history.iter().sum::<f64>() / n;
        let (mut cov, mut var) = (0.0, 0.0);
        for (i, y) in history.iter().enumerate() {
            let dx = i as f64 - mean_x;
            cov += dx * (y - mean_y);
            var += dx * dx;
        }
        let trend = if var > 0.0 { cov / var } else { 0.0 };

        let diffs: Vec<f64> = history.windows(2).map(|w| w[1] - w[0]).collect();
        let mean_diff = diffs.iter().sum::<f64>() / diffs.len() as f64;
        let volatility =
            (diffs.iter().map(|d| (d - mean_diff).powi(2)).sum::<f64>() / diffs.len() as f64).sqrt();

        Self {
            samples,
            trend,
            volatility,
            plateau: samples >= 4 && trend.abs() < PLATEAU_SLOPE,
            best,
            last,
        }
    }
}

/// How a new schedule is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationMethod {
    /// Cosine annealing with warm restarts
    Cosine,
    /// Smooth exponential decay
    Exponential,
    /// Milestone step decay
    Step,
    /// Reduce on plateau
    Adaptive,
    /// Cyclic schedule learned from past runs
    MetaLearned,
}

impl AdaptationMethod {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptationMethod::Cosine => "cosine",
            AdaptationMethod::Exponential => "exponential",
            AdaptationMethod::Step => "step",
            AdaptationMethod::Adaptive => "adaptive",
            AdaptationMethod::MetaLearned => "meta_learned",
        }
    }
}

impl std::fmt::Display for AdaptationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdaptationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "cosine" => Ok(AdaptationMethod::Cosine),
            "exponential" => Ok(AdaptationMethod::Exponential),
            "step" => Ok(AdaptationMethod::Step),
            "adaptive" => Ok(AdaptationMethod::Adaptive),
            "meta_learned" => Ok(AdaptationMethod::MetaLearned),
            other => Err(format!("unknown adaptation method: {}", other)),
        }
    }
}

/// Outcome of a learning-rate adaptation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRateAdaptation {
    /// Adapted algorithm
    pub algorithm_id: AlgorithmId,
    /// Method used
    pub method: AdaptationMethod,
    /// Trajectory analysis the method was chosen from
    pub dynamics: LearningDynamics,
    /// Proposed schedule
    pub schedule: LearningRateSchedule,
    /// Schedule active before the call
    pub previous_schedule: Option<LearningRateSchedule>,
    /// Projected score after adopting the schedule
    pub predicted_score: f64,
    /// Relative change from the last observation to the projection
    pub improvement: f64,
    /// Whether the schedule passed validation and was stored
    pub accepted: bool,
}

/// Choose the adaptation method for a trajectory.
pub fn select_method(dynamics: &LearningDynamics, requested: Option<AdaptationMethod>) -> AdaptationMethod {
    if let Some(method) = requested {
        return method;
    }
    if dynamics.volatility > VOLATILITY_THRESHOLD {
        AdaptationMethod::Adaptive
    } else if dynamics.plateau {
        AdaptationMethod::Cosine
    } else if dynamics.trend < 0.0 {
        AdaptationMethod::Step
    } else {
        AdaptationMethod::Exponential
    }
}

/// Base rate of a record: its `learning_rate` parameter, else its
/// `learningRate` metric, else [`DEFAULT_LEARNING_RATE`].
pub fn base_learning_rate(record: &AlgorithmRecord) -> f64 {
    record
        .parameters
        .get("learning_rate")
        .and_then(|v| v.as_f64())
        .or_else(|| record.score("learningRate"))
        .filter(|lr| lr.is_finite() && *lr > 0.0)
        .unwrap_or(DEFAULT_LEARNING_RATE)
}

/// Build the schedule a method prescribes.
pub fn build_schedule(method: AdaptationMethod, base_lr: f64) -> LearningRateSchedule {
    let params = |pairs: &[(&str, f64)]| -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    };
    match method {
        AdaptationMethod::Cosine => LearningRateSchedule {
            kind: ScheduleKind::WarmRestart,
            parameters: params(&[("base_lr", base_lr), ("min_lr", base_lr * 0.01), ("period", 10.0)]),
            milestones: Vec::new(),
            factors: Vec::new(),
        },
        AdaptationMethod::Exponential => LearningRateSchedule {
            kind: ScheduleKind::Decay,
            parameters: params(&[("base_lr", base_lr), ("gamma", 0.95)]),
            milestones: Vec::new(),
            factors: Vec::new(),
        },
        AdaptationMethod::Step => LearningRateSchedule {
            kind: ScheduleKind::Decay,
            parameters: params(&[("base_lr", base_lr)]),
            milestones: vec![5, 15, 30],
            factors: vec![0.5, 0.5, 0.5],
        },
        AdaptationMethod::Adaptive => LearningRateSchedule {
            kind: ScheduleKind::Adaptive,
            parameters: params(&[
                ("base_lr", base_lr),
                ("patience", 3.0),
                ("factor", 0.5),
                ("min_lr", base_lr * 1e-3),
            ]),
            milestones: Vec::new(),
            factors: Vec::new(),
        },
        AdaptationMethod::MetaLearned => LearningRateSchedule {
            kind: ScheduleKind::Cyclic,
            parameters: params(&[
                ("base_lr", base_lr),
                ("min_lr", base_lr * 0.1),
                ("max_lr", base_lr),
                ("period", 8.0),
            ]),
            milestones: Vec::new(),
            factors: Vec::new(),
        },
    }
}

/// Projected score after [`HORIZON`] steps under `schedule`.
///
/// The current trend continues at a speed proportional to the mean rate
/// relative to the base rate; volatility costs in proportion to that rate.
pub fn predict_score(dynamics: &LearningDynamics, schedule: &LearningRateSchedule) -> f64 {
    let base = schedule.base_lr();
    let relative = if base > 0.0 {
        (0..HORIZON).map(|t| schedule.rate_at(t)).sum::<f64>() / (HORIZON as f64 * base)
    } else {
        0.0
    };
    let projected = dynamics.last + dynamics.trend * HORIZON as f64 * relative - 0.5 * dynamics.volatility * relative;
    projected.clamp(0.0, 1.0)
}

/// Derive, project and validate a schedule.
///
/// A schedule is rejected when its projection falls more than `tolerance`
/// below the best known score: the trajectory's best or the record's
/// stored `metric`, whichever is higher. Trajectories with fewer than two
/// samples carry no trend and get a constant schedule.
pub fn adapt(
    record: &AlgorithmRecord,
    history: &[f64],
    metric: &str,
    requested: Option<AdaptationMethod>,
    tolerance: f64,
) -> LearningRateAdaptation {
    let dynamics = LearningDynamics::analyze(history);
    let method = select_method(&dynamics, requested);
    let base = base_learning_rate(record);
    let schedule = if dynamics.samples < 2 {
        LearningRateSchedule::constant(base)
    } else {
        build_schedule(method, base)
    };
    let predicted_score = predict_score(&dynamics, &schedule);
    let best = record
        .score(metric)
        .filter(|s| s.is_finite())
        .map_or(dynamics.best, |s| s.max(dynamics.best));
    let accepted = predicted_score >= best - tolerance;

    LearningRateAdaptation {
        algorithm_id: record.id.clone(),
        method,
        improvement: improvement(dynamics.last, predicted_score),
        previous_schedule: record.learning_rate_schedule.clone(),
        dynamics,
        schedule,
        predicted_score,
        accepted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfopt_core::{AlgorithmType, ParamValue};

    fn record() -> AlgorithmRecord {
        AlgorithmRecord::new("net", AlgorithmType::Neural)
    }

    #[test]
    fn test_dynamics_of_linear_series() {
        let d = LearningDynamics::analyze(&[0.5, 0.6, 0.7, 0.8]);
        assert!((d.trend - 0.1).abs() < 1e-9);
        assert!(d.volatility < 1e-9);
        assert!(!d.plateau);
        assert_eq!(d.best, 0.8);
        assert_eq!(d.last, 0.8);
    }

    #[test]
    fn test_method_rule() {
        let volatile = LearningDynamics::analyze(&[0.5, 0.8, 0.4, 0.9, 0.5]);
        assert_eq!(select_method(&volatile, None), AdaptationMethod::Adaptive);

        let flat = LearningDynamics::analyze(&[0.7, 0.7, 0.7, 0.7, 0.7]);
        assert_eq!(select_method(&flat, None), AdaptationMethod::Cosine);

        let falling = LearningDynamics::analyze(&[0.8, 0.78, 0.76, 0.74]);
        assert_eq!(select_method(&falling, None), AdaptationMethod::Step);

        let rising = LearningDynamics::analyze(&[0.6, 0.62, 0.64, 0.66]);
        assert_eq!(select_method(&rising, None), AdaptationMethod::Exponential);
        assert_eq!(
            select_method(&rising, Some(AdaptationMethod::MetaLearned)),
            AdaptationMethod::MetaLearned
        );
    }

    #[test]
    fn test_base_rate_sources() {
        assert_eq!(base_learning_rate(&record()), DEFAULT_LEARNING_RATE);
        assert_eq!(base_learning_rate(&record().with_metric("learningRate", 0.01)), 0.01);
        let with_param = record()
            .with_metric("learningRate", 0.01)
            .with_parameter("learning_rate", ParamValue::Float(0.05));
        assert_eq!(base_learning_rate(&with_param), 0.05);
    }

    #[test]
    fn test_schedules_decrease_or_cycle_within_base() {
        for method in [
            AdaptationMethod::Cosine,
            AdaptationMethod::Exponential,
            AdaptationMethod::Step,
            AdaptationMethod::Adaptive,
            AdaptationMethod::MetaLearned,
        ] {
            let schedule = build_schedule(method, 0.1);
            assert_eq!(schedule.base_lr(), 0.1);
            for step in 0..50 {
                let lr = schedule.rate_at(step);
                assert!(lr > 0.0 && lr <= 0.1 + 1e-12, "{} at {}: {}", method, step, lr);
            }
        }
    }

    #[test]
    fn test_rising_trajectory_accepted() {
        let result = adapt(&record(), &[0.6, 0.62, 0.64, 0.66], "accuracy", None, 0.05);
        assert!(result.accepted);
        assert!(result.predicted_score > 0.66);
        assert!(result.improvement > 0.0);
    }

    #[test]
    fn test_steep_decline_rejected() {
        let result = adapt(&record(), &[0.9, 0.85, 0.8, 0.75, 0.7], "accuracy", None, 0.05);
        assert_eq!(result.method, AdaptationMethod::Step);
        assert!(!result.accepted);
        assert!(result.predicted_score < 0.85);
    }

    #[test]
    fn test_projection_below_stored_score_rejected() {
        let stored = record().with_metric("accuracy", 0.9);
        let result = adapt(&stored, &[0.5, 0.51, 0.52, 0.53], "accuracy", None, 0.05);
        assert_eq!(result.dynamics.best, 0.53);
        assert!(result.predicted_score < 0.85);
        assert!(!result.accepted);

        // Without a stored score the same trajectory is judged on its own best.
        let result = adapt(&record(), &[0.5, 0.51, 0.52, 0.53], "accuracy", None, 0.05);
        assert!(result.accepted);
    }

    #[test]
    fn test_single_sample_gets_constant_schedule() {
        let result = adapt(&record(), &[0.7], "accuracy", None, 0.05);
        assert_eq!(result.schedule.kind, ScheduleKind::Constant);
        assert_eq!(result.schedule.base_lr(), DEFAULT_LEARNING_RATE);
        assert_eq!(result.predicted_score, 0.7);
        assert!(result.accepted);
    }
}
