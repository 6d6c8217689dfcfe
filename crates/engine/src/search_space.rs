//! Search space construction and sampling.

use rand::Rng;
use selfopt_core::{
    AlgorithmRecord, AlgorithmType, Constraint, Direction, Objective, ParamValue, ParameterRange,
    ParameterSet, ParameterSpec, Scale, SearchSpace,
};
use std::collections::HashMap;

/// Importance gained by a parameter for each applied improvement it took part in.
const HISTORY_BIAS: f64 = 0.1;

/// Derives the search space of an algorithm from its type and history.
#[derive(Debug, Clone)]
pub struct SearchSpaceBuilder {
    defaults: Vec<ParameterSpec>,
    tolerance: f64,
}

impl Default for SearchSpaceBuilder {
    fn default() -> Self {
        Self {
            defaults: vec![
                ParameterSpec::continuous("learning_rate", 1e-5, 1e-1)
                    .log_scale()
                    .with_importance(0.9),
                ParameterSpec::discrete("batch_size", 8, 512)
                    .log_scale()
                    .with_importance(0.6),
                ParameterSpec::discrete("depth", 1, 12).with_importance(0.5),
                ParameterSpec::continuous("dropout", 0.0, 0.5).with_importance(0.4),
            ],
            tolerance: 0.0,
        }
    }
}

impl SearchSpaceBuilder {
    /// Builder with the standard default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default parameters shared by every algorithm type.
    pub fn with_defaults(mut self, defaults: Vec<ParameterSpec>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Minimum relative gain on the target metric before a result is applied.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    /// Build the space for one optimization call.
    ///
    /// Pure: the same record always yields the same space.
    pub fn build(&self, record: &AlgorithmRecord, metric: &str) -> SearchSpace {
        let mut parameters = self.defaults.clone();
        parameters.extend(type_extensions(record.algorithm_type));

        // Parameters the record carries but no default covers are searched
        // around their current value.
        for (name, value) in &record.parameters {
            if parameters.iter().any(|p| &p.name == name) {
                continue;
            }
            parameters.push(around_current(name, value));
        }

        let bias = history_bias(record);
        for spec in &mut parameters {
            if let Some(extra) = bias.get(&spec.name) {
                spec.importance = (spec.importance + extra).min(1.0);
            }
        }

        let constraints = match record.algorithm_type {
            AlgorithmType::Neural => Vec::new(),
            _ => vec![Constraint {
                parameter: "depth".to_string(),
                min: None,
                max: Some(4.0),
            }],
        };

        SearchSpace {
            parameters,
            constraints,
            objectives: vec![Objective {
                metric: metric.to_string(),
                direction: Direction::Maximize,
                weight: 1.0,
                tolerance: self.tolerance,
            }],
        }
    }
}

fn type_extensions(algorithm_type: AlgorithmType) -> Vec<ParameterSpec> {
    match algorithm_type {
        AlgorithmType::Neural => vec![
            ParameterSpec::categorical("optimizer", ["sgd", "adam", "adamw", "rmsprop"]).with_importance(0.7),
            ParameterSpec::continuous("weight_decay", 1e-6, 1e-2)
                .log_scale()
                .with_importance(0.3),
        ],
        AlgorithmType::Statistical => vec![
            ParameterSpec::continuous("regularization", 1e-4, 10.0)
                .log_scale()
                .with_importance(0.7),
            ParameterSpec::discrete("max_iterations", 100, 5000).with_importance(0.3),
        ],
        AlgorithmType::Heuristic => vec![
            ParameterSpec::discrete("population_size", 10, 200).with_importance(0.6),
            ParameterSpec::continuous("mutation_rate", 0.001, 0.5).with_importance(0.7),
            ParameterSpec::continuous("crossover_rate", 0.1, 1.0).with_importance(0.5),
        ],
        AlgorithmType::Ensemble => vec![
            ParameterSpec::discrete("n_estimators", 10, 500).with_importance(0.7),
            ParameterSpec::continuous("max_features", 0.1, 1.0).with_importance(0.5),
            ParameterSpec::categorical("aggregation", ["mean", "vote", "stacking"]).with_importance(0.4),
        ],
    }
}

fn around_current(name: &str, value: &ParamValue) -> ParameterSpec {
    match value {
        ParamValue::Float(v) if *v != 0.0 => {
            let (a, b) = (v * 0.5, v * 2.0);
            ParameterSpec::continuous(name, a.min(b), a.max(b))
        }
        ParamValue::Float(_) => ParameterSpec::continuous(name, -1.0, 1.0),
        ParamValue::Int(v) => {
            let (a, b) = (v / 2, v.saturating_mul(2));
            ParameterSpec::discrete(name, a.min(b), a.max(b))
        }
        ParamValue::Category(c) => ParameterSpec::categorical(name, [c.clone()]),
    }
}

fn history_bias(record: &AlgorithmRecord) -> HashMap<String, f64> {
    let mut bias: HashMap<String, f64> = HashMap::new();
    for event in &record.improvement_history {
        if !event.applied || event.improvement <= 0.0 {
            continue;
        }
        for name in &event.changed_parameters {
            *bias.entry(name.clone()).or_default() += HISTORY_BIAS;
        }
    }
    bias
}

/// Position of a value inside its parameter range, in [0, 1].
///
/// Log-scaled parameters are measured in log space. Categorical values map to
/// their index.
pub fn to_unit(spec: &ParameterSpec, value: &ParamValue) -> f64 {
    let log = spec.scale == Scale::Log;
    let unit = match (&spec.range, value) {
        (ParameterRange::Categorical { choices }, ParamValue::Category(c)) => {
            let idx = choices.iter().position(|x| x == c).unwrap_or(0);
            if choices.len() <= 1 {
                0.0
            } else {
                idx as f64 / (choices.len() - 1) as f64
            }
        }
        (ParameterRange::Continuous { low, high }, v) => span_position(*low, *high, v.as_f64(), log),
        (ParameterRange::Discrete { low, high }, v) => {
            span_position(*low as f64, *high as f64, v.as_f64(), log)
        }
        _ => 0.5,
    };
    unit.clamp(0.0, 1.0)
}

fn span_position(low: f64, high: f64, value: Option<f64>, log: bool) -> f64 {
    let Some(v) = value else { return 0.5 };
    let (low, high, v) = if log {
        (low.ln(), high.ln(), v.max(f64::MIN_POSITIVE).ln())
    } else {
        (low, high, v)
    };
    if high - low <= 0.0 {
        0.0
    } else {
        (v - low) / (high - low)
    }
}

/// Value at a position in [0, 1] of the parameter range.
pub fn from_unit(spec: &ParameterSpec, unit: f64) -> ParamValue {
    let unit = unit.clamp(0.0, 1.0);
    let log = spec.scale == Scale::Log;
    match &spec.range {
        ParameterRange::Continuous { low, high } => {
            ParamValue::Float(interpolate(*low, *high, unit, log).clamp(*low, *high))
        }
        ParameterRange::Discrete { low, high } => {
            let v = interpolate(*low as f64, *high as f64, unit, log).round() as i64;
            ParamValue::Int(v.clamp(*low, *high))
        }
        ParameterRange::Categorical { choices } => {
            if choices.is_empty() {
                return ParamValue::Category(String::new());
            }
            let idx = (unit * (choices.len() - 1) as f64).round() as usize;
            ParamValue::Category(choices[idx.min(choices.len() - 1)].clone())
        }
    }
}

fn interpolate(low: f64, high: f64, unit: f64, log: bool) -> f64 {
    if log {
        (low.ln() + unit * (high.ln() - low.ln())).exp()
    } else {
        low + unit * (high - low)
    }
}

/// Draw one value uniformly (in the parameter's scale) from its range.
pub fn sample_param<R: Rng + ?Sized>(spec: &ParameterSpec, rng: &mut R) -> ParamValue {
    match &spec.range {
        ParameterRange::Categorical { choices } if !choices.is_empty() => {
            ParamValue::Category(choices[rng.gen_range(0..choices.len())].clone())
        }
        ParameterRange::Discrete { low, high } if spec.scale != Scale::Log => {
            ParamValue::Int(rng.gen_range(*low..=*high))
        }
        _ => from_unit(spec, rng.gen_range(0.0..=1.0)),
    }
}

/// Draw a full assignment uniformly from the space.
pub fn sample<R: Rng + ?Sized>(space: &SearchSpace, rng: &mut R) -> ParameterSet {
    let mut params: ParameterSet = space
        .parameters
        .iter()
        .map(|spec| (spec.name.clone(), sample_param(spec, rng)))
        .collect();
    enforce_constraints(space, &mut params);
    params
}

/// Sample around `center`: each parameter moves at most `width / 2` (in unit
/// space) from its current position. Parameters are varied with probability
/// equal to their importance, so high-impact parameters are explored most.
pub fn narrow<R: Rng + ?Sized>(
    space: &SearchSpace,
    center: &ParameterSet,
    width: f64,
    rng: &mut R,
) -> ParameterSet {
    let half = (width / 2.0).clamp(0.0, 0.5);
    let mut params = ParameterSet::new();
    for spec in &space.parameters {
        let value = match center.get(&spec.name) {
            Some(current) if rng.gen_range(0.0..1.0) >= spec.importance => current.clone(),
            Some(current) => {
                let unit = to_unit(spec, current) + rng.gen_range(-half..=half);
                from_unit(spec, unit)
            }
            None => sample_param(spec, rng),
        };
        params.insert(spec.name.clone(), value);
    }
    enforce_constraints(space, &mut params);
    params
}

/// Mutate each parameter with probability `rate` scaled by its importance.
///
/// Numeric parameters move by up to 10% of their range; categorical ones are
/// redrawn.
pub fn perturb<R: Rng + ?Sized>(
    space: &SearchSpace,
    params: &ParameterSet,
    rate: f64,
    rng: &mut R,
) -> (ParameterSet, Vec<String>) {
    let mut out = params.clone();
    let mut mutated = Vec::new();
    for spec in &space.parameters {
        let probability = (rate * (0.5 + spec.importance)).clamp(0.0, 1.0);
        if rng.gen_range(0.0..1.0) >= probability {
            continue;
        }
        let value = match (&spec.range, params.get(&spec.name)) {
            (ParameterRange::Categorical { .. }, _) | (_, None) => sample_param(spec, rng),
            (_, Some(current)) => {
                let unit = to_unit(spec, current) + rng.gen_range(-0.1..=0.1);
                from_unit(spec, unit)
            }
        };
        out.insert(spec.name.clone(), value);
        mutated.push(spec.name.clone());
    }
    enforce_constraints(space, &mut out);
    (out, mutated)
}

/// Clamp numeric values into the bounds of every constraint.
pub fn enforce_constraints(space: &SearchSpace, params: &mut ParameterSet) {
    for constraint in &space.constraints {
        let Some(value) = params.get_mut(&constraint.parameter) else {
            continue;
        };
        match value {
            ParamValue::Float(v) => {
                if let Some(min) = constraint.min {
                    *v = v.max(min);
                }
                if let Some(max) = constraint.max {
                    *v = v.min(max);
                }
            }
            ParamValue::Int(v) => {
                if let Some(min) = constraint.min {
                    *v = (*v).max(min.ceil() as i64);
                }
                if let Some(max) = constraint.max {
                    *v = (*v).min(max.floor() as i64);
                }
            }
            ParamValue::Category(_) => {}
        }
    }
}

/// Enumerates a discretized space.
///
/// Parameters are ordered by importance and the most important one varies
/// fastest, so a budget-capped walk covers high-impact parameters first.
pub struct GridIter {
    axes: Vec<(String, Vec<ParamValue>)>,
    indices: Vec<usize>,
    done: bool,
}

impl GridIter {
    /// Grid over `space` with numeric ranges cut into `levels` points.
    pub fn new(space: &SearchSpace, levels: usize) -> Self {
        let levels = levels.max(2);
        let mut specs: Vec<&ParameterSpec> = space.parameters.iter().collect();
        specs.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        let axes: Vec<(String, Vec<ParamValue>)> = specs
            .into_iter()
            .map(|spec| {
                let values = match &spec.range {
                    ParameterRange::Categorical { choices } => {
                        choices.iter().cloned().map(ParamValue::Category).collect()
                    }
                    ParameterRange::Discrete { low, high } if (high - low + 1) as usize <= levels => {
                        (*low..=*high).map(ParamValue::Int).collect()
                    }
                    _ => {
                        let mut values: Vec<ParamValue> = (0..levels)
                            .map(|i| from_unit(spec, i as f64 / (levels - 1) as f64))
                            .collect();
                        values.dedup();
                        values
                    }
                };
                (spec.name.clone(), values)
            })
            .collect();

        let done = axes.iter().any(|(_, values)| values.is_empty());
        Self {
            indices: vec![0; axes.len()],
            axes,
            done,
        }
    }
}

impl Iterator for GridIter {
    type Item = ParameterSet;

    fn next(&mut self) -> Option<ParameterSet> {
        if self.done {
            return None;
        }
        let point = self
            .axes
            .iter()
            .zip(&self.indices)
            .map(|((name, values), &i)| (name.clone(), values[i].clone()))
            .collect();

        // Advance the odometer, first axis fastest.
        self.done = true;
        for (idx, (_, values)) in self.indices.iter_mut().zip(&self.axes) {
            *idx += 1;
            if *idx < values.len() {
                self.done = false;
                break;
            }
            *idx = 0;
        }
        Some(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use selfopt_core::{ImprovementEvent, ImprovementKind};

    fn neural() -> AlgorithmRecord {
        AlgorithmRecord::new("net", AlgorithmType::Neural).with_metric("accuracy", 0.7)
    }

    #[test]
    fn test_build_includes_defaults_and_extensions() {
        let space = SearchSpaceBuilder::new().build(&neural(), "accuracy");
        for name in ["learning_rate", "batch_size", "depth", "dropout", "optimizer", "weight_decay"] {
            assert!(space.parameter(name).is_some(), "missing {}", name);
        }
        assert_eq!(space.validate(), Ok(()));
        assert!(space.constraints.is_empty());

        let stat = AlgorithmRecord::new("s", AlgorithmType::Statistical);
        let space = SearchSpaceBuilder::new().build(&stat, "accuracy");
        assert!(space.parameter("regularization").is_some());
        assert!(space.parameter("optimizer").is_none());
        assert_eq!(space.constraints.len(), 1);
    }

    #[test]
    fn test_build_is_deterministic() {
        let record = neural().with_parameter("momentum", ParamValue::Float(0.9));
        let builder = SearchSpaceBuilder::new();
        assert_eq!(builder.build(&record, "accuracy"), builder.build(&record, "accuracy"));

        let momentum = builder.build(&record, "accuracy").parameter("momentum").cloned().unwrap();
        assert_eq!(momentum.range, ParameterRange::Continuous { low: 0.45, high: 1.8 });
    }

    #[test]
    fn test_single_target_objective() {
        let space = SearchSpaceBuilder::new().with_tolerance(0.05).build(&neural(), "f1");
        assert_eq!(space.objectives.len(), 1);
        assert_eq!(space.objectives[0].metric, "f1");
        assert_eq!(space.objectives[0].weight, 1.0);
        assert_eq!(space.tolerance("f1"), 0.05);
        assert_eq!(SearchSpaceBuilder::new().build(&neural(), "f1").tolerance("f1"), 0.0);
    }

    #[test]
    fn test_history_raises_importance() {
        let mut record = neural();
        let event = ImprovementEvent::new(ImprovementKind::Hyperparameter, "random", 0.7, 0.8)
            .applied(true)
            .with_changes(vec!["dropout".to_string()]);
        record.record_event(event);

        let space = SearchSpaceBuilder::new().build(&record, "accuracy");
        let dropout = space.parameter("dropout").unwrap();
        assert!((dropout.importance - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_samples_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for algorithm_type in [
            AlgorithmType::Neural,
            AlgorithmType::Statistical,
            AlgorithmType::Heuristic,
            AlgorithmType::Ensemble,
        ] {
            let record = AlgorithmRecord::new("a", algorithm_type);
            let space = SearchSpaceBuilder::new().build(&record, "accuracy");
            let mut current = sample(&space, &mut rng);
            for _ in 0..200 {
                assert!(space.contains(&sample(&space, &mut rng)));
                let narrowed = narrow(&space, &current, 0.3, &mut rng);
                assert!(space.contains(&narrowed));
                let (mutated, _) = perturb(&space, &narrowed, 0.5, &mut rng);
                assert!(space.contains(&mutated));
                current = mutated;
            }
        }
    }

    #[test]
    fn test_unit_mapping_respects_log_scale() {
        let spec = ParameterSpec::continuous("lr", 1e-4, 1e-2).log_scale();
        let mid = from_unit(&spec, 0.5).as_f64().unwrap();
        assert!((mid - 1e-3).abs() < 1e-9);
        assert!((to_unit(&spec, &ParamValue::Float(1e-3)) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_grid_enumerates_every_point_once() {
        let space = SearchSpace {
            parameters: vec![
                ParameterSpec::continuous("x", 0.0, 1.0).with_importance(0.9),
                ParameterSpec::categorical("c", ["a", "b"]).with_importance(0.1),
            ],
            constraints: vec![],
            objectives: vec![],
        };
        let points: Vec<ParameterSet> = GridIter::new(&space, 3).collect();
        assert_eq!(points.len(), 6);
        // most important axis varies fastest
        assert_eq!(points[0]["x"], ParamValue::Float(0.0));
        assert_eq!(points[1]["x"], ParamValue::Float(0.5));
        assert_eq!(points[0]["c"], points[2]["c"]);
        assert_ne!(points[0]["c"], points[3]["c"]);
    }
}
