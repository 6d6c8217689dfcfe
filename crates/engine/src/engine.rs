//! The self-optimization engine: registry access, per-algorithm leases, and
//! the public operations.

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use selfopt_core::{
    changed_parameters, improvement, AlgorithmId, AlgorithmRecord, AlgorithmType, FeatureSpec,
    HyperparameterResult, ImprovementEvent, ImprovementKind, OptimizationMethod, ParameterSet,
    TransferInsight, VersionId,
};
use selfopt_storage::PerformanceStore;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::architecture::{
    decode, efficiency, encode, io_sizes, search_architecture, select_architecture_method, ArchitectureObjective,
    ArchitectureOptimization, ArchitectureSearchMethod,
};
use crate::config::EngineConfig;
use crate::error::{EvaluationError, OptimizationError, Result};
use crate::evaluator::{checked_evaluate, Evaluator};
use crate::evolution::{self, BatchEvolution, EvolutionApplication, EvolutionRun};
use crate::features::{self, FeatureEngineering};
use crate::genetic::Origin;
use crate::hyperparameter::run_strategy;
use crate::insights::{summarize, OptimizationInsights};
use crate::learning_rate::{self, AdaptationMethod, LearningRateAdaptation};
use crate::runner::SearchRun;
use crate::search_space::SearchSpaceBuilder;
use crate::strategy::{select_strategy, MetaStatistics};
use crate::transfer::{self, TransferApplication, TransferReport, ARCHITECTURE_CAPABILITY, SCHEDULE_CAPABILITY};

type Leases = StdMutex<HashSet<AlgorithmId>>;

fn lock_leases(leases: &Leases) -> MutexGuard<'_, HashSet<AlgorithmId>> {
    leases.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive right to optimize one algorithm; released on drop.
struct Lease<'a> {
    leases: &'a Leases,
    id: AlgorithmId,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        lock_leases(self.leases).remove(&self.id);
    }
}

/// Drives every optimizer against a performance registry.
///
/// At most one optimizing operation runs per algorithm id; a concurrent call
/// for a busy id fails fast with [`OptimizationError::AlreadyOptimizing`].
/// Different ids proceed independently.
pub struct SelfOptimizationEngine<S: PerformanceStore> {
    store: Arc<S>,
    evaluator: Arc<dyn Evaluator>,
    config: EngineConfig,
    builder: SearchSpaceBuilder,
    leases: Leases,
    meta: Mutex<MetaStatistics>,
    pending: Mutex<HashMap<AlgorithmId, EvolutionRun>>,
    last_transfer: Mutex<Vec<TransferInsight>>,
}

impl<S: PerformanceStore> SelfOptimizationEngine<S> {
    /// Create an engine over a store and an evaluator.
    pub fn new(store: Arc<S>, evaluator: Arc<dyn Evaluator>, config: EngineConfig) -> Self {
        Self {
            store,
            evaluator,
            config,
            builder: SearchSpaceBuilder::default(),
            leases: StdMutex::new(HashSet::new()),
            meta: Mutex::new(MetaStatistics::new()),
            pending: Mutex::new(HashMap::new()),
            last_transfer: Mutex::new(Vec::new()),
        }
    }

    /// Replace the search space builder.
    pub fn with_search_space_builder(mut self, builder: SearchSpaceBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying registry.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn lease(&self, id: &AlgorithmId) -> Result<Lease<'_>> {
        if !lock_leases(&self.leases).insert(id.clone()) {
            return Err(OptimizationError::AlreadyOptimizing(id.clone()));
        }
        Ok(Lease {
            leases: &self.leases,
            id: id.clone(),
        })
    }

    /// Seeds for a meta-learned search. Statistics for a type with no
    /// in-process history are first filled from the registry, so runs of
    /// earlier processes still count.
    async fn meta_seeds(&self, algorithm_type: AlgorithmType, metric: &str) -> Result<Vec<ParameterSet>> {
        let mut meta = self.meta.lock().await;
        if meta.len(algorithm_type) == 0 {
            let records = self.store.list_algorithms().await?;
            let taken = meta.absorb(&records, metric);
            debug!(%algorithm_type, taken, "meta statistics loaded from registry");
        }
        Ok(meta.seeds(algorithm_type))
    }

    fn rng_for(&self, id: &AlgorithmId) -> StdRng {
        match self.config.seed {
            Some(seed) => {
                let mut hasher = DefaultHasher::new();
                id.hash(&mut hasher);
                StdRng::seed_from_u64(seed ^ hasher.finish())
            }
            None => StdRng::from_entropy(),
        }
    }

    fn deadline_from(&self, started: Instant) -> Option<Instant> {
        self.config.deadline().map(|d| started + d)
    }

    fn metric<'m>(&'m self, metric: Option<&'m str>) -> &'m str {
        metric.unwrap_or(&self.config.default_metric)
    }

    // === Registry ===

    /// Register a new algorithm.
    pub async fn register_algorithm(&self, record: AlgorithmRecord) -> Result<AlgorithmRecord> {
        self.store.register_algorithm(&record).await?;
        info!(algorithm = %record.id, kind = %record.algorithm_type, "registered algorithm");
        Ok(record)
    }

    /// Load one algorithm record.
    pub async fn get_algorithm(&self, id: &AlgorithmId) -> Result<AlgorithmRecord> {
        Ok(self.store.load_algorithm(id).await?)
    }

    /// All registered algorithms.
    pub async fn list_algorithms(&self) -> Result<Vec<AlgorithmRecord>> {
        Ok(self.store.list_algorithms().await?)
    }

    // === Hyperparameters ===

    /// Optimize hyperparameters with the automatically selected strategy.
    pub async fn optimize_hyperparameters(
        &self,
        id: &AlgorithmId,
        metric: Option<&str>,
    ) -> Result<HyperparameterResult> {
        self.optimize_hyperparameters_with(id, metric, None).await
    }

    /// Optimize hyperparameters, optionally forcing a strategy.
    ///
    /// When no improvement is found the registry keeps the prior parameters
    /// and only records the attempt.
    pub async fn optimize_hyperparameters_with(
        &self,
        id: &AlgorithmId,
        metric: Option<&str>,
        method: Option<OptimizationMethod>,
    ) -> Result<HyperparameterResult> {
        let metric = self.metric(metric).to_string();
        let _lease = self.lease(id)?;
        let started = Instant::now();

        let record = self.store.load_algorithm(id).await?;
        let space = self.builder.build(&record, &metric);
        space.validate()?;
        let budget = self.config.optimization_budget;
        let method = select_strategy(&space, budget, method);
        info!(algorithm = %id, %method, budget, parameters = space.parameters.len(), "optimizing hyperparameters");

        let seeds = if method == OptimizationMethod::MetaLearned {
            self.meta_seeds(record.algorithm_type, &metric).await?
        } else {
            Vec::new()
        };
        let origin = Origin {
            version: record.version,
            parameters: record.parameters.clone(),
            fitness: record.score(&metric),
        };
        let mut rng = self.rng_for(id);
        let mut run = SearchRun::new(id, &metric, self.evaluator.as_ref(), budget)
            .with_deadline(self.deadline_from(started))
            .with_parallel(self.config.parallel_optimization);

        let termination = run_strategy(&mut run, &space, method, &self.config, &origin, seeds, &mut rng).await?;
        let (best_parameters, best_score) = run.best().cloned().ok_or_else(|| OptimizationError::OptimizationFailed {
            algorithm: id.clone(),
            cause: EvaluationError::Failed("no candidate was evaluated".to_string()),
        })?;

        let validation_score = match run.rescore(&best_parameters).await {
            Ok(score) => score,
            Err(err) => {
                warn!(algorithm = %id, error = %err, "validation re-score failed");
                best_score
            }
        };

        let prior_score = record.score(&metric).unwrap_or(0.0);
        let gain = improvement(prior_score, best_score);
        let applied = gain > space.tolerance(&metric);
        let mut new_parameters = record.parameters.clone();
        new_parameters.extend(best_parameters.clone());

        let event = ImprovementEvent::new(ImprovementKind::Hyperparameter, method.as_str(), prior_score, best_score)
            .applied(applied)
            .with_changes(changed_parameters(&record.parameters, &new_parameters))
            .with_note(format!("{:?} after {} evaluations", termination, run.evaluations()));
        let stored_parameters = new_parameters.clone();
        let stored_metric = metric.clone();
        self.store
            .update_algorithm(
                id,
                Box::new(move |r| {
                    if applied {
                        r.parameters = stored_parameters;
                        r.performance_metrics.insert(stored_metric, best_score);
                        r.version = VersionId::new();
                    }
                    r.record_event(event);
                }),
            )
            .await?;

        if applied {
            self.meta.lock().await.record(record.algorithm_type, best_score, best_parameters);
        }

        let iterations = run.evaluations();
        info!(algorithm = %id, %method, prior_score, best_score, improvement = gain, applied, "hyperparameter optimization finished");
        Ok(HyperparameterResult {
            algorithm_id: id.clone(),
            prior_parameters: record.parameters,
            new_parameters,
            prior_score,
            best_score,
            improvement: gain,
            confidence: selfopt_core::confidence(gain, iterations),
            validation_score,
            method,
            iterations,
            failed_evaluations: run.failures(),
            termination,
            applied,
            elapsed: started.elapsed(),
        })
    }

    // === Architecture ===

    /// Search for a better architecture. Neural algorithms only.
    pub async fn optimize_architecture(
        &self,
        id: &AlgorithmId,
        method: Option<ArchitectureSearchMethod>,
    ) -> Result<ArchitectureOptimization> {
        let _lease = self.lease(id)?;
        let started = Instant::now();
        let record = self.store.load_algorithm(id).await?;
        if record.algorithm_type != AlgorithmType::Neural {
            return Err(OptimizationError::NotApplicable {
                algorithm: id.clone(),
                algorithm_type: record.algorithm_type,
                operation: "architecture optimization",
            });
        }

        let metric = self.config.default_metric.clone();
        let budget = self.config.optimization_budget;
        let method = select_architecture_method(&record, budget, method);
        info!(algorithm = %id, %method, "optimizing architecture");

        let io = io_sizes(record.architecture.as_ref());
        let objective = ArchitectureObjective::new(self.evaluator.as_ref(), &record.parameters, io);
        let mut rng = self.rng_for(id);
        let mut run = SearchRun::new(id, &metric, &objective, budget)
            .with_deadline(self.deadline_from(started))
            .with_parallel(self.config.parallel_optimization);
        let termination = search_architecture(&mut run, method, &record, &self.config, &mut rng).await?;

        let (encoded, _) = run.best().cloned().ok_or_else(|| OptimizationError::OptimizationFailed {
            algorithm: id.clone(),
            cause: EvaluationError::Failed("no architecture was evaluated".to_string()),
        })?;
        let accuracy = objective
            .accuracy(id, &encoded, &metric)
            .await
            .map_err(|cause| OptimizationError::OptimizationFailed {
                algorithm: id.clone(),
                cause,
            })?;

        let new_architecture = decode(&encoded, io.0, io.1);
        let complexity = new_architecture.parameter_count();
        let efficiency = efficiency(accuracy, complexity);
        let prior_score = record.score(&metric).unwrap_or(0.0);
        let gain = improvement(prior_score, accuracy);
        let applied = gain > 0.0;

        let event = ImprovementEvent::new(ImprovementKind::Architecture, method.as_str(), prior_score, accuracy)
            .applied(applied)
            .with_note(format!("complexity {}, efficiency {:.4}", complexity, efficiency));
        let stored = new_architecture.clone();
        let stored_metric = metric.clone();
        self.store
            .update_algorithm(
                id,
                Box::new(move |r| {
                    if applied {
                        if let Some(previous) = r.architecture.take() {
                            r.architecture_history.push(previous);
                        }
                        r.architecture = Some(stored);
                        r.performance_metrics.insert(stored_metric, accuracy);
                        r.performance_metrics.insert("efficiency".to_string(), efficiency);
                        r.version = VersionId::new();
                    }
                    r.record_event(event);
                }),
            )
            .await?;

        info!(algorithm = %id, %method, accuracy, complexity, applied, "architecture optimization finished");
        Ok(ArchitectureOptimization {
            algorithm_id: id.clone(),
            method,
            prior_architecture: record.architecture,
            new_architecture,
            prior_score,
            validation_score: accuracy,
            improvement: gain,
            complexity,
            efficiency,
            iterations: run.evaluations(),
            termination,
            applied,
            elapsed: started.elapsed(),
        })
    }

    /// Restore the most recent prior architecture and re-score it.
    pub async fn rollback_architecture(&self, id: &AlgorithmId) -> Result<AlgorithmRecord> {
        let _lease = self.lease(id)?;
        let record = self.store.load_algorithm(id).await?;
        let Some(previous) = record.architecture_history.last().cloned() else {
            return Err(OptimizationError::NothingToRollBack(id.clone()));
        };

        let metric = self.config.default_metric.clone();
        let io = io_sizes(Some(&previous));
        let objective = ArchitectureObjective::new(self.evaluator.as_ref(), &record.parameters, io);
        let accuracy = objective
            .accuracy(id, &encode(&previous), &metric)
            .await
            .map_err(|cause| OptimizationError::OptimizationFailed {
                algorithm: id.clone(),
                cause,
            })?;
        let efficiency = efficiency(accuracy, previous.parameter_count());
        let prior_score = record.score(&metric).unwrap_or(0.0);

        let event = ImprovementEvent::new(ImprovementKind::Rollback, "rollback", prior_score, accuracy).applied(true);
        let updated = self
            .store
            .update_algorithm(
                id,
                Box::new(move |r| {
                    r.architecture_history.pop();
                    r.architecture = Some(previous);
                    r.performance_metrics.insert(metric, accuracy);
                    r.performance_metrics.insert("efficiency".to_string(), efficiency);
                    r.version = VersionId::new();
                    r.record_event(event);
                }),
            )
            .await?;
        info!(algorithm = %id, accuracy, "architecture rolled back");
        Ok(updated)
    }

    // === Learning rate ===

    /// Derive a learning-rate schedule from a performance series.
    ///
    /// An empty `history` falls back to the scores in the record's history.
    /// Rejected schedules leave the record untouched.
    pub async fn adapt_learning_rate(
        &self,
        id: &AlgorithmId,
        history: &[f64],
        method: Option<AdaptationMethod>,
    ) -> Result<LearningRateAdaptation> {
        let _lease = self.lease(id)?;
        let record = self.store.load_algorithm(id).await?;

        let series: Vec<f64> = if history.is_empty() {
            let mut series: Vec<f64> = record
                .improvement_history
                .iter()
                .map(|e| if e.applied { e.score_after } else { e.score_before })
                .collect();
            if series.is_empty() {
                series.extend(record.score(&self.config.default_metric));
            }
            series
        } else {
            history.to_vec()
        };

        let result = learning_rate::adapt(
            &record,
            &series,
            &self.config.default_metric,
            method,
            self.config.learning_rate_tolerance,
        );
        debug!(algorithm = %id, method = %result.method, trend = result.dynamics.trend, volatility = result.dynamics.volatility, "learning dynamics");

        if result.accepted {
            let schedule = result.schedule.clone();
            let event = ImprovementEvent::new(
                ImprovementKind::LearningRate,
                result.method.as_str(),
                result.dynamics.last,
                result.predicted_score,
            )
            .applied(true)
            .with_note(format!("{:?} schedule", schedule.kind));
            self.store
                .update_algorithm(
                    id,
                    Box::new(move |r| {
                        r.learning_rate_schedule = Some(schedule);
                        r.record_event(event);
                    }),
                )
                .await?;
        }
        info!(algorithm = %id, method = %result.method, accepted = result.accepted, predicted = result.predicted_score, "learning rate adapted");
        Ok(result)
    }

    // === Features ===

    /// Engineer features; an empty list falls back to the record's features.
    pub async fn engineer_features(&self, id: &AlgorithmId, features: Vec<FeatureSpec>) -> Result<FeatureEngineering> {
        let _lease = self.lease(id)?;
        let record = self.store.load_algorithm(id).await?;
        let features = if features.is_empty() {
            record.features.clone()
        } else {
            features
        };

        let metric = self.config.default_metric.clone();
        let mut result = features::engineer(self.evaluator.as_ref(), id, &record.parameters, features, &metric).await?;
        result.applied = result.improvement > 0.0;

        let method = if result.methods_applied.is_empty() {
            "none".to_string()
        } else {
            result
                .methods_applied
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join("+")
        };
        let event = ImprovementEvent::new(ImprovementKind::Features, method, result.baseline_score, result.validation_score)
            .applied(result.applied);
        let applied = result.applied;
        let engineered = result.engineered_features.clone();
        self.store
            .update_algorithm(
                id,
                Box::new(move |r| {
                    if applied {
                        r.features = engineered;
                    }
                    r.record_event(event);
                }),
            )
            .await?;
        info!(algorithm = %id, improvement = result.improvement, methods = result.methods_applied.len(), "features engineered");
        Ok(result)
    }

    // === Evolution ===

    /// Run the evolutionary driver for one algorithm.
    ///
    /// The lineage is persisted; the best individual becomes the pending
    /// candidate for [`apply_best_evolution`](Self::apply_best_evolution).
    pub async fn evolve_algorithm(
        &self,
        id: &AlgorithmId,
        population_size: usize,
        generations: usize,
    ) -> Result<EvolutionRun> {
        let _lease = self.lease(id)?;
        let record = self.store.load_algorithm(id).await?;
        let metric = self.config.default_metric.clone();
        let space = self.builder.build(&record, &metric);
        space.validate()?;
        info!(algorithm = %id, population_size, generations, "evolving algorithm");

        let mut rng = self.rng_for(id);
        let run = evolution::evolve_algorithm(
            &record,
            &space,
            self.evaluator.as_ref(),
            &self.config,
            population_size,
            generations,
            &metric,
            &mut rng,
        )
        .await?;

        self.store.append_evolutions(&run.records).await?;
        if run.best.is_some() {
            self.pending.lock().await.insert(id.clone(), run.clone());
        }
        info!(
            algorithm = %id,
            generations = run.generations,
            records = run.records.len(),
            termination = ?run.termination,
            best = ?run.best.as_ref().map(|b| b.fitness),
            "evolution finished"
        );
        Ok(run)
    }

    /// Commit the pending candidate of the last evolution run if it beats the
    /// recorded score. The candidate is consumed once the decision is
    /// persisted, whether or not it was applied; a failed load or write
    /// leaves it pending.
    pub async fn apply_best_evolution(&self, id: &AlgorithmId) -> Result<EvolutionApplication> {
        let _lease = self.lease(id)?;
        let candidate = self
            .pending
            .lock()
            .await
            .get(id)
            .and_then(|run| run.best.clone())
            .ok_or_else(|| OptimizationError::NoPendingEvolution(id.clone()))?;

        let record = self.store.load_algorithm(id).await?;
        let metric = self.config.default_metric.clone();
        let prior_score = record.score(&metric).unwrap_or(0.0);
        let gain = improvement(prior_score, candidate.fitness);
        let applied = gain > self.builder.build(&record, &metric).tolerance(&metric);

        let mut parameters = record.parameters.clone();
        parameters.extend(candidate.parameters.clone());
        let event = ImprovementEvent::new(ImprovementKind::Evolution, "evolutionary", prior_score, candidate.fitness)
            .applied(applied)
            .with_changes(changed_parameters(&record.parameters, &parameters))
            .with_note(format!("generation {}", candidate.generation));
        let (fitness, version) = (candidate.fitness, candidate.version);
        self.store
            .update_algorithm(
                id,
                Box::new(move |r| {
                    if applied {
                        r.parameters = parameters;
                        r.performance_metrics.insert(metric, fitness);
                        r.version = version;
                    }
                    r.record_event(event);
                }),
            )
            .await?;
        self.pending.lock().await.remove(id);

        if applied {
            self.meta
                .lock()
                .await
                .record(record.algorithm_type, candidate.fitness, candidate.parameters.clone());
        }
        info!(algorithm = %id, fitness = candidate.fitness, applied, "best evolution considered");
        Ok(EvolutionApplication {
            algorithm_id: id.clone(),
            candidate,
            prior_score,
            improvement: gain,
            applied,
        })
    }

    /// Evolve several algorithms concurrently. Failures are reported per id
    /// and do not abort the other runs.
    pub async fn evolve_many(&self, ids: &[AlgorithmId], population_size: usize, generations: usize) -> BatchEvolution {
        let outcomes = join_all(
            ids.iter()
                .map(|id| async move { (id, self.evolve_algorithm(id, population_size, generations).await) }),
        )
        .await;

        let mut batch = BatchEvolution::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(run) => batch.runs.push(run),
                Err(err) => {
                    warn!(algorithm = %id, error = %err, "evolution failed");
                    batch.failures.push((id.clone(), err.report()));
                }
            }
        }
        batch
    }

    // === Transfer ===

    /// Analyze every unordered pair of `ids` (all algorithms when empty).
    pub async fn analyze_transfer(&self, ids: &[AlgorithmId]) -> Result<TransferReport> {
        let mut report = TransferReport::default();
        let records = if ids.is_empty() {
            self.store.list_algorithms().await?
        } else {
            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                match self.store.load_algorithm(id).await {
                    Ok(record) => records.push(record),
                    Err(err) => report.failures.push((id.clone(), OptimizationError::from(err).report())),
                }
            }
            records
        };

        let thresholds = &self.config.transfer;
        report.insights = transfer::analyze_all(&records, &self.config.default_metric, thresholds.surface_threshold);
        report.synergies = report
            .insights
            .iter()
            .filter(|i| i.transfer_potential > thresholds.synergy_threshold)
            .cloned()
            .collect();
        *self.last_transfer.lock().await = report.insights.clone();

        info!(algorithms = records.len(), insights = report.insights.len(), synergies = report.synergies.len(), "transfer analysis finished");
        Ok(report)
    }

    /// Apply an insight to its target. Idempotent: an insight already applied
    /// to the target is skipped.
    pub async fn apply_transfer_insight(&self, insight: &TransferInsight) -> Result<TransferApplication> {
        let target_id = &insight.target_algorithm;
        let _lease = self.lease(target_id)?;
        let target = self.store.load_algorithm(target_id).await?;
        let key = insight.key();
        let metric = self.config.default_metric.clone();
        let score_before = target.score(&metric).unwrap_or(0.0);

        if target.has_applied(&key) {
            debug!(insight = %key, "insight already applied");
            return Ok(TransferApplication {
                insight_key: key,
                target_algorithm: target_id.clone(),
                score_before,
                score_after: score_before,
                improvement: 0.0,
                applied: false,
                already_applied: true,
            });
        }

        let source = self.store.load_algorithm(&insight.source_algorithm).await?;
        let mut parameters: ParameterSet = target.parameters.clone();
        for capability in &insight.transferable_capabilities {
            if let Some(value) = source.parameters.get(capability) {
                parameters.insert(capability.clone(), value.clone());
            }
        }
        let wants = |name: &str| insight.transferable_capabilities.iter().any(|c| c == name);
        let architecture = source.architecture.clone().filter(|_| wants(ARCHITECTURE_CAPABILITY));
        let schedule = source.learning_rate_schedule.clone().filter(|_| wants(SCHEDULE_CAPABILITY));

        let mut scored = parameters.clone();
        if let Some(arch) = &architecture {
            scored.extend(encode(arch));
        }
        let score_after = checked_evaluate(self.evaluator.as_ref(), target_id, &scored, &metric)
            .await
            .map_err(|cause| OptimizationError::OptimizationFailed {
                algorithm: target_id.clone(),
                cause,
            })?;
        let gain = improvement(score_before, score_after);
        let applied = gain > 0.0;

        let event = ImprovementEvent::new(ImprovementKind::Transfer, "transfer", score_before, score_after)
            .applied(applied)
            .with_changes(changed_parameters(&target.parameters, &parameters))
            .with_note(key.clone());
        let stored_key = key.clone();
        self.store
            .update_algorithm(
                target_id,
                Box::new(move |r| {
                    r.applied_insights.push(stored_key);
                    if applied {
                        r.parameters = parameters;
                        if let Some(arch) = architecture {
                            if let Some(previous) = r.architecture.replace(arch) {
                                r.architecture_history.push(previous);
                            }
                        }
                        if schedule.is_some() {
                            r.learning_rate_schedule = schedule;
                        }
                        r.performance_metrics.insert(metric, score_after);
                        r.version = VersionId::new();
                    }
                    r.record_event(event);
                }),
            )
            .await?;

        info!(insight = %key, score_before, score_after, applied, "transfer insight applied");
        Ok(TransferApplication {
            insight_key: key,
            target_algorithm: target_id.clone(),
            score_before,
            score_after,
            improvement: gain,
            applied,
            already_applied: false,
        })
    }

    // === Insights ===

    /// Aggregated summary for one algorithm.
    pub async fn get_optimization_insights(&self, id: &AlgorithmId) -> Result<OptimizationInsights> {
        let record = self.store.load_algorithm(id).await?;
        let lineage = self.store.list_evolutions(id).await?;
        let threshold = self.config.transfer.synergy_threshold;
        let synergies: Vec<TransferInsight> = self
            .last_transfer
            .lock()
            .await
            .iter()
            .filter(|i| i.transfer_potential > threshold)
            .cloned()
            .collect();
        Ok(summarize(&record, &self.config.default_metric, &lineage, synergies))
    }
}
