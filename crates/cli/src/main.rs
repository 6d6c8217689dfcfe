//! selfopt CLI - algorithmic self-optimization engine.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use selfopt_core::{AlgorithmId, AlgorithmRecord, AlgorithmType, FeatureKind, FeatureSpec, OptimizationMethod, ParamValue};
use selfopt_engine::{
    AdaptationMethod, ArchitectureSearchMethod, EngineConfig, HashEvaluator, SelfOptimizationEngine,
};
use selfopt_storage::JsonStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "selfopt")]
#[command(about = "Algorithmic self-optimization engine", long_about = None)]
struct Cli {
    /// Engine configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Registry directory
    #[arg(long, global = true, default_value = ".selfopt")]
    storage: PathBuf,

    /// Seed for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register an algorithm
    Register {
        /// Algorithm ID
        id: String,
        /// Algorithm type (neural, statistical, heuristic, ensemble)
        #[arg(long = "type")]
        algorithm_type: AlgorithmType,
        /// Performance metric, `name=value` (repeatable)
        #[arg(long = "metric")]
        metrics: Vec<String>,
        /// Parameter, `name=value` (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
        /// Input feature, `name:kind:importance` (repeatable)
        #[arg(long = "feature")]
        features: Vec<String>,
    },
    /// List registered algorithms
    List,
    /// Optimize hyperparameters
    Optimize {
        /// Algorithm ID
        id: String,
        /// Metric to optimize
        #[arg(long)]
        metric: Option<String>,
        /// Force a strategy (grid, random, bayesian, evolutionary, meta_learned)
        #[arg(long)]
        method: Option<OptimizationMethod>,
    },
    /// Optimize the architecture of a neural algorithm
    Architecture {
        /// Algorithm ID
        id: String,
        /// Force a method (nas, evolutionary, gradient_based, meta_learned)
        #[arg(long)]
        method: Option<ArchitectureSearchMethod>,
    },
    /// Restore the previous architecture
    Rollback {
        /// Algorithm ID
        id: String,
    },
    /// Adapt the learning-rate schedule
    AdaptLr {
        /// Algorithm ID
        id: String,
        /// Comma-separated score history, oldest first
        #[arg(long, value_delimiter = ',')]
        history: Vec<f64>,
        /// Force a method (cosine, exponential, step, adaptive, meta_learned)
        #[arg(long)]
        method: Option<AdaptationMethod>,
    },
    /// Engineer features
    Features {
        /// Algorithm ID
        id: String,
        /// Feature, `name:kind:importance` (repeatable); defaults to the registered ones
        #[arg(long = "feature")]
        features: Vec<String>,
    },
    /// Evolve one or more algorithms
    Evolve {
        /// Algorithm IDs
        #[arg(required = true)]
        ids: Vec<String>,
        /// Individuals per generation
        #[arg(long, default_value = "20")]
        population: usize,
        /// Maximum generations
        #[arg(long, default_value = "10")]
        generations: usize,
        /// Commit the best candidate when it improves
        #[arg(long)]
        apply: bool,
    },
    /// Analyze cross-algorithm transfer
    Transfer {
        /// Algorithm IDs (all when empty)
        ids: Vec<String>,
        /// Apply every surfaced insight
        #[arg(long)]
        apply: bool,
    },
    /// Show the optimization insights of an algorithm
    Insights {
        /// Algorithm ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }

    let store = Arc::new(JsonStore::new(&cli.storage).await?);
    let evaluator = Arc::new(HashEvaluator::new(config.seed.unwrap_or(0)));
    let engine = SelfOptimizationEngine::new(store, evaluator, config);

    match cli.command {
        Commands::Register { id, algorithm_type, metrics, params, features } => {
            let mut record = AlgorithmRecord::new(id, algorithm_type);
            for metric in &metrics {
                let (name, value) = split_pair(metric)?;
                let value: f64 = value.parse().with_context(|| format!("invalid metric value in '{}'", metric))?;
                record = record.with_metric(name, value);
            }
            for param in &params {
                let (name, value) = split_pair(param)?;
                record = record.with_parameter(name, parse_value(value));
            }
            record.features = features.iter().map(|f| parse_feature(f)).collect::<Result<_>>()?;

            let record = engine.register_algorithm(record).await?;
            info!("Registered {}", record.id);
            print_json(&record)?;
        }
        Commands::List => {
            let records = engine.list_algorithms().await?;
            println!("Algorithms ({})", records.len());
            for record in records {
                let metrics: Vec<String> = record
                    .performance_metrics
                    .iter()
                    .map(|(k, v)| format!("{}={:.4}", k, v))
                    .collect();
                println!(
                    "  {} | {} | {} | {} events",
                    record.id,
                    record.algorithm_type,
                    metrics.join(" "),
                    record.improvement_history.len()
                );
            }
        }
        Commands::Optimize { id, metric, method } => {
            let result = engine
                .optimize_hyperparameters_with(&AlgorithmId::from(id), metric.as_deref(), method)
                .await?;
            print_json(&result)?;
        }
        Commands::Architecture { id, method } => {
            let result = engine.optimize_architecture(&AlgorithmId::from(id), method).await?;
            print_json(&result)?;
        }
        Commands::Rollback { id } => {
            let record = engine.rollback_architecture(&AlgorithmId::from(id)).await?;
            print_json(&record)?;
        }
        Commands::AdaptLr { id, history, method } => {
            let result = engine.adapt_learning_rate(&AlgorithmId::from(id), &history, method).await?;
            print_json(&result)?;
        }
        Commands::Features { id, features } => {
            let features = features.iter().map(|f| parse_feature(f)).collect::<Result<Vec<_>>>()?;
            let result = engine.engineer_features(&AlgorithmId::from(id), features).await?;
            print_json(&result)?;
        }
        Commands::Evolve { ids, population, generations, apply } => {
            let ids: Vec<AlgorithmId> = ids.into_iter().map(AlgorithmId::from).collect();
            let batch = engine.evolve_many(&ids, population, generations).await;
            print_json(&batch)?;
            if apply {
                for run in batch.runs.iter().filter(|r| r.best.is_some()) {
                    let application = engine.apply_best_evolution(&run.algorithm_id).await?;
                    print_json(&application)?;
                }
            }
        }
        Commands::Transfer { ids, apply } => {
            let ids: Vec<AlgorithmId> = ids.into_iter().map(AlgorithmId::from).collect();
            let report = engine.analyze_transfer(&ids).await?;
            print_json(&report)?;
            if apply {
                for insight in &report.insights {
                    let application = engine.apply_transfer_insight(insight).await?;
                    print_json(&application)?;
                }
            }
        }
        Commands::Insights { id } => {
            let insights = engine.get_optimization_insights(&AlgorithmId::from(id)).await?;
            print_json(&insights)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => bail!("expected name=value, got '{}'", pair),
    }
}

fn parse_value(raw: &str) -> ParamValue {
    if let Ok(v) = raw.parse::<i64>() {
        ParamValue::Int(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        ParamValue::Float(v)
    } else {
        ParamValue::Category(raw.to_string())
    }
}

fn parse_feature(raw: &str) -> Result<FeatureSpec> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [name, kind, importance] = parts.as_slice() else {
        bail!("expected name:kind:importance, got '{}'", raw);
    };
    let kind = match kind.to_lowercase().as_str() {
        "numerical" => FeatureKind::Numerical,
        "categorical" => FeatureKind::Categorical,
        "text" => FeatureKind::Text,
        "temporal" => FeatureKind::Temporal,
        "derived" => FeatureKind::Derived,
        other => bail!("unknown feature kind '{}'", other),
    };
    let importance: f64 = importance
        .parse()
        .with_context(|| format!("invalid importance in '{}'", raw))?;
    Ok(FeatureSpec::new(*name, kind, importance))
}
