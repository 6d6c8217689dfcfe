//! Registry trait abstraction.

use async_trait::async_trait;
use selfopt_core::{AlgorithmId, AlgorithmRecord, EvolutionRecord, ImprovementEvent};

/// Error type for registry operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown algorithm
    #[error("Algorithm not found: {0}")]
    NotFound(AlgorithmId),

    /// Algorithm registered twice
    #[error("Algorithm already registered: {0}")]
    AlreadyExists(AlgorithmId),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Read-modify-write step applied atomically to one record.
pub type RecordUpdate = Box<dyn FnOnce(&mut AlgorithmRecord) + Send>;

/// Durable store of algorithm records and evolution lineage.
///
/// Writes for one id are serialized and all-or-nothing: a reader sees either
/// the record before an update or after it, never a mix.
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    // === Algorithm records ===

    /// Load a record, failing with `NotFound` if the id is unknown.
    async fn load_algorithm(&self, id: &AlgorithmId) -> Result<AlgorithmRecord>;

    /// Save a record (create or replace).
    async fn save_algorithm(&self, record: &AlgorithmRecord) -> Result<()>;

    /// Create a record, failing with `AlreadyExists` if the id is taken.
    async fn register_algorithm(&self, record: &AlgorithmRecord) -> Result<()>;

    /// List all records.
    async fn list_algorithms(&self) -> Result<Vec<AlgorithmRecord>>;

    /// Apply `update` to a copy of the record and swap it in.
    async fn update_algorithm(&self, id: &AlgorithmId, update: RecordUpdate) -> Result<AlgorithmRecord>;

    /// Append an event to a record's history.
    async fn append_history(&self, id: &AlgorithmId, event: ImprovementEvent) -> Result<()> {
        self.update_algorithm(id, Box::new(move |record| record.record_event(event)))
            .await
            .map(|_| ())
    }

    // === Evolution lineage ===

    /// Append evolution records.
    async fn append_evolutions(&self, records: &[EvolutionRecord]) -> Result<()>;

    /// Evolution records of one algorithm, in generation order.
    async fn list_evolutions(&self, id: &AlgorithmId) -> Result<Vec<EvolutionRecord>>;
}
