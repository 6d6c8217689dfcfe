//! In-memory registry.
//!
//! Each record sits in its own cell so updates to different ids do not
//! contend; the outer map lock is only held to look cells up.

use async_trait::async_trait;
use selfopt_core::{AlgorithmId, AlgorithmRecord, EvolutionRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::{PerformanceStore, RecordUpdate, Result, StorageError};

/// Registry kept entirely in memory.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<AlgorithmId, Arc<Mutex<AlgorithmRecord>>>>,
    evolutions: Mutex<Vec<EvolutionRecord>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = AlgorithmRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.id.clone(), Arc::new(Mutex::new(r))))
            .collect();
        Self {
            records: RwLock::new(map),
            evolutions: Mutex::new(Vec::new()),
        }
    }

    async fn cell(&self, id: &AlgorithmId) -> Result<Arc<Mutex<AlgorithmRecord>>> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.clone()))
    }
}

#[async_trait]
impl PerformanceStore for InMemoryStore {
    async fn load_algorithm(&self, id: &AlgorithmId) -> Result<AlgorithmRecord> {
        let cell = self.cell(id).await?;
        let record = cell.lock().await.clone();
        Ok(record)
    }

    async fn save_algorithm(&self, record: &AlgorithmRecord) -> Result<()> {
        let existing = self.records.read().await.get(&record.id).cloned();
        match existing {
            Some(cell) => *cell.lock().await = record.clone(),
            None => {
                self.records
                    .write()
                    .await
                    .entry(record.id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(record.clone())));
            }
        }
        debug!("Saved algorithm {}", record.id);
        Ok(())
    }

    async fn register_algorithm(&self, record: &AlgorithmRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StorageError::AlreadyExists(record.id.clone()));
        }
        records.insert(record.id.clone(), Arc::new(Mutex::new(record.clone())));
        debug!("Registered algorithm {}", record.id);
        Ok(())
    }

    async fn list_algorithms(&self) -> Result<Vec<AlgorithmRecord>> {
        let cells: Vec<_> = self.records.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(cells.len());
        for cell in cells {
            out.push(cell.lock().await.clone());
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn update_algorithm(&self, id: &AlgorithmId, update: RecordUpdate) -> Result<AlgorithmRecord> {
        let cell = self.cell(id).await?;
        let mut guard = cell.lock().await;
        let mut next = guard.clone();
        update(&mut next);
        next.touch();
        *guard = next.clone();
        Ok(next)
    }

    async fn append_evolutions(&self, records: &[EvolutionRecord]) -> Result<()> {
        self.evolutions.lock().await.extend_from_slice(records);
        Ok(())
    }

    async fn list_evolutions(&self, id: &AlgorithmId) -> Result<Vec<EvolutionRecord>> {
        let mut out: Vec<_> = self
            .evolutions
            .lock()
            .await
            .iter()
            .filter(|r| &r.algorithm_id == id)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.generation);
        Ok(out)
    }
}
