//! JSON file storage implementation.
//!
//! Stores one JSON file per algorithm under `algorithms/`, one per evolution
//! record under `evolutions/`, and keeps small per-algorithm meta markers
//! (version + updated_at). Files are written to a temporary path and renamed
//! into place so a crash never leaves a half-written record.

use async_trait::async_trait;
use selfopt_core::{AlgorithmId, AlgorithmRecord, EvolutionRecord};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{PerformanceStore, RecordUpdate, Result, StorageError};

/// File-based JSON registry.
pub struct JsonStore {
    root: PathBuf,
    locks: Mutex<HashMap<AlgorithmId, Arc<Mutex<()>>>>,
}

impl JsonStore {
    /// Create storage, creating the directories it needs.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("algorithms")).await?;
        fs::create_dir_all(root.join("evolutions")).await?;
        fs::create_dir_all(root.join("meta").join("algorithms")).await?;

        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    fn algorithm_path(&self, id: &AlgorithmId) -> PathBuf {
        self.root.join("algorithms").join(format!("{}.json", file_stem(id)))
    }

    fn evolution_path(&self, record: &EvolutionRecord) -> PathBuf {
        self.root.join("evolutions").join(format!("{}.json", record.evolution_id))
    }

    fn meta_path(&self, id: &AlgorithmId) -> PathBuf {
        self.root
            .join("meta")
            .join("algorithms")
            .join(format!("{}.meta.json", file_stem(id)))
    }

    /// Per-id write lock.
    async fn key_lock(&self, id: &AlgorithmId) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(id.clone()).or_default().clone()
    }

    /// Number of times a record has been written.
    pub async fn version(&self, id: &AlgorithmId) -> Result<u64> {
        Ok(read_meta_version(&self.meta_path(id)).await)
    }

    /// Read and increment per-record version, return new version.
    async fn bump_version(&self, id: &AlgorithmId) -> Result<u64> {
        let path = self.meta_path(id);
        let version = read_meta_version(&path).await + 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        write_atomic(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }

    async fn write_record(&self, record: &AlgorithmRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        write_atomic(&self.algorithm_path(&record.id), json.as_bytes()).await?;
        let version = self.bump_version(&record.id).await?;
        debug!("Wrote algorithm {} (v{})", record.id, version);
        Ok(())
    }
}

#[async_trait]
impl PerformanceStore for JsonStore {
    async fn load_algorithm(&self, id: &AlgorithmId) -> Result<AlgorithmRecord> {
        let record: AlgorithmRecord = read_json(&self.algorithm_path(id))
            .await?
            .ok_or_else(|| StorageError::NotFound(id.clone()))?;
        if &record.id != id {
            return Err(StorageError::NotFound(id.clone()));
        }
        Ok(record)
    }

    async fn save_algorithm(&self, record: &AlgorithmRecord) -> Result<()> {
        let lock = self.key_lock(&record.id).await;
        let _guard = lock.lock().await;
        self.write_record(record).await
    }

    async fn register_algorithm(&self, record: &AlgorithmRecord) -> Result<()> {
        let lock = self.key_lock(&record.id).await;
        let _guard = lock.lock().await;
        if fs::try_exists(self.algorithm_path(&record.id)).await? {
            return Err(StorageError::AlreadyExists(record.id.clone()));
        }
        self.write_record(record).await
    }

    async fn list_algorithms(&self) -> Result<Vec<AlgorithmRecord>> {
        let mut records: Vec<AlgorithmRecord> = list_dir(&self.root.join("algorithms")).await?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn update_algorithm(&self, id: &AlgorithmId, update: RecordUpdate) -> Result<AlgorithmRecord> {
        let lock = self.key_lock(id).await;
        let _guard = lock.lock().await;

        let mut record = self.load_algorithm(id).await?;
        update(&mut record);
        record.touch();
        self.write_record(&record).await?;
        Ok(record)
    }

    async fn append_evolutions(&self, records: &[EvolutionRecord]) -> Result<()> {
        for record in records {
            let json = serde_json::to_string_pretty(record)?;
            write_atomic(&self.evolution_path(record), json.as_bytes()).await?;
        }
        Ok(())
    }

    async fn list_evolutions(&self, id: &AlgorithmId) -> Result<Vec<EvolutionRecord>> {
        let all: Vec<EvolutionRecord> = list_dir(&self.root.join("evolutions")).await?;
        let mut out: Vec<_> = all.into_iter().filter(|r| &r.algorithm_id == id).collect();
        out.sort_by(|a, b| a.generation.cmp(&b.generation).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }
}

/// File-system safe name for an algorithm id.
///
/// Bytes outside `[A-Za-z0-9.-]` are percent-encoded, so distinct ids never
/// share a file.
fn file_stem(id: &AlgorithmId) -> String {
    let mut stem = String::with_capacity(id.as_str().len());
    for byte in id.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

async fn read_meta_version(path: &Path) -> u64 {
    match fs::read_to_string(path).await {
        Ok(s) => serde_json::from_str::<serde_json::Value>(&s)
            .ok()
            .and_then(|json| json.get("version").and_then(|v| v.as_u64()))
            .unwrap_or(0),
        Err(_) => 0,
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use selfopt_core::{AlgorithmType, EvolutionId, ImprovementEvent, ImprovementKind, VersionId};

    #[tokio::test]
    async fn test_round_trip_and_versioning() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).await.unwrap();

        let record = AlgorithmRecord::new("net/v1", AlgorithmType::Neural).with_metric("accuracy", 0.8);
        store.register_algorithm(&record).await.unwrap();
        assert!(matches!(
            store.register_algorithm(&record).await,
            Err(StorageError::AlreadyExists(_))
        ));

        let id = record.id.clone();
        store
            .append_history(&id, ImprovementEvent::new(ImprovementKind::Architecture, "nas", 0.8, 0.85))
            .await
            .unwrap();

        let loaded = store.load_algorithm(&id).await.unwrap();
        assert_eq!(loaded.score("accuracy"), Some(0.8));
        assert_eq!(loaded.improvement_history.len(), 1);
        assert_eq!(store.version(&id).await.unwrap(), 2);
        assert_eq!(store.list_algorithms().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).await.unwrap();
        assert!(matches!(
            store.load_algorithm(&"nope".into()).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.update_algorithm(&"nope".into(), Box::new(|_| {})).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_evolutions_filtered_by_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).await.unwrap();

        let make = |algo: &str, generation: usize| EvolutionRecord {
            evolution_id: EvolutionId::new(),
            algorithm_id: algo.into(),
            parent_version: VersionId::new(),
            evolved_version: VersionId::new(),
            mutations: vec![],
            crossovers: vec![],
            fitness: 0.5,
            generation,
            created_at: chrono::Utc::now(),
        };

        store
            .append_evolutions(&[make("a", 2), make("a", 1), make("b", 1)])
            .await
            .unwrap();

        let a = store.list_evolutions(&"a".into()).await.unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].generation, 1);
        assert_eq!(store.list_evolutions(&"b".into()).await.unwrap().len(), 1);
    }

    #[test]
    fn test_file_stem_is_injective() {
        assert_eq!(file_stem(&"net/v1 x".into()), "net%2Fv1%20x");
        assert_eq!(file_stem(&"net_v1".into()), "net%5Fv1");
        assert_ne!(file_stem(&"net/v1".into()), file_stem(&"net_v1".into()));
        assert_ne!(file_stem(&"a%2F".into()), file_stem(&"a/".into()));
    }

    #[tokio::test]
    async fn test_similar_ids_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).await.unwrap();

        let slash = AlgorithmRecord::new("net/v1", AlgorithmType::Neural);
        let underscore = AlgorithmRecord::new("net_v1", AlgorithmType::Statistical);
        store.register_algorithm(&slash).await.unwrap();
        store.register_algorithm(&underscore).await.unwrap();

        let loaded = store.load_algorithm(&underscore.id).await.unwrap();
        assert_eq!(loaded.id, underscore.id);
        assert_eq!(loaded.algorithm_type, AlgorithmType::Statistical);
        assert_eq!(store.load_algorithm(&slash.id).await.unwrap().algorithm_type, AlgorithmType::Neural);
        assert_eq!(store.list_algorithms().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_load_rejects_record_stored_under_another_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path()).await.unwrap();

        let other = AlgorithmRecord::new("other", AlgorithmType::Heuristic);
        let path = store.algorithm_path(&"ga".into());
        std::fs::write(&path, serde_json::to_string(&other).unwrap()).unwrap();

        assert!(matches!(
            store.load_algorithm(&"ga".into()).await,
            Err(StorageError::NotFound(id)) if id.as_str() == "ga"
        ));
    }
}
