//! Customer record storage
//!
//! A record is a JSON object with an `id` and a `categoryId` partition key,
//! mirroring the document database the demo was deployed against. Writes are
//! last-write-wins: there is no version check, so two callers that read, edit
//! and write the same record race and the later write silently replaces the
//! earlier one.

use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A stored customer record
pub type Record = Map<String, Value>;

/// Partition customer records are stored in unless configured otherwise
pub const DEFAULT_PARTITION: &str = "customers";

const ID_KEY: &str = "id";
const PARTITION_KEY: &str = "categoryId";

pub(crate) fn default_records_root() -> PathBuf {
    PathBuf::from("records")
}

pub(crate) fn default_partition() -> String {
    DEFAULT_PARTITION.to_string()
}

/// Outcome of an upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertStatus {
    /// Id of the written record
    pub id: String,
    /// Human-readable status line
    pub status: String,
}

/// Record storage trait
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read a record by id within a partition
    async fn read(&self, id: &str, partition: &str) -> StorageResult<Option<Record>>;

    /// Insert or replace a record (partition taken from its `categoryId`)
    async fn upsert(&self, record: Record) -> StorageResult<UpsertStatus>;

    /// All records in a partition, ordered by id
    async fn list(&self, partition: &str) -> StorageResult<Vec<Record>>;
}

/// Pull the id and partition out of a record, defaulting the partition.
fn record_key(record: &mut Record) -> StorageResult<(String, String)> {
    let id = match record.get(ID_KEY) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(StorageError::InvalidRecord(
                "record must carry a non-empty 'id'".to_string(),
            ))
        }
    };

    let partition = match record.get(PARTITION_KEY) {
        Some(Value::String(p)) if !p.is_empty() => p.clone(),
        _ => {
            record.insert(PARTITION_KEY.to_string(), Value::from(DEFAULT_PARTITION));
            DEFAULT_PARTITION.to_string()
        }
    };

    validate_segment(&id)?;
    validate_segment(&partition)?;

    Ok((id, partition))
}

fn validate_segment(segment: &str) -> StorageResult<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\'])
    {
        return Err(StorageError::InvalidRecord(format!(
            "'{segment}' is not a valid record key"
        )));
    }
    Ok(())
}

/// Records stored as one JSON file per record: `{root}/{partition}/{id}.json`
#[derive(Debug, Clone)]
pub struct JsonFileRecordStore {
    root: PathBuf,
}

impl JsonFileRecordStore {
    /// Create a record store rooted at `root`
    ///
    /// # Errors
    /// Returns an error if the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn record_path(&self, id: &str, partition: &str) -> PathBuf {
        self.root.join(partition).join(format!("{id}.json"))
    }
}

async fn read_record(path: &Path) -> StorageResult<Option<Record>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn read(&self, id: &str, partition: &str) -> StorageResult<Option<Record>> {
        if validate_segment(id).is_err() || validate_segment(partition).is_err() {
            return Ok(None);
        }
        let record = read_record(&self.record_path(id, partition)).await?;
        debug!("Read record {}/{}: found={}", partition, id, record.is_some());
        Ok(record)
    }

    async fn upsert(&self, mut record: Record) -> StorageResult<UpsertStatus> {
        let (id, partition) = record_key(&mut record)?;
        let path = self.record_path(&id, &partition);
        tokio::fs::create_dir_all(self.root.join(&partition)).await?;

        // Readers never see a partially written record.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&record)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        info!("Upserted record {}/{}", partition, id);
        Ok(UpsertStatus {
            status: format!("Document {id} was successfully upserted to {partition}"),
            id,
        })
    }

    async fn list(&self, partition: &str) -> StorageResult<Vec<Record>> {
        validate_segment(partition)?;
        let dir = self.root.join(partition);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(record) = read_record(&path).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// In-process record store
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<(String, String), Record>>,
}

impl MemoryRecordStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn read(&self, id: &str, partition: &str) -> StorageResult<Option<Record>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(partition.to_string(), id.to_string()))
            .cloned())
    }

    async fn upsert(&self, mut record: Record) -> StorageResult<UpsertStatus> {
        let (id, partition) = record_key(&mut record)?;
        self.records
            .write()
            .await
            .insert((partition.clone(), id.clone()), record);
        Ok(UpsertStatus {
            status: format!("Document {id} was successfully upserted to {partition}"),
            id,
        })
    }

    async fn list(&self, partition: &str) -> StorageResult<Vec<Record>> {
        let records = self.records.read().await;
        let mut matching: Vec<(&String, &Record)> = records
            .iter()
            .filter(|((p, _), _)| p == partition)
            .map(|((_, id), record)| (id, record))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));
        Ok(matching.into_iter().map(|(_, r)| r.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[tokio::test]
    async fn test_json_store_upsert_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::new(dir.path()).unwrap();

        let status = store
            .upsert(record(json!({"id": "c-1", "first_name": "John"})))
            .await
            .unwrap();
        assert_eq!(status.id, "c-1");

        let read = store.read("c-1", DEFAULT_PARTITION).await.unwrap().unwrap();
        assert_eq!(read["first_name"], "John");
        assert_eq!(read["categoryId"], DEFAULT_PARTITION);
    }

    #[tokio::test]
    async fn test_json_store_missing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::new(dir.path()).unwrap();

        assert!(store.read("nobody", DEFAULT_PARTITION).await.unwrap().is_none());
        assert!(store.read("../etc", DEFAULT_PARTITION).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::new(dir.path()).unwrap();

        store
            .upsert(record(json!({"id": "c-1", "address": "1 Main St"})))
            .await
            .unwrap();
        store
            .upsert(record(json!({"id": "c-1", "address": "2 Side Ave"})))
            .await
            .unwrap();

        let read = store.read("c-1", DEFAULT_PARTITION).await.unwrap().unwrap();
        assert_eq!(read["address"], "2 Side Ave");
        assert_eq!(store.list(DEFAULT_PARTITION).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_requires_id() {
        let store = MemoryRecordStore::new();
        let err = store
            .upsert(record(json!({"first_name": "John"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));

        let err = store
            .upsert(record(json!({"id": "a/b"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_list_respects_partition_and_order() {
        let store = MemoryRecordStore::new();
        for id in ["c-2", "c-1"] {
            store.upsert(record(json!({"id": id}))).await.unwrap();
        }
        store
            .upsert(record(json!({"id": "x", "categoryId": "staff"})))
            .await
            .unwrap();

        let customers = store.list(DEFAULT_PARTITION).await.unwrap();
        let ids: Vec<&str> = customers.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["c-1", "c-2"]);
        assert_eq!(store.list("staff").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_store_list_empty_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRecordStore::new(dir.path()).unwrap();
        assert!(store.list("nothing-here").await.unwrap().is_empty());
    }
}
