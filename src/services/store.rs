use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::job::JobRecord;

/// Crash-recovery cache for job records.
///
/// Writes carry the record's `revision`; a store never replaces a snapshot
/// with an older revision, so concurrent writers cannot regress it.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn put(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Reload a single record from stable storage.
    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError>;

    /// Read the whole snapshot.
    async fn load_all(&self) -> Result<HashMap<Uuid, JobRecord>, StoreError>;
}

fn is_newer(incoming: &JobRecord, existing: Option<&JobRecord>) -> bool {
    existing.map_or(true, |current| incoming.revision >= current.revision)
}

/// Volatile store, for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Uuid, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        if is_newer(record, records.get(&record.id)) {
            records.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn load_all(&self) -> Result<HashMap<Uuid, JobRecord>, StoreError> {
        Ok(self.records.lock().await.clone())
    }
}

/// Whole-snapshot JSON file, rewritten atomically (temp file + rename) on
/// every put. Writes are serialized by the snapshot lock.
pub struct JsonFileStore {
    path: PathBuf,
    snapshot: Mutex<Option<HashMap<Uuid, JobRecord>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: Mutex::new(None),
        }
    }

    async fn read_file(&self) -> Result<HashMap<Uuid, JobRecord>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write_file(&self, records: &HashMap<Uuid, JobRecord>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut guard = self.snapshot.lock().await;
        if guard.is_none() {
            // Keep whatever a previous process left behind.
            *guard = Some(self.read_file().await?);
        }
        let records = guard.get_or_insert_with(HashMap::new);

        if !is_newer(record, records.get(&record.id)) {
            return Ok(());
        }
        records.insert(record.id, record.clone());
        self.write_file(records).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        let mut records = self.read_file().await?;
        Ok(records.remove(&id))
    }

    async fn load_all(&self) -> Result<HashMap<Uuid, JobRecord>, StoreError> {
        self.read_file().await
    }
}

// KEYS[1] = records hash, KEYS[2] = revisions hash
// ARGV[1] = job id, ARGV[2] = revision, ARGV[3] = record json
const PUT_IF_NEWER: &str = r#"
local current = redis.call('HGET', KEYS[2], ARGV[1])
if current and tonumber(current) > tonumber(ARGV[2]) then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
return 1
"#;

/// Redis-backed snapshot: one hash of records per registry namespace.
pub struct RedisStore {
    client: redis::Client,
    records_key: String,
    revisions_key: String,
    script: redis::Script,
}

impl RedisStore {
    pub fn new(redis_url: &str, namespace: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            records_key: format!("brand_detector:{}:jobs", namespace),
            revisions_key: format!("brand_detector:{}:revisions", namespace),
            script: redis::Script::new(PUT_IF_NEWER),
        })
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for RedisStore {
    async fn put(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;
        let _applied: i32 = self
            .script
            .key(&self.records_key)
            .key(&self.revisions_key)
            .arg(record.id.to_string())
            .arg(record.revision)
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.hget(&self.records_key, id.to_string()).await?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    async fn load_all(&self) -> Result<HashMap<Uuid, JobRecord>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: HashMap<String, String> = conn.hgetall(&self.records_key).await?;
        raw.into_values()
            .map(|p| {
                let record: JobRecord = serde_json::from_str(&p)?;
                Ok((record.id, record))
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
