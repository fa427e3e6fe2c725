use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::job::{JobRecord, JobState, TransitionError};
use crate::services::store::{DurableStore, StoreError};

/// Concurrency-safe map from job id to job record.
///
/// Every mutation goes through [`JobRegistry::update`], which applies the
/// mutation to a copy under the lock and commits it only on success. The
/// lock is never held across I/O: persisting to the [`DurableStore`] happens
/// after the lock is released, ordered by the record's `revision`.
pub struct JobRegistry {
    name: &'static str,
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
    store: Arc<dyn DurableStore>,
    /// Last snapshot write failure; cleared by the next successful write.
    store_failure: Mutex<Option<String>>,
}

impl JobRegistry {
    pub fn new(name: &'static str, store: Arc<dyn DurableStore>) -> Self {
        Self {
            name,
            jobs: Mutex::new(HashMap::new()),
            store,
            store_failure: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, JobRecord>> {
        // A poisoned map is still structurally valid: mutations are
        // committed whole or not at all.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store_failure_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.store_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn persist(&self, record: &JobRecord) {
        match self.store.put(record).await {
            Ok(()) => {
                self.store_failure_slot().take();
            }
            Err(e) => {
                metrics::counter!("detector_store_write_failures_total").increment(1);
                warn!(
                    registry = self.name,
                    job_id = %record.id,
                    error = %e,
                    "Failed to persist job snapshot"
                );
                *self.store_failure_slot() = Some(e.to_string());
            }
        }
    }

    /// `Err` with the last write error while snapshots are not reaching the
    /// durable store.
    pub fn store_health(&self) -> Result<(), String> {
        match self.store_failure_slot().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Insert a new record and return its id.
    pub async fn create(&self, mut record: JobRecord) -> Uuid {
        record.updated_at = Utc::now();
        let id = record.id;
        self.lock().insert(id, record.clone());
        debug!(registry = self.name, job_id = %id, "Job created");
        self.persist(&record).await;
        id
    }

    /// Fetch a record, reloading it once from the durable store on a miss.
    pub async fn get(&self, id: Uuid) -> Result<JobRecord, RegistryError> {
        let cached = self.lock().get(&id).cloned();
        if let Some(record) = cached {
            return Ok(record);
        }

        match self.store.get(id).await {
            Ok(Some(record)) => {
                debug!(registry = self.name, job_id = %id, "Job reloaded from durable store");
                let mut jobs = self.lock();
                // A concurrent create or reload may have won the race.
                let entry = jobs.entry(id).or_insert(record);
                Ok(entry.clone())
            }
            Ok(None) => Err(RegistryError::NotFound(id)),
            Err(e) => {
                warn!(registry = self.name, job_id = %id, error = %e, "Durable store reload failed");
                Err(RegistryError::Store { id, source: e })
            }
        }
    }

    /// Atomically apply `mutation` to the record.
    ///
    /// Terminal records are never mutated. If the closure fails, the record
    /// is left untouched. On success `updated_at` and `revision` are bumped
    /// and the new record is returned.
    pub async fn update<F>(&self, id: Uuid, mutation: F) -> Result<JobRecord, RegistryError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), TransitionError> + Send,
    {
        // Make sure a record from a previous process is present.
        self.get(id).await?;

        let committed = {
            let mut jobs = self.lock();
            let current = jobs.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
            if current.state.is_terminal() {
                return Err(RegistryError::Terminal {
                    id,
                    state: current.state,
                });
            }

            let mut next = current.clone();
            mutation(&mut next).map_err(|source| RegistryError::Rejected { id, source })?;
            next.updated_at = Utc::now();
            next.revision = current.revision + 1;
            *current = next.clone();
            next
        };

        self.persist(&committed).await;
        Ok(committed)
    }

    /// Append a non-fatal warning. Allowed on terminal records; never
    /// changes the state.
    pub async fn add_warning(&self, id: Uuid, warning: impl Into<String>) -> Result<(), RegistryError> {
        self.get(id).await?;

        let committed = {
            let mut jobs = self.lock();
            let current = jobs.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
            current.warnings.push(warning.into());
            current.updated_at = Utc::now();
            current.revision += 1;
            current.clone()
        };

        self.persist(&committed).await;
        Ok(())
    }

    /// Whether the in-memory record is terminal. Unknown ids count as terminal
    /// so a worker whose record vanished stops.
    pub fn is_terminal(&self, id: Uuid) -> bool {
        self.lock()
            .get(&id)
            .map_or(true, |record| record.state.is_terminal())
    }

    /// All non-terminal records held in memory.
    pub fn list_active(&self) -> Vec<JobRecord> {
        let mut active: Vec<JobRecord> = self
            .lock()
            .values()
            .filter(|record| !record.state.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|record| record.created_at);
        active
    }

    /// Drop the in-memory map, as a process restart would.
    pub fn clear_memory(&self) {
        self.lock().clear();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {id} is already {state}")]
    Terminal { id: Uuid, state: JobState },

    #[error("Mutation of job {id} rejected: {source}")]
    Rejected {
        id: Uuid,
        #[source]
        source: TransitionError,
    },

    #[error("Durable store unavailable while loading job {id}: {source}")]
    Store {
        id: Uuid,
        #[source]
        source: StoreError,
    },
}
