//! In-memory store of job handles, owned by one orchestrator.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::lifecycle::JobHandle;
use super::types::{BatchError, JobFilter, JobRecord};

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobHandle>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `record` and returns its handle. Ids are never reused, so an
    /// id that is already registered is rejected.
    pub async fn create(&self, record: JobRecord) -> Result<Arc<JobHandle>, BatchError> {
        let mut jobs = self.jobs.write().await;
        match jobs.entry(record.id.clone()) {
            Entry::Occupied(entry) => Err(BatchError::DuplicateJobId(entry.key().clone())),
            Entry::Vacant(entry) => {
                let handle = Arc::new(JobHandle::new(record));
                entry.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<JobHandle>> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Snapshots of matching jobs, newest first, at most `filter.limit`.
    pub async fn list(&self, filter: &JobFilter) -> Vec<JobRecord> {
        let mut records = Vec::new();
        for handle in self.handles().await {
            let record = handle.snapshot().await;
            if filter.matches(&record) {
                records.push(record);
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(filter.limit);
        records
    }

    pub async fn handles(&self) -> Vec<Arc<JobHandle>> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Removes terminal jobs whose `end_time` is older than `retention`.
    /// Returns the number removed.
    pub async fn purge_finished(&self, retention: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));

        let mut expired = Vec::new();
        for handle in self.handles().await {
            if !handle.status().is_terminal() {
                continue;
            }
            let ended = handle.read(|job| job.end_time).await;
            if let (Some(ended), Some(cutoff)) = (ended, cutoff) {
                if ended <= cutoff {
                    expired.push(handle.id().to_string());
                }
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut jobs = self.jobs.write().await;
        for id in &expired {
            jobs.remove(id);
            debug!(job_id = %id, "Purged finished job");
        }
        expired.len()
    }
}
