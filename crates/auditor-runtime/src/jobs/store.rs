//! Job storage trait and the in-memory implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;

use super::{JobError, JobEvent, JobId, JobRecord, JobUpdate};

/// Events buffered per job before slow subscribers start lagging.
const EVENT_CAPACITY: usize = 64;

/// Storage for job records and their event streams.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Register a new queued job.
    async fn create(&self, id: JobId) -> Result<JobRecord, JobError>;

    /// Apply an update and notify subscribers. Finished jobs reject updates.
    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<JobRecord, JobError>;

    async fn get(&self, id: &JobId) -> Option<JobRecord>;

    /// Receive events for one job from now on.
    async fn subscribe(&self, id: &JobId) -> Result<broadcast::Receiver<JobEvent>, JobError>;

    /// Drop a finished job. Subscribers still attached see the channel close.
    async fn remove(&self, id: &JobId) -> Result<JobRecord, JobError>;

    /// Drop every finished job last updated more than `older_than` ago.
    /// Returns how many were removed.
    async fn prune_finished(&self, older_than: Duration) -> usize;
}

struct JobEntry {
    record: JobRecord,
    events: broadcast::Sender<JobEvent>,
}

/// Job store for a single process.
///
/// Records stay until [`JobStore::remove`] or [`JobStore::prune_finished`]
/// drops them; long-lived hosts should prune periodically.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, id: JobId) -> Result<JobRecord, JobError> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&id) {
            return Err(JobError::AlreadyExists(id));
        }

        let record = JobRecord::queued(id.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        jobs.insert(
            id,
            JobEntry {
                record: record.clone(),
                events,
            },
        );
        Ok(record)
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> Result<JobRecord, JobError> {
        let mut jobs = self.jobs.write();
        let entry = jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.clone()))?;

        if entry.record.status.is_terminal() {
            return Err(JobError::AlreadyFinished(id.clone()));
        }

        let stage = update.stage;
        entry.record.apply(update);

        // No receivers is fine
        let _ = entry.events.send(JobEvent::from_record(&entry.record, stage));
        Ok(entry.record.clone())
    }

    async fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.read().get(id).map(|entry| entry.record.clone())
    }

    async fn subscribe(&self, id: &JobId) -> Result<broadcast::Receiver<JobEvent>, JobError> {
        self.jobs
            .read()
            .get(id)
            .map(|entry| entry.events.subscribe())
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    async fn remove(&self, id: &JobId) -> Result<JobRecord, JobError> {
        let mut jobs = self.jobs.write();
        match jobs.get(id) {
            None => Err(JobError::NotFound(id.clone())),
            Some(entry) if !entry.record.status.is_terminal() => {
                Err(JobError::StillRunning(id.clone()))
            }
            Some(_) => jobs
                .remove(id)
                .map(|entry| entry.record)
                .ok_or_else(|| JobError::NotFound(id.clone())),
        }
    }

    async fn prune_finished(&self, older_than: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, entry| {
            !(entry.record.status.is_terminal() && entry.record.updated_at <= cutoff)
        });
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::debug!(removed, "Pruned finished jobs");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use auditor_core::Stage;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryJobStore::new();
        let id = JobId::new();

        let record = store.create(id.clone()).await.unwrap();
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(store.get(&id).await, Some(record));
        assert_eq!(store.len(), 1);

        assert_eq!(
            store.create(id.clone()).await.unwrap_err(),
            JobError::AlreadyExists(id)
        );
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = InMemoryJobStore::new();
        let id = JobId::new();
        assert!(store.get(&id).await.is_none());
        assert!(store.subscribe(&id).await.is_err());
        assert_eq!(
            store.update(&id, JobUpdate::failed("x")).await.unwrap_err(),
            JobError::NotFound(id)
        );
    }

    #[tokio::test]
    async fn test_updates_are_broadcast() {
        let store = InMemoryJobStore::new();
        let id = JobId::new();
        store.create(id.clone()).await.unwrap();
        let mut events = store.subscribe(&id).await.unwrap();

        store
            .update(&id, JobUpdate::stage(Stage::Extracting, "Agent 1: Clause Context Extracted"))
            .await
            .unwrap();
        store.update(&id, JobUpdate::failed("boom")).await.unwrap();

        match events.recv().await.unwrap() {
            JobEvent::Progress {
                stage_name,
                progress_percent,
                ..
            } => {
                assert_eq!(stage_name.as_deref(), Some("extract_clauses"));
                assert_eq!(progress_percent, 25);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let last = events.recv().await.unwrap();
        assert!(last.is_terminal());
    }

    #[tokio::test]
    async fn test_finished_jobs_reject_updates() {
        let store = InMemoryJobStore::new();
        let id = JobId::new();
        store.create(id.clone()).await.unwrap();
        store.update(&id, JobUpdate::failed("boom")).await.unwrap();

        let err = store
            .update(&id, JobUpdate::stage(Stage::Auditing, "late"))
            .await
            .unwrap_err();
        assert_eq!(err, JobError::AlreadyFinished(id.clone()));
        assert_eq!(store.get(&id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_remove_only_finished_jobs() {
        let store = InMemoryJobStore::new();
        let id = JobId::new();
        store.create(id.clone()).await.unwrap();

        assert_eq!(
            store.remove(&id).await.unwrap_err(),
            JobError::StillRunning(id.clone())
        );

        let mut events = store.subscribe(&id).await.unwrap();
        store.update(&id, JobUpdate::failed("boom")).await.unwrap();
        assert!(events.recv().await.unwrap().is_terminal());

        let removed = store.remove(&id).await.unwrap();
        assert_eq!(removed.status, JobStatus::Failed);
        assert!(store.get(&id).await.is_none());
        assert!(store.is_empty());
        assert!(matches!(
            events.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(store.remove(&id).await.unwrap_err(), JobError::NotFound(id));
    }

    #[tokio::test]
    async fn test_prune_keeps_running_and_recent_jobs() {
        let store = InMemoryJobStore::new();
        let running = JobId::new();
        let finished = JobId::new();
        store.create(running.clone()).await.unwrap();
        store.create(finished.clone()).await.unwrap();
        store.update(&finished, JobUpdate::failed("boom")).await.unwrap();

        assert_eq!(store.prune_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.len(), 2);

        assert_eq!(store.prune_finished(Duration::ZERO).await, 1);
        assert!(store.get(&finished).await.is_none());
        assert!(store.get(&running).await.is_some());

        assert_eq!(store.prune_finished(Duration::MAX).await, 0);
    }
}
