//! Job store abstraction and the in-process implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use slidecast_models::{Job, JobId, JobPatch};

use crate::error::{JobsError, JobsResult};

/// Jobs are kept for 24 hours after creation.
pub const DEFAULT_RETENTION: Duration = Duration::hours(24);

/// Key-value store of job records.
///
/// `update` must apply a patch to the stored record as one atomic step: no
/// other update to the same job may interleave with it, whatever the backend.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job.
    async fn create(&self, job: Job) -> JobsResult<()>;

    /// Snapshot of a job.
    async fn get(&self, id: &JobId) -> JobsResult<Job>;

    /// Apply `patch` atomically and return the updated snapshot.
    async fn update(&self, id: &JobId, patch: JobPatch) -> JobsResult<Job>;

    /// All retained jobs, newest first.
    async fn list(&self) -> JobsResult<Vec<Job>>;

    /// Remove jobs created before `cutoff`. Returns the number removed.
    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> JobsResult<usize>;
}

/// Process-local job store.
///
/// Records older than the retention window are invisible to reads even
/// before the sweeper removes them.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    retention: Duration,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    fn is_expired(&self, job: &Job, now: DateTime<Utc>) -> bool {
        now - job.created_at > self.retention
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> JobsResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_id) {
            return Err(JobsError::AlreadyExists(job.job_id));
        }
        jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> JobsResult<Job> {
        let jobs = self.jobs.read().await;
        jobs.get(id)
            .filter(|job| !self.is_expired(job, Utc::now()))
            .cloned()
            .ok_or_else(|| JobsError::NotFound(id.clone()))
    }

    async fn update(&self, id: &JobId, patch: JobPatch) -> JobsResult<Job> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .filter(|job| now - job.created_at <= self.retention)
            .ok_or_else(|| JobsError::NotFound(id.clone()))?;

        job.apply(patch, now)
            .map_err(|source| JobsError::rejected(id, source))?;
        Ok(job.clone())
    }

    async fn list(&self) -> JobsResult<Vec<Job>> {
        let now = Utc::now();
        let jobs = self.jobs.read().await;
        let mut list: Vec<Job> = jobs
            .values()
            .filter(|job| !self.is_expired(job, now))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> JobsResult<usize> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.created_at >= cutoff);
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, "Purged expired jobs");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slidecast_models::{JobStatus, PatchError};

    fn job_created_at(created_at: DateTime<Utc>) -> Job {
        Job::new(JobId::new(), created_at)
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let store = InMemoryJobStore::new();
        let job = job_created_at(Utc::now());
        let id = job.job_id.clone();
        store.create(job).await.unwrap();

        let updated = store
            .update(&id, JobPatch::new().status(JobStatus::Processing).progress(10))
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Processing);
        assert_eq!(store.get(&id).await.unwrap().progress, 10);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = InMemoryJobStore::new();
        let job = job_created_at(Utc::now());
        store.create(job.clone()).await.unwrap();
        assert!(matches!(store.create(job).await, Err(JobsError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = InMemoryJobStore::new();
        let id = JobId::from_string("missing");
        assert!(store.get(&id).await.unwrap_err().is_not_found());
        assert!(store.update(&id, JobPatch::new().progress(5)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_on_terminal_job_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = job_created_at(Utc::now());
        let id = job.job_id.clone();
        store.create(job).await.unwrap();
        store
            .update(&id, JobPatch::new().status(JobStatus::Cancelled))
            .await
            .unwrap();

        let err = store
            .update(&id, JobPatch::new().status(JobStatus::Processing))
            .await
            .unwrap_err();
        assert_eq!(err.terminal_status(), Some(JobStatus::Cancelled));
        assert!(matches!(
            err,
            JobsError::Rejected { source: PatchError::Terminal(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_jobs_are_invisible_and_purged() {
        let store = InMemoryJobStore::new();
        let old = job_created_at(Utc::now() - Duration::hours(25));
        let old_id = old.job_id.clone();
        let fresh = job_created_at(Utc::now());
        let fresh_id = fresh.job_id.clone();
        store.create(old).await.unwrap();
        store.create(fresh).await.unwrap();

        assert!(store.get(&old_id).await.unwrap_err().is_not_found());
        let listed: Vec<JobId> = store.list().await.unwrap().into_iter().map(|j| j.job_id).collect();
        assert_eq!(listed, vec![fresh_id.clone()]);

        let removed = store
            .purge_created_before(Utc::now() - DEFAULT_RETENTION)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&fresh_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = InMemoryJobStore::new();
        let older = job_created_at(Utc::now() - Duration::minutes(5));
        let newer = job_created_at(Utc::now());
        let newer_id = newer.job_id.clone();
        store.create(older).await.unwrap();
        store.create(newer).await.unwrap();
        assert_eq!(store.list().await.unwrap()[0].job_id, newer_id);
    }

    #[tokio::test]
    async fn test_concurrent_patches_do_not_lose_updates() {
        let store = std::sync::Arc::new(InMemoryJobStore::new());
        let job = job_created_at(Utc::now());
        let id = job.job_id.clone();
        store.create(job).await.unwrap();
        store
            .update(&id, JobPatch::new().status(JobStatus::Processing))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20u8 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(&id, JobPatch::new().step(format!("step {}", i)).progress(i))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let job = store.get(&id).await.unwrap();
        assert_eq!(job.steps.len(), 20);
        assert_eq!(job.progress, 19);
    }
}
