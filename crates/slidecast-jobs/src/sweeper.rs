//! Background purge of jobs past the retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::error::JobsResult;
use crate::store::JobStore;

/// Periodically removes jobs older than the retention window, whatever
/// their status.
pub struct RetentionSweeper {
    store: Arc<dyn JobStore>,
    retention: chrono::Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn JobStore>, retention: chrono::Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    /// Start the sweep loop.
    ///
    /// Runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        info!(
            "Starting job retention sweeper (interval: {:?}, retention: {}h)",
            self.interval,
            self.retention.num_hours()
        );

        let mut ticker = interval(self.interval);

        loop {
            ticker.tick().await;

            if let Err(e) = self.sweep_once().await {
                error!("Job retention sweep error: {}", e);
            }
        }
    }

    /// Run a single sweep. Returns the number of jobs removed.
    pub async fn sweep_once(&self) -> JobsResult<usize> {
        let cutoff = Utc::now() - self.retention;
        let removed = self.store.purge_created_before(cutoff).await?;
        if removed > 0 {
            info!(removed, "Removed jobs past the retention window");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryJobStore;
    use slidecast_models::{Job, JobId, JobPatch, JobStatus};

    #[tokio::test]
    async fn test_sweep_removes_old_jobs_regardless_of_status() {
        let store = Arc::new(InMemoryJobStore::new());

        let stuck = Job::new(JobId::new(), Utc::now() - chrono::Duration::hours(30));
        let stuck_id = stuck.job_id.clone();
        store.create(stuck).await.unwrap();

        let recent = Job::new(JobId::new(), Utc::now());
        let recent_id = recent.job_id.clone();
        store.create(recent).await.unwrap();
        store
            .update(&recent_id, JobPatch::new().status(JobStatus::Processing))
            .await
            .unwrap();

        let sweeper = RetentionSweeper::new(
            store.clone(),
            chrono::Duration::hours(24),
            Duration::from_secs(600),
        );
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

        assert!(store.get(&stuck_id).await.is_err());
        assert!(store.get(&recent_id).await.is_ok());
    }
}
