//! Cancellation handles of running jobs.
//!
//! Handles live here, keyed by job id, and never on the job record itself,
//! so snapshots handed to callers cannot carry them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use slidecast_media::ProcessGroup;
use slidecast_models::JobId;
use tokio::sync::watch;

/// Cancel flag and process group of one job.
#[derive(Debug)]
pub struct JobControl {
    cancel_tx: watch::Sender<bool>,
    group: ProcessGroup,
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

impl JobControl {
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            cancel_tx,
            group: ProcessGroup::new(),
        }
    }

    pub fn group(&self) -> &ProcessGroup {
        &self.group
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Resolves once the job is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Raise the cancel flag and SIGTERM every running process.
    ///
    /// Returns the number of processes signalled.
    pub fn cancel(&self) -> usize {
        self.cancel_tx.send_replace(true);
        self.group.terminate_all()
    }

    /// SIGKILL processes that survived [`JobControl::cancel`].
    pub fn kill_remaining(&self) -> usize {
        self.group.kill_remaining()
    }
}

/// Controls of jobs that have not finished yet.
#[derive(Debug, Clone, Default)]
pub struct ControlTable {
    inner: Arc<Mutex<HashMap<JobId, Arc<JobControl>>>>,
}

impl ControlTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobControl>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a fresh control for `job_id`.
    pub fn register(&self, job_id: &JobId) -> Arc<JobControl> {
        let control = Arc::new(JobControl::new());
        self.lock().insert(job_id.clone(), control.clone());
        control
    }

    pub fn get(&self, job_id: &JobId) -> Option<Arc<JobControl>> {
        self.lock().get(job_id).cloned()
    }

    pub fn remove(&self, job_id: &JobId) -> Option<Arc<JobControl>> {
        self.lock().remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let control = Arc::new(JobControl::new());
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.cancelled().await })
        };

        assert!(!control.is_cancelled());
        assert_eq!(control.cancel(), 0);
        assert!(control.is_cancelled());
        assert!(control.group().is_cancelled());

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_control_table() {
        let table = ControlTable::new();
        let id = JobId::new();
        let control = table.register(&id);
        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(&control, &table.get(&id).unwrap()));
        assert!(table.remove(&id).is_some());
        assert!(table.is_empty());
        assert!(table.get(&id).is_none());
    }
}
