//! Removal of old published outputs.
//!
//! Published outputs live under `<work>/outputs/` and outlive their job
//! records. The janitor deletes files under the work root older than the
//! output retention and prunes directories left empty. Working directories
//! of unfinished jobs are never touched.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use slidecast_jobs::JobStore;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::error::{WorkerError, WorkerResult};

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JanitorReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
}

pub struct OutputJanitor {
    work_root: PathBuf,
    max_age: Duration,
    interval: Duration,
    store: Arc<dyn JobStore>,
}

impl OutputJanitor {
    pub fn new(
        work_root: impl Into<PathBuf>,
        max_age: Duration,
        interval: Duration,
        store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            work_root: work_root.into(),
            max_age,
            interval,
            store,
        }
    }

    /// Start the sweep loop. Runs indefinitely.
    pub async fn run(&self) {
        info!(
            "Starting output janitor on {} (interval: {:?}, max age: {:?})",
            self.work_root.display(),
            self.interval,
            self.max_age
        );

        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once().await {
                error!("Output janitor sweep error: {}", e);
            }
        }
    }

    pub async fn sweep_once(&self) -> WorkerResult<JanitorReport> {
        let active: HashSet<String> = self
            .store
            .list()
            .await
            .map_err(WorkerError::from_store)?
            .into_iter()
            .filter(|job| !job.is_terminal())
            .map(|job| job.job_id.as_str().to_string())
            .collect();

        let root = self.work_root.clone();
        let max_age = self.max_age;
        let report = tokio::task::spawn_blocking(move || sweep_root(&root, max_age, &active))
            .await
            .map_err(|e| WorkerError::internal(format!("janitor task failed: {}", e)))??;

        if report.files_removed > 0 || report.dirs_removed > 0 {
            info!(
                files = report.files_removed,
                dirs = report.dirs_removed,
                "Removed expired outputs"
            );
        }
        Ok(report)
    }
}

fn sweep_root(root: &Path, max_age: Duration, active: &HashSet<String>) -> WorkerResult<JanitorReport> {
    let mut report = JanitorReport::default();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if active.contains(&name) {
            debug!(job_id = %name, "Skipping directory of unfinished job");
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            sweep_dir(&path, now, max_age, &mut report);
            remove_if_empty(&path, &mut report);
        } else if is_expired(&path, now, max_age) {
            remove_file(&path, &mut report);
        }
    }
    Ok(report)
}

fn sweep_dir(dir: &Path, now: SystemTime, max_age: Duration, report: &mut JanitorReport) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), "Cannot read directory: {}", e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => {
                sweep_dir(&path, now, max_age, report);
                remove_if_empty(&path, report);
            }
            Ok(_) if is_expired(&path, now, max_age) => remove_file(&path, report),
            Ok(_) => {}
            Err(e) => warn!(path = %path.display(), "Cannot stat entry: {}", e),
        }
    }
}

fn is_expired(path: &Path, now: SystemTime, max_age: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age >= max_age)
}

fn remove_file(path: &Path, report: &mut JanitorReport) {
    match fs::remove_file(path) {
        Ok(()) => report.files_removed += 1,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove expired file: {}", e),
    }
}

fn remove_if_empty(dir: &Path, report: &mut JanitorReport) {
    let empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if empty && fs::remove_dir(dir).is_ok() {
        report.dirs_removed += 1;
    }
}
