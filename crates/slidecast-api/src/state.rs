//! Application state.

use std::sync::Arc;

use slidecast_jobs::InMemoryJobStore;
use slidecast_media::{FfmpegEncoder, HttpFetcher};
use slidecast_worker::{RenderService, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub renders: Arc<RenderService>,
}

impl AppState {
    /// Create state backed by FFmpeg and an in-process job store.
    pub fn new(config: ApiConfig, worker_config: WorkerConfig) -> Self {
        let store = Arc::new(InMemoryJobStore::with_retention(
            worker_config.job_retention_chrono(),
        ));
        let fetcher = match &worker_config.local_input_root {
            Some(root) => HttpFetcher::default().with_local_root(root),
            None => HttpFetcher::default(),
        };
        let renders = RenderService::new(
            store,
            Arc::new(FfmpegEncoder::new()),
            Arc::new(fetcher),
            worker_config,
        );
        Self::with_service(config, renders)
    }

    /// Create state around an existing render service.
    pub fn with_service(config: ApiConfig, renders: RenderService) -> Self {
        Self {
            config,
            renders: Arc::new(renders),
        }
    }
}
