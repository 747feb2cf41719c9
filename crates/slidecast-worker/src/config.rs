//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Name of the published output tree under the work directory.
pub const OUTPUTS_DIR: &str = "outputs";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root of per-job working directories and of the published outputs
    pub work_dir: PathBuf,
    /// Directory local input references may be read from (none = http(s) only)
    pub local_input_root: Option<PathBuf>,
    /// Prefix of published output URLs
    pub public_base_url: String,
    /// Maximum jobs processing at once (0 = unbounded)
    pub max_concurrent_jobs: usize,
    /// Delay between SIGTERM and SIGKILL on cancellation
    pub cancel_grace: Duration,
    /// How long job records are kept after creation
    pub job_retention: Duration,
    /// Interval of the job retention sweep
    pub sweep_interval: Duration,
    /// Age after which published outputs are deleted
    pub output_retention: Duration,
    /// Interval of the output janitor
    pub janitor_interval: Duration,
    /// Encoder silence before the mux progress estimator takes over
    pub mux_quiescence: Duration,
    /// Period of the mux progress estimator
    pub mux_fallback_tick: Duration,
    /// Nominal minimum duration of the final encode
    pub mux_nominal: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./temp"),
            local_input_root: None,
            public_base_url: "http://localhost:3000".to_string(),
            max_concurrent_jobs: 0,
            cancel_grace: Duration::from_secs(2),
            job_retention: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(600),
            output_retention: Duration::from_secs(3 * 24 * 3600),
            janitor_interval: Duration::from_secs(3600),
            mux_quiescence: Duration::from_millis(2000),
            mux_fallback_tick: Duration::from_millis(1000),
            mux_nominal: Duration::from_secs(30),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("RENDER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            local_input_root: std::env::var("RENDER_LOCAL_INPUT_ROOT")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            max_concurrent_jobs: env_parse("RENDER_MAX_CONCURRENT_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs),
            cancel_grace: env_parse("RENDER_CANCEL_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cancel_grace),
            job_retention: env_parse("RENDER_JOB_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_retention),
            sweep_interval: env_parse("RENDER_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            output_retention: env_parse("RENDER_OUTPUT_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.output_retention),
            janitor_interval: env_parse("RENDER_JANITOR_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.janitor_interval),
            mux_quiescence: env_parse("RENDER_MUX_QUIESCENCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.mux_quiescence),
            mux_fallback_tick: env_parse("RENDER_MUX_FALLBACK_TICK_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.mux_fallback_tick),
            mux_nominal: env_parse("RENDER_MUX_NOMINAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.mux_nominal),
        }
    }

    /// Working directory of one job.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(job_id)
    }

    /// Directory served under `/videos`. Holds finished outputs only.
    pub fn output_dir(&self) -> PathBuf {
        self.work_dir.join(OUTPUTS_DIR)
    }

    /// Published location of a job's output file.
    pub fn published_dir(&self, job_id: &str) -> PathBuf {
        self.output_dir().join(job_id)
    }

    /// Public URL of a job's published output.
    pub fn output_url(&self, job_id: &str, file_name: &str) -> String {
        format!(
            "{}/videos/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            job_id,
            file_name
        )
    }

    /// Job retention as a chrono duration.
    pub fn job_retention_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.job_retention).unwrap_or(chrono::Duration::hours(24))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.cancel_grace, Duration::from_secs(2));
        assert_eq!(config.max_concurrent_jobs, 0);
        assert_eq!(config.job_retention_chrono(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_output_url() {
        let config = WorkerConfig {
            public_base_url: "https://render.example.com/".to_string(),
            ..WorkerConfig::default()
        };
        assert_eq!(
            config.output_url("abc", "output.mp4"),
            "https://render.example.com/videos/abc/output.mp4"
        );
        assert_eq!(config.job_dir("abc"), PathBuf::from("./temp/abc"));
        assert_eq!(config.published_dir("abc"), PathBuf::from("./temp/outputs/abc"));
    }

    #[test]
    fn test_local_inputs_disabled_by_default() {
        assert!(WorkerConfig::default().local_input_root.is_none());
    }
}
