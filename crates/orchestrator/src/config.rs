//! Orchestrator tuning knobs.

use std::time::Duration;

use salonpost_core::payload::JobType;

/// Retry and concurrency policy loaded from environment variables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Attempts per job, first try included (default: `3`).
    pub max_attempts: i32,
    /// Delay before retrying a generate job (default: `60` seconds).
    pub generate_retry_delay: Duration,
    /// Delay before retrying a publish job (default: `120` seconds).
    pub publish_retry_delay: Duration,
    /// Concurrent attempts across all jobs (default: `2`).
    pub concurrency: usize,
    /// Wall-clock bound on one job's whole attempt sequence
    /// (default: `1800` seconds).
    pub job_deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            generate_retry_delay: Duration::from_secs(60),
            publish_retry_delay: Duration::from_secs(120),
            concurrency: 2,
            job_deadline: Duration::from_secs(1800),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `ORCH_MAX_ATTEMPTS`         | `3`     |
    /// | `GENERATE_RETRY_DELAY_SECS` | `60`    |
    /// | `PUBLISH_RETRY_DELAY_SECS`  | `120`   |
    /// | `ORCH_CONCURRENCY`          | `2`     |
    /// | `JOB_DEADLINE_SECS`         | `1800`  |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts: i32 = env_or("ORCH_MAX_ATTEMPTS", defaults.max_attempts);
        let generate_secs: u64 = env_or("GENERATE_RETRY_DELAY_SECS", 60);
        let publish_secs: u64 = env_or("PUBLISH_RETRY_DELAY_SECS", 120);
        let concurrency: usize = env_or("ORCH_CONCURRENCY", defaults.concurrency);
        let deadline_secs: u64 = env_or("JOB_DEADLINE_SECS", 1800);

        Self {
            max_attempts,
            generate_retry_delay: Duration::from_secs(generate_secs),
            publish_retry_delay: Duration::from_secs(publish_secs),
            concurrency,
            job_deadline: Duration::from_secs(deadline_secs),
        }
    }

    /// Fixed retry delay for a job type.
    pub fn retry_delay(&self, job_type: JobType) -> Duration {
        match job_type {
            JobType::Generate => self.generate_retry_delay,
            JobType::Publish => self.publish_retry_delay,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
