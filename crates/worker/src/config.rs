use std::time::Duration;

use sieve_core::retry::{
    RetryPolicy, DEFAULT_HARD_TIME_LIMIT, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF,
    DEFAULT_SOFT_TIME_LIMIT,
};

use crate::analyzer::detector::DetectorCommand;
use crate::error::WorkerError;
use crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use crate::runner::DEFAULT_POLL_INTERVAL;

/// Extra lease time on top of the hard limit, so a live worker always settles
/// its message before the lease runs out.
const LEASE_GRACE: Duration = Duration::from_secs(60);

/// Worker process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Base name; instances are suffixed `-0`, `-1`, ...
    pub name: String,
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub lease: Duration,
    pub heartbeat_interval: Duration,
    pub face_detector: Option<DetectorCommand>,
    pub text_extractor: Option<DetectorCommand>,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Default           |
    /// |---------------------------|-------------------|
    /// | `DATABASE_URL`            | required          |
    /// | `WORKER_NAME`             | `<hostname>-<pid>`|
    /// | `WORKER_CONCURRENCY`      | `1`               |
    /// | `POLL_INTERVAL_MS`        | `1000`            |
    /// | `MAX_ATTEMPTS`            | `4`               |
    /// | `RETRY_BACKOFF_SECS`      | `5`               |
    /// | `SOFT_TIME_LIMIT_SECS`    | `270`             |
    /// | `HARD_TIME_LIMIT_SECS`    | `300`             |
    /// | `LEASE_SECS`              | hard limit + 60   |
    /// | `HEARTBEAT_INTERVAL_SECS` | `10`              |
    /// | `FACE_DETECT_CMD`         | unset             |
    /// | `OCR_CMD`                 | unset             |
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| WorkerError::Config("DATABASE_URL must be set".into()))?;

        let name = lookup("WORKER_NAME")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default_name(&lookup));

        let concurrency: usize = parse_or(&lookup, "WORKER_CONCURRENCY", 1)?;
        if concurrency == 0 {
            return Err(WorkerError::Config(
                "WORKER_CONCURRENCY must be at least 1".into(),
            ));
        }

        let poll_interval = Duration::from_millis(parse_or(
            &lookup,
            "POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL.as_millis() as u64,
        )?);

        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            backoff: secs_or(&lookup, "RETRY_BACKOFF_SECS", DEFAULT_RETRY_BACKOFF)?,
            soft_time_limit: secs_or(&lookup, "SOFT_TIME_LIMIT_SECS", DEFAULT_SOFT_TIME_LIMIT)?,
            hard_time_limit: secs_or(&lookup, "HARD_TIME_LIMIT_SECS", DEFAULT_HARD_TIME_LIMIT)?,
        };
        retry.validate()?;

        let lease = secs_or(&lookup, "LEASE_SECS", retry.hard_time_limit + LEASE_GRACE)?;
        if lease <= retry.hard_time_limit {
            return Err(WorkerError::Config(
                "LEASE_SECS must exceed HARD_TIME_LIMIT_SECS".into(),
            ));
        }

        let heartbeat_interval =
            secs_or(&lookup, "HEARTBEAT_INTERVAL_SECS", DEFAULT_HEARTBEAT_INTERVAL)?;

        Ok(Self {
            database_url,
            name,
            concurrency,
            poll_interval,
            retry,
            lease,
            heartbeat_interval,
            face_detector: lookup("FACE_DETECT_CMD").and_then(|c| DetectorCommand::parse(&c)),
            text_extractor: lookup("OCR_CMD").and_then(|c| DetectorCommand::parse(&c)),
        })
    }

    /// Name of the `index`-th instance in this process.
    pub fn instance_name(&self, index: usize) -> String {
        format!("{}-{index}", self.name)
    }
}

fn default_name<F: Fn(&str) -> Option<String>>(lookup: &F) -> String {
    let host = lookup("HOSTNAME").unwrap_or_else(|| "sieve-worker".into());
    format!("{host}-{}", std::process::id())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, WorkerError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| WorkerError::Config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, WorkerError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}
