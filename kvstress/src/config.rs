//! Run configuration: YAML-loadable, validated before anything spawns.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::http::RetryPolicy;

/// Relative likelihood of each operation kind.
///
/// Weights are normalized at selection time and need not sum to anything in
/// particular; at least one must be positive.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Weights {
    /// Weight of SET.
    pub set: u32,
    /// Weight of GET.
    pub get: u32,
    /// Weight of DELETE.
    pub delete: u32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            set: 1,
            get: 1,
            delete: 1,
        }
    }
}

/// Inclusive bounds of the per-iteration think-time sleep.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Jitter {
    /// Shortest sleep before an iteration.
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    /// Longest sleep before an iteration.
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl Default for Jitter {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(1),
            max: Duration::from_millis(20),
        }
    }
}

/// Everything a run needs, set once at startup and never mutated.
///
/// The defaults reproduce the reference run: 50 workers of 200 ops each
/// against `http://localhost:8080`, over a keyspace of 1000, with a 2s
/// per-request timeout and 3 attempts per call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the service under test.
    pub base_url: String,
    /// Number of concurrent workers.
    pub workers: u32,
    /// Iterations every worker performs.
    pub ops_per_worker: u32,
    /// Number of distinct keys (and values) to draw from.
    pub keyspace_size: u32,
    /// Relative operation mix.
    pub weights: Weights,
    /// Think-time bounds between iterations.
    pub jitter: Jitter,
    /// Connection pool size; raised to `workers` when omitted or set lower.
    pub pool_size: Option<u32>,
    /// Attempts per call, including the first.
    pub retries: u32,
    /// Backoff before the first retry; doubles on every further one.
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
    /// Per-request timeout; an expired call counts as a transport failure.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Seed for reproducible sampling; drawn from entropy when omitted.
    pub seed: Option<u64>,
    /// Print one line per completed call.
    pub verbose: bool,
    /// Issue `POST /compact` once after the warm-up pass.
    pub compact_after_warmup: bool,
    /// Exit nonzero when the measured failure rate exceeds this fraction.
    pub max_failure_rate: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_owned(),
            workers: 50,
            ops_per_worker: 200,
            keyspace_size: 1000,
            weights: Weights::default(),
            jitter: Jitter::default(),
            pool_size: None,
            retries: 3,
            backoff: Duration::from_millis(50),
            timeout: Duration::from_secs(2),
            seed: None,
            verbose: false,
            compact_after_warmup: false,
            max_failure_rate: None,
        }
    }
}

impl Config {
    /// Loads and validates a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).context("failed to open config file")?;
        let config: Config =
            serde_yaml::from_reader(file).context("failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.workers >= 1, "workers must be at least 1");
        ensure!(self.ops_per_worker >= 1, "ops_per_worker must be at least 1");
        ensure!(self.keyspace_size >= 1, "keyspace_size must be at least 1");

        let weight_sum =
            self.weights.set as u64 + self.weights.get as u64 + self.weights.delete as u64;
        ensure!(weight_sum > 0, "at least one operation weight must be positive");

        ensure!(
            self.jitter.min <= self.jitter.max,
            "jitter.min must not exceed jitter.max"
        );
        ensure!(self.retries >= 1, "retries must be at least 1");
        ensure!(!self.timeout.is_zero(), "timeout must be positive");
        reqwest::Url::parse(&self.base_url).context("base_url is not a valid URL")?;

        if let Some(rate) = self.max_failure_rate {
            ensure!(
                (0.0..=1.0).contains(&rate),
                "max_failure_rate must be within [0, 1]"
            );
        }

        Ok(())
    }

    /// Pool capacity actually used: never below the worker count, so the
    /// configured concurrency cannot exhaust the pool.
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or(self.workers).max(self.workers) as usize
    }

    /// The transport's retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retries,
            base_backoff: self.backoff,
        }
    }
}
