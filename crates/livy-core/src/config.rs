//! Connection, polling and result-size settings.

use std::{collections::HashMap, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Rule deciding whether a line continues onto the next physical line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationRule {
    /// A next line starting with `.` (but not `..` or `./`) chains onto the current one.
    #[default]
    FluentDot,
    /// Every line stands on its own until the server reports it incomplete.
    Disabled,
}

impl ContinuationRule {
    /// Whether the line before `next_line` must be held back and merged with it.
    #[must_use]
    pub fn continues(self, next_line: &str) -> bool {
        match self {
            Self::FluentDot => {
                let next = next_line.trim();
                next.starts_with('.') && !next.starts_with("..") && !next.starts_with("./")
            }
            Self::Disabled => false,
        }
    }
}

impl FromStr for ContinuationRule {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fluent_dot" => Ok(Self::FluentDot),
            "disabled" => Ok(Self::Disabled),
            _ => Err(()),
        }
    }
}

/// Settings for talking to a Livy server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivyConfig {
    /// Base URL of the Livy server.
    pub url: String,
    /// Row cap passed to `show()` for SQL queries.
    pub max_result: usize,
    /// Run SQL paragraphs in parallel instead of on the shared FIFO.
    pub concurrent_sql: bool,
    /// Parallelism of the SQL scheduler when `concurrent_sql` is set.
    pub max_concurrency: usize,
    /// Pause between two status polls.
    pub poll_interval_ms: u64,
    /// Deadline for a new session to become idle.
    pub session_start_timeout_ms: u64,
    /// Deadline for one statement; `None` waits until cancelled.
    pub statement_timeout_ms: Option<u64>,
    /// Timeout of a single HTTP request.
    pub request_timeout_ms: u64,
    pub continuation: ContinuationRule,
}

impl Default for LivyConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8998".to_string(),
            max_result: 1000,
            concurrent_sql: false,
            max_concurrency: 10,
            poll_interval_ms: 1000,
            session_start_timeout_ms: 300_000,
            statement_timeout_ms: None,
            request_timeout_ms: 30_000,
            continuation: ContinuationRule::FluentDot,
        }
    }
}

// (property key, environment variable) per field.
const URL: (&str, &str) = ("zeppelin.livy.url", "LIVY_URL");
const MAX_RESULT: (&str, &str) = ("zeppelin.livy.spark.sql.maxResult", "LIVY_SPARK_SQL_MAX_RESULT");
const CONCURRENT_SQL: (&str, &str) = ("zeppelin.livy.concurrentSQL", "LIVY_CONCURRENT_SQL");
const MAX_CONCURRENCY: (&str, &str) = (
    "zeppelin.livy.concurrentSQL.maxConcurrency",
    "LIVY_MAX_CONCURRENCY",
);
const POLL_INTERVAL: (&str, &str) = (
    "zeppelin.livy.pull_status.interval.millis",
    "LIVY_POLL_INTERVAL_MS",
);
const SESSION_START_TIMEOUT: (&str, &str) = (
    "zeppelin.livy.session.create_timeout.millis",
    "LIVY_SESSION_START_TIMEOUT_MS",
);
const STATEMENT_TIMEOUT: (&str, &str) = (
    "zeppelin.livy.statement.timeout.millis",
    "LIVY_STATEMENT_TIMEOUT_MS",
);
const REQUEST_TIMEOUT: (&str, &str) = ("zeppelin.livy.http.timeout.millis", "LIVY_REQUEST_TIMEOUT_MS");
const CONTINUATION: (&str, &str) = ("zeppelin.livy.continuation", "LIVY_CONTINUATION");

impl LivyConfig {
    /// Build a config from interpreter properties, falling back to defaults.
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    /// Returns error if a known key holds a value that does not parse.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|(key, _)| props.get(key).map(|v| (key, v.clone())))
    }

    /// Build a config from `LIVY_*` environment variables, falling back to defaults.
    ///
    /// # Errors
    /// Returns error if a variable holds a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|(_, var)| std::env::var(var).ok().map(|v| (var, v)))
    }

    fn from_lookup<'a, F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn((&'a str, &'a str)) -> Option<(&'a str, String)>,
    {
        let mut cfg = Self::default();
        if let Some((_, v)) = lookup(URL) {
            cfg.url = v.trim().to_string();
        }
        if let Some((key, v)) = lookup(MAX_RESULT) {
            cfg.max_result = parse(key, &v)?;
        }
        if let Some((key, v)) = lookup(CONCURRENT_SQL) {
            cfg.concurrent_sql = parse(key, &v)?;
        }
        if let Some((key, v)) = lookup(MAX_CONCURRENCY) {
            cfg.max_concurrency = parse(key, &v)?;
        }
        if let Some((key, v)) = lookup(POLL_INTERVAL) {
            cfg.poll_interval_ms = parse(key, &v)?;
        }
        if let Some((key, v)) = lookup(SESSION_START_TIMEOUT) {
            cfg.session_start_timeout_ms = parse(key, &v)?;
        }
        if let Some((key, v)) = lookup(STATEMENT_TIMEOUT) {
            cfg.statement_timeout_ms = Some(parse(key, &v)?);
        }
        if let Some((key, v)) = lookup(REQUEST_TIMEOUT) {
            cfg.request_timeout_ms = parse(key, &v)?;
        }
        if let Some((key, v)) = lookup(CONTINUATION) {
            cfg.continuation = parse(key, &v)?;
        }
        tracing::debug!(url = %cfg.url, poll_interval_ms = cfg.poll_interval_ms, "loaded Livy config");
        Ok(cfg)
    }

    /// Server URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn session_start_timeout(&self) -> Duration {
        Duration::from_millis(self.session_start_timeout_ms)
    }

    #[must_use]
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}
