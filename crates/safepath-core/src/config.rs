//! Run configuration.
//!
//! Built once at startup from, in increasing precedence: defaults, an
//! optional TOML file, environment variables, command-line overrides. The
//! environment is read through a lookup function handed in by the caller, so
//! nothing in the pipeline touches process state on its own.

use crate::delivery::RetryPolicy;
use crate::error::{Error, Result};
use crate::finding::Severity;
use crate::scanner::{DEFAULT_ARGS, DEFAULT_PROGRAM};
use crate::targets::TargetSet;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const ENV_BACKEND_URL: &str = "BACKEND_URL";
pub const ENV_TARGETS: &str = "TARGETS";
pub const ENV_SCAN_TIMEOUT: &str = "NMAP_TIMEOUT";
pub const ENV_MAX_ATTEMPTS: &str = "RETRY_POST";
pub const ENV_RETRY_DELAY: &str = "RETRY_DELAY";

/// Everything one pass of the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub backend_url: String,
    pub targets: TargetSet,
    pub scan_timeout: Duration,
    pub scanner_program: String,
    pub scanner_args: Vec<String>,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub severity: Severity,
    pub severity_overrides: HashMap<String, Severity>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8000".to_string(),
            targets: TargetSet::parse("127.0.0.1"),
            scan_timeout: Duration::from_secs(120),
            scanner_program: DEFAULT_PROGRAM.to_string(),
            scanner_args: DEFAULT_ARGS.iter().map(|a| a.to_string()).collect(),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            severity: Severity::Medium,
            severity_overrides: HashMap::new(),
        }
    }
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend_url: Option<String>,
    pub targets: Option<String>,
    pub scan_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub retry_delay_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    backend: Option<BackendSection>,
    scan: Option<ScanSection>,
    severity: Option<SeveritySection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BackendSection {
    url: Option<String>,
    max_attempts: Option<u32>,
    retry_delay_secs: Option<f64>,
    request_timeout_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScanSection {
    targets: Option<String>,
    timeout_secs: Option<u64>,
    program: Option<String>,
    args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeveritySection {
    default: Option<Severity>,
    #[serde(default)]
    services: HashMap<String, Severity>,
}

impl RunConfig {
    /// Assemble and validate the configuration for a run.
    pub fn load<F>(file: Option<&Path>, env: F, overrides: &ConfigOverrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RunConfig::default();
        if let Some(path) = file {
            config.apply_file(path)?;
        }
        config.apply_env(env)?;
        config.apply_overrides(overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge a TOML configuration file over the current values.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.apply_toml(&content)
    }

    pub fn apply_toml(&mut self, content: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(content)?;

        if let Some(backend) = file.backend {
            if let Some(url) = backend.url {
                self.backend_url = url;
            }
            if let Some(n) = backend.max_attempts {
                self.max_attempts = n;
            }
            if let Some(secs) = backend.retry_delay_secs {
                self.retry_delay = seconds("backend.retry_delay_secs", secs)?;
            }
            if let Some(secs) = backend.request_timeout_secs {
                self.request_timeout = seconds("backend.request_timeout_secs", secs)?;
            }
        }

        if let Some(scan) = file.scan {
            if let Some(targets) = scan.targets {
                self.targets = TargetSet::parse(&targets);
            }
            if let Some(secs) = scan.timeout_secs {
                self.scan_timeout = Duration::from_secs(secs);
            }
            if let Some(program) = scan.program {
                self.scanner_program = program;
            }
            if let Some(args) = scan.args {
                self.scanner_args = args;
            }
        }

        if let Some(severity) = file.severity {
            if let Some(default) = severity.default {
                self.severity = default;
            }
            self.severity_overrides.extend(severity.services);
        }

        Ok(())
    }

    /// Merge environment variables, looked up through `env`.
    pub fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = env(ENV_BACKEND_URL) {
            self.backend_url = url;
        }
        if let Some(targets) = env(ENV_TARGETS) {
            self.targets = TargetSet::parse(&targets);
        }
        if let Some(raw) = env(ENV_SCAN_TIMEOUT) {
            self.scan_timeout = Duration::from_secs(parse_env(ENV_SCAN_TIMEOUT, &raw)?);
        }
        if let Some(raw) = env(ENV_MAX_ATTEMPTS) {
            self.max_attempts = parse_env(ENV_MAX_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = env(ENV_RETRY_DELAY) {
            self.retry_delay = seconds(ENV_RETRY_DELAY, parse_env(ENV_RETRY_DELAY, &raw)?)?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(url) = &overrides.backend_url {
            self.backend_url = url.clone();
        }
        if let Some(targets) = &overrides.targets {
            self.targets = TargetSet::parse(targets);
        }
        if let Some(secs) = overrides.scan_timeout_secs {
            self.scan_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = overrides.max_attempts {
            self.max_attempts = n;
        }
        if let Some(secs) = overrides.retry_delay_secs {
            self.retry_delay = seconds("--retry-delay", secs)?;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.backend_url).map_err(|e| {
            Error::Config(format!("invalid backend URL '{}': {}", self.backend_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "backend URL '{}' must use http or https",
                self.backend_url
            )));
        }
        if self.targets.is_empty() {
            return Err(Error::Config(
                "target list is empty after removing blank entries".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max delivery attempts must be at least 1".to_string()));
        }
        if self.scan_timeout.is_zero() {
            return Err(Error::Config("scan timeout must be greater than zero".to_string()));
        }
        if self.scanner_program.trim().is_empty() {
            return Err(Error::Config("scanner program must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.retry_delay)
    }
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}='{}' is not valid: {}", name, raw, e)))
}

fn seconds(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::Config(format!("{} must be a non-negative number of seconds, got {}", name, secs)))
}
