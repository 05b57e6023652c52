//! Configuration file structure
//!
//! One JSON object. Only `replicas` is required; everything else has a
//! default.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{ConfigError, ConfigResult};
use crate::channels::{Replica, ReplicaType};
use crate::connection::RetryPolicy;

/// One configured replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub replica_type: ReplicaType,
}

impl ReplicaConfig {
    pub fn to_replica(&self) -> Replica {
        let name = if self.name.is_empty() { &self.id } else { &self.name };
        Replica::new(self.id.clone(), name.clone(), self.replica_type)
    }
}

/// Retry settings for broker operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            factor: default_factor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitvaultConfig {
    /// Channel name prefix
    #[serde(default = "default_environment")]
    pub environment: String,

    pub replicas: Vec<ReplicaConfig>,

    /// Replica served by this process
    #[serde(default)]
    pub this_replica: Option<String>,

    #[serde(default = "default_checksum_file")]
    pub checksum_file: PathBuf,

    /// Staging directory shared by file transfers
    #[serde(default = "default_transfer_dir")]
    pub transfer_dir: PathBuf,

    #[serde(default = "default_bitarchive_dir")]
    pub bitarchive_dir: PathBuf,

    /// Secret for Correct and RemoveAndGetFile
    #[serde(default)]
    pub credentials: String,

    #[serde(default)]
    pub use_precomputed_checksum_during_upload: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_environment() -> String {
    "DEV".to_string()
}
fn default_checksum_file() -> PathBuf {
    PathBuf::from("./checksum/checksums.md5")
}
fn default_transfer_dir() -> PathBuf {
    PathBuf::from("./transfer")
}
fn default_bitarchive_dir() -> PathBuf {
    PathBuf::from("./bitarchive")
}
fn default_max_attempts() -> usize {
    10
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    60_000
}
fn default_factor() -> f32 {
    2.0
}
fn default_request_timeout_ms() -> u64 {
    60_000
}
fn default_batch_timeout_ms() -> u64 {
    3_600_000
}

/// Channel names are built from these, so they stay upper case.
fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

impl BitvaultConfig {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: BitvaultConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !is_identifier(&self.environment) {
            return Err(ConfigError::invalid(
                "environment",
                format!("'{}' must be upper case alphanumerics", self.environment),
            ));
        }

        if self.replicas.is_empty() {
            return Err(ConfigError::invalid("replicas", "at least one replica is required"));
        }
        let mut seen = HashSet::new();
        for replica in &self.replicas {
            if !is_identifier(&replica.id) {
                return Err(ConfigError::invalid(
                    "replicas",
                    format!("replica id '{}' must be upper case alphanumerics", replica.id),
                ));
            }
            if !seen.insert(replica.id.as_str()) {
                return Err(ConfigError::invalid(
                    "replicas",
                    format!("duplicate replica id '{}'", replica.id),
                ));
            }
        }

        if let Some(this) = &self.this_replica {
            if !seen.contains(this.as_str()) {
                return Err(ConfigError::invalid(
                    "this_replica",
                    format!("'{}' is not a configured replica", this),
                ));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be > 0"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::invalid(
                "retry.initial_backoff_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }
        if self.retry.factor.is_nan() || self.retry.factor < 1.0 {
            return Err(ConfigError::invalid("retry.factor", "must be >= 1.0"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("request_timeout_ms", "must be > 0"));
        }
        if self.batch_timeout_ms == 0 {
            return Err(ConfigError::invalid("batch_timeout_ms", "must be > 0"));
        }
        Ok(())
    }

    pub fn replica_list(&self) -> Vec<Replica> {
        self.replicas.iter().map(ReplicaConfig::to_replica).collect()
    }

    /// The replica this process serves, if any
    pub fn served_replica(&self) -> Option<Replica> {
        let id = self.this_replica.as_deref()?;
        self.replicas
            .iter()
            .find(|r| r.id == id)
            .map(ReplicaConfig::to_replica)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
            self.retry.factor,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}
