//! # Configuration
//!
//! JSON configuration file for a bitvault process.

mod errors;
mod settings;

pub use errors::{ConfigError, ConfigResult};
pub use settings::{BitvaultConfig, ReplicaConfig, RetryConfig};
