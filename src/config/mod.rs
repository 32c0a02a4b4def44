//! Configuration module for the multicloud client.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `azmc.yaml` with environment overrides
//! - Reading resource manifests
//! - Validation of configuration values and manifest sets
//! - Computing fingerprints of desired resources

mod hash;
mod manifest;
mod parser;
mod spec;
mod validator;

pub use hash::{ConfigHasher, strip_nulls};
pub use manifest::Manifest;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{ClientConfig, DEFAULT_STATE_DIR, PollPolicy, RetryPolicy};
pub use validator::{ConfigValidator, ValidationIssue, ValidationResult};
