//! Validation of client configuration and manifest sets.
//!
//! Per-resource checks (required fields, oneof groups) live with the schema.
//! This module adds the checks that span a whole manifest file and the
//! field-level checks of [`ClientConfig`].

use std::collections::HashSet;
use tracing::debug;
use validator::Validate;

use crate::error::{ConfigError, MultiCloudError, Result};
use crate::resources::{ResourceKind, ResourceRef};
use crate::schema::last_segment;

use super::manifest::Manifest;
use super::spec::ClientConfig;

/// Longest resource name accepted by the API.
const MAX_NAME_LEN: usize = 63;

/// Validator for configuration and manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationIssue>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationIssue {
    /// Where the problem is, e.g. `manifests[1].name`.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates client configuration values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field as a [`ConfigError::ValidationError`].
    pub fn validate_config(&self, config: &ClientConfig) -> Result<()> {
        config.validate().map_err(|errors| {
            let field = errors.errors().keys().next().map(ToString::to_string);
            MultiCloudError::Config(ConfigError::ValidationError {
                message: errors.to_string(),
                field,
            })
        })?;

        if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
            return Err(ConfigError::validation(
                "initial backoff exceeds max backoff",
                "retry.initial_backoff_ms",
            )
            .into());
        }

        if config.poll.initial_interval_ms > config.poll.max_interval_ms {
            return Err(ConfigError::validation(
                "initial poll interval exceeds max interval",
                "poll.initial_interval_ms",
            )
            .into());
        }

        debug!("Client configuration validation passed");
        Ok(())
    }

    /// Validates a set of manifests, failing on the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error found if any.
    pub fn validate_manifests(&self, manifests: &[Manifest]) -> Result<ValidationResult> {
        let result = self.check_manifests(manifests);

        match result.errors.first() {
            None => {
                debug!("Manifest validation passed");
                Ok(result)
            }
            Some(first) => Err(ConfigError::validation(&first.message, &first.field).into()),
        }
    }

    /// Collects every problem in a set of manifests.
    ///
    /// Errors cover invalid resources, bad names and duplicates. References
    /// to parents or clients not in the set are only warned about, since
    /// they may already exist remotely.
    #[must_use]
    pub fn check_manifests(&self, manifests: &[Manifest]) -> ValidationResult {
        let mut result = ValidationResult::default();

        if manifests.is_empty() {
            result.warnings.push(String::from("No resources defined"));
            return result;
        }

        let mut seen = HashSet::new();
        let mut refs: Vec<(usize, ResourceRef)> = Vec::new();

        for (i, manifest) in manifests.iter().enumerate() {
            let prefix = format!("manifests[{i}]");

            if let Err(e) = manifest.validate() {
                result.errors.push(ValidationIssue {
                    field: prefix.clone(),
                    message: e.to_string(),
                });
            }

            let resource = match manifest.resource_ref() {
                Ok(resource) => resource,
                Err(e) => {
                    result.errors.push(ValidationIssue {
                        field: prefix,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if !is_valid_name(&resource.name) {
                result.errors.push(ValidationIssue {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        resource.name
                    ),
                });
            }

            let path = resource.path();
            if seen.contains(&path) {
                result.errors.push(ValidationIssue {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate resource: {path}"),
                });
            } else {
                seen.insert(path);
            }

            refs.push((i, resource));
        }

        Self::check_references(manifests, &refs, &mut result);
        result
    }

    /// Warns about node pools and clusters pointing outside the set.
    fn check_references(
        manifests: &[Manifest],
        refs: &[(usize, ResourceRef)],
        result: &mut ValidationResult,
    ) {
        let names_of = |kind: ResourceKind| {
            refs.iter()
                .filter(|(_, r)| r.kind() == kind)
                .map(|(_, r)| r.name.as_str())
                .collect::<HashSet<_>>()
        };
        let clusters = names_of(ResourceKind::AzureCluster);
        let clients = names_of(ResourceKind::AzureClient);

        for (i, manifest) in manifests.iter().enumerate() {
            match manifest {
                Manifest::AzureNodePool(pool) => {
                    if let Some(cluster) = pool
                        .cluster
                        .as_deref()
                        .map(last_segment)
                        .filter(|c| !clusters.contains(c))
                    {
                        result.warnings.push(format!(
                            "manifests[{i}].cluster: cluster '{cluster}' is not defined here and must already exist"
                        ));
                    }
                }
                Manifest::AzureCluster(cluster) => {
                    if let Some(client) = cluster
                        .client
                        .as_deref()
                        .map(last_segment)
                        .filter(|c| !clients.contains(c))
                    {
                        result.warnings.push(format!(
                            "manifests[{i}].azureClient: client '{client}' is not defined here and must already exist"
                        ));
                    }
                }
                Manifest::AzureClient(_) => {}
            }
        }
    }
}

/// Validates that a name follows the API naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    let mut chars = name.chars();

    if chars.next().is_some_and(|first| !first.is_ascii_lowercase()) {
        return false;
    }

    if chars.any(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-') {
        return false;
    }

    !name.ends_with('-')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
