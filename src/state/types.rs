//! Types recorded in the local state file.
//!
//! One [`ApplyRecord`] is kept per resource path. Records let the CLI show
//! what was applied and can seed the next apply as a state hint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::config::ConfigHasher;
use crate::reconciler::ApplyOutcome;
use crate::resources::{ResourceKind, ResourceRef};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The complete local state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    /// State format version.
    pub version: String,
    /// Records keyed by resource path.
    pub records: BTreeMap<String, ApplyRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent operations, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// What was last applied to one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRecord {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Fully-qualified resource path.
    pub path: String,
    /// Fingerprint of the desired state that was applied.
    pub fingerprint: String,
    /// When the apply finished.
    pub applied_at: DateTime<Utc>,
    /// Identifier of the apply.
    pub apply_id: Uuid,
    /// Attempts the apply needed.
    pub attempts: u32,
    /// Canonical state observed after the apply.
    pub observed: Value,
}

/// One recorded operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// What was done.
    pub operation: StateOperation,
    /// Resource path.
    pub path: String,
}

/// Operations recorded in history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StateOperation {
    /// The resource was applied.
    Apply,
    /// The resource was deleted.
    Delete,
}

impl StateDocument {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            records: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Returns the record for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ApplyRecord> {
        self.records.get(path)
    }

    /// Returns the canonical state last observed for `resource`.
    #[must_use]
    pub fn observed(&self, resource: &ResourceRef) -> Option<Value> {
        self.get(&resource.path()).map(|r| r.observed.clone())
    }

    /// Stores a record, replacing any previous one for the same path.
    pub fn record(&mut self, record: ApplyRecord) {
        self.add_history(StateOperation::Apply, &record.path);
        self.records.insert(record.path.clone(), record);
        self.last_updated = Utc::now();
    }

    /// Removes the record for `path`.
    pub fn remove(&mut self, path: &str) -> Option<ApplyRecord> {
        let removed = self.records.remove(path);
        if removed.is_some() {
            self.add_history(StateOperation::Delete, path);
            self.last_updated = Utc::now();
        }
        removed
    }

    fn add_history(&mut self, operation: StateOperation, path: &str) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            operation,
            path: path.to_string(),
        });
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplyRecord {
    /// Builds a record from a converged apply.
    #[must_use]
    pub fn from_outcome<R>(
        resource: &ResourceRef,
        fingerprint: impl Into<String>,
        outcome: &ApplyOutcome<R>,
    ) -> Self {
        Self {
            kind: resource.kind(),
            path: resource.path(),
            fingerprint: fingerprint.into(),
            applied_at: Utc::now(),
            apply_id: outcome.apply_id,
            attempts: outcome.attempts,
            observed: outcome.observed.clone(),
        }
    }

    /// Returns true if `fingerprint` is the one recorded at the last apply.
    #[must_use]
    pub fn matches_fingerprint(&self, fingerprint: &str) -> bool {
        ConfigHasher::hashes_match(&self.fingerprint, fingerprint)
    }
}

impl fmt::Display for StateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Delete => "delete",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(path: &str) -> ApplyRecord {
        ApplyRecord {
            kind: ResourceKind::AzureCluster,
            path: path.to_string(),
            fingerprint: "abc".to_string(),
            applied_at: Utc::now(),
            apply_id: Uuid::new_v4(),
            attempts: 1,
            observed: json!({"name": "c"}),
        }
    }

    #[test]
    fn test_record_replaces_and_removes() {
        let mut state = StateDocument::new();
        state.record(record("projects/p/locations/l/azureClusters/c"));
        state.record(ApplyRecord {
            fingerprint: "def".to_string(),
            ..record("projects/p/locations/l/azureClusters/c")
        });

        assert_eq!(state.len(), 1);
        assert_eq!(
            state
                .get("projects/p/locations/l/azureClusters/c")
                .map(|r| r.fingerprint.as_str()),
            Some("def")
        );

        assert!(state.remove("projects/p/locations/l/azureClusters/c").is_some());
        assert!(state.remove("projects/p/locations/l/azureClusters/c").is_none());
        assert!(state.is_empty());
        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history[2].operation, StateOperation::Delete);
    }

    #[test]
    fn test_observed_by_reference() {
        use crate::resources::{AzureClient, Cluster, Resource};

        let mut state = StateDocument::new();
        state.record(record("projects/p/locations/l/azureClusters/c"));

        let known = Cluster::new("p", "l", "c").resource_ref().expect("ref");
        let unknown = AzureClient::new("p", "l", "a").resource_ref().expect("ref");
        assert_eq!(state.observed(&known), Some(json!({"name": "c"})));
        assert_eq!(state.observed(&unknown), None);
    }

    #[test]
    fn test_matches_fingerprint() {
        let applied = record("projects/p/locations/l/azureClusters/c");
        assert!(applied.matches_fingerprint("abc"));
        assert!(!applied.matches_fingerprint("abd"));
        assert!(!applied.matches_fingerprint("ab"));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = StateDocument::new();
        for i in 0..(MAX_HISTORY + 5) {
            state.record(record(&format!("projects/p/locations/l/azureClusters/c{i}")));
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
        assert_eq!(state.history[0].path, "projects/p/locations/l/azureClusters/c5");
    }
}
