//! Resource manifests.
//!
//! A manifest file holds one or more YAML documents of the form
//! `{ kind: AzureCluster, spec: { ... } }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::resources::{AzureClient, Cluster, NodePool, Resource, ResourceKind, ResourceRef};

/// A single desired resource read from a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "spec")]
pub enum Manifest {
    /// An Azure authentication client.
    AzureClient(AzureClient),
    /// An Azure cluster.
    AzureCluster(Cluster),
    /// An Azure node pool.
    AzureNodePool(NodePool),
}

impl Manifest {
    /// Returns the resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::AzureClient(_) => ResourceKind::AzureClient,
            Self::AzureCluster(_) => ResourceKind::AzureCluster,
            Self::AzureNodePool(_) => ResourceKind::AzureNodePool,
        }
    }

    /// Returns the identity of the described resource.
    ///
    /// # Errors
    ///
    /// Returns a validation error if an identity field is missing.
    pub fn resource_ref(&self) -> Result<ResourceRef> {
        match self {
            Self::AzureClient(r) => r.resource_ref(),
            Self::AzureCluster(r) => r.resource_ref(),
            Self::AzureNodePool(r) => r.resource_ref(),
        }
    }

    /// Checks required fields and oneof groups.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::AzureClient(r) => r.validate(),
            Self::AzureCluster(r) => r.validate(),
            Self::AzureNodePool(r) => r.validate(),
        }
    }

    /// Returns the JSON tree of the described resource.
    ///
    /// # Errors
    ///
    /// Returns a validation error if serialization fails.
    pub fn to_tree(&self) -> Result<Value> {
        match self {
            Self::AzureClient(r) => r.to_tree(),
            Self::AzureCluster(r) => r.to_tree(),
            Self::AzureNodePool(r) => r.to_tree(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_representation() {
        let yaml = r"
kind: AzureClient
spec:
  name: my-client
  project: my-project
  location: us-west1
  tenantId: tenant
  applicationId: app
";
        let manifest: Manifest = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(manifest.kind(), ResourceKind::AzureClient);
        assert!(manifest.validate().is_ok());
        assert_eq!(
            manifest.resource_ref().expect("ref").path(),
            "projects/my-project/locations/us-west1/azureClients/my-client"
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let yaml = "kind: AwsCluster\nspec: {}\n";
        assert!(serde_yaml::from_str::<Manifest>(yaml).is_err());
    }
}
