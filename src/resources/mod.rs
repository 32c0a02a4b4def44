//! Typed resource descriptions and their identities.
//!
//! Each resource type pairs a serde struct with a static [`ResourceModel`]
//! (schema plus registered update operations). The engine itself only sees
//! the JSON tree form and the model.

mod azure_client;
mod cluster;
mod common;
mod node_pool;

pub use azure_client::AzureClient;
pub use cluster::{
    Cluster, ClusterAuthorization, ClusterAzureServicesAuthentication, ClusterControlPlane,
    ClusterDatabaseEncryption, ClusterFleet, ClusterNetworking, ClusterReplicaPlacement,
    ClusterWorkloadIdentityConfig, AdminGroup, AdminUser,
};
pub use common::{ProxyConfig, SshConfig, VolumeTemplate};
pub use node_pool::{NodePool, NodePoolAutoscaling, NodePoolConfig, NodePoolMaxPodsConstraint};

#[cfg(test)]
pub(crate) use cluster::tests::sample as cluster_sample;
#[cfg(test)]
pub(crate) use node_pool::tests::sample as node_pool_sample;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

use crate::error::{Result, ValidationError};
use crate::schema::{self, ObjectSchema, last_segment};

/// The kinds of resource managed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ResourceKind {
    /// Authentication client used by clusters.
    AzureClient,
    /// Kubernetes control plane.
    AzureCluster,
    /// Node pool attached to a cluster.
    AzureNodePool,
}

impl ResourceKind {
    /// REST collection name.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::AzureClient => "azureClients",
            Self::AzureCluster => "azureClusters",
            Self::AzureNodePool => "azureNodePools",
        }
    }

    /// Query parameter carrying the leaf name on create.
    #[must_use]
    pub const fn id_param(self) -> &'static str {
        match self {
            Self::AzureClient => "azureClientId",
            Self::AzureCluster => "azureClusterId",
            Self::AzureNodePool => "azureNodePoolId",
        }
    }

    /// Returns the static model of this kind.
    #[must_use]
    pub fn model(self) -> &'static ResourceModel {
        match self {
            Self::AzureClient => AzureClient::model(),
            Self::AzureCluster => Cluster::model(),
            Self::AzureNodePool => NodePool::model(),
        }
    }

    /// Returns true if resources of this kind live under a cluster.
    #[must_use]
    pub const fn has_cluster_parent(self) -> bool {
        matches!(self, Self::AzureNodePool)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AzureClient => "AzureClient",
            Self::AzureCluster => "AzureCluster",
            Self::AzureNodePool => "AzureNodePool",
        };
        write!(f, "{s}")
    }
}

/// Identity of a collection: the parent path plus the kind listed in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentRef {
    /// Kind of the resources in the collection.
    pub kind: ResourceKind,
    /// Project identifier.
    pub project: String,
    /// Location identifier.
    pub location: String,
    /// Parent cluster, for node pools.
    pub cluster: Option<String>,
}

impl ParentRef {
    /// Creates a parent reference, reducing identifiers to their short form.
    #[must_use]
    pub fn new(
        kind: ResourceKind,
        project: &str,
        location: &str,
        cluster: Option<&str>,
    ) -> Self {
        Self {
            kind,
            project: last_segment(project).to_string(),
            location: last_segment(location).to_string(),
            cluster: cluster.map(|c| last_segment(c).to_string()),
        }
    }

    /// Returns the parent path, e.g. `projects/p/locations/l`.
    #[must_use]
    pub fn path(&self) -> String {
        let base = format!("projects/{}/locations/{}", self.project, self.location);
        match &self.cluster {
            Some(cluster) if self.kind.has_cluster_parent() => {
                format!("{base}/azureClusters/{cluster}")
            }
            _ => base,
        }
    }

    /// Returns the collection path, e.g. `projects/p/locations/l/azureClusters`.
    #[must_use]
    pub fn collection_path(&self) -> String {
        format!("{}/{}", self.path(), self.kind.collection())
    }
}

/// Identity of a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// The collection holding the resource.
    pub parent: ParentRef,
    /// Leaf name.
    pub name: String,
}

impl ResourceRef {
    /// Creates a resource reference under `parent`.
    #[must_use]
    pub fn new(parent: ParentRef, name: &str) -> Self {
        Self {
            parent,
            name: last_segment(name).to_string(),
        }
    }

    /// Kind of the referenced resource.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.parent.kind
    }

    /// Fully-qualified relative name.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}/{}", self.parent.collection_path(), self.name)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// A named partial-update call and the top-level fields it carries.
#[derive(Debug)]
pub struct UpdateOperation {
    /// Operation name used by field selectors.
    pub name: &'static str,
    /// Top-level fields included in the request when non-empty.
    pub fields: &'static [&'static str],
}

/// Static description of a resource type.
#[derive(Debug)]
pub struct ResourceModel {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Field schema.
    pub schema: &'static ObjectSchema,
    /// Registered update operations.
    pub operations: &'static [UpdateOperation],
}

impl ResourceModel {
    /// Looks up a registered update operation.
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&'static UpdateOperation> {
        self.operations.iter().find(|op| op.name == name)
    }
}

/// A typed resource description the engine can reconcile.
pub trait Resource:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Returns the static model of this resource type.
    fn model() -> &'static ResourceModel;

    /// Returns the leaf name, if set.
    fn name(&self) -> Option<&str>;

    /// Returns the collection this resource belongs to.
    ///
    /// # Errors
    ///
    /// Returns a validation error if an identity parameter is missing.
    fn parent_ref(&self) -> Result<ParentRef>;

    /// Returns the identity of this resource.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the name or a parameter is missing.
    fn resource_ref(&self) -> Result<ResourceRef> {
        let parent = self.parent_ref()?;
        let name = required(Self::model(), "name", self.name())?;
        Ok(ResourceRef::new(parent, name))
    }

    /// Converts the resource to its JSON tree form.
    ///
    /// # Errors
    ///
    /// Returns a validation error if serialization fails.
    fn to_tree(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| malformed(Self::model(), &e).into())
    }

    /// Builds a resource from its JSON tree form.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the tree does not match the type.
    fn from_tree(tree: Value) -> Result<Self> {
        serde_json::from_value(tree).map_err(|e| malformed(Self::model(), &e).into())
    }

    /// Checks required fields and oneof groups.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    fn validate(&self) -> Result<()> {
        schema::validate(Self::model().schema, &self.to_tree()?)
    }
}

fn malformed(model: &ResourceModel, err: &serde_json::Error) -> ValidationError {
    ValidationError::Malformed {
        resource: model.kind.to_string(),
        message: err.to_string(),
    }
}

/// Returns a non-empty identity parameter or a validation error naming it.
///
/// # Errors
///
/// Returns [`ValidationError::MissingRequiredField`] if the value is unset.
pub fn required<'a>(model: &ResourceModel, field: &str, value: Option<&'a str>) -> Result<&'a str> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        ValidationError::MissingRequiredField {
            resource: model.kind.to_string(),
            field: field.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let parent = ParentRef::new(ResourceKind::AzureCluster, "projects/p", "l", None);
        assert_eq!(parent.path(), "projects/p/locations/l");
        assert_eq!(parent.collection_path(), "projects/p/locations/l/azureClusters");

        let r = ResourceRef::new(parent, "projects/p/locations/l/azureClusters/c");
        assert_eq!(r.name, "c");
        assert_eq!(r.path(), "projects/p/locations/l/azureClusters/c");
    }

    #[test]
    fn test_node_pool_paths() {
        let parent = ParentRef::new(ResourceKind::AzureNodePool, "p", "l", Some("c"));
        let r = ResourceRef::new(parent, "np");
        assert_eq!(
            r.path(),
            "projects/p/locations/l/azureClusters/c/azureNodePools/np"
        );
        assert_eq!(r.kind().id_param(), "azureNodePoolId");
    }
}
