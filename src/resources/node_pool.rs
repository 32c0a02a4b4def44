//! Node pools attached to an Azure cluster.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::schema::{Block, Equivalence, FieldSpec, ObjectSchema};

use super::common::{ProxyConfig, SshConfig, VolumeTemplate};
use super::{ParentRef, Resource, ResourceKind, ResourceModel, UpdateOperation, required};

const UPDATE: &str = "UpdateAzureNodePool";

static SSH_CONFIG: ObjectSchema = ObjectSchema {
    name: "NodePoolConfigSshConfig",
    fields: &[FieldSpec::text("authorizedKey").required().recreate()],
    one_of: &[],
};

static ROOT_VOLUME: ObjectSchema = ObjectSchema {
    name: "NodePoolConfigRootVolume",
    fields: &[FieldSpec::scalar("sizeGib", Equivalence::Numeric)
        .recreate()
        .server_default()],
    one_of: &[],
};

static PROXY_CONFIG: ObjectSchema = ObjectSchema {
    name: "NodePoolConfigProxyConfig",
    fields: &[
        FieldSpec::text("resourceGroupId").required().recreate(),
        FieldSpec::text("secretId").required().recreate(),
    ],
    one_of: &[],
};

static CONFIG: ObjectSchema = ObjectSchema {
    name: "NodePoolConfig",
    fields: &[
        FieldSpec::scalar("vmSize", Equivalence::CaseInsensitive)
            .recreate()
            .server_default(),
        FieldSpec::object("rootVolume", &ROOT_VOLUME)
            .recreate()
            .server_default(),
        FieldSpec::string_map("tags").recreate(),
        FieldSpec::object("sshConfig", &SSH_CONFIG)
            .required()
            .recreate(),
        FieldSpec::object("proxyConfig", &PROXY_CONFIG).recreate(),
        FieldSpec::string_map("labels").recreate(),
    ],
    one_of: &[],
};

static AUTOSCALING: ObjectSchema = ObjectSchema {
    name: "NodePoolAutoscaling",
    fields: &[
        FieldSpec::scalar("minNodeCount", Equivalence::Numeric)
            .required()
            .recreate(),
        FieldSpec::scalar("maxNodeCount", Equivalence::Numeric)
            .required()
            .recreate(),
    ],
    one_of: &[],
};

static MAX_PODS: ObjectSchema = ObjectSchema {
    name: "NodePoolMaxPodsConstraint",
    fields: &[FieldSpec::scalar("maxPodsPerNode", Equivalence::Numeric)
        .required()
        .recreate()],
    one_of: &[],
};

static SCHEMA: ObjectSchema = ObjectSchema {
    name: "AzureNodePool",
    fields: &[
        FieldSpec::scalar("name", Equivalence::SelfLink)
            .required()
            .recreate()
            .send_empty(),
        FieldSpec::text("version")
            .required()
            .triggers(UPDATE)
            .send_empty(),
        FieldSpec::object("config", &CONFIG).required().recreate(),
        FieldSpec::text("subnetId").required().recreate().send_empty(),
        FieldSpec::object("autoscaling", &AUTOSCALING)
            .required()
            .recreate(),
        FieldSpec::text("state").output_only().recreate(),
        FieldSpec::text("uid").output_only().recreate(),
        FieldSpec::scalar("reconciling", Equivalence::Boolean)
            .output_only()
            .recreate(),
        FieldSpec::text("createTime").output_only().recreate(),
        FieldSpec::text("updateTime").output_only().recreate(),
        FieldSpec::text("etag").output_only().recreate(),
        FieldSpec::string_map("annotations")
            .triggers(UPDATE)
            .send_empty(),
        FieldSpec::object("maxPodsConstraint", &MAX_PODS)
            .required()
            .recreate(),
        FieldSpec::text("azureAvailabilityZone")
            .recreate()
            .server_default()
            .send_empty(),
        FieldSpec::scalar("project", Equivalence::Reference)
            .required()
            .parameter()
            .recreate(),
        FieldSpec::text("location").required().parameter().recreate(),
        FieldSpec::scalar("cluster", Equivalence::Reference)
            .required()
            .parameter()
            .recreate(),
    ],
    one_of: &[],
};

static MODEL: ResourceModel = ResourceModel {
    kind: ResourceKind::AzureNodePool,
    schema: &SCHEMA,
    operations: &[UpdateOperation {
        name: UPDATE,
        fields: &["version", "annotations"],
    }],
};

/// Node virtual machine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePoolConfig {
    /// VM size; the server picks one when unset.
    pub vm_size: Option<String>,
    pub root_volume: Block<VolumeTemplate>,
    pub tags: Option<BTreeMap<String, String>>,
    pub ssh_config: Block<SshConfig>,
    pub proxy_config: Block<ProxyConfig>,
    /// Kubernetes labels applied to every node.
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePoolAutoscaling {
    pub min_node_count: Option<i64>,
    pub max_node_count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePoolMaxPodsConstraint {
    pub max_pods_per_node: Option<i64>,
}

/// A group of worker nodes in an Azure cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodePool {
    pub name: Option<String>,
    /// Kubernetes version of the nodes.
    pub version: Option<String>,
    pub config: Block<NodePoolConfig>,
    pub subnet_id: Option<String>,
    pub autoscaling: Block<NodePoolAutoscaling>,
    pub state: Option<String>,
    pub uid: Option<String>,
    pub reconciling: Option<bool>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    pub etag: Option<String>,
    pub annotations: Option<BTreeMap<String, String>>,
    pub max_pods_constraint: Block<NodePoolMaxPodsConstraint>,
    /// Availability zone; the server picks one when unset.
    pub azure_availability_zone: Option<String>,
    pub project: Option<String>,
    pub location: Option<String>,
    /// Parent cluster.
    pub cluster: Option<String>,
}

impl NodePool {
    /// Creates a node pool description with its identity filled in.
    #[must_use]
    pub fn new(project: &str, location: &str, cluster: &str, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            project: Some(project.to_string()),
            location: Some(location.to_string()),
            cluster: Some(cluster.to_string()),
            ..Self::default()
        }
    }
}

impl Resource for NodePool {
    fn model() -> &'static ResourceModel {
        &MODEL
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn parent_ref(&self) -> Result<ParentRef> {
        Ok(ParentRef::new(
            ResourceKind::AzureNodePool,
            required(&MODEL, "project", self.project.as_deref())?,
            required(&MODEL, "location", self.location.as_deref())?,
            Some(required(&MODEL, "cluster", self.cluster.as_deref())?),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{MultiCloudError, ValidationError};

    pub(crate) fn sample() -> NodePool {
        NodePool {
            version: Some("1.27.3-gke.100".to_string()),
            config: Block::Set(NodePoolConfig {
                ssh_config: Block::Set(SshConfig::new("ssh-rsa AAA")),
                ..NodePoolConfig::default()
            }),
            subnet_id: Some("subnet-a".to_string()),
            autoscaling: Block::Set(NodePoolAutoscaling {
                min_node_count: Some(1),
                max_node_count: Some(3),
            }),
            max_pods_constraint: Block::Set(NodePoolMaxPodsConstraint {
                max_pods_per_node: Some(110),
            }),
            ..NodePool::new("p", "us-west1", "cl", "np")
        }
    }

    #[test]
    fn test_sample_is_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_identity_includes_cluster() {
        let r = sample().resource_ref().expect("ref");
        assert_eq!(
            r.path(),
            "projects/p/locations/us-west1/azureClusters/cl/azureNodePools/np"
        );

        let orphan = NodePool {
            cluster: None,
            ..sample()
        };
        assert!(matches!(
            orphan.resource_ref(),
            Err(MultiCloudError::Validation(ValidationError::MissingRequiredField { ref field, .. }))
                if field == "cluster"
        ));
    }

    #[test]
    fn test_missing_autoscaling() {
        let pool = NodePool {
            autoscaling: Block::Absent,
            ..sample()
        };
        assert!(pool.validate().is_err());
    }
}
