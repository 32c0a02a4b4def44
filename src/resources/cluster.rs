//! Azure Kubernetes control plane.
//!
//! Only a handful of fields can change in place (description, client,
//! services authentication, control plane version, VM size, SSH key and
//! admin users). Everything else is fixed at creation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::schema::{Block, Equivalence, FieldSpec, ObjectSchema, OneOf};

use super::common::{ProxyConfig, SshConfig, VolumeTemplate};
use super::{ParentRef, Resource, ResourceKind, ResourceModel, UpdateOperation, required};

const UPDATE: &str = "UpdateAzureCluster";

static AUTHENTICATION: ObjectSchema = ObjectSchema {
    name: "ClusterAzureServicesAuthentication",
    fields: &[
        FieldSpec::text("tenantId").required().triggers(UPDATE),
        FieldSpec::text("applicationId").required().triggers(UPDATE),
    ],
    one_of: &[],
};

static NETWORKING: ObjectSchema = ObjectSchema {
    name: "ClusterNetworking",
    fields: &[
        FieldSpec::text("virtualNetworkId").required().recreate(),
        FieldSpec::string_list("podAddressCidrBlocks", true)
            .required()
            .recreate(),
        FieldSpec::string_list("serviceAddressCidrBlocks", true)
            .required()
            .recreate(),
    ],
    one_of: &[],
};

static SSH_CONFIG: ObjectSchema = ObjectSchema {
    name: "ClusterControlPlaneSshConfig",
    fields: &[FieldSpec::text("authorizedKey").required().triggers(UPDATE)],
    one_of: &[],
};

static ROOT_VOLUME: ObjectSchema = ObjectSchema {
    name: "ClusterControlPlaneRootVolume",
    fields: &[FieldSpec::scalar("sizeGib", Equivalence::Numeric)
        .recreate()
        .server_default()],
    one_of: &[],
};

static MAIN_VOLUME: ObjectSchema = ObjectSchema {
    name: "ClusterControlPlaneMainVolume",
    fields: &[FieldSpec::scalar("sizeGib", Equivalence::Numeric)
        .recreate()
        .server_default()],
    one_of: &[],
};

static DATABASE_ENCRYPTION: ObjectSchema = ObjectSchema {
    name: "ClusterControlPlaneDatabaseEncryption",
    fields: &[FieldSpec::text("keyId").required().recreate()],
    one_of: &[],
};

static PROXY_CONFIG: ObjectSchema = ObjectSchema {
    name: "ClusterControlPlaneProxyConfig",
    fields: &[
        FieldSpec::text("resourceGroupId").required().recreate(),
        FieldSpec::text("secretId").required().recreate(),
    ],
    one_of: &[],
};

static REPLICA_PLACEMENT: ObjectSchema = ObjectSchema {
    name: "ClusterControlPlaneReplicaPlacements",
    fields: &[
        FieldSpec::text("subnetId").required().recreate(),
        FieldSpec::text("azureAvailabilityZone").required().recreate(),
    ],
    one_of: &[],
};

static CONTROL_PLANE: ObjectSchema = ObjectSchema {
    name: "ClusterControlPlane",
    fields: &[
        FieldSpec::text("version").required().triggers(UPDATE),
        FieldSpec::text("subnetId").required().recreate(),
        FieldSpec::scalar("vmSize", Equivalence::CaseInsensitive)
            .triggers(UPDATE)
            .server_default(),
        FieldSpec::object("sshConfig", &SSH_CONFIG)
            .required()
            .triggers(UPDATE),
        FieldSpec::object("rootVolume", &ROOT_VOLUME)
            .recreate()
            .server_default(),
        FieldSpec::object("mainVolume", &MAIN_VOLUME)
            .recreate()
            .server_default(),
        FieldSpec::object("databaseEncryption", &DATABASE_ENCRYPTION).recreate(),
        FieldSpec::string_map("tags").recreate(),
        FieldSpec::object("proxyConfig", &PROXY_CONFIG).recreate(),
        FieldSpec::object_list("replicaPlacements", &REPLICA_PLACEMENT, true).recreate(),
    ],
    one_of: &[],
};

static ADMIN_USER: ObjectSchema = ObjectSchema {
    name: "ClusterAuthorizationAdminUsers",
    fields: &[FieldSpec::text("username").required().triggers(UPDATE)],
    one_of: &[],
};

static ADMIN_GROUP: ObjectSchema = ObjectSchema {
    name: "ClusterAuthorizationAdminGroups",
    fields: &[FieldSpec::text("group").required().triggers(UPDATE)],
    one_of: &[],
};

static AUTHORIZATION: ObjectSchema = ObjectSchema {
    name: "ClusterAuthorization",
    fields: &[
        FieldSpec::object_list("adminUsers", &ADMIN_USER, false)
            .required()
            .triggers(UPDATE),
        FieldSpec::object_list("adminGroups", &ADMIN_GROUP, false).triggers(UPDATE),
    ],
    one_of: &[],
};

static WORKLOAD_IDENTITY: ObjectSchema = ObjectSchema {
    name: "ClusterWorkloadIdentityConfig",
    fields: &[
        FieldSpec::text("issuerUri").output_only().recreate(),
        FieldSpec::text("workloadPool").output_only().recreate(),
        FieldSpec::text("identityProvider").output_only().recreate(),
    ],
    one_of: &[],
};

static FLEET: ObjectSchema = ObjectSchema {
    name: "ClusterFleet",
    fields: &[
        FieldSpec::scalar("project", Equivalence::Reference)
            .required()
            .recreate(),
        FieldSpec::text("membership").output_only().recreate(),
    ],
    one_of: &[],
};

static SCHEMA: ObjectSchema = ObjectSchema {
    name: "AzureCluster",
    fields: &[
        FieldSpec::scalar("name", Equivalence::SelfLink)
            .required()
            .recreate()
            .send_empty(),
        FieldSpec::text("description").triggers(UPDATE).send_empty(),
        FieldSpec::scalar("azureRegion", Equivalence::CaseInsensitive)
            .required()
            .recreate()
            .send_empty(),
        FieldSpec::text("resourceGroupId")
            .required()
            .recreate()
            .send_empty(),
        FieldSpec::scalar("azureClient", Equivalence::Reference)
            .triggers(UPDATE)
            .send_empty(),
        FieldSpec::object("azureServicesAuthentication", &AUTHENTICATION).triggers(UPDATE),
        FieldSpec::object("networking", &NETWORKING)
            .required()
            .recreate(),
        FieldSpec::object("controlPlane", &CONTROL_PLANE)
            .required()
            .recreate(),
        FieldSpec::object("authorization", &AUTHORIZATION)
            .required()
            .recreate(),
        FieldSpec::text("state").output_only().recreate(),
        FieldSpec::text("endpoint").output_only().recreate(),
        FieldSpec::text("uid").output_only().recreate(),
        FieldSpec::scalar("reconciling", Equivalence::Boolean)
            .output_only()
            .recreate(),
        FieldSpec::text("createTime").output_only().recreate(),
        FieldSpec::text("updateTime").output_only().recreate(),
        FieldSpec::text("etag").output_only().recreate(),
        FieldSpec::string_map("annotations").recreate().send_empty(),
        FieldSpec::object("workloadIdentityConfig", &WORKLOAD_IDENTITY)
            .output_only()
            .recreate(),
        FieldSpec::scalar("project", Equivalence::Reference)
            .required()
            .parameter()
            .recreate(),
        FieldSpec::text("location").required().parameter().recreate(),
        FieldSpec::object("fleet", &FLEET).required().recreate(),
    ],
    one_of: &[OneOf {
        fields: &["azureClient", "azureServicesAuthentication"],
        required: true,
    }],
};

static MODEL: ResourceModel = ResourceModel {
    kind: ResourceKind::AzureCluster,
    schema: &SCHEMA,
    operations: &[UpdateOperation {
        name: UPDATE,
        fields: &[
            "description",
            "azureClient",
            "azureServicesAuthentication",
            "controlPlane",
            "authorization",
        ],
    }],
};

/// Workload identity used by cluster services instead of an [`super::AzureClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterAzureServicesAuthentication {
    /// Azure Active Directory tenant.
    pub tenant_id: Option<String>,
    /// Azure AD application.
    pub application_id: Option<String>,
}

/// Cluster-wide networking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterNetworking {
    /// Azure Resource Manager ID of the virtual network.
    pub virtual_network_id: Option<String>,
    /// CIDR ranges for pods.
    pub pod_address_cidr_blocks: Option<Vec<String>>,
    /// CIDR ranges for services.
    pub service_address_cidr_blocks: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterDatabaseEncryption {
    /// Key Vault key used to encrypt etcd.
    pub key_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterReplicaPlacement {
    pub subnet_id: Option<String>,
    pub azure_availability_zone: Option<String>,
}

/// Control plane virtual machines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterControlPlane {
    /// Kubernetes version.
    pub version: Option<String>,
    /// Subnet the replicas run in.
    pub subnet_id: Option<String>,
    /// VM size; the server picks one when unset.
    pub vm_size: Option<String>,
    pub ssh_config: Block<SshConfig>,
    pub root_volume: Block<VolumeTemplate>,
    pub main_volume: Block<VolumeTemplate>,
    pub database_encryption: Block<ClusterDatabaseEncryption>,
    pub tags: Option<BTreeMap<String, String>>,
    pub proxy_config: Block<ProxyConfig>,
    pub replica_placements: Option<Vec<ClusterReplicaPlacement>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminUser {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminGroup {
    pub group: Option<String>,
}

/// Users and groups with cluster-admin rights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterAuthorization {
    pub admin_users: Option<Vec<AdminUser>>,
    pub admin_groups: Option<Vec<AdminGroup>>,
}

/// Server-reported workload identity settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterWorkloadIdentityConfig {
    pub issuer_uri: Option<String>,
    pub workload_pool: Option<String>,
    pub identity_provider: Option<String>,
}

/// Fleet registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterFleet {
    /// Fleet host project.
    pub project: Option<String>,
    /// Membership name assigned by the server.
    pub membership: Option<String>,
}

/// An Azure-hosted Kubernetes cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cluster {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Azure region the cluster runs in.
    pub azure_region: Option<String>,
    /// Resource group holding cluster resources.
    pub resource_group_id: Option<String>,
    /// Client used for authentication; exclusive with
    /// `azure_services_authentication`.
    #[serde(rename = "azureClient")]
    pub client: Option<String>,
    pub azure_services_authentication: Block<ClusterAzureServicesAuthentication>,
    pub networking: Block<ClusterNetworking>,
    pub control_plane: Block<ClusterControlPlane>,
    pub authorization: Block<ClusterAuthorization>,
    pub state: Option<String>,
    pub endpoint: Option<String>,
    pub uid: Option<String>,
    pub reconciling: Option<bool>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    pub etag: Option<String>,
    pub annotations: Option<BTreeMap<String, String>>,
    pub workload_identity_config: Block<ClusterWorkloadIdentityConfig>,
    pub project: Option<String>,
    pub location: Option<String>,
    pub fleet: Block<ClusterFleet>,
}

impl Cluster {
    /// Creates a cluster description with its identity filled in.
    #[must_use]
    pub fn new(project: &str, location: &str, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            project: Some(project.to_string()),
            location: Some(location.to_string()),
            ..Self::default()
        }
    }
}

impl Resource for Cluster {
    fn model() -> &'static ResourceModel {
        &MODEL
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn parent_ref(&self) -> Result<ParentRef> {
        Ok(ParentRef::new(
            ResourceKind::AzureCluster,
            required(&MODEL, "project", self.project.as_deref())?,
            required(&MODEL, "location", self.location.as_deref())?,
            None,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{MultiCloudError, ValidationError};
    use serde_json::json;

    pub(crate) fn sample() -> Cluster {
        Cluster {
            azure_region: Some("westus2".to_string()),
            resource_group_id: Some("/subscriptions/s/resourceGroups/rg".to_string()),
            client: Some("projects/p/locations/us-west1/azureClients/c".to_string()),
            networking: Block::Set(ClusterNetworking {
                virtual_network_id: Some("vnet".to_string()),
                pod_address_cidr_blocks: Some(vec!["10.200.0.0/16".to_string()]),
                service_address_cidr_blocks: Some(vec!["10.32.0.0/24".to_string()]),
            }),
            control_plane: Block::Set(ClusterControlPlane {
                version: Some("1.27.3-gke.100".to_string()),
                subnet_id: Some("subnet-a".to_string()),
                ssh_config: Block::Set(SshConfig::new("ssh-rsa AAA")),
                ..ClusterControlPlane::default()
            }),
            authorization: Block::Set(ClusterAuthorization {
                admin_users: Some(vec![AdminUser {
                    username: Some("admin@example.com".to_string()),
                }]),
                admin_groups: None,
            }),
            fleet: Block::Set(ClusterFleet {
                project: Some("projects/p".to_string()),
                membership: None,
            }),
            ..Cluster::new("p", "us-west1", "cl")
        }
    }

    #[test]
    fn test_sample_is_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_client_serializes_as_azure_client() {
        let tree = sample().to_tree().expect("tree");
        assert_eq!(
            tree["azureClient"],
            json!("projects/p/locations/us-west1/azureClients/c")
        );
        assert!(tree.get("client").is_none());
        assert!(tree["azureServicesAuthentication"].is_null());
    }

    #[test]
    fn test_client_and_authentication_are_exclusive() {
        let both = Cluster {
            azure_services_authentication: Block::Set(ClusterAzureServicesAuthentication {
                tenant_id: Some("t".to_string()),
                application_id: Some("a".to_string()),
            }),
            ..sample()
        };
        assert!(matches!(
            both.validate(),
            Err(MultiCloudError::Validation(ValidationError::ConflictingFields { .. }))
        ));

        let neither = Cluster {
            client: None,
            ..sample()
        };
        assert!(matches!(
            neither.validate(),
            Err(MultiCloudError::Validation(ValidationError::MissingOneOf { .. }))
        ));
    }

    #[test]
    fn test_nested_required_field() {
        let mut cluster = sample();
        if let Block::Set(cp) = &mut cluster.control_plane {
            cp.ssh_config = Block::Set(SshConfig::default());
        }
        let err = cluster.validate().expect_err("authorized key missing");
        assert!(matches!(
            err,
            MultiCloudError::Validation(ValidationError::MissingRequiredField { ref field, .. })
                if field == "controlPlane.sshConfig.authorizedKey"
        ));
    }

    #[test]
    fn test_update_operation_registered() {
        let op = Cluster::model().operation(UPDATE).expect("registered");
        assert!(op.fields.contains(&"controlPlane"));
        assert!(Cluster::model().operation("UpdateSomethingElse").is_none());
    }
}
