//! Azure authentication client.
//!
//! A client holds the tenant and application identity used by clusters to
//! reach Azure. Every input field is immutable once created.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::schema::{Equivalence, FieldSpec, ObjectSchema};

use super::{ParentRef, Resource, ResourceKind, ResourceModel, required};

static SCHEMA: ObjectSchema = ObjectSchema {
    name: "AzureClient",
    fields: &[
        FieldSpec::scalar("name", Equivalence::SelfLink)
            .required()
            .recreate()
            .send_empty(),
        FieldSpec::text("tenantId").required().recreate().send_empty(),
        FieldSpec::text("applicationId")
            .required()
            .recreate()
            .send_empty(),
        FieldSpec::scalar("reconciling", Equivalence::Boolean)
            .output_only()
            .recreate(),
        FieldSpec::string_map("annotations").recreate().send_empty(),
        FieldSpec::text("pemCertificate").output_only().recreate(),
        FieldSpec::text("uid").output_only().recreate(),
        FieldSpec::text("createTime").output_only().recreate(),
        FieldSpec::text("updateTime").output_only().recreate(),
        FieldSpec::scalar("project", Equivalence::Reference)
            .required()
            .parameter()
            .recreate(),
        FieldSpec::text("location").required().parameter().recreate(),
    ],
    one_of: &[],
};

static MODEL: ResourceModel = ResourceModel {
    kind: ResourceKind::AzureClient,
    schema: &SCHEMA,
    operations: &[],
};

/// An Azure AD application registration used by clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AzureClient {
    /// Client name.
    pub name: Option<String>,
    /// Azure Active Directory tenant.
    pub tenant_id: Option<String>,
    /// Azure AD application.
    pub application_id: Option<String>,
    /// Set while the client is being changed.
    pub reconciling: Option<bool>,
    /// Free-form annotations.
    pub annotations: Option<BTreeMap<String, String>>,
    /// Certificate the application authenticates with.
    pub pem_certificate: Option<String>,
    /// Server-assigned identifier.
    pub uid: Option<String>,
    /// Creation timestamp.
    pub create_time: Option<String>,
    /// Last update timestamp.
    pub update_time: Option<String>,
    /// Owning project.
    pub project: Option<String>,
    /// Region of the API endpoint.
    pub location: Option<String>,
}

impl AzureClient {
    /// Creates a client description with its identity filled in.
    #[must_use]
    pub fn new(project: &str, location: &str, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            project: Some(project.to_string()),
            location: Some(location.to_string()),
            ..Self::default()
        }
    }

    /// Sets the tenant and application identifiers.
    #[must_use]
    pub fn with_identity(mut self, tenant_id: &str, application_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self.application_id = Some(application_id.to_string());
        self
    }
}

impl Resource for AzureClient {
    fn model() -> &'static ResourceModel {
        &MODEL
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn parent_ref(&self) -> Result<ParentRef> {
        Ok(ParentRef::new(
            ResourceKind::AzureClient,
            required(&MODEL, "project", self.project.as_deref())?,
            required(&MODEL, "location", self.location.as_deref())?,
            None,
        ))
    }
}
