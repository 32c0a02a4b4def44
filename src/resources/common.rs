//! Nested blocks shared by clusters and node pools.

use serde::{Deserialize, Serialize};

/// SSH access to virtual machines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SshConfig {
    /// Public key in OpenSSH format.
    pub authorized_key: Option<String>,
}

impl SshConfig {
    /// Creates an SSH block for `authorized_key`.
    #[must_use]
    pub fn new(authorized_key: impl Into<String>) -> Self {
        Self {
            authorized_key: Some(authorized_key.into()),
        }
    }
}

/// Disk attached to a virtual machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeTemplate {
    /// Disk size in GiB; the server picks one when unset.
    pub size_gib: Option<i64>,
}

/// Outbound HTTP proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    /// Resource group holding the proxy secret.
    pub resource_group_id: Option<String>,
    /// Key Vault secret with the proxy settings.
    pub secret_id: Option<String>,
}
