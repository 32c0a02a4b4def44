//! The transport seam between the engine and the remote API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::resources::{ParentRef, ResourceRef};

/// A long-running operation as returned by mutating calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Operation {
    /// Server-assigned operation name, e.g. `projects/p/locations/l/operations/op-1`.
    pub name: String,
    /// True once the operation reached a terminal state.
    pub done: bool,
    /// Failure status of a finished operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationStatus>,
    /// Result of a successful operation, usually the resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// Remote failure attached to a finished operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationStatus {
    /// Canonical status code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl Operation {
    /// Creates a finished operation carrying `response`.
    #[must_use]
    pub fn completed(name: impl Into<String>, response: Option<Value>) -> Self {
        Self {
            name: name.into(),
            done: true,
            error: None,
            response,
        }
    }

    /// Creates an operation that is still running.
    #[must_use]
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One page of a list call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Raw resource trees.
    pub items: Vec<Value>,
    /// Token of the next page; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// A partial update request.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    /// Name of the update operation being issued.
    pub method: String,
    /// Field paths being changed.
    pub update_mask: Vec<String>,
    /// Body holding the changed top-level fields.
    pub body: Value,
    /// Etag of the state the update was computed against.
    pub etag: Option<String>,
}

/// Remote API calls needed by the engine.
///
/// Mutations return an [`Operation`] that is polled with
/// [`Transport::poll_operation`] until done.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Reads a resource; `Ok(None)` when it does not exist.
    async fn get(&self, resource: &ResourceRef) -> Result<Option<Value>>;

    /// Lists one page of a collection. A `page_size` of -1 lets the server choose.
    async fn list(
        &self,
        parent: &ParentRef,
        page_token: Option<String>,
        page_size: i32,
    ) -> Result<Page>;

    /// Starts creating a resource from a wire body.
    async fn create(&self, resource: &ResourceRef, body: Value) -> Result<Operation>;

    /// Starts a partial update.
    async fn update(&self, resource: &ResourceRef, request: UpdateRequest) -> Result<Operation>;

    /// Starts deleting a resource.
    async fn delete(&self, resource: &ResourceRef) -> Result<Operation>;

    /// Refreshes an operation's status.
    async fn poll_operation(&self, operation: &Operation) -> Result<Operation>;
}
