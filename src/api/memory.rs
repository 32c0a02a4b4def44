//! In-memory backend implementing [`Transport`].
//!
//! Behaves like the remote API closely enough to drive the whole Apply
//! loop: it assigns server fields on create, enforces etags on update and
//! runs long-running operations. Faults can be injected to exercise retry
//! and failure paths.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::resources::{ParentRef, ResourceRef};

use super::transport::{Operation, OperationStatus, Page, Transport, UpdateRequest};

/// Number of calls made per method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// Single reads.
    pub get: usize,
    /// Page reads.
    pub list: usize,
    /// Creates.
    pub create: usize,
    /// Partial updates.
    pub update: usize,
    /// Deletes.
    pub delete: usize,
    /// Operation polls.
    pub poll: usize,
}

#[derive(Debug)]
struct PendingOperation {
    remaining_polls: u32,
    operation: Operation,
}

#[derive(Debug, Default)]
struct Backend {
    resources: BTreeMap<String, Value>,
    operations: HashMap<String, PendingOperation>,
    next_id: u64,
    conflicts: u32,
    sticky_deletes: bool,
    ignored_fields: HashSet<String>,
    failure: Option<OperationStatus>,
    pending_polls: u32,
    calls: CallCounts,
}

/// A fake multicloud API held in memory.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    backend: Mutex<Backend>,
}

impl InMemoryTransport {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a raw resource as if it had been created remotely.
    pub fn insert(&self, resource: &ResourceRef, mut raw: Value) {
        if let Value::Object(map) = &mut raw {
            map.insert("name".to_string(), Value::String(resource.path()));
        }
        self.backend().resources.insert(resource.path(), raw);
    }

    /// Returns the stored raw resource.
    #[must_use]
    pub fn stored(&self, resource: &ResourceRef) -> Option<Value> {
        self.backend().resources.get(&resource.path()).cloned()
    }

    /// Removes a resource as if it had been deleted by someone else.
    pub fn remove(&self, resource: &ResourceRef) -> Option<Value> {
        self.backend().resources.remove(&resource.path())
    }

    /// Makes the next `count` create or update calls fail with a conflict.
    pub fn inject_conflicts(&self, count: u32) {
        self.backend().conflicts = count;
    }

    /// Makes deletes report success without removing anything.
    pub fn set_sticky_deletes(&self, sticky: bool) {
        self.backend().sticky_deletes = sticky;
    }

    /// Makes the server silently drop a top-level field from writes.
    pub fn ignore_field(&self, field: &str) {
        self.backend().ignored_fields.insert(field.to_string());
    }

    /// Makes the next operation finish with a remote error.
    pub fn fail_next_operation(&self, code: i32, message: &str) {
        self.backend().failure = Some(OperationStatus {
            code,
            message: message.to_string(),
        });
    }

    /// Number of polls before each new operation reports done.
    pub fn set_pending_polls(&self, polls: u32) {
        self.backend().pending_polls = polls;
    }

    /// Returns the call counters.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.backend().calls
    }
}

impl Backend {
    fn take_conflict(&mut self, resource: &ResourceRef) -> Result<()> {
        if self.conflicts == 0 {
            return Ok(());
        }
        self.conflicts -= 1;
        Err(ApiError::Conflict {
            resource: resource.path(),
            message: "injected concurrent modification".to_string(),
        }
        .into())
    }

    fn next_etag(&mut self) -> String {
        self.next_id += 1;
        format!("etag-{}", self.next_id)
    }

    fn start_operation(&mut self, resource: &ResourceRef, response: Option<Value>) -> Operation {
        self.next_id += 1;
        let name = format!(
            "projects/{}/locations/{}/operations/op-{}",
            resource.parent.project, resource.parent.location, self.next_id
        );

        let finished = Operation {
            error: self.failure.take(),
            response,
            ..Operation::completed(name.clone(), None)
        };

        if self.pending_polls == 0 {
            return finished;
        }

        self.operations.insert(
            name.clone(),
            PendingOperation {
                remaining_polls: self.pending_polls,
                operation: finished,
            },
        );
        Operation::pending(name)
    }

    fn strip_ignored(&self, map: &mut Map<String, Value>) {
        map.retain(|key, _| !self.ignored_fields.contains(key));
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn get(&self, resource: &ResourceRef) -> Result<Option<Value>> {
        let mut backend = self.backend();
        backend.calls.get += 1;
        Ok(backend.resources.get(&resource.path()).cloned())
    }

    async fn list(
        &self,
        parent: &ParentRef,
        page_token: Option<String>,
        page_size: i32,
    ) -> Result<Page> {
        let mut backend = self.backend();
        backend.calls.list += 1;

        let prefix = format!("{}/", parent.collection_path());
        let matching: Vec<Value> = backend
            .resources
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix) && !path[prefix.len()..].contains('/'))
            .map(|(_, v)| v.clone())
            .collect();

        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ApiError::request_failed(400, format!("invalid page token '{token}'")))?,
            None => 0,
        };
        let size = usize::try_from(page_size).unwrap_or(usize::MAX).max(1);
        let end = start.saturating_add(size).min(matching.len());

        Ok(Page {
            items: matching.get(start..end).map(<[Value]>::to_vec).unwrap_or_default(),
            next_page_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn create(&self, resource: &ResourceRef, body: Value) -> Result<Operation> {
        let mut backend = self.backend();
        backend.calls.create += 1;
        backend.take_conflict(resource)?;

        let path = resource.path();
        if backend.resources.contains_key(&path) {
            return Err(ApiError::Conflict {
                resource: path,
                message: "resource already exists".to_string(),
            }
            .into());
        }

        let Value::Object(mut map) = body else {
            return Err(ApiError::request_failed(400, "body must be an object").into());
        };
        backend.strip_ignored(&mut map);

        let now = Utc::now().to_rfc3339();
        let etag = backend.next_etag();
        let schema = resource.kind().model().schema;
        let assigned = [
            ("uid", Value::String(Uuid::new_v4().to_string())),
            ("state", Value::String("RUNNING".to_string())),
            ("etag", Value::String(etag)),
            ("createTime", Value::String(now.clone())),
            ("updateTime", Value::String(now)),
            ("reconciling", Value::Bool(false)),
        ];
        for (field, value) in assigned {
            if schema.field(field).is_some_and(|f| f.output_only) {
                map.insert(field.to_string(), value);
            }
        }
        map.insert("name".to_string(), Value::String(path.clone()));

        let stored = Value::Object(map);
        debug!("In-memory create of {path}");
        backend.resources.insert(path, stored.clone());
        Ok(backend.start_operation(resource, Some(stored)))
    }

    async fn update(&self, resource: &ResourceRef, request: UpdateRequest) -> Result<Operation> {
        let mut backend = self.backend();
        backend.calls.update += 1;
        backend.take_conflict(resource)?;

        let path = resource.path();
        let Some(Value::Object(current)) = backend.resources.get(&path).cloned() else {
            return Err(ApiError::NotFound { resource: path }.into());
        };

        let current_etag = current.get("etag").and_then(Value::as_str);
        if let (Some(sent), Some(stored)) = (request.etag.as_deref(), current_etag) {
            if sent != stored {
                return Err(ApiError::Conflict {
                    resource: path,
                    message: format!("etag mismatch: sent {sent}, current {stored}"),
                }
                .into());
            }
        }

        let mut body = match request.body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        backend.strip_ignored(&mut body);

        let mut updated = current;
        let top_level: HashSet<&str> = request
            .update_mask
            .iter()
            .filter_map(|p| p.split('.').next())
            .collect();
        for field in top_level {
            if backend.ignored_fields.contains(field) {
                continue;
            }
            match body.get(field) {
                Some(value) => {
                    updated.insert(field.to_string(), value.clone());
                }
                None => {
                    updated.remove(field);
                }
            }
        }

        let etag = backend.next_etag();
        updated.insert("etag".to_string(), Value::String(etag));
        updated.insert("updateTime".to_string(), Value::String(Utc::now().to_rfc3339()));

        let stored = Value::Object(updated);
        debug!("In-memory update of {path} ({})", request.method);
        backend.resources.insert(path, stored.clone());
        Ok(backend.start_operation(resource, Some(stored)))
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<Operation> {
        let mut backend = self.backend();
        backend.calls.delete += 1;

        let path = resource.path();
        if !backend.resources.contains_key(&path) {
            return Err(ApiError::NotFound { resource: path }.into());
        }
        if !backend.sticky_deletes {
            backend.resources.remove(&path);
        }
        Ok(backend.start_operation(resource, None))
    }

    async fn poll_operation(&self, operation: &Operation) -> Result<Operation> {
        let mut backend = self.backend();
        backend.calls.poll += 1;

        let Some(pending) = backend.operations.get_mut(&operation.name) else {
            return Err(ApiError::NotFound {
                resource: operation.name.clone(),
            }
            .into());
        };

        pending.remaining_polls = pending.remaining_polls.saturating_sub(1);
        if pending.remaining_polls > 0 {
            return Ok(Operation::pending(operation.name.clone()));
        }

        let finished = pending.operation.clone();
        backend.operations.remove(&operation.name);
        Ok(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MultiCloudError;
    use crate::resources::{AzureClient, Resource};
    use serde_json::json;

    fn client_ref(name: &str) -> ResourceRef {
        AzureClient::new("p", "us-west1", name)
            .resource_ref()
            .expect("ref")
    }

    #[tokio::test]
    async fn test_create_assigns_server_fields() {
        let transport = InMemoryTransport::new();
        let resource = client_ref("c");

        let op = transport
            .create(&resource, json!({"tenantId": "t"}))
            .await
            .expect("create");
        assert!(op.done);

        let stored = transport.get(&resource).await.expect("get").expect("exists");
        assert_eq!(stored["name"], json!(resource.path()));
        assert_eq!(stored["tenantId"], json!("t"));
        assert!(stored["uid"].is_string());
        assert!(stored["createTime"].is_string());
        assert!(stored.get("etag").is_none());
    }

    #[tokio::test]
    async fn test_update_checks_etag() {
        let transport = InMemoryTransport::new();
        let resource = client_ref("c");
        transport.insert(&resource, json!({"etag": "e1", "description": "a"}));

        let request = UpdateRequest {
            method: "Update".to_string(),
            update_mask: vec!["description".to_string()],
            body: json!({"description": "b"}),
            etag: Some("stale".to_string()),
        };
        let err = transport
            .update(&resource, request.clone())
            .await
            .expect_err("conflict");
        assert!(err.is_conflict());

        let ok = UpdateRequest {
            etag: Some("e1".to_string()),
            ..request
        };
        transport.update(&resource, ok).await.expect("update");
        let stored = transport.stored(&resource).expect("stored");
        assert_eq!(stored["description"], json!("b"));
        assert_ne!(stored["etag"], json!("e1"));
    }

    #[tokio::test]
    async fn test_pending_operations() {
        let transport = InMemoryTransport::new();
        transport.set_pending_polls(2);
        let resource = client_ref("c");

        let op = transport.create(&resource, json!({})).await.expect("create");
        assert!(!op.done);
        assert!(!transport.poll_operation(&op).await.expect("poll").done);
        assert!(transport.poll_operation(&op).await.expect("poll").done);
        assert_eq!(transport.calls().poll, 2);
    }

    #[tokio::test]
    async fn test_list_pages() {
        let transport = InMemoryTransport::new();
        for name in ["a", "b", "c"] {
            transport.insert(&client_ref(name), json!({}));
        }
        let parent = client_ref("a").parent;

        let first = transport.list(&parent, None, 2).await.expect("list");
        assert_eq!(first.items.len(), 2);
        let second = transport
            .list(&parent, first.next_page_token, 2)
            .await
            .expect("list");
        assert_eq!(second.items.len(), 1);
        assert!(second.next_page_token.is_none());

        let all = transport.list(&parent, None, -1).await.expect("list");
        assert_eq!(all.items.len(), 3);
    }

    #[tokio::test]
    async fn test_injected_conflicts_and_delete() {
        let transport = InMemoryTransport::new();
        transport.inject_conflicts(1);
        let resource = client_ref("c");

        let err = transport.create(&resource, json!({})).await.expect_err("conflict");
        assert!(matches!(err, MultiCloudError::Api(ApiError::Conflict { .. })));
        transport.create(&resource, json!({})).await.expect("create");

        transport.delete(&resource).await.expect("delete");
        assert!(transport.get(&resource).await.expect("get").is_none());
        assert!(transport.delete(&resource).await.expect_err("gone").is_not_found());
    }
}
