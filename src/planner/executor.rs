//! Executes planned actions against the transport.
//!
//! Each action is one mutating call followed by a wait on the returned
//! long-running operation. Deletes additionally confirm that the resource
//! is gone, absorbing read-after-delete staleness.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{OperationWaiter, Transport, UpdateRequest, expand, expand_fields};
use crate::config::PollPolicy;
use crate::error::{ApiError, OperationError, ReconcileError, Result};
use crate::resources::{ResourceModel, ResourceRef, UpdateOperation};

use super::diff::{FieldDiff, update_mask};
use super::plan::PlannedAction;

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The resource existed and is now gone.
    Deleted,
    /// The resource did not exist; no call was issued.
    AlreadyAbsent,
}

/// Executor for planned actions.
pub struct PlanExecutor<'a> {
    /// Remote API.
    transport: &'a dyn Transport,
    /// Operation pacing.
    poll: &'a PollPolicy,
    /// Interrupts waits.
    cancel: CancellationToken,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(transport: &'a dyn Transport, poll: &'a PollPolicy) -> Self {
        Self {
            transport,
            poll,
            cancel: CancellationToken::new(),
        }
    }

    /// Interrupts operation waits when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn waiter(&self) -> OperationWaiter<'_> {
        OperationWaiter::new(self.transport, self.poll).with_cancellation(self.cancel.clone())
    }

    /// Executes one action for the canonical desired tree.
    ///
    /// Returns the operation's response payload, if it carried one.
    ///
    /// # Errors
    ///
    /// Returns the transport or operation error unchanged.
    pub async fn execute(
        &self,
        action: &PlannedAction,
        model: &ResourceModel,
        resource: &ResourceRef,
        desired: &Value,
    ) -> Result<Option<Value>> {
        match action {
            PlannedAction::Create => self.create(model, resource, desired).await,
            PlannedAction::Update { operation, diffs } => {
                self.update(model, resource, desired, operation, diffs).await
            }
        }
    }

    async fn create(
        &self,
        model: &ResourceModel,
        resource: &ResourceRef,
        desired: &Value,
    ) -> Result<Option<Value>> {
        let body = expand(model.schema, desired, resource)?;
        info!("Creating {resource}");

        let operation = self.transport.create(resource, body).await?;
        let response = self.waiter().wait(operation).await?;

        info!("Created {resource}");
        Ok(response)
    }

    async fn update(
        &self,
        model: &ResourceModel,
        resource: &ResourceRef,
        desired: &Value,
        operation: &UpdateOperation,
        diffs: &[FieldDiff],
    ) -> Result<Option<Value>> {
        // The etag must be read right before the write it guards.
        let Some(current) = self.transport.get(resource).await? else {
            return Err(ApiError::Conflict {
                resource: resource.path(),
                message: "resource disappeared before update".to_string(),
            }
            .into());
        };
        let etag = current
            .get("etag")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        if etag.is_none() {
            warn!("{resource} has no etag, updating without a concurrency check");
        }

        let request = UpdateRequest {
            method: operation.name.to_string(),
            update_mask: update_mask(diffs),
            body: expand_fields(model.schema, desired, resource, operation.fields)?,
            etag,
        };
        info!(
            "Updating {resource} via {} ({})",
            operation.name,
            request.update_mask.join(", ")
        );

        let handle = self.transport.update(resource, request).await?;
        self.waiter().wait(handle).await
    }

    /// Deletes a resource and confirms it is gone.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::NotDeleted`] if the resource is still visible
    ///   after the confirmation budget
    /// - any transport or operation error
    pub async fn delete(&self, resource: &ResourceRef) -> Result<DeleteOutcome> {
        if self.transport.get(resource).await?.is_none() {
            debug!("{resource} is already absent");
            return Ok(DeleteOutcome::AlreadyAbsent);
        }

        info!("Deleting {resource}");
        match self.transport.delete(resource).await {
            Ok(operation) => {
                self.waiter().wait(operation).await?;
            }
            Err(e) if e.is_not_found() => {
                debug!("{resource} vanished before delete");
                return Ok(DeleteOutcome::Deleted);
            }
            Err(e) => return Err(e),
        }

        self.confirm_deleted(resource).await?;
        info!("Deleted {resource}");
        Ok(DeleteOutcome::Deleted)
    }

    async fn confirm_deleted(&self, resource: &ResourceRef) -> Result<()> {
        let attempts = self.poll.delete_confirm_retries;

        for attempt in 1..=attempts {
            if self.transport.get(resource).await?.is_none() {
                return Ok(());
            }
            debug!("{resource} still visible after delete (check {attempt}/{attempts})");

            if attempt < attempts {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => {
                        return Err(OperationError::Cancelled {
                            operation: format!("delete {resource}"),
                        }
                        .into());
                    }
                    () = tokio::time::sleep(self.poll.delete_confirm_interval()) => {}
                }
            }
        }

        Err(ReconcileError::NotDeleted {
            resource: resource.path(),
            attempts,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockTransport, Operation};
    use crate::error::MultiCloudError;
    use crate::resources::{Cluster, NodePool, Resource, cluster_sample, node_pool_sample};
    use crate::schema::OperationSelector;
    use serde_json::json;

    fn done(name: &str) -> Operation {
        Operation::completed(name, None)
    }

    #[tokio::test]
    async fn test_create_sends_expanded_body() {
        let cluster = cluster_sample();
        let resource = cluster.resource_ref().expect("ref");
        let tree = cluster.to_tree().expect("tree");

        let mut mock = MockTransport::new();
        mock.expect_create()
            .withf(|r, body| {
                r.name == "cl"
                    && body["name"] == json!("projects/p/locations/us-west1/azureClusters/cl")
                    && body.get("project").is_none()
            })
            .times(1)
            .returning(|_, _| Ok(Operation::completed("op-1", Some(json!({"uid": "u"})))));
        let policy = PollPolicy::fast();

        let response = PlanExecutor::new(&mock, &policy)
            .execute(&PlannedAction::Create, Cluster::model(), &resource, &tree)
            .await
            .expect("create");
        assert_eq!(response, Some(json!({"uid": "u"})));
    }

    #[tokio::test]
    async fn test_update_uses_fresh_etag_and_mask() {
        let pool = NodePool {
            version: Some("1.28.0".to_string()),
            ..node_pool_sample()
        };
        let resource = pool.resource_ref().expect("ref");
        let tree = pool.to_tree().expect("tree");
        let model = NodePool::model();
        let operation = model.operation("UpdateAzureNodePool").expect("registered");

        let mut mock = MockTransport::new();
        mock.expect_get()
            .times(1)
            .returning(|_| Ok(Some(json!({"etag": "e7"}))));
        mock.expect_update()
            .withf(|_, req| {
                req.method == "UpdateAzureNodePool"
                    && req.update_mask == vec!["version".to_string()]
                    && req.etag.as_deref() == Some("e7")
                    && req.body["version"] == json!("1.28.0")
                    && req.body.get("subnetId").is_none()
            })
            .times(1)
            .returning(|_, _| Ok(done("op-2")));
        let policy = PollPolicy::fast();

        let action = PlannedAction::Update {
            operation,
            diffs: vec![FieldDiff {
                path: "version".to_string(),
                desired: Some(json!("1.28.0")),
                actual: Some(json!("1.27.3-gke.100")),
                operation: OperationSelector::TriggersOperation("UpdateAzureNodePool"),
                output_only: false,
            }],
        };
        PlanExecutor::new(&mock, &policy)
            .execute(&action, model, &resource, &tree)
            .await
            .expect("update");
    }

    #[tokio::test]
    async fn test_delete_absent_issues_no_delete() {
        let resource = cluster_sample().resource_ref().expect("ref");
        let mut mock = MockTransport::new();
        mock.expect_get().times(1).returning(|_| Ok(None));
        mock.expect_delete().never();
        let policy = PollPolicy::fast();

        let outcome = PlanExecutor::new(&mock, &policy)
            .delete(&resource)
            .await
            .expect("delete");
        assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_delete_absorbs_stale_reads() {
        let resource = cluster_sample().resource_ref().expect("ref");
        let mut mock = MockTransport::new();
        let mut reads = 0;
        mock.expect_get().times(3).returning(move |_| {
            reads += 1;
            Ok((reads < 3).then(|| json!({"name": "cl"})))
        });
        mock.expect_delete().times(1).returning(|_| Ok(done("op-3")));
        let policy = PollPolicy::fast();

        let outcome = PlanExecutor::new(&mock, &policy)
            .delete(&resource)
            .await
            .expect("delete");
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_delete_still_visible_fails() {
        let resource = cluster_sample().resource_ref().expect("ref");
        let mut mock = MockTransport::new();
        mock.expect_get().returning(|_| Ok(Some(json!({"name": "cl"}))));
        mock.expect_delete().times(1).returning(|_| Ok(done("op-4")));
        let policy = PollPolicy::fast();

        let err = PlanExecutor::new(&mock, &policy)
            .delete(&resource)
            .await
            .expect_err("not deleted");
        assert!(matches!(
            err,
            MultiCloudError::Reconcile(ReconcileError::NotDeleted { attempts: 3, .. })
        ));
    }
}
