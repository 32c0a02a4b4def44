//! User-facing client for managing multicloud resources.
//!
//! Wraps a [`Reconciler`] and the transport it drives with typed
//! operations: apply, plan, get, list and delete.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{HttpTransport, Transport, flatten};
use crate::config::ClientConfig;
use crate::error::{ApiError, MultiCloudError, ReconcileError, Result};
use crate::planner::{DeleteOutcome, OperationPlan, PlanExecutor};
use crate::reconciler::{ApplyOptions, ApplyOutcome, Reconciler};
use crate::resources::{ParentRef, Resource, ResourceRef};

/// A page of typed resources.
#[derive(Debug, Clone)]
pub struct ResourcePage<R> {
    /// Resources on this page.
    pub items: Vec<R>,
    /// Token of the next page, if any.
    pub next_page_token: Option<String>,
}

/// Client for Azure clients, clusters and node pools.
pub struct MultiCloudClient {
    reconciler: Reconciler,
}

impl MultiCloudClient {
    /// Creates a client talking to the regional HTTP endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Creates a client over an arbitrary transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            reconciler: Reconciler::from_config(transport, config),
        }
    }

    /// Cancels in-flight work when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.reconciler = self.reconciler.with_cancellation(token);
        self
    }

    /// Converges the remote resource to `desired`.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::apply`].
    pub async fn apply<R: Resource>(
        &self,
        desired: &R,
        options: &ApplyOptions,
    ) -> Result<ApplyOutcome<R>> {
        self.reconciler.apply(desired, options).await
    }

    /// Computes the plan for `desired` without executing it.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::plan`].
    pub async fn plan<R: Resource>(
        &self,
        desired: &R,
        options: &ApplyOptions,
    ) -> Result<OperationPlan> {
        self.reconciler.plan(desired, options).await
    }

    /// Reads the live state of the resource identified by `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if the resource does not exist.
    pub async fn get<R: Resource>(&self, resource: &R) -> Result<R> {
        let reference = resource.resource_ref()?;
        let raw = self
            .reconciler
            .transport()
            .get(&reference)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: reference.path(),
            })?;
        R::from_tree(flatten(R::model().schema, &raw, &reference)?)
    }

    /// Lists one page of resources under `parent`.
    ///
    /// A `page_size` of -1 lets the server choose.
    ///
    /// # Errors
    ///
    /// Returns an error if `parent` lists another kind or the call fails.
    pub async fn list<R: Resource>(
        &self,
        parent: &ParentRef,
        page_token: Option<String>,
        page_size: i32,
    ) -> Result<ResourcePage<R>> {
        if parent.kind != R::model().kind {
            return Err(MultiCloudError::internal(format!(
                "cannot list {} as {}",
                parent.kind,
                R::model().kind
            )));
        }

        let page = self
            .reconciler
            .transport()
            .list(parent, page_token, page_size)
            .await?;

        let mut items = Vec::with_capacity(page.items.len());
        for raw in &page.items {
            let name = raw.get("name").and_then(|n| n.as_str()).ok_or_else(|| {
                ApiError::invalid_response(format!(
                    "listed {} has no name",
                    parent.kind
                ))
            })?;
            let reference = ResourceRef::new(parent.clone(), name);
            items.push(R::from_tree(flatten(R::model().schema, raw, &reference)?)?);
        }

        Ok(ResourcePage {
            items,
            next_page_token: page.next_page_token,
        })
    }

    /// Lists every resource under `parent`, following page tokens.
    ///
    /// # Errors
    ///
    /// Returns the first failing page's error.
    pub async fn list_all<R: Resource>(&self, parent: &ParentRef) -> Result<Vec<R>> {
        let mut all = Vec::new();
        let mut token = None;

        loop {
            let page = self.list::<R>(parent, token, -1).await?;
            all.extend(page.items);
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(all)
    }

    /// Deletes the resource identified by `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotDeleted`] if the resource is still visible
    /// after delete, or any transport or operation error.
    pub async fn delete<R: Resource>(&self, resource: &R) -> Result<DeleteOutcome> {
        let reference = resource.resource_ref()?;
        self.executor().delete(&reference).await
    }

    /// Deletes every resource under `parent` accepted by `filter`.
    ///
    /// Returns the number of resources deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::DeleteAllFailed`] listing every resource
    /// that could not be deleted.
    pub async fn delete_all<R, F>(&self, parent: &ParentRef, filter: F) -> Result<usize>
    where
        R: Resource,
        F: Fn(&R) -> bool + Send + Sync,
    {
        let executor = self.executor();
        let mut deleted = 0;
        let mut failures = Vec::new();

        for resource in self.list_all::<R>(parent).await? {
            if !filter(&resource) {
                continue;
            }
            let reference = resource.resource_ref()?;
            match executor.delete(&reference).await {
                Ok(DeleteOutcome::Deleted) => deleted += 1,
                Ok(DeleteOutcome::AlreadyAbsent) => {}
                Err(e) => {
                    warn!("Failed to delete {reference}: {e}");
                    failures.push(format!("{reference}: {e}"));
                }
            }
        }

        if !failures.is_empty() {
            return Err(ReconcileError::DeleteAllFailed { failures }.into());
        }

        info!("Deleted {deleted} resource(s) under {}", parent.collection_path());
        Ok(deleted)
    }

    fn executor(&self) -> PlanExecutor<'_> {
        PlanExecutor::new(self.reconciler.transport(), self.reconciler.poll_policy())
            .with_cancellation(self.reconciler.cancellation().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryTransport;
    use crate::config::{PollPolicy, RetryPolicy};
    use crate::resources::{AzureClient, ResourceKind};
    use tokio_test::{assert_err, assert_ok};

    fn setup() -> (Arc<InMemoryTransport>, MultiCloudClient) {
        let transport = Arc::new(InMemoryTransport::new());
        let config = ClientConfig {
            retry: RetryPolicy::fast(3),
            poll: PollPolicy::fast(),
            ..ClientConfig::default()
        };
        let client = MultiCloudClient::with_transport(transport.clone(), &config);
        (transport, client)
    }

    fn azure_client(name: &str) -> AzureClient {
        AzureClient::new("p", "l", name).with_identity("t", "app")
    }

    fn parent() -> ParentRef {
        ParentRef::new(ResourceKind::AzureClient, "p", "l", None)
    }

    async fn seed(client: &MultiCloudClient, names: &[&str]) {
        for name in names {
            assert_ok!(client.apply(&azure_client(name), &ApplyOptions::default()).await);
        }
    }

    #[tokio::test]
    async fn test_get() {
        let (_transport, client) = setup();
        let err = assert_err!(client.get(&azure_client("a")).await);
        assert!(err.is_not_found());

        seed(&client, &["a"]).await;
        let found = assert_ok!(client.get(&azure_client("a")).await);
        assert_eq!(found.name.as_deref(), Some("a"));
        assert_eq!(found.project.as_deref(), Some("p"));
        assert!(found.uid.is_some());
    }

    #[tokio::test]
    async fn test_list_pages() {
        let (_transport, client) = setup();
        seed(&client, &["a", "b", "c"]).await;

        let first = assert_ok!(client.list::<AzureClient>(&parent(), None, 2).await);
        assert_eq!(first.items.len(), 2);
        let token = first.next_page_token.expect("more pages");

        let second = assert_ok!(client.list::<AzureClient>(&parent(), Some(token), 2).await);
        assert_eq!(second.items.len(), 1);
        assert!(second.next_page_token.is_none());

        let all = assert_ok!(client.list_all::<AzureClient>(&parent()).await);
        let names: Vec<_> = all.iter().filter_map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_list_rejects_other_kind() {
        let (_transport, client) = setup();
        let clusters = ParentRef::new(ResourceKind::AzureCluster, "p", "l", None);
        assert_err!(client.list::<AzureClient>(&clusters, None, -1).await);
    }

    #[tokio::test]
    async fn test_delete_and_delete_absent() {
        let (transport, client) = setup();
        seed(&client, &["a"]).await;

        let outcome = assert_ok!(client.delete(&azure_client("a")).await);
        assert_eq!(outcome, DeleteOutcome::Deleted);

        let outcome = assert_ok!(client.delete(&azure_client("a")).await);
        assert_eq!(outcome, DeleteOutcome::AlreadyAbsent);
        assert_eq!(transport.calls().delete, 1);
    }

    #[tokio::test]
    async fn test_delete_all_with_filter() {
        let (transport, client) = setup();
        seed(&client, &["keep", "drop-1", "drop-2"]).await;

        let deleted = assert_ok!(
            client
                .delete_all::<AzureClient, _>(&parent(), |c| {
                    c.name.as_deref().is_some_and(|n| n.starts_with("drop"))
                })
                .await
        );
        assert_eq!(deleted, 2);
        assert!(transport
            .stored(&azure_client("keep").resource_ref().expect("ref"))
            .is_some());
    }

    #[tokio::test]
    async fn test_delete_all_aggregates_failures() {
        let (transport, client) = setup();
        seed(&client, &["a", "b"]).await;
        transport.set_sticky_deletes(true);

        let err = assert_err!(client.delete_all::<AzureClient, _>(&parent(), |_| true).await);
        match err {
            MultiCloudError::Reconcile(ReconcileError::DeleteAllFailed { failures }) => {
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
