//! Reconciler for converging one resource to its desired state.
//!
//! This module implements the Apply loop: validate, observe, canonicalize,
//! diff, plan, execute and verify. Conflicts reported by the backend restart
//! the loop with a fresh observation, bounded by the retry policy.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{Transport, flatten};
use crate::config::{ClientConfig, PollPolicy, RetryPolicy};
use crate::error::{ApiError, MultiCloudError, ReconcileError, Result};
use crate::planner::{
    LifecyclePolicy, OperationPlan, PlanExecutor, Planner, canonicalize_desired,
    canonicalize_new, diff,
};
use crate::resources::{Resource, ResourceModel, ResourceRef};

/// Per-call options of [`Reconciler::apply`].
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Restrictions on what the plan may do.
    pub lifecycle: LifecyclePolicy,
    /// Previously observed state used instead of the first fetch.
    pub state_hint: Option<Value>,
    /// Overall time allowed for the whole apply.
    pub deadline: Option<Duration>,
}

/// Result of a converged apply.
#[derive(Debug, Clone)]
pub struct ApplyOutcome<R> {
    /// The resource as observed after apply.
    pub resource: R,
    /// Canonical observed tree.
    pub observed: Value,
    /// The plan that was executed on the final attempt.
    pub plan: OperationPlan,
    /// Number of attempts, the first included.
    pub attempts: u32,
    /// Identifier of this apply, also present in log lines.
    pub apply_id: Uuid,
}

/// Observation made at the start of an attempt.
struct Observed {
    /// Canonical desired tree.
    desired: Value,
    /// The computed plan.
    plan: OperationPlan,
}

/// Reconciler for single resources.
pub struct Reconciler {
    /// Remote API.
    transport: Arc<dyn Transport>,
    /// Conflict retry policy.
    retry: RetryPolicy,
    /// Operation pacing.
    poll: PollPolicy,
    /// Interrupts waits and backoffs.
    cancel: CancellationToken,
}

impl Reconciler {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy, poll: PollPolicy) -> Self {
        Self {
            transport,
            retry,
            poll,
            cancel: CancellationToken::new(),
        }
    }

    /// Creates a reconciler using the policies of `config`.
    #[must_use]
    pub fn from_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self::new(transport, config.retry.clone(), config.poll.clone())
    }

    /// Cancels in-flight waits and backoffs when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the transport used by this reconciler.
    #[must_use]
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Returns the operation pacing policy.
    #[must_use]
    pub const fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Converges the remote resource to `desired`.
    ///
    /// # Errors
    ///
    /// - a validation error if `desired` is incomplete
    /// - a plan error if the change is infeasible or forbidden
    /// - [`ReconcileError::ResidualDiffs`] if the resource did not converge
    /// - [`ReconcileError::MaxRetriesExceeded`] if conflicts persist
    /// - [`ReconcileError::Timeout`] if the deadline elapsed
    /// - [`ReconcileError::Cancelled`] if cancelled between attempts
    /// - any transport or operation error
    pub async fn apply<R: Resource>(
        &self,
        desired: &R,
        options: &ApplyOptions,
    ) -> Result<ApplyOutcome<R>> {
        desired.validate()?;
        let resource = desired.resource_ref()?;
        let tree = desired.to_tree()?;
        let apply_id = Uuid::new_v4();

        info!("[{apply_id}] Applying {resource}");

        let run = self.apply_with_retries::<R>(&resource, &tree, options, apply_id);
        let outcome = match options.deadline {
            Some(deadline) => tokio::time::timeout(deadline, run).await.map_err(|_| {
                MultiCloudError::from(ReconcileError::Timeout {
                    resource: resource.path(),
                    deadline_secs: deadline.as_secs(),
                })
            })?,
            None => run.await,
        }?;

        info!(
            "[{apply_id}] {resource} converged after {} attempt(s)",
            outcome.attempts
        );
        Ok(outcome)
    }

    /// Computes the plan `apply` would execute without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns validation, plan and transport errors.
    pub async fn plan<R: Resource>(
        &self,
        desired: &R,
        options: &ApplyOptions,
    ) -> Result<OperationPlan> {
        desired.validate()?;
        let resource = desired.resource_ref()?;
        let tree = desired.to_tree()?;

        let observed = self
            .observe(
                R::model(),
                &resource,
                &tree,
                options.state_hint.as_ref(),
                options.lifecycle,
            )
            .await?;
        Ok(observed.plan)
    }

    async fn apply_with_retries<R: Resource>(
        &self,
        resource: &ResourceRef,
        tree: &Value,
        options: &ApplyOptions,
        apply_id: Uuid,
    ) -> Result<ApplyOutcome<R>> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return Err(cancelled(resource));
            }
            debug!("[{apply_id}] Attempt {attempt}/{max_attempts} for {resource}");

            // Restarts always observe fresh state.
            let hint = if attempt == 1 {
                options.state_hint.as_ref()
            } else {
                None
            };

            match self
                .attempt::<R>(resource, tree, hint, options.lifecycle)
                .await
            {
                Ok((resource_value, observed, plan)) => {
                    return Ok(ApplyOutcome {
                        resource: resource_value,
                        observed,
                        plan,
                        attempts: attempt,
                        apply_id,
                    });
                }
                Err(e) if e.is_conflict() => {
                    warn!("[{apply_id}] Conflict on attempt {attempt}: {e}");
                    last_error = Some(e);
                    if attempt < max_attempts {
                        self.backoff(resource, attempt).await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(ReconcileError::MaxRetriesExceeded {
            attempts: max_attempts,
            resource: resource.path(),
            last_error: last_error.map_or_else(String::new, |e| e.to_string()),
        }
        .into())
    }

    async fn backoff(&self, resource: &ResourceRef, attempt: u32) -> Result<()> {
        let delay = self.retry.backoff(attempt);
        debug!("Retrying {resource} in {delay:?}");

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(cancelled(resource)),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Runs one pass of the loop.
    async fn attempt<R: Resource>(
        &self,
        resource: &ResourceRef,
        tree: &Value,
        hint: Option<&Value>,
        lifecycle: LifecyclePolicy,
    ) -> Result<(R, Value, OperationPlan)> {
        let model = R::model();
        let observed = self.observe(model, resource, tree, hint, lifecycle).await?;

        let executor = PlanExecutor::new(self.transport.as_ref(), &self.poll)
            .with_cancellation(self.cancel.clone());
        let mut first_response = None;
        for action in &observed.plan.actions {
            let response = executor
                .execute(action, model, resource, &observed.desired)
                .await?;
            if first_response.is_none() && observed.plan.creates() {
                first_response = response.filter(|r| r.as_object().is_some_and(|m| !m.is_empty()));
            }
        }

        let fetched = self.transport.get(resource).await?.ok_or_else(|| {
            MultiCloudError::from(ApiError::NotFound {
                resource: resource.path(),
            })
        })?;
        let raw_new = match first_response {
            Some(response) => fill_missing(fetched, &response),
            None => fetched,
        };

        let new_state = verify(model, resource, tree, &raw_new)?;
        let typed = R::from_tree(new_state.clone())?;
        Ok((typed, new_state, observed.plan))
    }

    /// Fetches, canonicalizes, diffs and plans.
    async fn observe(
        &self,
        model: &ResourceModel,
        resource: &ResourceRef,
        tree: &Value,
        hint: Option<&Value>,
        lifecycle: LifecyclePolicy,
    ) -> Result<Observed> {
        let raw = match hint {
            Some(hint) => {
                debug!("Using state hint for {resource}");
                Some(hint.clone())
            }
            None => self.transport.get(resource).await?,
        };
        let initial = raw
            .map(|raw| flatten(model.schema, &raw, resource))
            .transpose()?;

        let desired = canonicalize_desired(model.schema, tree, initial.as_ref());
        let diffs = match &initial {
            Some(actual) => diff(model.schema, &desired, actual)?,
            None => Vec::new(),
        };
        for d in &diffs {
            debug!("{resource}: {d}");
        }

        let plan = Planner::new(model)
            .with_lifecycle(lifecycle)
            .plan(resource, initial.is_some(), diffs)?;

        Ok(Observed {
            desired,
            plan,
        })
    }
}

fn cancelled(resource: &ResourceRef) -> MultiCloudError {
    ReconcileError::Cancelled {
        resource: resource.path(),
    }
    .into()
}

/// Copies top-level fields the fetched resource lacks from the create response.
fn fill_missing(mut fetched: Value, response: &Value) -> Value {
    if let (Value::Object(target), Value::Object(source)) = (&mut fetched, response) {
        for (key, value) in source {
            if target.get(key).is_none_or(Value::is_null) {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    fetched
}

/// Checks that the observed state matches the raw desired tree.
fn verify(
    model: &ResourceModel,
    resource: &ResourceRef,
    tree: &Value,
    raw_new: &Value,
) -> Result<Value> {
    let flat = flatten(model.schema, raw_new, resource)?;
    let new_state = canonicalize_new(model.schema, &flat, tree);
    let desired = canonicalize_desired(model.schema, tree, Some(&new_state));

    let residual = diff(model.schema, &desired, &new_state)?;
    if !residual.is_empty() {
        return Err(ReconcileError::ResidualDiffs {
            resource: resource.path(),
            diffs: residual,
        }
        .into());
    }
    Ok(new_state)
}
