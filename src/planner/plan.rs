//! Operation plan types and construction.
//!
//! A plan turns a set of field differences into the remote calls needed to
//! converge one resource. Recreation is never planned: a difference that
//! needs it on an existing resource is an error.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::debug;

use crate::error::{PlanError, Result};
use crate::resources::{ResourceModel, ResourceRef, UpdateOperation};
use crate::schema::OperationSelector;

use super::diff::FieldDiff;

/// Caller restrictions on what a plan may do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Fail instead of creating a missing resource.
    pub block_creation: bool,
    /// Fail instead of adopting a resource that already exists.
    pub block_acquire: bool,
    /// Fail instead of changing an existing resource.
    pub block_modification: bool,
}

/// A single planned remote call.
#[derive(Debug, Clone)]
pub enum PlannedAction {
    /// Create the resource from the desired state.
    Create,
    /// Issue one partial update covering every difference it carries.
    Update {
        /// The registered operation.
        operation: &'static UpdateOperation,
        /// Differences resolved by this call.
        diffs: Vec<FieldDiff>,
    },
}

/// The planned calls for one resource.
#[derive(Debug, Clone)]
pub struct OperationPlan {
    /// Resource being planned.
    pub resource: ResourceRef,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Whether the resource existed when planning.
    pub exists: bool,
    /// Every difference found, including those needing no call.
    pub diffs: Vec<FieldDiff>,
    /// Actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// Builds plans for one resource type.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    model: &'a ResourceModel,
    lifecycle: LifecyclePolicy,
}

impl<'a> Planner<'a> {
    /// Creates a planner for `model` with no lifecycle restrictions.
    #[must_use]
    pub const fn new(model: &'a ResourceModel) -> Self {
        Self {
            model,
            lifecycle: LifecyclePolicy {
                block_creation: false,
                block_acquire: false,
                block_modification: false,
            },
        }
    }

    /// Applies a lifecycle policy.
    #[must_use]
    pub const fn with_lifecycle(mut self, lifecycle: LifecyclePolicy) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Plans the calls that converge `resource`.
    ///
    /// A missing resource always gets a single create. An existing one gets
    /// one update per distinct operation, in first-seen order.
    ///
    /// # Errors
    ///
    /// - [`PlanError::CreationBlocked`], [`PlanError::AcquireBlocked`] or
    ///   [`PlanError::ModificationBlocked`] when the lifecycle policy forbids the plan
    /// - [`PlanError::InfeasibleUpdate`] when any difference requires recreation
    /// - [`PlanError::UnknownOperation`] when a difference names an unregistered operation
    pub fn plan(
        &self,
        resource: &ResourceRef,
        exists: bool,
        diffs: Vec<FieldDiff>,
    ) -> Result<OperationPlan> {
        let path = resource.path();

        if !exists {
            if self.lifecycle.block_creation {
                return Err(PlanError::CreationBlocked { resource: path }.into());
            }
            debug!("{path} does not exist, planning create");
            return Ok(OperationPlan::new(resource.clone(), false, diffs, vec![PlannedAction::Create]));
        }

        if self.lifecycle.block_acquire {
            return Err(PlanError::AcquireBlocked { resource: path }.into());
        }

        let recreate: Vec<FieldDiff> = diffs
            .iter()
            .filter(|d| d.requires_recreate())
            .cloned()
            .collect();
        if !recreate.is_empty() {
            return Err(PlanError::InfeasibleUpdate {
                resource: path,
                diffs: recreate,
            }
            .into());
        }

        let actions = self.group(&path, &diffs)?;

        if !actions.is_empty() && self.lifecycle.block_modification {
            return Err(PlanError::ModificationBlocked {
                resource: path,
                diffs,
            }
            .into());
        }

        debug!("{path}: {} difference(s), {} action(s)", diffs.len(), actions.len());
        Ok(OperationPlan::new(resource.clone(), true, diffs, actions))
    }

    fn group(&self, path: &str, diffs: &[FieldDiff]) -> Result<Vec<PlannedAction>> {
        let mut actions: Vec<PlannedAction> = Vec::new();

        for diff in diffs {
            let OperationSelector::TriggersOperation(name) = diff.operation else {
                continue;
            };

            let existing = actions.iter_mut().find_map(|action| match action {
                PlannedAction::Update { operation, diffs: grouped } if operation.name == name => {
                    Some(grouped)
                }
                _ => None,
            });
            if let Some(grouped) = existing {
                grouped.push(diff.clone());
                continue;
            }

            let operation = self.model.operation(name).ok_or_else(|| PlanError::UnknownOperation {
                resource: path.to_string(),
                operation: name.to_string(),
            })?;
            actions.push(PlannedAction::Update {
                operation,
                diffs: vec![diff.clone()],
            });
        }

        Ok(actions)
    }
}

impl OperationPlan {
    fn new(
        resource: ResourceRef,
        exists: bool,
        diffs: Vec<FieldDiff>,
        actions: Vec<PlannedAction>,
    ) -> Self {
        Self {
            resource,
            created_at: Utc::now(),
            exists,
            diffs,
            actions,
        }
    }

    /// Returns true if the plan issues no calls.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns true if the plan creates the resource.
    #[must_use]
    pub fn creates(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, PlannedAction::Create))
    }
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Create => "create".to_string(),
            Self::Update { operation, diffs } => {
                format!("{} ({} field(s))", operation.name, diffs.len())
            }
        }
    }
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for OperationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "{}: no changes required", self.resource);
        }

        writeln!(f, "{} ({} actions):", self.resource, self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
            if let PlannedAction::Update { diffs, .. } = action {
                for diff in diffs {
                    writeln!(f, "       {diff}")?;
                }
            }
        }
        Ok(())
    }
}
