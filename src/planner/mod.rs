//! Planning module for reconciliation.
//!
//! This module canonicalizes desired and observed states, compares them
//! field by field, turns the differences into a plan and executes it.

mod canonical;
mod diff;
mod executor;
mod plan;

pub use canonical::{canonicalize_desired, canonicalize_new};
pub use diff::{FieldDiff, describe_diffs, diff, objects_match, update_mask};
pub use executor::{DeleteOutcome, PlanExecutor};
pub use plan::{LifecyclePolicy, OperationPlan, PlannedAction, Planner};
