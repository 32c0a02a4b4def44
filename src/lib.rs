// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness
#![warn(unused_imports)]              // Unused imports should be removed
#![warn(unused_variables)]            // Unused variables should be removed
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Azure Multicloud
//!
//! A declarative reconciliation client for Azure-hosted Kubernetes clusters,
//! their node pools and the authentication clients they use.
//!
//! ## Overview
//!
//! Given a desired resource, [`MultiCloudClient::apply`] converges the remote
//! resource to it:
//!
//! 1. **Observe**: fetch the live resource (or use a recorded state hint)
//! 2. **Plan**: canonicalize, diff field by field and group the differences
//!    into at most one create or a set of partial updates
//! 3. **Execute**: issue the calls and wait on their long-running operations
//! 4. **Verify**: fetch again and fail if anything still differs
//!
//! Conflicting concurrent modifications restart the loop from a fresh fetch,
//! bounded by the [`config::RetryPolicy`]. Differences no update can resolve
//! are reported, never fixed by recreating the resource.
//!
//! ## Modules
//!
//! - [`schema`]: Field metadata, equivalence rules and tri-state values
//! - [`planner`]: Canonicalizer, differ, planner and executor
//! - [`reconciler`]: The apply loop
//! - [`api`]: Transport trait, HTTP and in-memory transports, operation waiter
//! - [`resources`]: Typed `AzureClient`, `Cluster` and `NodePool`
//! - [`client`]: User-facing apply, plan, get, list and delete
//! - [`config`]: Client configuration, manifests and fingerprints
//! - [`state`]: Local record of applied resources
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! kind: AzureNodePool
//! spec:
//!   name: pool-a
//!   project: my-project
//!   location: us-west1
//!   cluster: my-cluster
//!   version: 1.29.4-gke.200
//!   subnetId: /subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vn/subnets/default
//!   config:
//!     vmSize: Standard_DS2_v2
//!     sshConfig:
//!       authorizedKey: ssh-rsa AAAA...
//!   autoscaling:
//!     minNodeCount: 1
//!     maxNodeCount: 3
//!   maxPodsConstraint:
//!     maxPodsPerNode: 110
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod planner;
pub mod reconciler;
pub mod resources;
pub mod schema;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{HttpTransport, InMemoryTransport, Transport};
pub use client::{MultiCloudClient, ResourcePage};
pub use config::{ClientConfig, ConfigParser, Manifest, PollPolicy, RetryPolicy};
pub use error::{MultiCloudError, Result};
pub use planner::{DeleteOutcome, LifecyclePolicy, OperationPlan};
pub use reconciler::{ApplyOptions, ApplyOutcome, Reconciler};
pub use resources::{AzureClient, Cluster, NodePool, ParentRef, Resource, ResourceKind, ResourceRef};
pub use state::{ApplyRecord, LocalStateStore, StateDocument, StateStore};
