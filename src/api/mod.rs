//! Transport collaborator for the multicloud API.
//!
//! The engine talks to the backend exclusively through [`Transport`]. Two
//! implementations ship with the crate: [`HttpTransport`] for the real
//! regional endpoints and [`InMemoryTransport`], a fake backend used for
//! tests and dry runs.

mod http;
mod memory;
mod operation;
mod transport;
mod wire;

pub use http::HttpTransport;
pub use memory::{CallCounts, InMemoryTransport};
pub use operation::OperationWaiter;
#[cfg(test)]
pub use transport::MockTransport;
pub use transport::{Operation, OperationStatus, Page, Transport, UpdateRequest};
pub use wire::{expand, expand_fields, flatten};
