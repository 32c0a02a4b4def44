//! Local record of applied resources.
//!
//! The CLI keeps one record per resource it applied: the fingerprint of the
//! desired state and the state observed afterwards.

mod local;
mod store;
mod types;

pub use local::LocalStateStore;
pub use store::StateStore;
pub use types::{ApplyRecord, HistoryEntry, STATE_VERSION, StateDocument, StateOperation};
