//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.

use async_trait::async_trait;

use crate::error::Result;

use super::types::StateDocument;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<StateDocument>>;

    /// Saves the state.
    async fn save(&self, state: &StateDocument) -> Result<()>;

    /// Deletes the state.
    async fn delete(&self) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;

    /// Loads the state, or an empty one if none exists.
    async fn load_or_default(&self) -> Result<StateDocument> {
        Ok(self.load().await?.unwrap_or_default())
    }
}
