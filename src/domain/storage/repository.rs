//! Storage trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

use super::entity::StorageEntity;

/// Generic storage trait for keyed entities
///
/// `upsert` is the write path used by every repository in the collector:
/// writing the same key twice leaves exactly one stored entity holding the
/// latest value. `create` and `update` keep their strict semantics for the
/// few places that need them.
#[async_trait]
pub trait Storage<E>: Send + Sync + Debug
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError>;

    async fn list(&self) -> Result<Vec<E>, DomainError>;

    /// Creates a new entity, returns a conflict if the key is taken
    async fn create(&self, entity: E) -> Result<E, DomainError>;

    /// Replaces an existing entity, returns not found otherwise
    async fn update(&self, entity: E) -> Result<E, DomainError>;

    /// Inserts or replaces the entity under its key
    async fn upsert(&self, entity: E) -> Result<E, DomainError>;

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError>;

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.list().await?.len())
    }

    async fn clear(&self) -> Result<(), DomainError>;
}
