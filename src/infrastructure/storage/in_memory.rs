//! In-memory storage implementation

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::storage::{Storage, StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Thread-safe in-memory storage
///
/// Default backend for development and the one-shot CLI. Data is lost when
/// the process terminates.
#[derive(Debug)]
pub struct InMemoryStorage<E>
where
    E: StorageEntity,
{
    entities: RwLock<HashMap<String, E>>,
}

impl<E> Default for InMemoryStorage<E>
where
    E: StorageEntity,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InMemoryStorage<E>
where
    E: StorageEntity,
{
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    fn read_lock(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, E>>, DomainError> {
        self.entities
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write_lock(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, E>>, DomainError> {
        self.entities
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))
    }
}

#[async_trait]
impl<E> Storage<E> for InMemoryStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        Ok(self.read_lock()?.get(key.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        Ok(self.read_lock()?.values().cloned().collect())
    }

    async fn create(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self.write_lock()?;

        if entities.contains_key(&key) {
            return Err(DomainError::conflict(format!(
                "Entity with key '{}' already exists",
                key
            )));
        }

        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self.write_lock()?;

        if !entities.contains_key(&key) {
            return Err(DomainError::not_found(format!(
                "Entity with key '{}' not found",
                key
            )));
        }

        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn upsert(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        self.write_lock()?.insert(key, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.write_lock()?.remove(key.as_str()).is_some())
    }

    async fn clear(&self) -> Result<(), DomainError> {
        self.write_lock()?.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.read_lock()?.len())
    }

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.read_lock()?.contains_key(key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::storage::TextKey;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: TextKey,
        answer: String,
    }

    impl StorageEntity for Record {
        type Key = TextKey;

        fn key(&self) -> &Self::Key {
            &self.id
        }
    }

    fn record(id: &str, answer: &str) -> Record {
        Record {
            id: TextKey::new(id),
            answer: answer.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let storage: InMemoryStorage<Record> = InMemoryStorage::new();
        let r = record("b:0:search", "hello");

        storage.create(r.clone()).await.unwrap();

        let found = storage.get(&TextKey::new("b:0:search")).await.unwrap();
        assert_eq!(found, Some(r));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let storage: InMemoryStorage<Record> = InMemoryStorage::new();

        storage.create(record("k", "a")).await.unwrap();
        let result = storage.create(record("k", "b")).await;

        assert!(matches!(result.unwrap_err(), DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let storage: InMemoryStorage<Record> = InMemoryStorage::new();

        let result = storage.update(record("k", "a")).await;
        assert!(matches!(result.unwrap_err(), DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_upsert_twice_stores_one_entity() {
        let storage: InMemoryStorage<Record> = InMemoryStorage::new();

        storage.upsert(record("b:0:search", "first")).await.unwrap();
        storage.upsert(record("b:0:search", "second")).await.unwrap();

        assert_eq!(storage.count().await.unwrap(), 1);
        let found = storage.get(&TextKey::new("b:0:search")).await.unwrap();
        assert_eq!(found.unwrap().answer, "second");
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let storage: InMemoryStorage<Record> = InMemoryStorage::new();

        storage.upsert(record("1", "a")).await.unwrap();
        storage.upsert(record("2", "b")).await.unwrap();

        assert!(storage.delete(&TextKey::new("1")).await.unwrap());
        assert!(!storage.delete(&TextKey::new("1")).await.unwrap());
        assert!(!storage.exists(&TextKey::new("1")).await.unwrap());

        storage.clear().await.unwrap();
        assert_eq!(storage.count().await.unwrap(), 0);
    }
}
