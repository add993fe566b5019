//! Storage factory for runtime backend selection

use std::sync::Arc;

use serde::Deserialize;
use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::storage::{Storage, StorageEntity};
use crate::domain::DomainError;

use super::in_memory::InMemoryStorage;
use super::postgres::{PostgresConfig, PostgresStorage};

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    #[serde(alias = "memory", alias = "in-memory")]
    InMemory,
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
}

impl StorageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Storage section of the application config
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageType,
    pub postgres: PostgresConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageType::InMemory,
            postgres: PostgresConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn postgres_url(url: impl Into<String>) -> Self {
        Self {
            backend: StorageType::Postgres,
            postgres: PostgresConfig::new(url),
        }
    }
}

/// A connected backend that hands out one typed store per entity table
#[derive(Debug, Clone)]
pub enum StorageFactory {
    InMemory,
    Postgres(PgPool),
}

impl StorageFactory {
    pub async fn connect(config: &StorageConfig) -> Result<Self, DomainError> {
        match config.backend {
            StorageType::InMemory => {
                info!("Using in-memory storage");
                Ok(Self::InMemory)
            }
            StorageType::Postgres => {
                let pool = config.postgres.connect_pool().await?;
                info!(
                    max_connections = config.postgres.max_connections,
                    "Connected to PostgreSQL storage"
                );
                Ok(Self::Postgres(pool))
            }
        }
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::InMemory => StorageType::InMemory,
            Self::Postgres(_) => StorageType::Postgres,
        }
    }

    /// Creates the store for one entity kind, ensuring its table exists
    pub async fn create<E>(&self, table_name: &str) -> Result<Arc<dyn Storage<E>>, DomainError>
    where
        E: StorageEntity + 'static,
    {
        match self {
            Self::InMemory => Ok(Arc::new(InMemoryStorage::<E>::new())),
            Self::Postgres(pool) => {
                let storage = PostgresStorage::<E>::new(pool.clone(), table_name);
                storage.ensure_table().await?;
                Ok(Arc::new(storage))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::storage::TextKey;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct Row {
        id: TextKey,
    }

    impl StorageEntity for Row {
        type Key = TextKey;

        fn key(&self) -> &Self::Key {
            &self.id
        }
    }

    #[test]
    fn test_storage_type_parse() {
        assert_eq!(StorageType::parse("memory"), Some(StorageType::InMemory));
        assert_eq!(StorageType::parse("in-memory"), Some(StorageType::InMemory));
        assert_eq!(StorageType::parse("postgresql"), Some(StorageType::Postgres));
        assert_eq!(StorageType::parse("pg"), Some(StorageType::Postgres));
        assert_eq!(StorageType::parse("redis"), None);
    }

    #[test]
    fn test_storage_config_deserializes_alias() {
        let config: StorageConfig =
            serde_json::from_value(serde_json::json!({ "backend": "pg" })).unwrap();
        assert_eq!(config.backend, StorageType::Postgres);

        let url = StorageConfig::postgres_url("postgres://db/x");
        assert_eq!(url.postgres.url, "postgres://db/x");
    }

    #[tokio::test]
    async fn test_in_memory_factory_creates_independent_stores() {
        let factory = StorageFactory::connect(&StorageConfig::in_memory())
            .await
            .unwrap();
        assert_eq!(factory.storage_type(), StorageType::InMemory);

        let a = factory.create::<Row>("a").await.unwrap();
        let b = factory.create::<Row>("b").await.unwrap();

        a.upsert(Row { id: TextKey::new("1") }).await.unwrap();
        assert_eq!(a.count().await.unwrap(), 1);
        assert_eq!(b.count().await.unwrap(), 0);
    }
}
