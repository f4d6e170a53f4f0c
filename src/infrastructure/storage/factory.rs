//! Storage factory for runtime store selection

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::domain::{DomainError, WorkflowStore};

use super::in_memory::InMemoryWorkflowStore;
use super::migrations::run_workflow_migrations;
use super::postgres::PostgresWorkflowStore;

/// Supported storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

impl FromStr for StorageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(DomainError::configuration(format!(
                "Unknown storage backend '{}'",
                other
            ))),
        }
    }
}

/// Builds the workflow store named by `storage.backend`
///
/// The postgres backend connects and applies pending migrations first.
pub async fn create_workflow_store(
    config: &AppConfig,
) -> Result<Arc<dyn WorkflowStore>, DomainError> {
    match config.storage.backend.parse::<StorageType>()? {
        StorageType::InMemory => {
            info!("Using in-memory workflow store");
            Ok(Arc::new(InMemoryWorkflowStore::new()))
        }
        StorageType::Postgres => {
            let store = PostgresWorkflowStore::connect(&config.database).await?;
            run_workflow_migrations(store.pool()).await?;
            info!("Using PostgreSQL workflow store");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_from_str() {
        assert_eq!("memory".parse::<StorageType>().unwrap(), StorageType::InMemory);
        assert_eq!("In-Memory".parse::<StorageType>().unwrap(), StorageType::InMemory);
        assert_eq!("postgres".parse::<StorageType>().unwrap(), StorageType::Postgres);
        assert_eq!("PG".parse::<StorageType>().unwrap(), StorageType::Postgres);
        assert!(matches!(
            "sqlite".parse::<StorageType>(),
            Err(DomainError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_in_memory_store() {
        let mut config = AppConfig::default();
        config.storage.backend = "memory".to_string();

        let store = create_workflow_store(&config).await.unwrap();
        store.ping().await.unwrap();
        assert!(matches!(
            store.find_workflow_by_name("missing").await,
            Err(DomainError::NotFound { .. })
        ));
    }
}
