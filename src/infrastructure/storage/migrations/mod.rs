//! Database migrations infrastructure

use async_trait::async_trait;
use sqlx::Executor;
use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::DomainError;

/// Trait for running database migrations
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Runs all pending migrations
    async fn run(&self) -> Result<(), DomainError>;

    /// Reverts the last applied migration
    async fn revert(&self) -> Result<(), DomainError>;

    /// Returns the current migration version
    async fn version(&self) -> Result<Option<i64>, DomainError>;
}

/// PostgreSQL migrator over the embedded workflow schema
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
    migrations: Vec<Migration>,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            migrations: workflow_migrations(),
        }
    }

    /// Creates the migrations table if it doesn't exist
    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                success BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    async fn is_applied(&self, version: i64) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
            .bind(version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to check migration status: {}", e)))
    }

    /// Runs a single migration and records it, atomically
    pub async fn run_migration(&self, migration: &Migration) -> Result<(), DomainError> {
        self.ensure_migrations_table().await?;

        if self.is_applied(migration.version).await? {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin migration: {}", e)))?;

        (&mut *tx)
            .execute(sqlx::raw_sql(&migration.up))
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to run migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to record migration {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit migration: {}", e)))?;

        info!(version = migration.version, description = %migration.description, "Applied migration");

        Ok(())
    }

    /// Reverts a single migration
    pub async fn revert_migration(&self, migration: &Migration) -> Result<(), DomainError> {
        self.ensure_migrations_table().await?;

        if !self.is_applied(migration.version).await? {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin revert: {}", e)))?;

        (&mut *tx)
            .execute(sqlx::raw_sql(&migration.down))
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to revert migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query("DELETE FROM _migrations WHERE version = $1")
            .bind(migration.version)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to remove migration record {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit revert: {}", e)))?;

        info!(version = migration.version, "Reverted migration");

        Ok(())
    }

    /// Returns the latest applied migration version
    pub async fn current_version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        sqlx::query_scalar("SELECT MAX(version) FROM _migrations WHERE success = TRUE")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get migration version: {}", e)))
    }
}

#[async_trait]
impl Migrator for PostgresMigrator {
    async fn run(&self) -> Result<(), DomainError> {
        for migration in &self.migrations {
            self.run_migration(migration).await?;
        }

        Ok(())
    }

    async fn revert(&self) -> Result<(), DomainError> {
        let Some(current) = self.current_version().await? else {
            return Ok(());
        };

        match self.migrations.iter().find(|m| m.version == current) {
            Some(migration) => self.revert_migration(migration).await,
            None => Err(DomainError::storage(format!(
                "Applied migration {} is unknown to this build",
                current
            ))),
        }
    }

    async fn version(&self) -> Result<Option<i64>, DomainError> {
        self.current_version().await
    }
}

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version
    pub version: i64,
    /// Human-readable description
    pub description: String,
    /// SQL to run when applying the migration
    pub up: String,
    /// SQL to run when reverting the migration
    pub down: String,
}

impl Migration {
    pub fn new(
        version: i64,
        description: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            up: up.into(),
            down: down.into(),
        }
    }
}

/// Schema for workflows and their step artifacts
pub fn workflow_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create workflows table",
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                about TEXT NOT NULL,
                user_name VARCHAR(255) NOT NULL,
                complete BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT workflows_name_key UNIQUE (name)
            );
            "#,
            r#"
            DROP TABLE IF EXISTS workflows;
            "#,
        ),
        Migration::new(
            2,
            "Create steps table",
            r#"
            CREATE TABLE IF NOT EXISTS steps (
                id BIGSERIAL PRIMARY KEY,
                workflow_id BIGINT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                name VARCHAR(255) NOT NULL,
                doc TEXT NOT NULL,
                step_type VARCHAR(16) NOT NULL
                    CHECK (step_type IN ('load', 'logic', 'output')),
                position INTEGER NOT NULL CHECK (position >= 1),
                CONSTRAINT steps_workflow_position_key UNIQUE (workflow_id, position)
            );
            "#,
            r#"
            DROP TABLE IF EXISTS steps;
            "#,
        ),
        Migration::new(
            3,
            "Create step artifact tables",
            r#"
            CREATE TABLE IF NOT EXISTS inputs (
                id BIGSERIAL PRIMARY KEY,
                step_id BIGINT NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
                doc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_inputs_step_id ON inputs(step_id);

            CREATE TABLE IF NOT EXISTS outputs (
                id BIGSERIAL PRIMARY KEY,
                step_id BIGINT NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
                doc TEXT NOT NULL,
                extension VARCHAR(32) NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_outputs_step_id ON outputs(step_id);

            CREATE TABLE IF NOT EXISTS implementations (
                id BIGSERIAL PRIMARY KEY,
                step_id BIGINT NOT NULL REFERENCES steps(id) ON DELETE CASCADE,
                file_name VARCHAR(255) NOT NULL,
                language VARCHAR(32) NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_implementations_step_id ON implementations(step_id);
            "#,
            r#"
            DROP TABLE IF EXISTS implementations;
            DROP TABLE IF EXISTS outputs;
            DROP TABLE IF EXISTS inputs;
            "#,
        ),
    ]
}

/// Runs all pending workflow migrations
pub async fn run_workflow_migrations(pool: &PgPool) -> Result<(), DomainError> {
    PostgresMigrator::new(pool.clone()).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creation() {
        let migration = Migration::new(1, "Test migration", "CREATE TABLE test", "DROP TABLE test");

        assert_eq!(migration.version, 1);
        assert_eq!(migration.description, "Test migration");
        assert_eq!(migration.up, "CREATE TABLE test");
        assert_eq!(migration.down, "DROP TABLE test");
    }

    #[test]
    fn test_workflow_migrations_order() {
        let migrations = workflow_migrations();

        assert!(!migrations.is_empty());

        for i in 1..migrations.len() {
            assert!(
                migrations[i].version > migrations[i - 1].version,
                "Migrations should be in ascending order"
            );
        }
    }

    #[test]
    fn test_workflow_migrations_content() {
        for migration in workflow_migrations() {
            assert!(!migration.description.is_empty());
            assert!(!migration.up.is_empty());
            assert!(!migration.down.is_empty());
        }
    }

    #[test]
    fn test_schema_enforces_store_invariants() {
        let schema: String = workflow_migrations()
            .iter()
            .map(|m| m.up.as_str())
            .collect();

        assert!(schema.contains("UNIQUE (name)"));
        assert!(schema.contains("UNIQUE (workflow_id, position)"));
        assert!(schema.contains("CHECK (position >= 1)"));
        assert_eq!(schema.matches("ON DELETE CASCADE").count(), 4);
    }
}
