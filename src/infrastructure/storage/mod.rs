//! Storage infrastructure - workflow store implementations

mod factory;
mod in_memory;
pub mod migrations;
mod postgres;

pub use factory::{create_workflow_store, StorageType};
pub use in_memory::{InMemoryTransaction, InMemoryWorkflowStore, RowCounts};
pub use migrations::{run_workflow_migrations, Migration, Migrator, PostgresMigrator};
pub use postgres::{PostgresTransaction, PostgresWorkflowStore};
