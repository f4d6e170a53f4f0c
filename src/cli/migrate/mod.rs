//! Migrate command - applies the workflow schema and exits

use clap::Args;
use tracing::info;

use crate::config::AppConfig;
use crate::infrastructure::logging;
use crate::infrastructure::storage::{Migrator, PostgresMigrator, PostgresWorkflowStore};

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Revert the most recently applied migration
    #[arg(long, conflicts_with = "status")]
    pub revert: bool,

    /// Print the current schema version without changing anything
    #[arg(long)]
    pub status: bool,
}

/// Run migrations against `database.url`
pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    let store = PostgresWorkflowStore::connect(&config.database).await?;
    let migrator = PostgresMigrator::new(store.pool().clone());

    if args.status {
        match migrator.version().await? {
            Some(version) => info!(version, "Schema is at version {}", version),
            None => info!("No migrations applied"),
        }
        return Ok(());
    }

    if args.revert {
        migrator.revert().await?;
    } else {
        migrator.run().await?;
    }

    info!(version = ?migrator.version().await?, "Migrations complete");

    Ok(())
}
