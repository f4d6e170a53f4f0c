//! CLI module for the Phenoflow API
//!
//! - `serve`: run the HTTP server
//! - `migrate`: apply, inspect or revert the PostgreSQL schema

pub mod migrate;
pub mod serve;

use clap::{Parser, Subcommand};

/// Phenoflow API - phenotype workflow definition and packaging
#[derive(Parser)]
#[command(name = "phenoflow-api")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve,

    /// Manage database migrations
    Migrate(migrate::MigrateArgs),
}
