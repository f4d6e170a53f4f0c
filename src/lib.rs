//! Phenoflow API
//!
//! Defines phenotype workflows for the supported techniques, materializes
//! their Python step scripts, stores uploaded datasets and packages
//! everything into downloadable CWL workflow archives.

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use api::state::AppState;
use infrastructure::{
    auth::RsaTokenVerifier,
    datasets::DatasetStore,
    generator::create_cwl_source,
    materializer::TemplateMaterializer,
    packager::{Packager, PackagerPaths},
    services::PhenotypeService,
    storage::create_workflow_store,
};
use tracing::info;

/// Create the application state with custom configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let token_verifier = RsaTokenVerifier::from_config(&config.auth)?;

    let store = create_workflow_store(config).await?;
    let cwl_source = create_cwl_source(config)?;

    let paths = &config.paths;
    info!(
        templates = %paths.templates.display(),
        uploads = %paths.uploads.display(),
        output = %paths.output.display(),
        generator = ?config.generator.mode,
        "Initializing phenotype service"
    );

    let packager = Packager::new(
        PackagerPaths {
            templates: paths.templates.clone(),
            uploads: paths.uploads.clone(),
            output: paths.output.clone(),
        },
        cwl_source,
        Duration::from_secs(config.packaging.timeout_secs),
    );

    let service = PhenotypeService::new(
        store,
        TemplateMaterializer::new(paths.templates.clone(), paths.uploads.clone()),
        DatasetStore::new(paths.uploads.clone()),
        packager,
    );

    Ok(AppState::new(Arc::new(service), Arc::new(token_verifier)))
}
