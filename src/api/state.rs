//! Application state for shared services

use std::path::PathBuf;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::domain::{DomainError, PhenotypeDefinition, Technique, Workflow};
use crate::infrastructure::auth::TokenVerifier;
use crate::infrastructure::packager::Archive;
use crate::infrastructure::services::{DatasetUpload, PhenotypeService, WorkflowDetail};

/// Application state containing shared services using dynamic dispatch
#[derive(Clone)]
pub struct AppState {
    pub phenotype_service: Arc<dyn PhenotypeServiceTrait>,
    pub token_verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(
        phenotype_service: Arc<dyn PhenotypeServiceTrait>,
        token_verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            phenotype_service,
            token_verifier,
        }
    }
}

/// Trait for phenotype service operations
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait PhenotypeServiceTrait: Send + Sync {
    async fn define(&self, definition: &PhenotypeDefinition) -> Result<Workflow, DomainError>;
    async fn upload_dataset(
        &self,
        technique: Technique,
        upload: DatasetUpload,
    ) -> Result<PathBuf, DomainError>;
    async fn generate(
        &self,
        technique: Technique,
        name: &str,
        datasets: &[String],
    ) -> Result<Archive, DomainError>;
    async fn get_workflow(&self, name: &str) -> Result<WorkflowDetail, DomainError>;
    async fn ping(&self) -> Result<(), DomainError>;
}

#[async_trait::async_trait]
impl PhenotypeServiceTrait for PhenotypeService {
    async fn define(&self, definition: &PhenotypeDefinition) -> Result<Workflow, DomainError> {
        PhenotypeService::define(self, definition).await
    }

    async fn upload_dataset(
        &self,
        technique: Technique,
        upload: DatasetUpload,
    ) -> Result<PathBuf, DomainError> {
        PhenotypeService::upload_dataset(self, technique, upload).await
    }

    async fn generate(
        &self,
        technique: Technique,
        name: &str,
        datasets: &[String],
    ) -> Result<Archive, DomainError> {
        PhenotypeService::generate(self, technique, name, datasets).await
    }

    async fn get_workflow(&self, name: &str) -> Result<WorkflowDetail, DomainError> {
        PhenotypeService::get_workflow(self, name).await
    }

    async fn ping(&self) -> Result<(), DomainError> {
        PhenotypeService::ping(self).await
    }
}
