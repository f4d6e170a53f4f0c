//! CWL descriptor sources
//!
//! Packaging needs one CWL file per step plus the main workflow descriptor
//! and its job file. They either come from the remote generator service or
//! from static templates shipped with the service.

mod client;
mod static_source;

use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

pub use client::GeneratorClient;
pub use static_source::StaticCwlSource;

use crate::config::{AppConfig, GeneratorMode};
use crate::domain::{DomainError, Technique};

/// Source of CWL descriptors for a technique
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CwlSource: Send + Sync + std::fmt::Debug {
    /// Descriptor for the step at 1-based `index`
    async fn step_cwl(&self, technique: Technique, index: usize) -> Result<String, DomainError>;

    async fn main_cwl(&self, technique: Technique) -> Result<String, DomainError>;

    /// Job file naming the datasets, in the order the technique expects them
    async fn main_yml(
        &self,
        technique: Technique,
        datasets: &[String],
    ) -> Result<String, DomainError>;
}

/// Builds the CWL source selected by `generator.mode`
pub fn create_cwl_source(config: &AppConfig) -> Result<Arc<dyn CwlSource>, DomainError> {
    match config.generator.mode {
        GeneratorMode::Remote => Ok(Arc::new(GeneratorClient::new(
            &config.generator.base_url,
            std::time::Duration::from_secs(config.generator.timeout_secs),
        )?)),
        GeneratorMode::Static => Ok(Arc::new(StaticCwlSource::new(&config.paths.templates))),
    }
}
