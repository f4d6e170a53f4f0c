//! Infrastructure services

mod phenotype_service;

pub use phenotype_service::{DatasetUpload, PhenotypeService, WorkflowDetail};
