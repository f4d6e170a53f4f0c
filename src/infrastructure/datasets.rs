//! Dataset store - uploaded datasets live beside a workflow's scripts

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::domain::workflow::validate_dataset_name;
use crate::domain::{DomainError, WorkflowId};

/// Stores datasets under `<uploads>/<workflow_id>/datasets/`
#[derive(Debug, Clone)]
pub struct DatasetStore {
    uploads_dir: PathBuf,
}

impl DatasetStore {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
        }
    }

    pub fn datasets_dir(&self, workflow_id: WorkflowId) -> PathBuf {
        self.uploads_dir
            .join(workflow_id.to_string())
            .join("datasets")
    }

    /// Path of a named dataset; the name must be a plain file name
    pub fn dataset_path(
        &self,
        workflow_id: WorkflowId,
        file_name: &str,
    ) -> Result<PathBuf, DomainError> {
        validate_dataset_name(file_name)?;
        Ok(self.datasets_dir(workflow_id).join(file_name))
    }

    /// Save an uploaded dataset
    ///
    /// The workflow's upload folder must already exist. An existing dataset
    /// with the same name is only overwritten when `replace` is set.
    pub async fn store(
        &self,
        workflow_id: WorkflowId,
        file_name: &str,
        contents: Bytes,
        replace: bool,
    ) -> Result<PathBuf, DomainError> {
        let target = self.dataset_path(workflow_id, file_name)?;

        let workflow_dir = self.uploads_dir.join(workflow_id.to_string());
        if !exists(&workflow_dir).await? {
            return Err(DomainError::not_found(format!(
                "Workflow folder (workflow ID = {}) does not exist in uploads",
                workflow_id
            )));
        }

        let datasets_dir = self.datasets_dir(workflow_id);
        tokio::fs::create_dir_all(&datasets_dir).await.map_err(|e| {
            DomainError::io(format!("Failed to create {}", datasets_dir.display()), e)
        })?;

        if !replace && exists(&target).await? {
            return Err(DomainError::conflict(
                "There is already a dataset with the same name.",
            ));
        }

        tokio::fs::write(&target, &contents)
            .await
            .map_err(|e| DomainError::io(format!("Failed to write {}", target.display()), e))?;

        debug!(workflow_id = %workflow_id, dataset = file_name, bytes = contents.len(), "Stored dataset");

        Ok(target)
    }

    /// Resolve datasets that must already exist, in the given order
    pub async fn require(
        &self,
        workflow_id: WorkflowId,
        names: &[String],
    ) -> Result<Vec<PathBuf>, DomainError> {
        let mut paths = Vec::with_capacity(names.len());

        for name in names {
            let path = self.dataset_path(workflow_id, name)?;
            if !exists(&path).await? {
                return Err(DomainError::not_found(format!(
                    "Dataset with name '{}' does not exist for workflow {}",
                    name, workflow_id
                )));
            }
            paths.push(path);
        }

        Ok(paths)
    }
}

async fn exists(path: &Path) -> Result<bool, DomainError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| DomainError::io(format!("Failed to inspect {}", path.display()), e))
}
