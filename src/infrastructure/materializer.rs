//! Template materializer - renders step scripts into a workflow's upload folder

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::domain::template::{placeholders, render};
use crate::domain::{DomainError, StepSpec, Technique, WorkflowId};

/// Renders per-step script templates into `<uploads>/<workflow_id>/python/`
#[derive(Debug, Clone)]
pub struct TemplateMaterializer {
    templates_dir: PathBuf,
    uploads_dir: PathBuf,
}

impl TemplateMaterializer {
    pub fn new(templates_dir: impl Into<PathBuf>, uploads_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            uploads_dir: uploads_dir.into(),
        }
    }

    /// Root folder owned by a workflow
    pub fn workflow_dir(&self, workflow_id: WorkflowId) -> PathBuf {
        self.uploads_dir.join(workflow_id.to_string())
    }

    pub fn scripts_dir(&self, workflow_id: WorkflowId) -> PathBuf {
        self.workflow_dir(workflow_id).join("python")
    }

    /// Render one step's template and write it as the step's script
    pub async fn materialize(
        &self,
        workflow_id: WorkflowId,
        technique: Technique,
        step: &StepSpec,
    ) -> Result<PathBuf, DomainError> {
        let source = self.templates_dir.join(technique.slug()).join(step.template);
        let template = tokio::fs::read_to_string(&source)
            .await
            .map_err(|e| DomainError::io(format!("Failed to read template {}", source.display()), e))?;

        let scripts_dir = self.scripts_dir(workflow_id);
        tokio::fs::create_dir_all(&scripts_dir).await.map_err(|e| {
            DomainError::io(format!("Failed to create {}", scripts_dir.display()), e)
        })?;

        let rendered = render(&template, &step.bindings);
        let unbound = placeholders(&rendered);
        if !unbound.is_empty() {
            warn!(
                workflow_id = %workflow_id,
                script = step.template,
                unbound = ?unbound,
                "Script keeps placeholders without a binding"
            );
        }

        let target = scripts_dir.join(step.template);
        tokio::fs::write(&target, rendered)
            .await
            .map_err(|e| DomainError::io(format!("Failed to write {}", target.display()), e))?;

        debug!(workflow_id = %workflow_id, script = step.template, "Materialized step script");

        Ok(target)
    }

    /// Remove everything written for a workflow; a missing folder is not an error
    pub async fn discard(&self, workflow_id: WorkflowId) -> Result<(), DomainError> {
        let dir = self.workflow_dir(workflow_id);

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(workflow_id = %workflow_id, "Discarded workflow files");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DomainError::io(format!("Failed to remove {}", dir.display()), e)),
        }
    }
}
