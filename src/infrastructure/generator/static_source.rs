use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::CwlSource;
use crate::domain::template::Placeholder;
use crate::domain::{DomainError, Technique};

/// Reads CWL descriptors from `<templates>/<technique>/cwl/`
///
/// In `main.yml` the n-th `<DATASET_NAME>` is bound to the n-th dataset; any
/// occurrence past the last dataset reuses the last one.
#[derive(Debug, Clone)]
pub struct StaticCwlSource {
    templates_dir: PathBuf,
}

impl StaticCwlSource {
    pub fn new(templates_dir: impl AsRef<Path>) -> Self {
        Self {
            templates_dir: templates_dir.as_ref().to_path_buf(),
        }
    }

    async fn read(&self, technique: Technique, file: &str) -> Result<String, DomainError> {
        let path = self
            .templates_dir
            .join(technique.slug())
            .join("cwl")
            .join(file);

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DomainError::io(format!("Failed to read {}", path.display()), e))
    }
}

#[async_trait]
impl CwlSource for StaticCwlSource {
    async fn step_cwl(&self, technique: Technique, index: usize) -> Result<String, DomainError> {
        if index == 0 || index > technique.step_count() {
            return Err(DomainError::not_found(format!(
                "{} has no step {}",
                technique.display_name(),
                index
            )));
        }

        self.read(technique, &format!("step{}.cwl", index)).await
    }

    async fn main_cwl(&self, technique: Technique) -> Result<String, DomainError> {
        self.read(technique, "main.cwl").await
    }

    async fn main_yml(
        &self,
        technique: Technique,
        datasets: &[String],
    ) -> Result<String, DomainError> {
        let template = self.read(technique, "main.yml").await?;
        Ok(bind_datasets(&template, datasets))
    }
}

fn bind_datasets(template: &str, datasets: &[String]) -> String {
    let Some(last) = datasets.last() else {
        return template.to_string();
    };

    let token = Placeholder::DatasetName.token();
    let mut rendered = String::with_capacity(template.len());
    for (index, piece) in template.split(token.as_str()).enumerate() {
        if index > 0 {
            rendered.push_str(datasets.get(index - 1).unwrap_or(last));
        }
        rendered.push_str(piece);
    }

    rendered
}
