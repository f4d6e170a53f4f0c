//! Packager - assembles a workflow's deliverables into a zip archive

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::generator::CwlSource;
use crate::domain::{DomainError, StepDetail, Technique, Workflow};

/// A generated archive ready to be downloaded
#[derive(Debug, Clone)]
pub struct Archive {
    pub file_name: String,
    pub bytes: Bytes,
}

/// A dataset that goes into the archive's `files/` folder
#[derive(Debug, Clone)]
pub struct DatasetFile {
    pub name: String,
    pub path: PathBuf,
}

/// Directory layout the packager reads from and writes to
#[derive(Debug, Clone)]
pub struct PackagerPaths {
    pub templates: PathBuf,
    pub uploads: PathBuf,
    pub output: PathBuf,
}

/// Builds archives in a fresh temporary directory under `<output>/<workflow_id>/`
#[derive(Debug, Clone)]
pub struct Packager {
    paths: PackagerPaths,
    cwl: Arc<dyn CwlSource>,
    timeout: Duration,
}

impl Packager {
    pub fn new(paths: PackagerPaths, cwl: Arc<dyn CwlSource>, timeout: Duration) -> Self {
        Self {
            paths,
            cwl,
            timeout,
        }
    }

    /// Package a complete workflow
    ///
    /// The temporary directory is removed whether packaging succeeds, fails
    /// or runs out of time.
    pub async fn package(
        &self,
        workflow: &Workflow,
        technique: Technique,
        steps: &[StepDetail],
        datasets: &[DatasetFile],
    ) -> Result<Archive, DomainError> {
        match tokio::time::timeout(self.timeout, self.build(workflow, technique, steps, datasets))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(DomainError::timeout(format!(
                "Packaging workflow '{}' exceeded {}s",
                workflow.name,
                self.timeout.as_secs()
            ))),
        }
    }

    async fn build(
        &self,
        workflow: &Workflow,
        technique: Technique,
        steps: &[StepDetail],
        datasets: &[DatasetFile],
    ) -> Result<Archive, DomainError> {
        let output_root = self.paths.output.join(workflow.id.to_string());
        tokio::fs::create_dir_all(&output_root).await.map_err(|e| {
            DomainError::io(format!("Failed to create {}", output_root.display()), e)
        })?;

        let staging = staging_dir(output_root).await?;

        let root = staging.path().join(&workflow.name);
        create_dir(&root).await?;

        let template_dir = self.paths.templates.join(technique.slug());
        for document in ["LICENSE.md", "README.md"] {
            copy(&template_dir.join(document), &root.join(document)).await?;
        }

        let scripts_src = self
            .paths
            .uploads
            .join(workflow.id.to_string())
            .join("python");
        let scripts_dst = root.join("python");
        create_dir(&scripts_dst).await?;
        for implementation in steps.iter().flat_map(|s| &s.implementations) {
            copy(
                &scripts_src.join(&implementation.file_name),
                &scripts_dst.join(&implementation.file_name),
            )
            .await?;
        }

        let files_dst = root.join("files");
        create_dir(&files_dst).await?;
        for dataset in datasets {
            copy(&dataset.path, &files_dst.join(&dataset.name)).await?;
        }

        let cwl_dst = root.join("cwl");
        create_dir(&cwl_dst).await?;
        for step in steps {
            let index = step.step.position as usize;
            let content = self.cwl.step_cwl(technique, index).await?;
            write(&cwl_dst.join(format!("step{}.cwl", index)), content).await?;
        }

        let main_cwl = self.cwl.main_cwl(technique).await?;
        write(&root.join("main.cwl"), main_cwl).await?;

        let names: Vec<String> = datasets.iter().map(|d| d.name.clone()).collect();
        let main_yml = self.cwl.main_yml(technique, &names).await?;
        write(&root.join("main.yml"), main_yml).await?;

        let bytes = tokio::task::spawn_blocking(move || zip_tree(staging.path(), &root))
            .await
            .map_err(|e| DomainError::internal(format!("Zip task failed: {}", e)))??;

        info!(
            workflow = %workflow.name,
            technique = %technique,
            bytes = bytes.len(),
            "Packaged workflow"
        );

        Ok(Archive {
            file_name: format!("{}.zip", workflow.name),
            bytes: Bytes::from(bytes),
        })
    }
}

/// Scratch directory under `output_root`, removed when dropped
async fn staging_dir(output_root: PathBuf) -> Result<tempfile::TempDir, DomainError> {
    tokio::task::spawn_blocking(move || {
        tempfile::Builder::new()
            .prefix("package-")
            .tempdir_in(&output_root)
    })
    .await
    .map_err(|e| DomainError::internal(format!("Staging task failed: {}", e)))?
    .map_err(|e| DomainError::io("Failed to create packaging directory", e))
}

async fn create_dir(path: &Path) -> Result<(), DomainError> {
    tokio::fs::create_dir(path)
        .await
        .map_err(|e| DomainError::io(format!("Failed to create {}", path.display()), e))
}

async fn copy(from: &Path, to: &Path) -> Result<(), DomainError> {
    tokio::fs::copy(from, to)
        .await
        .map(|_| ())
        .map_err(|e| DomainError::io(format!("Failed to copy {}", from.display()), e))
}

async fn write(path: &Path, content: String) -> Result<(), DomainError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| DomainError::io(format!("Failed to write {}", path.display()), e))
}

/// Zip `dir` with entry names relative to `base`, in sorted order
fn zip_tree(base: &Path, dir: &Path) -> Result<Vec<u8>, DomainError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    add_dir(&mut writer, options, base, dir)?;

    let cursor = writer
        .finish()
        .map_err(|e| DomainError::internal(format!("Failed to finish zip: {}", e)))?;
    Ok(cursor.into_inner())
}

fn add_dir(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    base: &Path,
    dir: &Path,
) -> Result<(), DomainError> {
    let mut entries = std::fs::read_dir(dir)
        .and_then(|entries| entries.map(|e| e.map(|e| e.path())).collect::<Result<Vec<_>, _>>())
        .map_err(|e| DomainError::io(format!("Failed to list {}", dir.display()), e))?;
    entries.sort();

    writer
        .add_directory(entry_name(base, dir)?, options)
        .map_err(|e| DomainError::internal(format!("Failed to add directory to zip: {}", e)))?;

    for path in entries {
        if path.is_dir() {
            add_dir(writer, options, base, &path)?;
            continue;
        }

        let name = entry_name(base, &path)?;
        let content = std::fs::read(&path)
            .map_err(|e| DomainError::io(format!("Failed to read {}", path.display()), e))?;

        writer
            .start_file(name.as_str(), options)
            .map_err(|e| DomainError::internal(format!("Failed to add {} to zip: {}", name, e)))?;
        writer
            .write_all(&content)
            .map_err(|e| DomainError::io(format!("Failed to compress {}", name), e))?;

        debug!(entry = %name, "Added zip entry");
    }

    Ok(())
}

fn entry_name(base: &Path, path: &Path) -> Result<String, DomainError> {
    let relative = path
        .strip_prefix(base)
        .map_err(|_| DomainError::internal(format!("{} escapes the package root", path.display())))?;

    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}
