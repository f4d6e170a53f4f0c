//! Phenotype service - defines workflows, stores datasets and packages archives

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::workflow::PYTHON;
use crate::domain::{
    DomainError, PhenotypeDefinition, StepDetail, StepSpec, Technique, Workflow, WorkflowId,
    WorkflowStore, WorkflowTransaction,
};
use crate::infrastructure::datasets::DatasetStore;
use crate::infrastructure::materializer::TemplateMaterializer;
use crate::infrastructure::packager::{Archive, DatasetFile, Packager};

/// A dataset file uploaded for an existing phenotype
#[derive(Debug, Clone)]
pub struct DatasetUpload {
    pub phenotype_name: String,
    pub file_name: String,
    pub contents: Bytes,
    pub replace: bool,
}

/// A workflow together with its ordered steps
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: Workflow,
    pub steps: Vec<StepDetail>,
}

/// Orchestrates the store, the materializer, the dataset store and the packager
pub struct PhenotypeService {
    store: Arc<dyn WorkflowStore>,
    materializer: TemplateMaterializer,
    datasets: DatasetStore,
    packager: Packager,
}

impl std::fmt::Debug for PhenotypeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhenotypeService").finish()
    }
}

impl PhenotypeService {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        materializer: TemplateMaterializer,
        datasets: DatasetStore,
        packager: Packager,
    ) -> Self {
        Self {
            store,
            materializer,
            datasets,
            packager,
        }
    }

    /// Persist a validated phenotype definition and materialize its scripts
    ///
    /// Either every row and script of the new workflow exists afterwards, or
    /// none does and any workflow it was meant to replace is left as it was.
    pub async fn define(&self, definition: &PhenotypeDefinition) -> Result<Workflow, DomainError> {
        let name = definition.metadata.name.as_str();
        debug!(workflow = %name, technique = %definition.technique(), "Defining phenotype");

        let mut tx = self.store.begin().await?;
        let mut created = None;

        let outcome = self.construct(tx.as_mut(), definition, &mut created).await;

        let replaced = match outcome {
            Ok(replaced) => replaced,
            Err(e) => {
                warn!(workflow = %name, error = %e, "Phenotype definition failed, rolling back");
                if let Err(rollback) = tx.rollback().await {
                    warn!(workflow = %name, error = %rollback, "Rollback failed");
                }
                self.compensate(created).await;
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            warn!(workflow = %name, error = %e, "Commit failed");
            self.compensate(created).await;
            return Err(e);
        }

        if let Some(prior) = replaced {
            if let Err(e) = self.materializer.discard(prior).await {
                warn!(workflow = %name, prior = %prior, error = %e, "Failed to remove files of replaced workflow");
            }
        }

        let workflow = self.store.find_workflow_by_name(name).await?;
        info!(workflow = %name, workflow_id = %workflow.id, "Phenotype defined");

        Ok(workflow)
    }

    /// Runs inside the definition transaction; returns the id of a replaced workflow
    async fn construct(
        &self,
        tx: &mut dyn WorkflowTransaction,
        definition: &PhenotypeDefinition,
        created: &mut Option<WorkflowId>,
    ) -> Result<Option<WorkflowId>, DomainError> {
        let metadata = &definition.metadata;

        let existing = match tx.find_workflow_by_name(&metadata.name).await {
            Ok(workflow) => Some(workflow),
            Err(DomainError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let replaced = match existing {
            Some(_) if !metadata.replace => {
                return Err(DomainError::duplicate_name(
                    "There is already a phenotype with the same name.",
                ));
            }
            Some(prior) => {
                debug!(workflow = %metadata.name, prior = %prior.id, "Replacing existing phenotype");
                tx.delete_workflow(&metadata.name).await?;
                Some(prior.id)
            }
            None => None,
        };

        let workflow = tx
            .create_workflow(&metadata.name, &metadata.about, &metadata.user_name)
            .await?;
        *created = Some(workflow.id);

        let steps = definition.step_specs(&workflow);
        self.build_pipeline(tx, &workflow, definition.technique(), &steps)
            .await?;

        tx.mark_workflow_complete(workflow.id).await?;

        Ok(replaced)
    }

    /// Create every step with its artifacts and materialize its script
    ///
    /// Positions are the 1-based indices into `steps`.
    pub async fn build_pipeline(
        &self,
        tx: &mut dyn WorkflowTransaction,
        workflow: &Workflow,
        technique: Technique,
        steps: &[StepSpec],
    ) -> Result<(), DomainError> {
        for (index, spec) in steps.iter().enumerate() {
            let position = i32::try_from(index + 1)
                .map_err(|_| DomainError::internal("Too many steps for one workflow"))?;

            let step = tx
                .create_step(workflow.id, spec.name, spec.doc, spec.step_type, position)
                .await?;

            for doc in &spec.inputs {
                tx.create_input(step.id, doc).await?;
            }
            for output in &spec.outputs {
                tx.create_output(step.id, output.doc, output.extension)
                    .await?;
            }
            tx.create_implementation(step.id, spec.template, PYTHON)
                .await?;

            self.materializer
                .materialize(workflow.id, technique, spec)
                .await?;

            debug!(workflow = %workflow.name, step = spec.name, position, "Created step");
        }

        Ok(())
    }

    async fn compensate(&self, created: Option<WorkflowId>) {
        let Some(workflow_id) = created else {
            return;
        };

        if let Err(e) = self.materializer.discard(workflow_id).await {
            warn!(workflow_id = %workflow_id, error = %e, "Failed to remove files of aborted workflow");
        }
    }

    /// Store a dataset for an existing phenotype
    pub async fn upload_dataset(
        &self,
        technique: Technique,
        upload: DatasetUpload,
    ) -> Result<PathBuf, DomainError> {
        let workflow = self.store.find_workflow_by_name(&upload.phenotype_name).await?;

        let path = self
            .datasets
            .store(workflow.id, &upload.file_name, upload.contents, upload.replace)
            .await?;

        info!(
            workflow = %workflow.name,
            technique = %technique,
            dataset = %upload.file_name,
            "Dataset uploaded"
        );

        Ok(path)
    }

    /// Package a complete phenotype together with the named datasets
    pub async fn generate(
        &self,
        technique: Technique,
        name: &str,
        datasets: &[String],
    ) -> Result<Archive, DomainError> {
        let workflow = self.store.find_workflow_by_name(name).await?;

        if !workflow.complete {
            return Err(DomainError::partial_construction(format!(
                "Workflow '{}' is not complete",
                name
            )));
        }

        let steps = self.store.load_steps(workflow.id).await?;
        if steps.len() != technique.step_count() {
            return Err(DomainError::validation(format!(
                "Workflow '{}' is not a {} phenotype",
                name,
                technique.display_name()
            )));
        }

        let paths = self.datasets.require(workflow.id, datasets).await?;
        let files: Vec<DatasetFile> = datasets
            .iter()
            .cloned()
            .zip(paths)
            .map(|(name, path)| DatasetFile { name, path })
            .collect();

        self.packager
            .package(&workflow, technique, &steps, &files)
            .await
    }

    /// A workflow and its steps, by name
    pub async fn get_workflow(&self, name: &str) -> Result<WorkflowDetail, DomainError> {
        let workflow = self.store.find_workflow_by_name(name).await?;
        let steps = self.store.load_steps(workflow.id).await?;

        Ok(WorkflowDetail { workflow, steps })
    }

    /// Store connectivity, for readiness checks
    pub async fn ping(&self) -> Result<(), DomainError> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::{Cursor, Read};
    use std::path::Path;
    use std::time::Duration;

    use super::*;
    use crate::domain::Technique;
    use crate::infrastructure::generator::StaticCwlSource;
    use crate::infrastructure::packager::PackagerPaths;
    use crate::infrastructure::storage::InMemoryWorkflowStore;

    struct Harness {
        root: tempfile::TempDir,
        store: InMemoryWorkflowStore,
        service: PhenotypeService,
    }

    fn shipped_templates() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")
    }

    fn harness_with_templates(templates: PathBuf) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let uploads = root.path().join("uploads");
        let output = root.path().join("output");
        let store = InMemoryWorkflowStore::new();

        let packager = Packager::new(
            PackagerPaths {
                templates: templates.clone(),
                uploads: uploads.clone(),
                output,
            },
            Arc::new(StaticCwlSource::new(&templates)),
            Duration::from_secs(30),
        );

        let service = PhenotypeService::new(
            Arc::new(store.clone()),
            TemplateMaterializer::new(templates, uploads.clone()),
            DatasetStore::new(uploads),
            packager,
        );

        Harness {
            root,
            store,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with_templates(shipped_templates())
    }

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn dtc(name: &str, about: &str, replace: bool) -> PhenotypeDefinition {
        let replace = replace.to_string();
        PhenotypeDefinition::from_form(
            Technique::DecisionTreeClassifier,
            &form(&[
                ("class_name", "label"),
                ("random_state", "5"),
                ("replace", replace.as_str()),
                ("name", name),
                ("about", about),
                ("userName", "alice"),
            ]),
        )
        .unwrap()
    }

    fn tbc(name: &str) -> PhenotypeDefinition {
        PhenotypeDefinition::from_form(
            Technique::TraceBasedClustering,
            &form(&[
                ("k", "3"),
                ("clustering_algorithm", "kmeans"),
                ("match_function", "dice"),
                ("random_seed", "1"),
                ("threshold", "0.5"),
                ("replace", "false"),
                ("name", name),
                ("about", "clusters"),
                ("userName", "bob"),
            ]),
        )
        .unwrap()
    }

    fn script(harness: &Harness, workflow: &Workflow, file: &str) -> String {
        let path = harness
            .root
            .path()
            .join("uploads")
            .join(workflow.id.to_string())
            .join("python")
            .join(file);
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_define_decision_tree_scenario() {
        let harness = harness();

        let workflow = harness
            .service
            .define(&dtc("dtc001", "Decision tree phenotype", false))
            .await
            .unwrap();
        assert!(workflow.complete);

        let detail = harness.service.get_workflow("dtc001").await.unwrap();
        let positions: Vec<i32> = detail.steps.iter().map(|s| s.step.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        for step in &detail.steps {
            assert_eq!(step.inputs.len(), 1);
            assert_eq!(step.outputs.len(), 1);
            assert_eq!(step.outputs[0].extension, "csv");
            assert_eq!(step.implementations[0].language, "python");
        }

        let step2 = script(&harness, &workflow, "step2.py");
        assert!(step2.contains("\"label\""));
        assert!(step2.contains("random_state=5"));
        assert!(!step2.contains("<CLASS_NAME>"));
        assert!(!step2.contains("<RANDOM_STATE>"));
    }

    #[tokio::test]
    async fn test_define_trace_clustering_has_five_steps() {
        let harness = harness();

        let workflow = harness.service.define(&tbc("tbc001")).await.unwrap();

        let detail = harness.service.get_workflow("tbc001").await.unwrap();
        assert_eq!(detail.steps.len(), 5);
        assert_eq!(detail.steps[4].step.position, 5);

        let step2 = script(&harness, &workflow, "step2.py");
        assert!(step2.contains("k = 3"));
        assert!(step2.contains("KMeans(n_clusters=number_of_clusters"));
        let step3 = script(&harness, &workflow, "step3.py");
        assert!(step3.contains("dice(cluster_1, cluster_2)"));
    }

    #[tokio::test]
    async fn test_duplicate_without_replace_leaves_original() {
        let harness = harness();
        let original = harness
            .service
            .define(&dtc("dtc001", "first", false))
            .await
            .unwrap();

        let err = harness
            .service
            .define(&dtc("dtc001", "second", false))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateName { .. }));
        assert_eq!(
            err.to_string(),
            "Duplicate name: There is already a phenotype with the same name."
        );

        let current = harness.service.get_workflow("dtc001").await.unwrap();
        assert_eq!(current.workflow.id, original.id);
        assert_eq!(current.workflow.about, "first");
        assert_eq!(harness.store.row_counts().await.steps, 3);
    }

    #[tokio::test]
    async fn test_replace_yields_one_fresh_workflow() {
        let harness = harness();
        let original = harness
            .service
            .define(&dtc("dtc001", "first", false))
            .await
            .unwrap();

        let replacement = harness
            .service
            .define(&dtc("dtc001", "second", true))
            .await
            .unwrap();

        assert_ne!(replacement.id, original.id);
        assert_eq!(replacement.about, "second");

        let counts = harness.store.row_counts().await;
        assert_eq!(counts.workflows, 1);
        assert_eq!(counts.steps, 3);
        assert_eq!(counts.inputs, 3);
        assert_eq!(counts.outputs, 3);
        assert_eq!(counts.implementations, 3);

        let old_folder = harness
            .root
            .path()
            .join("uploads")
            .join(original.id.to_string());
        assert!(!old_folder.exists());
    }

    #[tokio::test]
    async fn test_failure_mid_construction_rolls_back_rows_and_files() {
        let templates = tempfile::tempdir().unwrap();
        let dir = templates.path().join("DecisionTreeClassifier");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("step1.py"), "# <WORKFLOW_NAME>").unwrap();
        std::fs::write(dir.join("step2.py"), "# <CLASS_NAME>").unwrap();

        let harness = harness_with_templates(templates.path().to_path_buf());
        let err = harness
            .service
            .define(&dtc("dtc001", "broken", false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("step3.py"));

        let counts = harness.store.row_counts().await;
        assert_eq!(counts.workflows, 0);
        assert_eq!(counts.steps, 0);
        assert_eq!(counts.implementations, 0);

        let uploads = harness.root.path().join("uploads");
        let leftovers = std::fs::read_dir(&uploads).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_prior_workflow() {
        let templates = tempfile::tempdir().unwrap();
        let dir = templates.path().join("DecisionTreeClassifier");
        std::fs::create_dir_all(&dir).unwrap();
        for file in ["step1.py", "step2.py", "step3.py"] {
            std::fs::write(dir.join(file), "# <WORKFLOW_NAME>").unwrap();
        }

        let harness = harness_with_templates(templates.path().to_path_buf());
        let original = harness
            .service
            .define(&dtc("dtc001", "first", false))
            .await
            .unwrap();

        std::fs::remove_file(dir.join("step3.py")).unwrap();
        harness
            .service
            .define(&dtc("dtc001", "second", true))
            .await
            .unwrap_err();

        let current = harness.service.get_workflow("dtc001").await.unwrap();
        assert_eq!(current.workflow.id, original.id);
        assert_eq!(current.steps.len(), 3);
        assert_eq!(script(&harness, &original, "step3.py"), "# dtc001");
    }

    #[tokio::test]
    async fn test_upload_dataset_requires_existing_phenotype() {
        let harness = harness();

        let err = harness
            .service
            .upload_dataset(
                Technique::DecisionTreeClassifier,
                DatasetUpload {
                    phenotype_name: "missing".to_string(),
                    file_name: "train.csv".to_string(),
                    contents: Bytes::from_static(b"a\n"),
                    replace: false,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_generate_requires_datasets() {
        let harness = harness();
        harness
            .service
            .define(&dtc("dtc001", "first", false))
            .await
            .unwrap();

        let err = harness
            .service
            .generate(
                Technique::DecisionTreeClassifier,
                "dtc001",
                &["train.csv".to_string(), "test.csv".to_string()],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_generate_rejects_other_technique() {
        let harness = harness();
        harness.service.define(&tbc("tbc001")).await.unwrap();

        let err = harness
            .service
            .generate(
                Technique::DecisionTreeClassifier,
                "tbc001",
                &["train.csv".to_string(), "test.csv".to_string()],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_generate_packages_uploaded_datasets() {
        let harness = harness();
        harness
            .service
            .define(&dtc("dtc001", "first", false))
            .await
            .unwrap();

        for name in ["train.csv", "test.csv"] {
            harness
                .service
                .upload_dataset(
                    Technique::DecisionTreeClassifier,
                    DatasetUpload {
                        phenotype_name: "dtc001".to_string(),
                        file_name: name.to_string(),
                        contents: Bytes::from_static(b"x,label\n1,a\n"),
                        replace: false,
                    },
                )
                .await
                .unwrap();
        }

        let archive = harness
            .service
            .generate(
                Technique::DecisionTreeClassifier,
                "dtc001",
                &["train.csv".to_string(), "test.csv".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(archive.file_name, "dtc001.zip");

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes.to_vec())).unwrap();
        let mut step2 = String::new();
        zip.by_name("dtc001/python/step2.py")
            .unwrap()
            .read_to_string(&mut step2)
            .unwrap();
        assert!(step2.contains("random_state=5"));

        let mut main_yml = String::new();
        zip.by_name("dtc001/main.yml")
            .unwrap()
            .read_to_string(&mut main_yml)
            .unwrap();
        assert!(main_yml.contains("train.csv"));
        assert!(zip.by_name("dtc001/cwl/step3.cwl").is_ok());
    }
}
