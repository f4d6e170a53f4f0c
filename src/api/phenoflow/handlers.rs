use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, info};

use crate::api::middleware::RequireBearer;
use crate::api::state::AppState;
use crate::api::types::{ApiError, DatasetForm, FormFields};
use crate::domain::technique::{parse_replace, FormReader};
use crate::domain::{PhenotypeDefinition, Technique};
use crate::infrastructure::packager::Archive;
use crate::infrastructure::services::{DatasetUpload, WorkflowDetail};

/// POST /phenoflow/DecisionTreeClassifier/addPhenotype
pub async fn add_decision_tree(
    State(state): State<AppState>,
    RequireBearer(claims): RequireBearer,
    FormFields(fields): FormFields,
) -> Result<StatusCode, ApiError> {
    debug!(user = %claims.subject(), "Adding decision tree phenotype");

    add_phenotype(&state, Technique::DecisionTreeClassifier, &fields).await
}

/// POST /phenoflow/tbc/addPhenotype
pub async fn add_trace_clustering(
    State(state): State<AppState>,
    RequireBearer(claims): RequireBearer,
    FormFields(fields): FormFields,
) -> Result<StatusCode, ApiError> {
    debug!(user = %claims.subject(), "Adding trace-based clustering phenotype");

    add_phenotype(&state, Technique::TraceBasedClustering, &fields).await
}

async fn add_phenotype(
    state: &AppState,
    technique: Technique,
    fields: &std::collections::HashMap<String, String>,
) -> Result<StatusCode, ApiError> {
    let definition = PhenotypeDefinition::from_form(technique, fields).map_err(ApiError::from)?;

    let workflow = state
        .phenotype_service
        .define(&definition)
        .await
        .map_err(ApiError::from)?;

    debug!(workflow = %workflow.name, workflow_id = %workflow.id, "Responding to definition");

    Ok(StatusCode::OK)
}

/// POST /phenoflow/DecisionTreeClassifier/uploadCsvDataset
pub async fn upload_decision_tree_dataset(
    State(state): State<AppState>,
    RequireBearer(_claims): RequireBearer,
    form: DatasetForm,
) -> Result<StatusCode, ApiError> {
    upload_dataset(&state, Technique::DecisionTreeClassifier, form).await
}

/// POST /phenoflow/tbc/uploadCsvDataset
pub async fn upload_trace_clustering_dataset(
    State(state): State<AppState>,
    RequireBearer(_claims): RequireBearer,
    form: DatasetForm,
) -> Result<StatusCode, ApiError> {
    upload_dataset(&state, Technique::TraceBasedClustering, form).await
}

async fn upload_dataset(
    state: &AppState,
    technique: Technique,
    form: DatasetForm,
) -> Result<StatusCode, ApiError> {
    let mut reader = FormReader::new(&form.fields);
    let phenotype_name = reader.required("phenotypeName");
    let replace = reader.parsed("replace", parse_replace);
    reader.finish().map_err(ApiError::from)?;

    let (Some(phenotype_name), Some(replace)) = (phenotype_name, replace) else {
        return Err(ApiError::bad_request("Missing parameters: phenotypeName, replace"));
    };

    debug!(
        workflow = %phenotype_name,
        dataset = %form.file.file_name,
        size = form.file.contents.len(),
        "Uploading dataset"
    );

    let upload = DatasetUpload {
        phenotype_name: phenotype_name.to_string(),
        file_name: form.file.file_name,
        contents: form.file.contents,
        replace,
    };

    state
        .phenotype_service
        .upload_dataset(technique, upload)
        .await
        .map_err(ApiError::from)?;

    Ok(StatusCode::OK)
}

/// GET /phenoflow/DecisionTreeClassifier/generate/{name}/{train}/{test}
pub async fn generate_decision_tree(
    State(state): State<AppState>,
    RequireBearer(_claims): RequireBearer,
    Path((name, train, test)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    generate(&state, Technique::DecisionTreeClassifier, &name, vec![train, test]).await
}

/// GET /phenoflow/tbc/generate/{name}/{dataset}
pub async fn generate_trace_clustering(
    State(state): State<AppState>,
    RequireBearer(_claims): RequireBearer,
    Path((name, dataset)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    generate(&state, Technique::TraceBasedClustering, &name, vec![dataset]).await
}

async fn generate(
    state: &AppState,
    technique: Technique,
    name: &str,
    datasets: Vec<String>,
) -> Result<Response, ApiError> {
    debug!(workflow = %name, technique = %technique, datasets = ?datasets, "Generating archive");

    let archive = state
        .phenotype_service
        .generate(technique, name, &datasets)
        .await
        .map_err(ApiError::from)?;

    info!(workflow = %name, bytes = archive.bytes.len(), "Archive generated");

    Ok(zip_response(archive))
}

fn zip_response(archive: Archive) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", archive.file_name);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response()
}

/// GET /phenoflow/workflows/{name}
pub async fn get_workflow(
    State(state): State<AppState>,
    RequireBearer(_claims): RequireBearer,
    Path(name): Path<String>,
) -> Result<Json<WorkflowDetail>, ApiError> {
    debug!(workflow = %name, "Getting workflow");

    let detail = state
        .phenotype_service
        .get_workflow(&name)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(detail))
}
