//! Phenoflow technique endpoints
//!
//! Every route requires a bearer token. Each technique exposes the same
//! three operations; only the number of datasets `generate` takes differs.

mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use super::state::AppState;

pub use handlers::{
    add_decision_tree, add_trace_clustering, generate_decision_tree, generate_trace_clustering,
    get_workflow, upload_decision_tree_dataset, upload_trace_clustering_dataset,
};

/// Create the `/phenoflow` router
///
/// Dataset uploads accept bodies up to `max_upload_bytes`; every other route
/// keeps axum's default limit.
pub fn create_phenoflow_router(max_upload_bytes: usize) -> Router<AppState> {
    let upload_limit = DefaultBodyLimit::max(max_upload_bytes);

    Router::new()
        .route(
            "/DecisionTreeClassifier/addPhenotype",
            post(add_decision_tree),
        )
        .route(
            "/DecisionTreeClassifier/uploadCsvDataset",
            post(upload_decision_tree_dataset).layer(upload_limit),
        )
        .route(
            "/DecisionTreeClassifier/generate/{name}/{train}/{test}",
            get(generate_decision_tree),
        )
        .route("/tbc/addPhenotype", post(add_trace_clustering))
        .route(
            "/tbc/uploadCsvDataset",
            post(upload_trace_clustering_dataset).layer(upload_limit),
        )
        .route("/tbc/generate/{name}/{dataset}", get(generate_trace_clustering))
        .route("/workflows/{name}", get(get_workflow))
}
