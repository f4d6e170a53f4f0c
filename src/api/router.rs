use axum::{middleware, routing::get, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::health;
use super::middleware::logging_middleware;
use super::phenoflow;
use super::state::AppState;

/// Create the full router with application state
pub fn create_router_with_state(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        // Health endpoints (no auth required)
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        // Technique API
        .nest("/phenoflow", phenoflow::create_phenoflow_router(max_upload_bytes))
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::config::ServerConfig;
    use crate::infrastructure::auth::test_keys;
    use crate::infrastructure::datasets::DatasetStore;
    use crate::infrastructure::generator::StaticCwlSource;
    use crate::infrastructure::materializer::TemplateMaterializer;
    use crate::infrastructure::packager::{Packager, PackagerPaths};
    use crate::infrastructure::services::PhenotypeService;
    use crate::infrastructure::storage::InMemoryWorkflowStore;

    const BOUNDARY: &str = "X-PHENOFLOW-BOUNDARY";

    struct TestApp {
        _root: tempfile::TempDir,
        uploads: PathBuf,
        router: Router,
    }

    fn test_app() -> TestApp {
        test_app_with_upload_limit(ServerConfig::default().max_upload_bytes)
    }

    fn test_app_with_upload_limit(max_upload_bytes: usize) -> TestApp {
        let root = tempfile::tempdir().unwrap();
        let templates = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
        let uploads = root.path().join("uploads");

        let packager = Packager::new(
            PackagerPaths {
                templates: templates.clone(),
                uploads: uploads.clone(),
                output: root.path().join("output"),
            },
            Arc::new(StaticCwlSource::new(&templates)),
            Duration::from_secs(30),
        );
        let service = PhenotypeService::new(
            Arc::new(InMemoryWorkflowStore::new()),
            TemplateMaterializer::new(templates, uploads.clone()),
            DatasetStore::new(uploads.clone()),
            packager,
        );
        let state = AppState::new(Arc::new(service), Arc::new(test_keys::verifier()));

        TestApp {
            _root: root,
            uploads,
            router: create_router_with_state(state, max_upload_bytes),
        }
    }

    fn bearer() -> String {
        format!("Bearer {}", test_keys::mint("alice"))
    }

    fn form_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, bearer())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_request(uri: &str, phenotype: &str, file_name: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"phenotypeName\"\r\n\r\n{phenotype}\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"replace\"\r\n\r\nfalse\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"uploadedCsvDataset\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{contents}\r\n\
             --{BOUNDARY}--\r\n"
        );

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, bearer())
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, bearer())
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    const DTC001: &str =
        "class_name=label&random_state=5&replace=false&name=dtc001&about=Diabetes&userName=alice";

    const TBC001: &str = "k=3&clustering_algorithm=kmeans&match_function=dice&random_seed=0\
                          &threshold=0.5&replace=false&name=tbc001&about=Traces&userName=alice";

    #[tokio::test]
    async fn test_health_is_public() {
        let app = test_app();

        let response = app
            .router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_phenoflow_requires_token() {
        let app = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/phenoflow/DecisionTreeClassifier/addPhenotype")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(DTC001))
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "authentication_error");
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let app = test_app();

        let request = Request::builder()
            .uri("/phenoflow/workflows/dtc001")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_add_decision_tree_phenotype() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(form_request(
                "/phenoflow/DecisionTreeClassifier/addPhenotype",
                DTC001,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());

        let response = app
            .router
            .oneshot(get_request("/phenoflow/workflows/dtc001"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["name"], "dtc001");
        assert_eq!(json["complete"], true);
        let steps = json["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 3);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step["position"], i as i64 + 1);
        }
    }

    #[tokio::test]
    async fn test_duplicate_phenotype_conflicts() {
        let app = test_app();
        let uri = "/phenoflow/DecisionTreeClassifier/addPhenotype";

        let first = app
            .router
            .clone()
            .oneshot(form_request(uri, DTC001))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.router.oneshot(form_request(uri, DTC001)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let json = json_body(second).await;
        assert_eq!(json["error"]["code"], "duplicate_name");
    }

    #[tokio::test]
    async fn test_missing_parameters_listed() {
        let app = test_app();

        let response = app
            .router
            .oneshot(form_request("/phenoflow/tbc/addPhenotype", "name=tbc001"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Missing parameters"));
    }

    #[tokio::test]
    async fn test_k_one_creates_nothing() {
        let app = test_app();
        let body = TBC001.replace("k=3", "k=1");

        let response = app
            .router
            .clone()
            .oneshot(form_request("/phenoflow/tbc/addPhenotype", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .router
            .oneshot(get_request("/phenoflow/workflows/tbc001"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_requires_existing_phenotype() {
        let app = test_app();

        let response = app
            .router
            .oneshot(upload_request(
                "/phenoflow/tbc/uploadCsvDataset",
                "missing",
                "traces.csv",
                "a,b\n",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_accepts_datasets_over_two_mebibytes() {
        let app = test_app();
        let response = app
            .router
            .clone()
            .oneshot(form_request("/phenoflow/tbc/addPhenotype", TBC001))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let contents = "a".repeat(3 * 1024 * 1024);
        let response = app
            .router
            .oneshot(upload_request(
                "/phenoflow/tbc/uploadCsvDataset",
                "tbc001",
                "traces.csv",
                &contents,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_over_configured_limit_rejected() {
        let app = test_app_with_upload_limit(1024);
        let response = app
            .router
            .clone()
            .oneshot(form_request("/phenoflow/tbc/addPhenotype", TBC001))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let contents = "a".repeat(4096);
        let response = app
            .router
            .oneshot(upload_request(
                "/phenoflow/tbc/uploadCsvDataset",
                "tbc001",
                "traces.csv",
                &contents,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_generate_trace_clustering_archive() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(form_request("/phenoflow/tbc/addPhenotype", TBC001))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .clone()
            .oneshot(upload_request(
                "/phenoflow/tbc/uploadCsvDataset",
                "tbc001",
                "traces.csv",
                "patient,event\n1,a\n",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(app.uploads.read_dir().unwrap().next().is_some());

        let response = app
            .router
            .oneshot(get_request("/phenoflow/tbc/generate/tbc001/traces.csv"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/zip"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"tbc001.zip\""
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(body.to_vec())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"tbc001/python/step5.py"));
        assert!(names.contains(&"tbc001/files/traces.csv"));
        assert!(names.contains(&"tbc001/main.yml"));
    }

    #[tokio::test]
    async fn test_generate_requires_datasets() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(form_request(
                "/phenoflow/DecisionTreeClassifier/addPhenotype",
                DTC001,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router
            .oneshot(get_request(
                "/phenoflow/DecisionTreeClassifier/generate/dtc001/train.csv/test.csv",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
