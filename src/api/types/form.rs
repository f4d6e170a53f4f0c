//! Form extractors that return errors as JSON
//!
//! Phenotype definitions arrive either URL-encoded or as multipart text
//! fields; dataset uploads are multipart with a single file part.

use std::collections::HashMap;

use axum::{
    extract::{FromRequest, Multipart, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json as AxumJson,
};
use bytes::Bytes;

use super::error::{ApiErrorDetail, ApiErrorResponse, ApiErrorType};

/// Name of the multipart part carrying the dataset
pub const DATASET_FIELD: &str = "uploadedCsvDataset";

/// Text fields of a form submission, keyed by field name
#[derive(Debug, Clone, Default)]
pub struct FormFields(pub HashMap<String, String>);

impl FormFields {
    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}

impl std::ops::Deref for FormFields {
    type Target = HashMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A single uploaded file
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub contents: Bytes,
}

/// Multipart dataset upload: text fields plus exactly one file
#[derive(Debug, Clone)]
pub struct DatasetForm {
    pub fields: HashMap<String, String>,
    pub file: UploadedFile,
}

/// Form rejection error that returns API error format
#[derive(Debug)]
pub struct FormRejection {
    status: StatusCode,
    message: String,
}

impl FormRejection {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for FormRejection {
    fn into_response(self) -> Response {
        let response = ApiErrorResponse {
            error: ApiErrorDetail {
                message: self.message,
                error_type: ApiErrorType::InvalidRequestError,
                param: None,
                code: Some("form_parse_error".to_string()),
            },
        };

        (self.status, AxumJson(response)).into_response()
    }
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn multipart_from<S>(req: Request, state: &S) -> Result<Multipart, FormRejection>
where
    S: Send + Sync,
{
    Multipart::from_request(req, state)
        .await
        .map_err(|rejection| FormRejection {
            status: rejection.status(),
            message: format!("Invalid multipart request: {}", rejection.body_text()),
        })
}

fn field_error(e: axum::extract::multipart::MultipartError) -> FormRejection {
    FormRejection {
        status: e.status(),
        message: format!("Failed to read multipart field: {}", e.body_text()),
    }
}

impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = FormRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&req) {
            return match Form::<HashMap<String, String>>::from_request(req, state).await {
                Ok(Form(fields)) => Ok(FormFields(fields)),
                Err(rejection) => Err(FormRejection {
                    status: rejection.status(),
                    message: format!("Invalid form body: {}", rejection.body_text()),
                }),
            };
        }

        let mut multipart = multipart_from(req, state).await?;
        let mut fields = HashMap::new();

        while let Some(field) = multipart.next_field().await.map_err(field_error)? {
            if field.file_name().is_some() {
                continue;
            }
            let Some(name) = field.name().map(|s| s.to_string()) else {
                continue;
            };
            let value = field.text().await.map_err(field_error)?;
            fields.insert(name, value);
        }

        Ok(FormFields(fields))
    }
}

impl<S> FromRequest<S> for DatasetForm
where
    S: Send + Sync,
{
    type Rejection = FormRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&req) {
            return Err(FormRejection::bad_request(
                "Expected a multipart/form-data request",
            ));
        }

        let mut multipart = multipart_from(req, state).await?;
        let mut fields = HashMap::new();
        let mut files = Vec::new();

        while let Some(field) = multipart.next_field().await.map_err(field_error)? {
            let name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(|s| s.to_string()) {
                Some(file_name) => {
                    let contents = field.bytes().await.map_err(field_error)?;
                    files.push((name, UploadedFile { file_name, contents }));
                }
                None => {
                    let value = field.text().await.map_err(field_error)?;
                    fields.insert(name, value);
                }
            }
        }

        if files.len() != 1 {
            return Err(FormRejection::bad_request("Only one file must be uploaded"));
        }

        let (name, file) = files.remove(0);
        if name != DATASET_FIELD {
            return Err(FormRejection::bad_request(format!(
                "The file must be sent in the '{}' field",
                DATASET_FIELD
            )));
        }

        Ok(DatasetForm { fields, file })
    }
}
