//! Request and response types shared by the HTTP handlers

pub mod error;
pub mod form;

pub use error::{ApiError, ApiErrorResponse};
pub use form::{DatasetForm, FormFields, UploadedFile, DATASET_FIELD};
