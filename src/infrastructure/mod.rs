//! Infrastructure layer - storage, files, the CWL generator and auth

pub mod auth;
pub mod datasets;
pub mod generator;
pub mod logging;
pub mod materializer;
pub mod packager;
pub mod services;
pub mod storage;
