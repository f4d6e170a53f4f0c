//! Layered application configuration

mod app_config;

pub use app_config::{
    AppConfig, AuthConfig, DatabaseConfig, GeneratorConfig, GeneratorMode, LogFormat,
    LoggingConfig, PackagingConfig, PathsConfig, ServerConfig, StorageSettings,
};
