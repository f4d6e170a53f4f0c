use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Duplicate name: {message}")]
    DuplicateName { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Position conflict: {message}")]
    PositionConflict { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Dangling reference: {message}")]
    DanglingReference { message: String },

    #[error("Upstream error: {message}")]
    Upstream { message: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error("Partial construction: {message}")]
    PartialConstruction { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn duplicate_name(message: impl Into<String>) -> Self {
        Self::DuplicateName {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn position_conflict(message: impl Into<String>) -> Self {
        Self::PositionConflict {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn dangling_reference(message: impl Into<String>) -> Self {
        Self::DanglingReference {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn partial_construction(message: impl Into<String>) -> Self {
        Self::PartialConstruction {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Filesystem failures surface as upstream errors, keeping the operation in the message
    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::upstream(format!("{}: {}", context, err))
    }
}
