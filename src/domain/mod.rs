//! Domain layer - Core business logic and entities

pub mod error;
pub mod technique;
pub mod template;
pub mod workflow;

pub use error::DomainError;
pub use technique::{PhenotypeDefinition, StepSpec, Technique, TechniqueParams};
pub use template::{Bindings, Placeholder, TemplateError};
pub use workflow::{
    Step, StepDetail, StepId, StepType, Workflow, WorkflowId, WorkflowStore, WorkflowTransaction,
};
