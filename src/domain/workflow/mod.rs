//! Workflow domain - phenotype workflows, their steps and step artifacts

mod entity;
mod store;

pub use entity::{
    validate_dataset_name, validate_workflow_name, verify_positions, Implementation, Input,
    Output, Step, StepDetail, StepId, StepType, Workflow, WorkflowId, MAX_NAME_LENGTH, PYTHON,
    WORKFLOW_NAME_PATTERN,
};
pub use store::{WorkflowStore, WorkflowTransaction};
