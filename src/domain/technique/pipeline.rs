//! Step specifications that drive pipeline construction

use crate::domain::template::{Bindings, Placeholder};
use crate::domain::workflow::{StepType, Workflow};

/// A declared output of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub doc: &'static str,
    pub extension: &'static str,
}

impl OutputSpec {
    pub fn new(doc: &'static str, extension: &'static str) -> Self {
        Self { doc, extension }
    }
}

/// Everything needed to persist and materialize one step
///
/// A step's position is its 1-based index in the list it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    pub name: &'static str,
    pub doc: &'static str,
    pub step_type: StepType,
    pub inputs: Vec<&'static str>,
    pub outputs: Vec<OutputSpec>,
    /// Template file name, also the materialized script name
    pub template: &'static str,
    pub bindings: Bindings,
}

/// Bindings every script of a workflow receives
pub fn workflow_bindings(workflow: &Workflow) -> Bindings {
    Bindings::new()
        .bind(Placeholder::WorkflowName, workflow.name.clone())
        .bind(Placeholder::WorkflowId, workflow.id.to_string())
}
