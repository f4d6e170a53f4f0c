//! Workflow, step and step artifact entities

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Maximum length for workflow names
pub const MAX_NAME_LENGTH: usize = 255;

/// Language recorded for every generated implementation
pub const PYTHON: &str = "python";

/// Workflow names end up as folder and archive names, so no separators
pub static WORKFLOW_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").unwrap());

/// Store-assigned workflow identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(i64);

impl WorkflowId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned step identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(i64);

impl StepId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a step in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Load,
    Logic,
    Output,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Logic => "logic",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load" => Ok(Self::Load),
            "logic" => Ok(Self::Logic),
            "output" => Ok(Self::Output),
            other => Err(DomainError::validation(format!(
                "Unknown step type '{}'",
                other
            ))),
        }
    }
}

/// A named phenotype definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub about: String,
    pub user_name: String,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub id: StepId,
    pub workflow_id: WorkflowId,
    pub name: String,
    pub doc: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Input {
    pub id: i64,
    pub step_id: StepId,
    pub doc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    pub id: i64,
    pub step_id: StepId,
    pub doc: String,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Implementation {
    pub id: i64,
    pub step_id: StepId,
    pub file_name: String,
    pub language: String,
}

/// A step together with everything hanging off it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDetail {
    #[serde(flatten)]
    pub step: Step,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    pub implementations: Vec<Implementation>,
}

/// Validate a workflow name
pub fn validate_workflow_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty() {
        return Err(DomainError::validation("Workflow name cannot be empty"));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(DomainError::validation(format!(
            "Workflow name exceeds maximum length of {} characters",
            MAX_NAME_LENGTH
        )));
    }

    if !WORKFLOW_NAME_PATTERN.is_match(name) {
        return Err(DomainError::validation(format!(
            "Workflow name '{}' may only contain letters, digits, '_', '-' and '.'",
            name
        )));
    }

    Ok(())
}

/// Dataset names are plain file names inside the workflow folder
pub fn validate_dataset_name(name: &str) -> Result<(), DomainError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);

    if !plain {
        return Err(DomainError::validation(format!(
            "Invalid dataset name '{}'",
            name
        )));
    }

    Ok(())
}

/// Positions of a finished workflow must be exactly 1..=N with N >= 1
pub fn verify_positions(workflow_id: WorkflowId, positions: &[i32]) -> Result<(), DomainError> {
    if positions.is_empty() {
        return Err(DomainError::partial_construction(format!(
            "Workflow {} has no steps",
            workflow_id
        )));
    }

    let mut sorted = positions.to_vec();
    sorted.sort_unstable();

    for (index, position) in sorted.iter().enumerate() {
        let expected = index as i32 + 1;

        if *position != expected {
            return Err(DomainError::partial_construction(format!(
                "Workflow {} expected a step at position {}, found {}",
                workflow_id, expected, position
            )));
        }
    }

    Ok(())
}
