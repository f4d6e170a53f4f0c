//! Script template rendering
//!
//! Templates carry placeholders of the form `<UPPER_SNAKE_NAME>`.
//! - Tokens with a binding are replaced by the bound value
//! - Tokens without a binding are left exactly as written

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

/// Regex to match placeholder tokens: <NAME>
static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Z][A-Z0-9_]*)>").unwrap());

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error("Unknown placeholder: {name}")]
    UnknownPlaceholder { name: String },
}

/// Every placeholder a script template may bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    WorkflowName,
    WorkflowId,
    ClassName,
    RandomState,
    KParameter,
    RandomSeedParameter,
    ClusteringAlgorithmCall,
    MatchFunctionCall,
    ThresholdParameter,
    DatasetName,
}

impl Placeholder {
    pub const ALL: [Placeholder; 10] = [
        Self::WorkflowName,
        Self::WorkflowId,
        Self::ClassName,
        Self::RandomState,
        Self::KParameter,
        Self::RandomSeedParameter,
        Self::ClusteringAlgorithmCall,
        Self::MatchFunctionCall,
        Self::ThresholdParameter,
        Self::DatasetName,
    ];

    /// Name between the angle brackets
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowName => "WORKFLOW_NAME",
            Self::WorkflowId => "WORKFLOW_ID",
            Self::ClassName => "CLASS_NAME",
            Self::RandomState => "RANDOM_STATE",
            Self::KParameter => "K_PARAMETER",
            Self::RandomSeedParameter => "RANDOM_SEED_PARAMETER",
            Self::ClusteringAlgorithmCall => "CLUSTERING_ALGORITHM_CALL",
            Self::MatchFunctionCall => "MATCH_FUNCTION_CALL",
            Self::ThresholdParameter => "THRESHOLD_PARAMETER",
            Self::DatasetName => "DATASET_NAME",
        }
    }

    /// Token as it appears in a template
    pub fn token(&self) -> String {
        format!("<{}>", self.name())
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name())
    }
}

impl FromStr for Placeholder {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| TemplateError::UnknownPlaceholder {
                name: s.to_string(),
            })
    }
}

/// Typed placeholder values for one template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<Placeholder, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding, replacing any previous value
    pub fn bind(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.values.insert(placeholder, value.into());
        self
    }

    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.values.get(&placeholder).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Render a template, leaving unbound or unrecognized tokens untouched
pub fn render(template: &str, bindings: &Bindings) -> String {
    PLACEHOLDER_PATTERN
        .replace_all(template, |caps: &Captures| {
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();

            caps.get(1)
                .and_then(|name| name.as_str().parse::<Placeholder>().ok())
                .and_then(|placeholder| bindings.get(placeholder))
                .unwrap_or(whole)
                .to_string()
        })
        .into_owned()
}

/// Placeholders present in a template that this crate knows how to bind
pub fn placeholders(template: &str) -> Vec<Placeholder> {
    let mut found: Vec<Placeholder> = PLACEHOLDER_PATTERN
        .captures_iter(template)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect();

    found.sort();
    found.dedup();
    found
}
