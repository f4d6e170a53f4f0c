//! Phenotype techniques - parameters, validation and step specifications

mod decision_tree;
mod params;
mod pipeline;
mod trace_clustering;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use decision_tree::DecisionTreeParams;
pub use params::{parse_replace, sanitize_html, FormReader, PhenotypeMetadata};
pub use pipeline::{workflow_bindings, OutputSpec, StepSpec};
pub use trace_clustering::{ClusteringAlgorithm, MatchFunction, TraceClusteringParams, MIN_K};

use crate::domain::workflow::Workflow;
use crate::domain::DomainError;

/// Supported phenotype techniques
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Technique {
    DecisionTreeClassifier,
    TraceBasedClustering,
}

impl Technique {
    /// Route segment, template folder and generator path component
    pub fn slug(&self) -> &'static str {
        match self {
            Self::DecisionTreeClassifier => "DecisionTreeClassifier",
            Self::TraceBasedClustering => "tbc",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DecisionTreeClassifier => "Decision Tree Classifier",
            Self::TraceBasedClustering => "Trace-based clustering",
        }
    }

    /// Number of steps every workflow of this technique has
    pub fn step_count(&self) -> usize {
        match self {
            Self::DecisionTreeClassifier => 3,
            Self::TraceBasedClustering => 5,
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Technique {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DecisionTreeClassifier" => Ok(Self::DecisionTreeClassifier),
            "tbc" => Ok(Self::TraceBasedClustering),
            other => Err(DomainError::not_found(format!(
                "Unknown technique '{}'",
                other
            ))),
        }
    }
}

/// Technique-specific parameters
#[derive(Debug, Clone, PartialEq)]
pub enum TechniqueParams {
    DecisionTree(DecisionTreeParams),
    TraceClustering(TraceClusteringParams),
}

impl TechniqueParams {
    pub fn technique(&self) -> Technique {
        match self {
            Self::DecisionTree(_) => Technique::DecisionTreeClassifier,
            Self::TraceClustering(_) => Technique::TraceBasedClustering,
        }
    }
}

/// A fully validated phenotype definition request
///
/// Built once from the request form; nothing downstream re-reads the form.
#[derive(Debug, Clone, PartialEq)]
pub struct PhenotypeDefinition {
    pub metadata: PhenotypeMetadata,
    pub params: TechniqueParams,
}

impl PhenotypeDefinition {
    /// Validate every form field for `technique` before anything is persisted
    pub fn from_form(
        technique: Technique,
        fields: &HashMap<String, String>,
    ) -> Result<Self, DomainError> {
        let mut reader = FormReader::new(fields);

        let params = match technique {
            Technique::DecisionTreeClassifier => {
                DecisionTreeParams::read(&mut reader).map(TechniqueParams::DecisionTree)
            }
            Technique::TraceBasedClustering => {
                TraceClusteringParams::read(&mut reader).map(TechniqueParams::TraceClustering)
            }
        };
        let metadata = PhenotypeMetadata::read(&mut reader);

        reader.finish()?;

        let (Some(metadata), Some(params)) = (metadata, params) else {
            return Err(DomainError::internal("Form reader accepted incomplete parameters"));
        };
        metadata.check()?;

        Ok(Self { metadata, params })
    }

    pub fn technique(&self) -> Technique {
        self.params.technique()
    }

    /// Ordered steps for `workflow`; positions are 1-based indices
    pub fn step_specs(&self, workflow: &Workflow) -> Vec<StepSpec> {
        match &self.params {
            TechniqueParams::DecisionTree(params) => params.step_specs(workflow),
            TechniqueParams::TraceClustering(params) => params.step_specs(workflow),
        }
    }
}
