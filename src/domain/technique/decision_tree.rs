//! Decision Tree Classifier technique

use super::params::FormReader;
use super::pipeline::{workflow_bindings, OutputSpec, StepSpec};
use crate::domain::template::Placeholder;
use crate::domain::workflow::{StepType, Workflow};

/// Validated Decision Tree Classifier parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionTreeParams {
    /// Target attribute, stored unquoted
    pub class_name: String,
    pub random_state: u32,
}

impl DecisionTreeParams {
    pub fn read(reader: &mut FormReader<'_>) -> Option<Self> {
        let class_name = reader.required("class_name");
        let random_state = reader.parsed("random_state", |raw| {
            raw.parse::<u32>()
                .map_err(|_| "must be an integer between 0 and 4294967295".to_string())
        });

        Some(Self {
            class_name: class_name?.to_string(),
            random_state: random_state?,
        })
    }

    /// Python string literal for the class attribute
    pub fn class_name_literal(&self) -> String {
        quote_python(&self.class_name)
    }

    pub fn step_specs(&self, workflow: &Workflow) -> Vec<StepSpec> {
        let base = workflow_bindings(workflow);

        vec![
            StepSpec {
                name: "step_1_load",
                doc: "Read the initial datasets (train and test) from the .csv files. We suppose that these datasets are already preprocessed, without missing values and with the correct attributes. Remember that all attributes (except the class) must be numeric.",
                step_type: StepType::Load,
                inputs: vec![
                    "The train and test datasets (in .csv format). We suppose that these datasets are already preprocessed, without missing values and with the correct attributes. Remember that all attributes (except the class) must be numeric.",
                ],
                outputs: vec![OutputSpec::new(
                    "The same .csv files, since the datasets are already preprocessed and in csv format.",
                    "csv",
                )],
                template: "step1.py",
                bindings: base.clone(),
            },
            StepSpec {
                name: "step_2_execute_ml_technique",
                doc: "Read the csv datasets and execute the corresponding ML technique in order to obtain predictions and the ML model.",
                step_type: StepType::Logic,
                inputs: vec![
                    "The train and test datasets (in .csv format) generated in the previous steps in order to obtain predictions and the ML model.",
                ],
                outputs: vec![OutputSpec::new(
                    "The train and test datasets with a new attribute (the predictions) and the ML model in pickle format.",
                    "csv",
                )],
                template: "step2.py",
                bindings: base
                    .clone()
                    .bind(Placeholder::ClassName, self.class_name_literal())
                    .bind(Placeholder::RandomState, self.random_state.to_string()),
            },
            StepSpec {
                name: "step_3_output",
                doc: "Write the train and test datasets with predictions (in csv format) and the model in pickle format.",
                step_type: StepType::Output,
                inputs: vec![
                    "The train and test datasets with predictions (in csv format) and the model in pickle format.",
                ],
                outputs: vec![OutputSpec::new(
                    "The train and test datasets with predictions (in csv format) and the model in pickle format.",
                    "csv",
                )],
                template: "step3.py",
                bindings: base,
            },
        ]
    }
}

/// Wrap in double quotes unless the value already carries matching quotes
fn quote_python(value: &str) -> String {
    let already_quoted = value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')));

    if already_quoted {
        return value.to_string();
    }

    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}
