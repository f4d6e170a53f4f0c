//! Trace-based clustering technique

use std::fmt;
use std::str::FromStr;

use super::params::FormReader;
use super::pipeline::{workflow_bindings, OutputSpec, StepSpec};
use crate::domain::template::Placeholder;
use crate::domain::workflow::{StepType, Workflow};

/// Smallest number of clusters the technique accepts
pub const MIN_K: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringAlgorithm {
    KMeans,
}

impl ClusteringAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KMeans => "kmeans",
        }
    }

    /// Python expression producing one clustering of `pandas_dataframe`
    pub fn python_call(&self) -> &'static str {
        match self {
            Self::KMeans => {
                "KMeans(n_clusters=number_of_clusters, random_state=current_random_seed).fit(pandas_dataframe)"
            }
        }
    }
}

impl FromStr for ClusteringAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kmeans" => Ok(Self::KMeans),
            _ => Err("must be one of: kmeans".to_string()),
        }
    }
}

impl fmt::Display for ClusteringAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Similarity between two clusters of trace identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFunction {
    Jaccard,
    Jaccard2,
    Dice,
}

impl MatchFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jaccard => "jaccard",
            Self::Jaccard2 => "jaccard2",
            Self::Dice => "dice",
        }
    }

    /// Python expression comparing `cluster_1` with `cluster_2`
    pub fn python_call(&self) -> &'static str {
        match self {
            Self::Jaccard => "jaccard(cluster_1, cluster_2)",
            Self::Jaccard2 => "jaccard2(cluster_1, cluster_2)",
            Self::Dice => "dice(cluster_1, cluster_2)",
        }
    }
}

impl FromStr for MatchFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jaccard" => Ok(Self::Jaccard),
            "jaccard2" => Ok(Self::Jaccard2),
            "dice" => Ok(Self::Dice),
            _ => Err("must be one of: jaccard, jaccard2, dice".to_string()),
        }
    }
}

impl fmt::Display for MatchFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated trace-based clustering parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TraceClusteringParams {
    pub k: u32,
    pub clustering_algorithm: ClusteringAlgorithm,
    pub match_function: MatchFunction,
    pub random_seed: u64,
    pub threshold: f64,
}

impl TraceClusteringParams {
    pub fn read(reader: &mut FormReader<'_>) -> Option<Self> {
        let k = reader.parsed("k", parse_k);
        let clustering_algorithm =
            reader.parsed("clustering_algorithm", |raw| raw.parse::<ClusteringAlgorithm>());
        let match_function =
            reader.parsed("match_function", |raw| raw.parse::<MatchFunction>());
        let random_seed = reader.parsed("random_seed", parse_random_seed);
        let threshold = reader.parsed("threshold", parse_threshold);

        Some(Self {
            k: k?,
            clustering_algorithm: clustering_algorithm?,
            match_function: match_function?,
            random_seed: random_seed?,
            threshold: threshold?,
        })
    }

    pub fn step_specs(&self, workflow: &Workflow) -> Vec<StepSpec> {
        let base = workflow_bindings(workflow);

        vec![
            StepSpec {
                name: "step_1_load",
                doc: "Read the initial dataset from the .csv file. We suppose that this dataset is already preprocessed and without missing values. Remember that all attributes must be numeric, since a clustering technique will be applied.",
                step_type: StepType::Load,
                inputs: vec![
                    "A .csv file containing a dataset in csv format. We suppose that this dataset is already preprocessed and without missing values. Remember that all attributes must be numeric, since a clustering technique will be applied.",
                ],
                outputs: vec![OutputSpec::new(
                    "The same .csv file, since the dataset is already preprocessed and in csv format.",
                    "csv",
                )],
                template: "step1.py",
                bindings: base.clone(),
            },
            StepSpec {
                name: "step_2_from_dataset_to_partitions",
                doc: "Read the csv dataset and apply the corresponding clustering algorithm k times in order to obtain all partitions.",
                step_type: StepType::Logic,
                inputs: vec!["The csv dataset produced by the load step."],
                outputs: vec![OutputSpec::new(
                    "All partitions obtained by running the clustering algorithm with every random seed, in json format.",
                    "json",
                )],
                template: "step2.py",
                bindings: base
                    .clone()
                    .bind(Placeholder::KParameter, self.k.to_string())
                    .bind(Placeholder::RandomSeedParameter, self.random_seed.to_string())
                    .bind(
                        Placeholder::ClusteringAlgorithmCall,
                        self.clustering_algorithm.python_call(),
                    ),
            },
            StepSpec {
                name: "step_3_from_partitions_to_matrix_of_matches",
                doc: "Compare every cluster of every partition with the clusters of the other partitions using the selected match function in order to obtain the matrix of matches.",
                step_type: StepType::Logic,
                inputs: vec!["All partitions (in json format) generated in the previous step."],
                outputs: vec![OutputSpec::new(
                    "The matrix of matches between the clusters of all partitions, in json format.",
                    "json",
                )],
                template: "step3.py",
                bindings: base
                    .clone()
                    .bind(Placeholder::KParameter, self.k.to_string())
                    .bind(Placeholder::MatchFunctionCall, self.match_function.python_call()),
            },
            StepSpec {
                name: "step_4_from_matrix_of_matches_to_final_candidate_clusters",
                doc: "Filter the matrix of matches with the threshold in order to obtain the final candidate clusters.",
                step_type: StepType::Logic,
                inputs: vec!["The matrix of matches (in json format) generated in the previous step."],
                outputs: vec![OutputSpec::new(
                    "The final candidate clusters, in json format.",
                    "json",
                )],
                template: "step4.py",
                bindings: base
                    .clone()
                    .bind(Placeholder::ThresholdParameter, format_number(self.threshold)),
            },
            StepSpec {
                name: "step_5_output",
                doc: "Write the final candidate clusters to a .csv file.",
                step_type: StepType::Output,
                inputs: vec!["The final candidate clusters (in json format) generated in the previous step."],
                outputs: vec![OutputSpec::new(
                    "The final candidate clusters, one row per trace, in csv format.",
                    "csv",
                )],
                template: "step5.py",
                bindings: base,
            },
        ]
    }
}

fn parse_k(raw: &str) -> Result<u32, String> {
    match raw.parse::<u32>() {
        Ok(k) if k >= MIN_K => Ok(k),
        _ => Err(format!("must be an integer greater or equal than {}", MIN_K)),
    }
}

fn parse_random_seed(raw: &str) -> Result<u64, String> {
    raw.parse::<u64>()
        .map_err(|_| "must be an integer greater or equal than 0".to_string())
}

fn parse_threshold(raw: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(threshold) if threshold.is_finite() => Ok(threshold),
        _ => Err("must be a finite number".to_string()),
    }
}

/// Shortest decimal form; whole numbers render without a fraction
fn format_number(value: f64) -> String {
    format!("{}", value)
}
