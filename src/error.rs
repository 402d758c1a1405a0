use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading the job list. Always fatal: no job runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Config must be a list of job records")]
    NotAList,

    #[error("Job record {index} is not an object")]
    NotAnObject { index: usize },

    #[error("Job record {index} is missing string field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("Job record {index} has unusable `{field}` {value:?}: {reason}")]
    InvalidField {
        index: usize,
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Failures touching the output directory or its manifest.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Output directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode manifest record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Per-job failures. Contained at the job boundary, never abort the batch.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Not a valid pipeline: {0}")]
    UnknownPipeline(String),

    #[error("Region {0:?} cannot be used in an artifact file name")]
    InvalidRegion(String),

    #[error("Artifact already exists: {0}")]
    ArtifactExists(PathBuf),

    #[error("Error while executing {pipeline} pipeline notebook for region {region}: {reason}")]
    Execution {
        pipeline: String,
        region: String,
        artifact: PathBuf,
        reason: String,
    },

    #[error("Cancelled while running {pipeline} pipeline for region {region}")]
    Cancelled {
        pipeline: String,
        region: String,
        artifact: PathBuf,
    },

    #[error("Notebook {artifact} was written but its completion could not be recorded: {source}")]
    Unrecorded {
        artifact: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
