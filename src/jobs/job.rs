use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DispatchError;

/// Supported pipelines. Each one maps to exactly one template notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    GriddedPopulation,
    Cluster,
    Query,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 3] = [
        PipelineKind::GriddedPopulation,
        PipelineKind::Cluster,
        PipelineKind::Query,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::GriddedPopulation => "gridded-population",
            PipelineKind::Cluster => "cluster",
            PipelineKind::Query => "query",
        }
    }

    /// File name of the template notebook, relative to the templates directory
    pub fn template(&self) -> &'static str {
        match self {
            PipelineKind::GriddedPopulation => "2020-11-06-gridded-population.ipynb",
            PipelineKind::Cluster => "2020-11-06-cluster.ipynb",
            PipelineKind::Query => "2020-11-06-query-engine.ipynb",
        }
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelineKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownPipeline(s.to_string()))
    }
}

/// One unit of work read from the job list.
///
/// `pipeline` is kept as written so that an unknown kind can be reported
/// instead of rejected at load time. `parameters` is the complete record,
/// handed to the engine untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDescriptor {
    pub region: String,
    pub pipeline: String,
    pub parameters: Map<String, Value>,
}

impl JobDescriptor {
    pub fn new(region: impl Into<String>, pipeline: impl Into<String>) -> Self {
        let region = region.into();
        let pipeline = pipeline.into();
        let mut parameters = Map::new();
        parameters.insert("REGION".to_string(), Value::String(region.clone()));
        parameters.insert("PIPELINE".to_string(), Value::String(pipeline.clone()));
        Self {
            region,
            pipeline,
            parameters,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn kind(&self) -> Result<PipelineKind, DispatchError> {
        self.pipeline.parse()
    }

    /// `REGION-PIPELINE`, as shown in the request banner
    pub fn label(&self) -> String {
        format!("{}-{}", self.region, self.pipeline)
    }
}
