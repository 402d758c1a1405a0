use std::path::Path;

use serde_json::{Map, Value};

use crate::artifact::ArtifactName;
use crate::error::ConfigError;
use crate::jobs::job::JobDescriptor;

/// Reads the ordered job list from a JSON config file.
///
/// The file holds an array of records. Each record needs a string `region`
/// and a string `pipeline` (upper-case `REGION` / `PIPELINE` are accepted as
/// well). Every other field rides along as an engine parameter. A region
/// that cannot round-trip through an artifact file name is rejected here,
/// before any job runs.
pub struct JobSource;

impl JobSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<JobDescriptor>, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let jobs = Self::parse(&raw)?;
        tracing::debug!(path = %path.display(), jobs = jobs.len(), "Loaded job list");
        Ok(jobs)
    }

    pub fn parse(raw: &str) -> Result<Vec<JobDescriptor>, ConfigError> {
        let Value::Array(records) = serde_json::from_str::<Value>(raw)? else {
            return Err(ConfigError::NotAList);
        };

        records
            .into_iter()
            .enumerate()
            .map(|(index, record)| match record {
                Value::Object(fields) => Self::descriptor(index, fields),
                _ => Err(ConfigError::NotAnObject { index }),
            })
            .collect()
    }

    fn descriptor(index: usize, fields: Map<String, Value>) -> Result<JobDescriptor, ConfigError> {
        let region = required(&fields, index, "region")?;
        if let Some(reason) = ArtifactName::region_problem(&region) {
            return Err(ConfigError::InvalidField {
                index,
                field: "region",
                value: region,
                reason,
            });
        }
        let pipeline = required(&fields, index, "pipeline")?;
        Ok(JobDescriptor {
            region,
            pipeline,
            parameters: fields,
        })
    }
}

fn required(
    fields: &Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String, ConfigError> {
    [field.to_string(), field.to_ascii_uppercase()]
        .iter()
        .find_map(|key| fields.get(key).and_then(Value::as_str))
        .map(str::to_string)
        .ok_or(ConfigError::MissingField { index, field })
}
