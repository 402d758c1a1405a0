use chrono::{Local, NaiveDateTime};

/// Human readable local timestamp embedded in artifact names,
/// e.g. `2020-11-06_03-04-05_PM`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%I-%M-%S_%p";

const EXECUTED: &str = "-executed-";
const STAMP: &str = "_@_";
const EXTENSION: &str = ".ipynb";

/// Structured form of `{pipeline}-executed-{region}_@_{timestamp}.ipynb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub pipeline: String,
    pub region: String,
    pub executed_at: NaiveDateTime,
}

impl ArtifactName {
    pub fn new(pipeline: impl Into<String>, region: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            pipeline: pipeline.into(),
            region: region.into(),
            executed_at: at,
        }
    }

    /// Name for an execution starting now.
    pub fn now(pipeline: impl Into<String>, region: impl Into<String>) -> Self {
        Self::new(pipeline, region, Local::now().naive_local())
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}{EXECUTED}{}{STAMP}{}{EXTENSION}",
            self.pipeline,
            self.region,
            self.executed_at.format(TIMESTAMP_FORMAT)
        )
    }

    /// Parse a file name back into its parts. Anything that does not follow
    /// the naming pattern exactly, including the timestamp, yields `None`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(EXTENSION)?;
        let (pipeline, rest) = stem.split_once(EXECUTED)?;
        let (region, stamp) = rest.rsplit_once(STAMP)?;
        if pipeline.is_empty() || region.is_empty() {
            return None;
        }
        let executed_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        Some(Self::new(pipeline, region, executed_at))
    }

    /// Why `region` cannot appear in an artifact name, if it cannot.
    ///
    /// The name must stay a single file inside the output directory and must
    /// parse back to the same region, otherwise the job would never be seen
    /// as done.
    pub fn region_problem(region: &str) -> Option<&'static str> {
        if region.is_empty() {
            return Some("must not be empty");
        }
        if region.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
            return Some("must not contain path separators");
        }
        let sample = ArtifactName::now("cluster", region);
        match ArtifactName::parse(&sample.file_name()) {
            Some(parsed) if parsed.region == region => None,
            _ => Some("does not survive the artifact naming pattern"),
        }
    }

    /// Exact match on the pair, never a substring match.
    pub fn is_for(&self, pipeline: &str, region: &str) -> bool {
        self.pipeline == pipeline && self.region == region
    }
}
