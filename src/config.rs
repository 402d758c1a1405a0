use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the external notebook execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Program invoked as `<program> [args..] <template> <output> -y <parameters>`
    pub program: String,
    /// Leading arguments, e.g. `["-m", "papermill"]` with `python` as program
    pub args: Vec<String>,
    /// Kill the engine and fail the job after this long. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "papermill".to_string(),
            args: Vec::new(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Where executed notebooks and the status manifest are written.
    /// Created on demand.
    pub output_dir: PathBuf,
    /// Directory holding the pipeline template notebooks.
    pub templates_dir: PathBuf,
    pub engine: EngineConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("nb-output"),
            templates_dir: PathBuf::from("."),
            engine: EngineConfig::default(),
        }
    }
}

impl DispatchConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = dir.into();
        self
    }

    pub fn with_engine_program(mut self, program: impl Into<String>) -> Self {
        self.engine.program = program.into();
        self
    }

    pub fn with_engine_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.engine.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.engine.timeout = Some(timeout);
        self
    }
}
