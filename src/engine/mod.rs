//! Notebook execution boundary.
//!
//! The dispatcher only ever talks to [`ExecutionEngine`]. The production
//! implementation, [`PapermillEngine`], shells out to papermill:
//!
//! 1. Serializes the job's parameter bag to JSON
//! 2. Spawns `papermill <template> <output> -y <json>`
//! 3. Captures stdout/stderr and exit status, or gives up after the timeout
//! 4. Returns an [`ExecutionResult`]

pub mod executor;

pub use executor::{
    ExecutionEngine, ExecutionRequest, ExecutionResult, ExecutionStatus, PapermillEngine,
};
