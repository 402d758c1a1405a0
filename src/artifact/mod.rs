//! Output directory bookkeeping.
//!
//! Executed notebooks are named `{pipeline}-executed-{region}_@_{timestamp}.ipynb`.
//! Names are parsed back into an exact `(pipeline, region)` pair, and an
//! append-only manifest next to them records whether each attempt finished,
//! so a partially written notebook from a failed run is retried rather than
//! taken as done.

pub mod manifest;
pub mod name;
pub mod store;

pub use manifest::{AttemptStatus, ManifestRecord, MANIFEST_FILE};
pub use name::{ArtifactName, TIMESTAMP_FORMAT};
pub use store::{ArtifactEntry, ArtifactStatus, ArtifactStore, CompletedSet};
