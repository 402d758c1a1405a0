pub mod job;
pub mod source;

pub use job::{JobDescriptor, PipelineKind};
pub use source::JobSource;
