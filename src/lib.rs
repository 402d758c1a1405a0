pub mod artifact;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod shutdown;
