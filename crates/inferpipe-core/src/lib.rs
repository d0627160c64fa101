//! # inferpipe-core
//!
//! Core types and traits for the inferpipe ordered inference pipeline.
//!
//! This crate holds no scheduling logic. It defines the vocabulary the
//! runtime and the worker backends share:
//!
//! - `seq` - Wrapping submission-order identifier
//! - `worker` - The `Worker` slot contract and `WorkerFactory`
//! - `error` - Error types
//! - `env` - Environment variable helpers for config overrides

pub mod seq;
pub mod worker;
pub mod error;
pub mod env;

// Re-exports for convenience
pub use seq::SeqId;
pub use worker::{Completion, Worker, WorkerFactory};
pub use error::{ConfigError, PipelineError, Result, WorkerError};
pub use env::{env_get, env_get_bool, env_get_opt};
