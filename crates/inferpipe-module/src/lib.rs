//! # inferpipe-module - Default worker implementations
//!
//! This crate provides ready-made `Worker` types for the pipeline. Each
//! one wraps a user compute function (or an external driver) and keeps
//! the named outputs of its latest unit until the pipeline reads them.
//!
//! ## Default stack
//!
//! | Worker          | Runs units on                | Completion fires        |
//! |-----------------|------------------------------|-------------------------|
//! | ExecutorWorker  | ThreadedExecutor OS threads  | on an executor thread   |
//! | InlineWorker    | the submitting thread        | before `submit` returns |
//! | DeferredWorker  | nothing until driven         | when the owner resolves |

pub mod compute;
pub mod deferred;
pub mod executor;
pub mod inline;

pub use compute::{ComputeFn, NamedOutputs, Outputs};
pub use deferred::{DeferredBackend, DeferredWorker};
pub use executor::{ExecutorConfig, ExecutorWorker, Job, JobStatus, ThreadedExecutor};
pub use inline::InlineWorker;
