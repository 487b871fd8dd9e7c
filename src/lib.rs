//! Model Runner - drives independently authored model plugins through a
//! uniform lifecycle: train, synopsis, infer and hyperparameter listing.
//!
//! # Modules
//!
//! - [`plugins`]: the capability contract and the Lua plugin loader
//! - [`runner`]: the lifecycle dispatcher
//! - [`table`]: tabular datasets and their CSV form
//! - [`types`]: descriptors, metadata and lifecycle results
//! - [`config`]: runner configuration
//! - [`cli`]: subcommand definitions and execution
//! - [`error`]: the error taxonomy

pub mod cli;
pub mod config;
pub mod error;
pub mod plugins;
pub mod runner;
pub mod table;
pub mod types;

pub use error::{Result, RunnerError};
pub use runner::ModelRunner;
