//! Task submission for the data processing service
//!
//! Accepts a task for a named topology, enumerates the records it covers
//! and dispatches each one to the topology's queue topic exactly once per
//! run, while keeping the task's lifecycle state current.

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod harvest;
pub mod ledger;
pub mod queue;
pub mod reader;
pub mod service;
pub mod status;
pub mod submitters;
pub mod topics;

pub use config::Config;
pub use context::SubmitContext;
pub use engine::DispatchEngine;
pub use error::{Result, SubmitError};
pub use service::{SubmitRequest, SubmitTaskService};
