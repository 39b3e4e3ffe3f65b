//! DPS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the DPS workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`DpsError`] and the crate [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: tasks, records, task states and the remote store's
//!   representation model
//!
//! # Example
//!
//! ```no_run
//! use dps_common::types::{DataSetRef, Task};
//! use dps_common::Result;
//!
//! fn datasets(task: &Task) -> Result<Vec<DataSetRef>> {
//!     task.dataset_urls().iter().map(|url| DataSetRef::parse(url)).collect()
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{DpsError, Result};
