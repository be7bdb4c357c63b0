//! Scorecard Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the scorecard sync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the [`SyncError`] taxonomy and [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//!
//! # Example
//!
//! ```no_run
//! use scorecard_common::{Result, SyncError};
//!
//! fn require_key(key: Option<&str>) -> Result<&str> {
//!     key.ok_or_else(|| SyncError::config("COLLEGE_SCORECARD_API_KEY is not set"))
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, SyncError};
