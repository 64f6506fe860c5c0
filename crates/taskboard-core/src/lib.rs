//! # taskboard-core - Core Domain Types
//!
//! Foundation crate for taskboard. Provides the wire record types, the
//! diagnostic-line parser, the incremental status tree, error handling, and
//! the collaborator seams (file resolution, problem markers) that a host
//! environment plugs into.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, thiserror, regex, tracing).
//!
//! ## Public API
//!
//! ### Protocol (`protocol`)
//! - [`Header`] - first record of every daemon connection
//! - [`TaskUpdate`] - one partial delta for one task id
//! - [`TaskState`] - task lifecycle states
//!
//! ### Diagnostics (`diagnostic`)
//! - [`DiagnosticLine`] - structured result of parsing one raw log line
//! - [`Severity`] - Error / Warning / Note / Prefix
//!
//! ### Status Tree (`tree`)
//! - [`StatusTree`] - arena-backed tree of directories, actions, log lines
//! - [`NodeId`], [`NodeStatus`] - handles and display classification
//!
//! ### Collaborators (`files`)
//! - [`FileResolver`], [`WorkspaceResolver`] - noun/filename → on-disk file
//! - [`ProblemSink`], [`Problem`] - editor-annotation offers
//!
//! ### Error Handling (`error`)
//! - [`Error`] - custom error enum with `recoverable` vs `fatal` classification
//! - [`Result`] - type alias for `std::result::Result<T, Error>`

pub mod diagnostic;
pub mod error;
pub mod files;
pub mod logging;
pub mod protocol;
pub mod tree;

/// Prelude for common imports used throughout all taskboard crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use diagnostic::{DiagnosticLine, Severity};
pub use error::{Error, Result};
pub use files::{FileResolver, NullResolver, Problem, ProblemSink, WorkspaceResolver};
pub use protocol::{Header, TaskState, TaskUpdate};
pub use tree::{NodeId, NodeStatus, StatusTree, MAX_PARSED_LINES};
