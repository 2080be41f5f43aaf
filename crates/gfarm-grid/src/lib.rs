//! Gfarm toolset client
//!
//! This crate drives the external Gfarm command-line tools on behalf of the
//! HTTP gateway:
//! - `gfls` for directory listings and the pre-transfer size probe
//! - `gfexport` for file retrieval (eager first chunk, then lazy streaming)
//! - `gfmkdir` for directory creation
//! - `gfwhoami` for identity lookup
//!
//! Every invocation carries a request-scoped SASL environment derived from
//! the caller's [`gfarm_auth::Identity`]; the variable names are a contract
//! with the toolset and are preserved byte-for-byte.

pub mod client;
pub mod listing;

pub use client::{
    FileExport, GridClient, GridConfig, ListOptions, SizeInfo, ENV_JWT_USER_PATH,
    ENV_SASL_MECHANISMS, ENV_SASL_PASSWORD, ENV_SASL_USER,
};
pub use listing::{parse_entry, EntryKind, ListingEntry};

use gfarm_proc::ProcError;
use thiserror::Error;

/// Grid client error types
#[derive(Debug, Error)]
pub enum GridError {
    /// Failure spawning or supervising an external tool
    #[error(transparent)]
    Process(#[from] ProcError),

    /// A listing line matched the grammar but carried an unparsable
    /// numeric field; fatal for that line only
    #[error("malformed listing field '{field}' in line: {line}")]
    MalformedListing {
        /// Field that failed to parse
        field: &'static str,
        /// Offending line
        line: String,
    },

    /// A retrieval produced no data although the size probe promised some
    #[error("no data from export of {path} (status {status}): {stderr}")]
    EmptyExport {
        /// Path that was being retrieved
        path: String,
        /// Tool exit code
        status: i32,
        /// Captured error-channel text
        stderr: String,
    },
}

/// Result type for grid operations
pub type Result<T> = std::result::Result<T, GridError>;
