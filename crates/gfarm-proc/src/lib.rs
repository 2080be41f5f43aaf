//! External process supervision for the Gfarm HTTP gateway
//!
//! This crate provides:
//! - [`Invocation`]: a request-scoped description of an external command
//!   (program, arguments, environment, working directory)
//! - [`ManagedProcess`]: an owned child process with its input channel
//!   closed at spawn and its error channel drained in the background
//! - Buffered consumption ([`ManagedProcess::wait_with_output`] /
//!   [`ManagedProcess::wait_with_status`]) for small, bounded responses
//! - Chunked consumption ([`ManagedProcess::read_chunk`]) for streaming
//!   large outputs without holding them in memory
//!
//! The error channel is drained concurrently with any output consumption,
//! so a tool that fills its stderr pipe cannot stall an output read.

pub mod invocation;
pub mod process;

pub use invocation::Invocation;
pub use process::{BufferedOutput, ManagedProcess, CHUNK_SIZE};

use thiserror::Error;

/// Process supervision error types
#[derive(Debug, Error)]
pub enum ProcError {
    /// The external program could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while consuming a process channel
    #[error("I/O error on {program}: {source}")]
    Io {
        /// Program name
        program: String,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    /// The external tool exited with a non-zero status before any output
    /// was committed to the caller
    #[error("{program} exited with status {status}: {stderr}")]
    ToolFailure {
        /// Program name
        program: String,
        /// Exit code (-1 when terminated by a signal)
        status: i32,
        /// Captured error-channel text
        stderr: String,
    },
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcError>;
