//! Grid toolset client

use std::path::PathBuf;

use bytes::Bytes;
use futures::stream::{self, Stream};
use tracing::{debug, error, trace};

use gfarm_auth::{bearer_subject, Identity};
use gfarm_proc::{Invocation, ManagedProcess};

use crate::listing::parse_entry;
use crate::{GridError, Result};

/// SASL mechanism selector variable. Contract with the toolset; the names
/// must be preserved byte-for-byte.
pub const ENV_SASL_MECHANISMS: &str = "GFARM_SASL_MECHANISMS";
/// SASL user variable.
pub const ENV_SASL_USER: &str = "GFARM_SASL_USER";
/// SASL password/token variable.
pub const ENV_SASL_PASSWORD: &str = "GFARM_SASL_PASSWORD";
/// Helper executable that surfaces the password to the toolset's own
/// authentication layer; the value carries a `!` prefix.
pub const ENV_JWT_USER_PATH: &str = "JWT_USER_PATH";

const GFLS: &str = "gfls";
const GFEXPORT: &str = "gfexport";
const GFMKDIR: &str = "gfmkdir";
const GFWHOAMI: &str = "gfwhoami";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// `PATH` handed to spawned tools. Captured once at construction;
    /// invocations never read the ambient environment per request.
    pub tool_path: String,

    /// Helper script surfaced through [`ENV_JWT_USER_PATH`] for bearer
    /// identities, if the deployment uses one.
    pub helper_script: Option<PathBuf>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            tool_path: std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
            helper_script: None,
        }
    }
}

/// Directory listing options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Include hidden entries (`-a`)
    pub all: bool,
    /// Recurse into subdirectories (`-R`)
    pub recursive: bool,
    /// Return captured output even when the tool exits non-zero
    pub ignore_errors: bool,
}

/// Pre-transfer probe result.
///
/// `size < 0` means the probe could not classify the target; callers must
/// not trust `is_file` in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeInfo {
    /// True when the target is a plain file
    pub is_file: bool,
    /// Size in bytes, `-1` when unknown
    pub size: i64,
}

impl SizeInfo {
    /// The "could not classify" probe result.
    pub fn unknown() -> Self {
        Self {
            is_file: false,
            size: -1,
        }
    }

    /// True when the target is a plain file of known size.
    pub fn is_transferable(&self) -> bool {
        self.is_file && self.size >= 0
    }
}

/// Client for the external Gfarm tools.
pub struct GridClient {
    config: GridConfig,
}

impl GridClient {
    /// Create a client.
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    /// Build a request-scoped invocation of `program` carrying the SASL
    /// environment for `identity`.
    fn invocation(&self, program: &str, identity: &Identity) -> Invocation {
        let mut inv = Invocation::new(program).env("PATH", &self.config.tool_path);
        match identity {
            Identity::Anonymous => {
                inv = inv.env(ENV_SASL_MECHANISMS, "ANONYMOUS");
            }
            Identity::Basic { username, password } => {
                inv = inv
                    .env(ENV_SASL_MECHANISMS, "PLAIN")
                    .env(ENV_SASL_USER, username)
                    .env(ENV_SASL_PASSWORD, password);
            }
            Identity::Bearer { token } => {
                inv = inv
                    .env(ENV_SASL_MECHANISMS, "XOAUTH2")
                    .env(ENV_SASL_PASSWORD, token);
                if let Some(subject) = bearer_subject(token) {
                    inv = inv.env(ENV_SASL_USER, subject);
                }
                if let Some(helper) = &self.config.helper_script {
                    inv = inv.env(ENV_JWT_USER_PATH, format!("!{}", helper.display()));
                }
            }
        }
        inv
    }

    /// Long-form directory listing, returned as raw text.
    pub async fn list(&self, identity: &Identity, path: &str, options: ListOptions) -> Result<String> {
        let mut inv = self.invocation(GFLS, identity).arg("-l");
        if options.all {
            inv = inv.arg("-a");
        }
        if options.recursive {
            inv = inv.arg("-R");
        }
        inv = inv.arg(path);

        debug!(path, "listing directory");
        let proc = ManagedProcess::spawn(inv)?;
        if options.ignore_errors {
            let out = proc.wait_with_status().await?;
            if !out.success() {
                debug!(path, status = %out.status, "listing errors ignored");
            }
            Ok(out.stdout_text())
        } else {
            let stdout = proc.wait_with_output().await?;
            Ok(String::from_utf8_lossy(&stdout).into_owned())
        }
    }

    /// Identity lookup, returned as the tool's raw output.
    pub async fn whoami(&self, identity: &Identity) -> Result<String> {
        let inv = self.invocation(GFWHOAMI, identity);
        let stdout = ManagedProcess::spawn(inv)?.wait_with_output().await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Create a directory.
    pub async fn make_directory(&self, identity: &Identity, path: &str) -> Result<()> {
        let inv = self.invocation(GFMKDIR, identity).arg(path);
        debug!(path, "creating directory");
        ManagedProcess::spawn(inv)?.wait_with_output().await?;
        Ok(())
    }

    /// Probe a path's kind and size with a single-entry listing query.
    ///
    /// The probe never fails on tool or parse trouble: an unparsable or
    /// absent result line degrades to [`SizeInfo::unknown`].
    pub async fn stat(&self, identity: &Identity, path: &str) -> Result<SizeInfo> {
        let inv = self
            .invocation(GFLS, identity)
            .args(["-i", "-l", "-T", "-d"])
            .arg(path);
        let out = ManagedProcess::spawn(inv)?.wait_with_status().await?;
        let text = out.stdout_text();
        let line = text.lines().next().unwrap_or("");

        let info = match parse_entry(line) {
            Ok(Some(entry)) => SizeInfo {
                is_file: entry.is_file(),
                size: entry.size,
            },
            Ok(None) | Err(_) => SizeInfo::unknown(),
        };
        trace!(path, ?info, "size probe");
        Ok(info)
    }

    /// Start a file retrieval.
    ///
    /// The first chunk is read eagerly so that an unexpectedly empty result
    /// can still be reported as a failure before any response bytes are
    /// committed. Callers should only invoke this after a size probe
    /// reported a positive size.
    pub async fn export(&self, identity: &Identity, path: &str) -> Result<FileExport> {
        let inv = self.invocation(GFEXPORT, identity).arg(path);
        debug!(path, "exporting file");
        let mut proc = ManagedProcess::spawn(inv)?;

        let first = proc.read_chunk().await?;
        if first.is_empty() {
            let out = proc.wait_with_status().await?;
            return Err(GridError::EmptyExport {
                path: path.to_string(),
                status: out.status.code().unwrap_or(-1),
                stderr: out.stderr,
            });
        }

        Ok(FileExport {
            first,
            process: proc,
            path: path.to_string(),
        })
    }
}

/// An in-flight file retrieval: one eagerly-read chunk plus the still
/// running tool behind it.
pub struct FileExport {
    first: Bytes,
    process: ManagedProcess,
    path: String,
}

impl std::fmt::Debug for FileExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileExport")
            .field("first_len", &self.first.len())
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

enum ExportState {
    First {
        first: Bytes,
        process: ManagedProcess,
        path: String,
    },
    Streaming {
        process: ManagedProcess,
        path: String,
    },
    Done,
}

impl FileExport {
    /// The eagerly-read first chunk.
    pub fn first_chunk(&self) -> &Bytes {
        &self.first
    }

    /// Turn the export into a lazy, finite, non-restartable chunk
    /// sequence.
    ///
    /// Chunks after the first are read only as the consumer polls, bounded
    /// by the fixed chunk size. Once the sequence is exhausted the tool is
    /// reaped; a non-zero exit at that point is only observable as a log
    /// event, since the response bytes are already committed. Dropping the
    /// stream mid-way kills the tool.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send {
        let state = ExportState::First {
            first: self.first,
            process: self.process,
            path: self.path,
        };

        stream::unfold(state, |state| async move {
            match state {
                ExportState::First {
                    first,
                    process,
                    path,
                } => Some((Ok(first), ExportState::Streaming { process, path })),
                ExportState::Streaming { mut process, path } => {
                    match process.read_chunk().await {
                        Ok(chunk) if chunk.is_empty() => {
                            match process.finish().await {
                                Ok(status) if !status.success() => {
                                    error!(
                                        path,
                                        %status,
                                        "export tool failed after the response was committed"
                                    );
                                }
                                Err(e) => error!(path, "failed to reap export tool: {e}"),
                                Ok(_) => {}
                            }
                            None
                        }
                        Ok(chunk) => Some((Ok(chunk), ExportState::Streaming { process, path })),
                        Err(e) => Some((Err(std::io::Error::other(e)), ExportState::Done)),
                    }
                }
                ExportState::Done => None,
            }
        })
    }
}
