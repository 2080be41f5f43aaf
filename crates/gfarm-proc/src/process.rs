//! Owned child process with deadlock-free channel consumption

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{Invocation, ProcError, Result};

/// Chunk size for incremental output consumption (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Cap on retained error-channel diagnostics per process.
const STDERR_CAP: usize = 64 * 1024;

/// Result of a fully buffered run, with exit-status policy left to the
/// caller.
#[derive(Debug)]
pub struct BufferedOutput {
    /// Everything the tool wrote to its output channel
    pub stdout: Vec<u8>,
    /// Captured error-channel text (capped)
    pub stderr: String,
    /// Terminal exit status
    pub status: ExitStatus,
}

impl BufferedOutput {
    /// True when the tool exited with status zero.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Output channel content as (lossy) text.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// An owned external process handle.
///
/// The input channel is closed at spawn: nothing is ever written to a
/// spawned tool. The error channel is drained by a background task for the
/// whole lifetime of the process, so both consumption modes satisfy the
/// concurrent-drain invariant. The child is spawned with kill-on-drop:
/// a consumer that disconnects mid-stream tears the tool down instead of
/// leaking it, and the stderr drain ends at pipe EOF.
pub struct ManagedProcess {
    child: Child,
    stdout: ChildStdout,
    stderr_task: JoinHandle<()>,
    stderr_buf: Arc<Mutex<Vec<u8>>>,
    program: String,
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl ManagedProcess {
    /// Spawn `invocation` without shell interpretation.
    pub fn spawn(invocation: Invocation) -> Result<Self> {
        let program = invocation.program().to_string();
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.arg_list())
            .env_clear()
            .envs(invocation.env_map())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = invocation.working_dir() {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ProcError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().expect("stdout is piped");
        let stderr = child.stderr.take().expect("stderr is piped");
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_task = tokio::spawn(drain_stderr(program.clone(), stderr, stderr_buf.clone()));

        Ok(Self {
            child,
            stdout,
            stderr_task,
            stderr_buf,
            program,
        })
    }

    /// Program name this process was spawned from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Read the entire output channel, await exit, and fail on a non-zero
    /// status with the captured error-channel text.
    pub async fn wait_with_output(self) -> Result<Vec<u8>> {
        let program = self.program.clone();
        let out = self.wait_with_status().await?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Err(ProcError::ToolFailure {
                program,
                status: out.status.code().unwrap_or(-1),
                stderr: out.stderr,
            })
        }
    }

    /// Read the entire output channel and await exit, returning output,
    /// diagnostics and status without judging the status.
    pub async fn wait_with_status(mut self) -> Result<BufferedOutput> {
        let mut stdout = Vec::new();
        self.stdout
            .read_to_end(&mut stdout)
            .await
            .map_err(|source| ProcError::Io {
                program: self.program.clone(),
                source,
            })?;

        let status = self.child.wait().await.map_err(|source| ProcError::Io {
            program: self.program.clone(),
            source,
        })?;
        // The drain task finishes once the error pipe reaches EOF.
        let _ = (&mut self.stderr_task).await;

        let stderr = self.stderr_text();
        Ok(BufferedOutput {
            stdout,
            stderr,
            status,
        })
    }

    /// Read the next chunk (at most [`CHUNK_SIZE`] bytes) from the output
    /// channel. An empty chunk signals end of stream.
    pub async fn read_chunk(&mut self) -> Result<Bytes> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = self
            .stdout
            .read(&mut buf)
            .await
            .map_err(|source| ProcError::Io {
                program: self.program.clone(),
                source,
            })?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    /// Await process exit after the output channel has been exhausted.
    pub async fn finish(mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await.map_err(|source| ProcError::Io {
            program: self.program.clone(),
            source,
        })?;
        let _ = (&mut self.stderr_task).await;
        Ok(status)
    }

    /// Diagnostics captured from the error channel so far.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr_buf.lock())
            .trim_end()
            .to_string()
    }
}

async fn drain_stderr(program: String, stderr: ChildStderr, buf: Arc<Mutex<Vec<u8>>>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(%program, "stderr: {line}");
                let mut buf = buf.lock();
                if buf.len() < STDERR_CAP {
                    if !buf.is_empty() {
                        buf.push(b'\n');
                    }
                    buf.extend_from_slice(line.as_bytes());
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(%program, "error channel read failed: {e}");
                break;
            }
        }
    }
}
