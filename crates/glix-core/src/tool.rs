//! Bounded invocation of external utilities (`dpkg-deb`, `tar`, `patchelf`, `file`).

use std::ffi::OsStr;
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use wait_timeout::ChildExt;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Required command `{0}` not found in PATH")]
    Missing(String),

    #[error("`{tool}` failed with status {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("`{tool}` did not finish within {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("IO error running `{tool}`: {source}")]
    Io {
        tool: String,
        source: std::io::Error,
    },
}

impl ToolError {
    /// The utility's own diagnostic text when it ran and failed, otherwise
    /// the rendered error.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed { stderr, .. } if !stderr.trim().is_empty() => stderr.trim().to_string(),
            other => other.to_string(),
        }
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Returns an error if `program` cannot be found on `PATH`.
///
/// # Errors
///
/// Returns [`ToolError::Missing`] when the lookup fails.
pub fn ensure_available(program: &str) -> Result<(), ToolError> {
    which::which(program)
        .map(|_| ())
        .map_err(|_| ToolError::Missing(program.to_string()))
}

/// Run `program` with `args`, killing it after `timeout`.
///
/// Stdout and stderr are drained on helper threads so a chatty child cannot
/// fill its pipe and stall before the deadline.
///
/// # Errors
///
/// Returns [`ToolError::Missing`] if the program is not installed,
/// [`ToolError::Timeout`] if it outlives `timeout`, and
/// [`ToolError::Failed`] on a non-zero exit.
pub fn run<I, S>(program: &str, args: I, timeout: Duration) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let io_err = |source| ToolError::Io {
        tool: program.to_string(),
        source,
    };

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ToolError::Missing(program.to_string()));
        }
        Err(e) => return Err(io_err(e)),
    };

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status: ExitStatus = match child.wait_timeout(timeout).map_err(io_err)? {
        Some(status) => status,
        None => {
            tracing::warn!("{program} timed out after {}s, killing", timeout.as_secs());
            let _ = child.kill();
            let _ = child.wait();
            return Err(ToolError::Timeout {
                tool: program.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if !status.success() {
        return Err(ToolError::Failed {
            tool: program.to_string(),
            status: status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr,
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}
