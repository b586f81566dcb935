//! Transport backends.
//!
//! Each transport implements the [`Backend`] trait, which runs a program on
//! the target and collects its output.  Everything the harness does to a
//! host — editing config files, restarting services, reading the clock — is
//! expressed as commands sent through this one primitive.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::NtpResult;

pub mod local;
pub mod ssh;

// ---------------------------------------------------------------------------
// Types returned by backend operations
// ---------------------------------------------------------------------------

/// Result of running a command via [`Backend::exec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Standard output decoded lossily, with surrounding whitespace trimmed.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// A transport capable of executing commands on a target host.
///
/// All operations are async.  [`crate::host::RemoteHost`] owns a handle to a
/// tokio runtime and blocks on these futures for its synchronous API.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute `program` with `args` on the target and collect its output.
    ///
    /// A non-zero exit status is not an error at this level; only transport
    /// failures are.
    async fn exec(&self, program: &str, args: &[&str]) -> NtpResult<ExecResult>;

    /// Execute a shell snippet via `sh -c '<script>'`.
    async fn exec_shell(&self, script: &str) -> NtpResult<ExecResult> {
        self.exec("sh", &["-c", script]).await
    }

    /// Human-readable description of the target, used in log lines.
    fn describe(&self) -> String;
}

/// Render `program args…` for log lines and error messages.
pub fn display_command(program: &str, args: &[&str]) -> String {
    let mut out = program.to_string();
    for arg in args {
        out.push(' ');
        if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
            out.push_str(&shell_escape(arg));
        } else {
            out.push_str(arg);
        }
    }
    out
}

/// Shell-escape a string for safe embedding in `sh -c '…'` commands.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
