//! Synchronous host facade.
//!
//! [`RemoteHost`] sits between the test logic and a transport [`Backend`].
//! It blocks on a shared tokio runtime for every call and offers the handful
//! of primitives the NTP checks need: run a command, edit a config file,
//! drive a systemd service and read or set the clock.

use log::{debug, info};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::backend::{Backend, ExecResult, display_command, shell_escape};
use crate::errors::{NtpResult, NtpTestError};

// ---------------------------------------------------------------------------
// Service lifecycle
// ---------------------------------------------------------------------------

/// What to do with a systemd service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    fn verb(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for ServiceAction {
    type Err = NtpTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" | "started" => Ok(ServiceAction::Start),
            "stop" | "stopped" => Ok(ServiceAction::Stop),
            "restart" | "restarted" => Ok(ServiceAction::Restart),
            other => Err(NtpTestError::Config(format!(
                "unknown service action '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteHost
// ---------------------------------------------------------------------------

/// A target host reachable through a [`Backend`].
pub struct RemoteHost {
    hostname: String,
    mgmt_ip: Option<String>,
    mgmt_ipv6: Option<String>,
    backend: Arc<dyn Backend>,
    runtime: Arc<Runtime>,
}

impl RemoteHost {
    pub fn new(hostname: impl Into<String>, backend: Arc<dyn Backend>, runtime: Arc<Runtime>) -> Self {
        Self {
            hostname: hostname.into(),
            mgmt_ip: None,
            mgmt_ipv6: None,
            backend,
            runtime,
        }
    }

    /// Attach management addresses (used when this host serves NTP).
    pub fn with_mgmt_addrs(mut self, ipv4: Option<String>, ipv6: Option<String>) -> Self {
        self.mgmt_ip = ipv4;
        self.mgmt_ipv6 = ipv6;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn mgmt_ip(&self) -> Option<&str> {
        self.mgmt_ip.as_deref()
    }

    pub fn mgmt_ipv6(&self) -> Option<&str> {
        self.mgmt_ipv6.as_deref()
    }

    // -----------------------------------------------------------------------
    // Command execution
    // -----------------------------------------------------------------------

    /// Run a command and return its result whatever the exit status.
    pub fn exec(&self, program: &str, args: &[&str]) -> NtpResult<ExecResult> {
        debug!(
            "{} ({}): {}",
            self.hostname,
            self.backend.describe(),
            display_command(program, args)
        );
        self.runtime.block_on(self.backend.exec(program, args))
    }

    /// Run a command and fail on a non-zero exit status.
    pub fn command(&self, program: &str, args: &[&str]) -> NtpResult<ExecResult> {
        let result = self.exec(program, args)?;
        if !result.success() {
            return Err(NtpTestError::CommandFailed {
                command: display_command(program, args),
                exit_code: result.exit_code,
                stderr: result.stderr_str(),
            });
        }
        Ok(result)
    }

    /// Run a shell snippet.  The exit status is returned, not checked.
    pub fn shell(&self, script: &str) -> NtpResult<ExecResult> {
        debug!("{} ({}): sh -c {script}", self.hostname, self.backend.describe());
        self.runtime.block_on(self.backend.exec_shell(script))
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    pub fn path_exists(&self, path: &str) -> NtpResult<bool> {
        Ok(self.exec("test", &["-e", path])?.success())
    }

    /// True when `path` contains `needle` as a fixed string.  A missing file
    /// counts as not containing it.
    pub fn file_contains(&self, path: &str, needle: &str) -> NtpResult<bool> {
        Ok(self.exec("grep", &["-qF", "--", needle, path])?.success())
    }

    /// Replace the first occurrence of `from` with `to` on every line of
    /// `path`, as root.
    pub fn replace_in_file(&self, path: &str, from: &str, to: &str) -> NtpResult<()> {
        let expr = sed_substitution(from, to);
        self.command("sudo", &["sed", "-i", &expr, path])?;
        Ok(())
    }

    /// Append `line` to `path` unless an identical line is already present.
    /// Returns whether the file changed.  The file must already exist.
    pub fn ensure_line(&self, path: &str, line: &str) -> NtpResult<bool> {
        let args = ["-qxF", "--", line, path];
        let found = self.exec("grep", &args)?;
        match found.exit_code {
            0 => return Ok(false),
            1 => {}
            code => {
                return Err(NtpTestError::CommandFailed {
                    command: display_command("grep", &args),
                    exit_code: code,
                    stderr: found.stderr_str(),
                });
            }
        }
        let script = append_line_script(path, line);
        self.command("sudo", &["sh", "-c", &script])?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Services
    // -----------------------------------------------------------------------

    pub fn service(&self, name: &str, action: ServiceAction) -> NtpResult<()> {
        info!("{}: {action} {name}", self.hostname);
        self.command("sudo", &["systemctl", action.verb(), name])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    /// The host's clock as seconds since the Unix epoch.
    pub fn epoch_now(&self) -> NtpResult<i64> {
        let result = self.command("date", &["+%s"])?;
        let text = result.stdout_str();
        text.parse::<i64>()
            .map_err(|_| NtpTestError::UnexpectedOutput {
                command: "date +%s".to_string(),
                output: text,
            })
    }

    pub fn set_epoch(&self, secs: i64) -> NtpResult<()> {
        info!("{}: set clock to @{secs}", self.hostname);
        self.command("sudo", &["date", "-s", &format!("@{secs}")])?;
        Ok(())
    }
}

impl fmt::Debug for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHost")
            .field("hostname", &self.hostname)
            .field("mgmt_ip", &self.mgmt_ip)
            .field("mgmt_ipv6", &self.mgmt_ipv6)
            .field("backend", &self.backend.describe())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a `s/…/…/` expression matching `from` literally.
pub fn sed_substitution(from: &str, to: &str) -> String {
    let mut pattern = String::with_capacity(from.len());
    for c in from.chars() {
        if matches!(c, '\\' | '/' | '.' | '*' | '[' | ']' | '^' | '$') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    let mut replacement = String::with_capacity(to.len());
    for c in to.chars() {
        if matches!(c, '\\' | '/' | '&') {
            replacement.push('\\');
        }
        replacement.push(c);
    }
    format!("s/{pattern}/{replacement}/")
}

/// Shell script appending `line` to `path`.
pub fn append_line_script(path: &str, line: &str) -> String {
    format!(
        "printf '%s\\n' {} >> {}",
        shell_escape(line),
        shell_escape(path)
    )
}
