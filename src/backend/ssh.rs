//! SSH backend implementation.
//!
//! Uses the [`openssh`] crate, which shells out to the system's OpenSSH
//! binary.  Host aliases, keys, agents and `ControlMaster` settings all come
//! from the operator's existing `~/.ssh/config`.

use async_trait::async_trait;
use bytes::Bytes;
use log::trace;
use openssh::{KnownHosts, Session, SessionBuilder};
use std::time::Duration;

use super::{Backend, ExecResult, display_command};
use crate::errors::{NtpResult, NtpTestError};

/// Connection parameters for [`SshBackend::connect`].
#[derive(Debug, Clone, Default)]
pub struct SshOptions {
    pub user: Option<String>,
    pub port: Option<u16>,
    /// Refuse hosts whose key is not already in `known_hosts`.
    pub strict_host_keys: bool,
    pub connect_timeout: Option<Duration>,
}

/// An SSH backend backed by a live [`openssh::Session`].
pub struct SshBackend {
    session: Session,
    host: String,
}

impl SshBackend {
    /// Open a new SSH connection to `host`.
    pub async fn connect(host: &str, options: &SshOptions) -> NtpResult<Self> {
        let mut builder = SessionBuilder::default();
        builder.known_hosts_check(if options.strict_host_keys {
            KnownHosts::Strict
        } else {
            KnownHosts::Accept
        });

        if let Some(ref user) = options.user {
            builder.user(user.clone());
        }
        if let Some(port) = options.port {
            builder.port(port);
        }
        if let Some(timeout) = options.connect_timeout {
            builder.connect_timeout(timeout);
        }

        let session = builder
            .connect(host)
            .await
            .map_err(|e| NtpTestError::ConnectionFailed {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            session,
            host: host.to_string(),
        })
    }
}

#[async_trait]
impl Backend for SshBackend {
    async fn exec(&self, program: &str, args: &[&str]) -> NtpResult<ExecResult> {
        trace!("ssh {}: {}", self.host, display_command(program, args));

        let mut cmd = self.session.command(program);
        for arg in args {
            cmd.arg(arg);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| NtpTestError::from_ssh(&self.host, e))?;

        Ok(ExecResult {
            stdout: Bytes::from(output.stdout),
            stderr: Bytes::from(output.stderr),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn describe(&self) -> String {
        format!("ssh:{}", self.host)
    }
}
