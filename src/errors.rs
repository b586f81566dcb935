use thiserror::Error;

#[derive(Debug, Error)]
pub enum NtpTestError {
    #[error("config: {0}")]
    Config(String),

    #[error("ssh: could not connect to {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("remote: `{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("remote: unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("remote: {0}")]
    RemoteError(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("skipped: {0}")]
    Skipped(String),

    #[error("dut-ntp: {0}")]
    Internal(String),
}

impl NtpTestError {
    /// Classify a transport error into a more specific `NtpTestError` when possible.
    pub fn from_ssh(host: &str, err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        if msg.contains("Connection refused")
            || msg.contains("Connection timed out")
            || msg.contains("Could not resolve")
            || msg.contains("Permission denied")
            || msg.contains("Host key verification failed")
        {
            NtpTestError::ConnectionFailed {
                host: host.to_string(),
                reason: msg,
            }
        } else {
            NtpTestError::RemoteError(msg)
        }
    }

    /// True for errors caused by the device misbehaving rather than by the
    /// harness or its environment.
    pub fn is_test_failure(&self) -> bool {
        matches!(
            self,
            NtpTestError::AssertionFailed(_)
                | NtpTestError::CommandFailed { .. }
                | NtpTestError::UnexpectedOutput { .. }
        )
    }
}

pub type NtpResult<T> = Result<T, NtpTestError>;

/// Turn a false condition into a failed assertion carrying `message`.
pub fn ensure(condition: bool, message: impl Into<String>) -> NtpResult<()> {
    if condition {
        Ok(())
    } else {
        Err(NtpTestError::AssertionFailed(message.into()))
    }
}
