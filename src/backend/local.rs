//! Local backend: runs commands on this machine via [`tokio::process`].
//!
//! Useful when the harness itself runs on the device (or inside the test
//! container) and for exercising the command plumbing without SSH.

use async_trait::async_trait;
use bytes::Bytes;
use log::trace;
use std::process::Stdio;

use super::{Backend, ExecResult, display_command};
use crate::errors::{NtpResult, NtpTestError};

pub struct LocalBackend;

#[async_trait]
impl Backend for LocalBackend {
    async fn exec(&self, program: &str, args: &[&str]) -> NtpResult<ExecResult> {
        trace!("local: {}", display_command(program, args));

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| NtpTestError::Internal(format!("failed to execute `{program}`: {e}")))?;

        Ok(ExecResult {
            stdout: Bytes::from(output.stdout),
            stderr: Bytes::from(output.stderr),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}
