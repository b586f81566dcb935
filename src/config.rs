//! Testbed configuration.
//!
//! The testbed is described by a small TOML file naming the device under
//! test, the companion host that serves NTP to it, and the timing used by
//! the checks.  Durations are whole seconds.
//!
//! ```toml
//! [dut]
//! host = "dut1"
//! user = "admin"
//!
//! [ptf]
//! host = "ptf1"
//! mgmt_ip = "10.0.0.100"
//! mgmt_ipv6 = "fc00::100"
//!
//! [timing]
//! time_forward = 3600
//! sync = { timeout = 720, interval = 10 }
//! ```

use log::trace;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::errors::{NtpResult, NtpTestError};
use crate::poll::Poll;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "dut-ntp.toml";

/// How far the DUT clock is set back before a long-jump check.
pub const DEFAULT_TIME_FORWARD: i64 = 3600;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Ssh,
    Local,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub strict_host_keys: bool,
    /// Seconds to wait for the SSH connection to come up.
    pub connect_timeout: Option<u64>,
    pub mgmt_ip: Option<String>,
    pub mgmt_ipv6: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    pub timeout: u64,
    pub interval: u64,
    #[serde(default)]
    pub delay: u64,
}

impl PollConfig {
    fn sync_default() -> Self {
        Self {
            timeout: 720,
            interval: 10,
            delay: 0,
        }
    }

    fn server_default() -> Self {
        Self {
            timeout: 120,
            interval: 5,
            delay: 0,
        }
    }

    pub fn to_poll(self) -> Poll {
        Poll::new(
            Duration::from_secs(self.timeout),
            Duration::from_secs(self.interval),
        )
        .with_delay(Duration::from_secs(self.delay))
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    #[serde(default = "default_time_forward")]
    pub time_forward: i64,
    /// Waiting for the DUT to synchronise.
    #[serde(default = "PollConfig::sync_default")]
    pub sync: PollConfig,
    /// Waiting for the PTF NTP server to come up.
    #[serde(default = "PollConfig::server_default")]
    pub server: PollConfig,
}

fn default_time_forward() -> i64 {
    DEFAULT_TIME_FORWARD
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            time_forward: DEFAULT_TIME_FORWARD,
            sync: PollConfig::sync_default(),
            server: PollConfig::server_default(),
        }
    }
}

/// Resolved timing used by the fixtures and cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub time_forward: i64,
    pub sync: Poll,
    pub server: Poll,
}

impl From<TimingConfig> for Timing {
    fn from(cfg: TimingConfig) -> Self {
        Self {
            time_forward: cfg.time_forward,
            sync: cfg.sync.to_poll(),
            server: cfg.server.to_poll(),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        TimingConfig::default().into()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub dut: HostConfig,
    pub ptf: HostConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

impl Config {
    pub fn load(path: &Path) -> NtpResult<Self> {
        trace!("loading config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            NtpTestError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| NtpTestError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> NtpResult<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| NtpTestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> NtpResult<()> {
        for (name, host) in [("dut", &self.dut), ("ptf", &self.ptf)] {
            if host.host.trim().is_empty() {
                return Err(NtpTestError::Config(format!("{name}.host must not be empty")));
            }
        }
        for (name, poll) in [
            ("timing.sync", &self.timing.sync),
            ("timing.server", &self.timing.server),
        ] {
            if poll.timeout == 0 {
                return Err(NtpTestError::Config(format!(
                    "{name}.timeout must be greater than zero"
                )));
            }
        }
        if self.timing.time_forward < 0 {
            return Err(NtpTestError::Config(
                "timing.time_forward must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
