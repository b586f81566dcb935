//! The testbed: a DUT, the PTF host that serves it NTP, and the runtime
//! their transports run on.

use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use crate::backend::Backend;
use crate::backend::local::LocalBackend;
use crate::backend::ssh::{SshBackend, SshOptions};
use crate::config::{Config, HostConfig, Timing, Transport};
use crate::errors::{NtpResult, NtpTestError};
use crate::host::RemoteHost;

pub struct Testbed {
    pub dut: RemoteHost,
    pub ptf: RemoteHost,
    pub timing: Timing,
}

impl Testbed {
    /// Create the shared runtime used by every host of a testbed.
    pub fn runtime() -> NtpResult<Arc<Runtime>> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| NtpTestError::Internal(format!("failed to create tokio runtime: {e}")))?;
        Ok(Arc::new(runtime))
    }

    /// Connect to both hosts described by `config`.
    pub fn connect(config: &Config) -> NtpResult<Self> {
        let runtime = Self::runtime()?;
        let dut = connect_host(&config.dut, &runtime)?;
        let ptf = connect_host(&config.ptf, &runtime)?;
        Ok(Self {
            dut,
            ptf,
            timing: config.timing.into(),
        })
    }
}

fn connect_host(cfg: &HostConfig, runtime: &Arc<Runtime>) -> NtpResult<RemoteHost> {
    let backend: Arc<dyn Backend> = match cfg.transport {
        Transport::Ssh => {
            let options = SshOptions {
                user: cfg.user.clone(),
                port: cfg.port,
                strict_host_keys: cfg.strict_host_keys,
                connect_timeout: cfg.connect_timeout.map(Duration::from_secs),
            };
            let ssh = runtime.block_on(SshBackend::connect(&cfg.host, &options))?;
            Arc::new(ssh)
        }
        Transport::Local => Arc::new(LocalBackend),
    };
    info!("connected to {} ({})", cfg.host, backend.describe());

    Ok(RemoteHost::new(cfg.host.clone(), backend, Arc::clone(runtime))
        .with_mgmt_addrs(cfg.mgmt_ip.clone(), cfg.mgmt_ipv6.clone()))
}
