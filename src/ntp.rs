//! NTP daemon helpers for a SONiC-style DUT.
//!
//! Two daemon flavours are in the field: classic ntpd configured through
//! `/etc/default/ntp`, and ntpsec configured through `/etc/default/ntpsec`.
//! The flavour is told apart by the presence of `/etc/ntpsec/ntp.conf`.
//!
//! Long jump (`-g`) lets ntpd step the clock by any amount on start; slew
//! mode (`-x`) only ever adjusts it gradually.

use log::{debug, info};
use std::collections::BTreeMap;

use crate::errors::{NtpResult, NtpTestError, ensure};
use crate::host::{RemoteHost, ServiceAction};
use crate::poll::Poll;

pub const NTP_SERVICE: &str = "ntp";

const NTPSEC_CONF: &str = "/etc/ntpsec/ntp.conf";

/// Seconds a forced one-shot `ntpd -gq` may take.
const FORCED_SYNC_TIMEOUT: &str = "20";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NtpFlavor {
    Ntpsec,
    Classic,
}

impl NtpFlavor {
    pub fn detect(host: &RemoteHost) -> NtpResult<Self> {
        let flavor = if host.path_exists(NTPSEC_CONF)? {
            NtpFlavor::Ntpsec
        } else {
            NtpFlavor::Classic
        };
        debug!("{}: ntp flavour is {flavor:?}", host.hostname());
        Ok(flavor)
    }

    /// File carrying the daemon's `NTPD_OPTS`.
    pub fn defaults_file(self) -> &'static str {
        match self {
            NtpFlavor::Ntpsec => "/etc/default/ntpsec",
            NtpFlavor::Classic => "/etc/default/ntp",
        }
    }

    /// The `NTPD_OPTS` line for long jump (`true`) or slew (`false`).
    pub fn opts_line(self, long_jump: bool) -> &'static str {
        match (self, long_jump) {
            (NtpFlavor::Ntpsec, true) => "NTPD_OPTS=\"-g -N\"",
            (NtpFlavor::Ntpsec, false) => "NTPD_OPTS=\"-x -N\"",
            (NtpFlavor::Classic, true) => "NTPD_OPTS='-g'",
            (NtpFlavor::Classic, false) => "NTPD_OPTS='-x'",
        }
    }

    /// The `-u` argument for a one-shot ntpd run.
    fn ntpd_user(self, host: &RemoteHost) -> NtpResult<String> {
        match self {
            NtpFlavor::Ntpsec => Ok("ntpsec:ntpsec".to_string()),
            NtpFlavor::Classic => {
                let passwd = host.command("getent", &["passwd", "ntp"])?.stdout_str();
                parse_passwd_ids(&passwd).ok_or(NtpTestError::UnexpectedOutput {
                    command: "getent passwd ntp".to_string(),
                    output: passwd,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Long jump
// ---------------------------------------------------------------------------

/// Switch the DUT's ntpd between long jump and slew mode and restart it.
pub fn config_long_jump(dut: &RemoteHost, enable: bool) -> NtpResult<()> {
    let flavor = NtpFlavor::detect(dut)?;
    if enable {
        info!("enable ntp long jump");
    } else {
        info!("disable ntp long jump");
    }
    dut.replace_in_file(
        flavor.defaults_file(),
        flavor.opts_line(!enable),
        flavor.opts_line(enable),
    )?;
    dut.service(NTP_SERVICE, ServiceAction::Restart)
}

/// True when either defaults file carries the long-jump option.
pub fn long_jump_enabled(dut: &RemoteHost) -> NtpResult<bool> {
    for flavor in [NtpFlavor::Classic, NtpFlavor::Ntpsec] {
        if dut.file_contains(flavor.defaults_file(), flavor.opts_line(true))? {
            return Ok(true);
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Status and sync
// ---------------------------------------------------------------------------

/// Ask `ntpstat` whether `host` is synchronised.
pub fn check_ntp_status(host: &RemoteHost) -> NtpResult<bool> {
    let result = host.exec("ntpstat", &[])?;
    debug!(
        "{}: ntpstat rc={} {}",
        host.hostname(),
        result.exit_code,
        result.stdout_str()
    );
    Ok(result.success())
}

/// Poll [`check_ntp_status`] under `poll`'s timing.
pub fn wait_for_sync(host: &RemoteHost, poll: &Poll) -> NtpResult<bool> {
    poll.try_until(|| check_ntp_status(host))
}

/// Force a one-shot sync on the DUT, restart ntp and wait until it reports
/// synchronised.
pub fn run_ntp(dut: &RemoteHost, poll: &Poll) -> NtpResult<()> {
    let flavor = NtpFlavor::detect(dut)?;
    dut.service(NTP_SERVICE, ServiceAction::Stop)?;

    let user = flavor.ntpd_user(dut)?;
    dut.command(
        "sudo",
        &["timeout", FORCED_SYNC_TIMEOUT, "ntpd", "-gq", "-u", &user],
    )?;

    dut.service(NTP_SERVICE, ServiceAction::Restart)?;
    ensure(wait_for_sync(dut, poll)?, "NTP not in sync")
}

// ---------------------------------------------------------------------------
// Server list
// ---------------------------------------------------------------------------

/// NTP servers currently in the DUT's running configuration.
pub fn current_ntp_servers(dut: &RemoteHost) -> NtpResult<Vec<String>> {
    let out = dut
        .command("sonic-cfggen", &["-d", "--var-json", "NTP_SERVER"])?
        .stdout_str();
    parse_ntp_servers(&out).map_err(|_| NtpTestError::UnexpectedOutput {
        command: "sonic-cfggen -d --var-json NTP_SERVER".to_string(),
        output: out,
    })
}

pub fn add_ntp_server(dut: &RemoteHost, addr: &str) -> NtpResult<()> {
    info!("{}: add ntp server {addr}", dut.hostname());
    dut.command("sudo", &["config", "ntp", "add", addr])?;
    Ok(())
}

pub fn del_ntp_server(dut: &RemoteHost, addr: &str) -> NtpResult<()> {
    info!("{}: delete ntp server {addr}", dut.hostname());
    dut.command("sudo", &["config", "ntp", "del", addr])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Keys of the `NTP_SERVER` table.  Empty output means an empty table.
fn parse_ntp_servers(json: &str) -> Result<Vec<String>, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let table: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
    Ok(table.into_keys().collect())
}

/// `uid:gid` from a passwd entry.
fn parse_passwd_ids(entry: &str) -> Option<String> {
    let fields: Vec<&str> = entry.trim().split(':').collect();
    if fields.len() < 4 {
        return None;
    }
    let (uid, gid) = (fields[2], fields[3]);
    if uid.parse::<u32>().is_err() || gid.parse::<u32>().is_err() {
        return None;
    }
    Some(format!("{uid}:{gid}"))
}
