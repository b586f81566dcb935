//! Setup and teardown scopes shared by the test cases.
//!
//! Each fixture has an explicit `setup` returning a guard value and a
//! `teardown` consuming it.  The `with_*` wrappers run a body between the
//! two and always tear down, reporting the body's error in preference to a
//! teardown error.

use log::{info, warn};
use std::fmt;
use std::time::Instant;

use crate::errors::{NtpResult, NtpTestError, ensure};
use crate::host::{RemoteHost, ServiceAction};
use crate::ntp::{
    NTP_SERVICE, add_ntp_server, config_long_jump, current_ntp_servers, del_ntp_server,
    long_jump_enabled, wait_for_sync,
};
use crate::poll::Poll;

const PTF_NTP_CONF: &str = "/etc/ntp.conf";

/// Makes the PTF ntpd serve its own local clock.
const LOCAL_CLOCK_SERVER: &str = "server 127.127.1.0 prefer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("ipv4"),
            AddressFamily::V6 => f.write_str("ipv6"),
        }
    }
}

/// Address the DUT should use to reach the PTF NTP server.
fn server_address(ptf: &RemoteHost, family: AddressFamily) -> NtpResult<String> {
    match family {
        AddressFamily::V4 => ptf.mgmt_ip().map(str::to_string).ok_or_else(|| {
            NtpTestError::Config(format!("ptf host {} has no mgmt_ip", ptf.hostname()))
        }),
        AddressFamily::V6 => ptf
            .mgmt_ipv6()
            .map(str::to_string)
            .ok_or_else(|| NtpTestError::Skipped("No IPv6 address on PTF host".to_string())),
    }
}

fn keep_first(slot: &mut Option<NtpTestError>, result: NtpResult<()>) {
    if let Err(e) = result {
        warn!("teardown step failed: {e}");
        slot.get_or_insert(e);
    }
}

fn undo_step(result: NtpResult<()>) {
    if let Err(e) = result {
        warn!("rollback step failed: {e}");
    }
}

// ---------------------------------------------------------------------------
// NTP server on the PTF host
// ---------------------------------------------------------------------------

/// The DUT pointed at an NTP server running on the PTF host.
#[derive(Debug)]
pub struct NtpServerContext {
    server_addr: String,
    saved_servers: Vec<String>,
}

impl NtpServerContext {
    pub fn setup(
        ptf: &RemoteHost,
        dut: &RemoteHost,
        family: AddressFamily,
        server_poll: &Poll,
    ) -> NtpResult<Self> {
        let server_addr = server_address(ptf, family)?;

        ptf.ensure_line(PTF_NTP_CONF, LOCAL_CLOCK_SERVER)?;
        ptf.service(NTP_SERVICE, ServiceAction::Restart)?;

        // Servers removed so far; put back if setup fails part way.
        let mut removed = Vec::new();
        match Self::point_dut_at(ptf, dut, &server_addr, server_poll, &mut removed) {
            Ok(saved_servers) => {
                info!("{}: syncing from {server_addr} ({family})", dut.hostname());
                Ok(Self {
                    server_addr,
                    saved_servers,
                })
            }
            Err(e) => {
                warn!("{}: ntp server setup failed, rolling back: {e}", dut.hostname());
                for server in &removed {
                    undo_step(add_ntp_server(dut, server));
                }
                undo_step(ptf.service(NTP_SERVICE, ServiceAction::Stop));
                Err(e)
            }
        }
    }

    /// Wait for the PTF server, then swap the DUT's servers for it.  Each
    /// server deleted from the DUT is pushed onto `removed`.
    fn point_dut_at(
        ptf: &RemoteHost,
        dut: &RemoteHost,
        server_addr: &str,
        server_poll: &Poll,
        removed: &mut Vec<String>,
    ) -> NtpResult<Vec<String>> {
        ensure(
            wait_for_sync(ptf, server_poll)?,
            format!("NTP server was not started in PTF container {}", ptf.hostname()),
        )?;

        let saved_servers = current_ntp_servers(dut)?;
        for server in &saved_servers {
            del_ntp_server(dut, server)?;
            removed.push(server.clone());
        }
        add_ntp_server(dut, server_addr)?;
        Ok(saved_servers)
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    /// Servers the DUT used before setup; restored on teardown.
    pub fn saved_servers(&self) -> &[String] {
        &self.saved_servers
    }

    pub fn teardown(self, ptf: &RemoteHost, dut: &RemoteHost) -> NtpResult<()> {
        let mut first_err = None;
        keep_first(&mut first_err, ptf.service(NTP_SERVICE, ServiceAction::Stop));
        keep_first(&mut first_err, del_ntp_server(dut, &self.server_addr));
        for server in &self.saved_servers {
            keep_first(&mut first_err, add_ntp_server(dut, server));
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Run `body` with the DUT syncing from the PTF host.
pub fn with_ntp_server<T>(
    ptf: &RemoteHost,
    dut: &RemoteHost,
    family: AddressFamily,
    server_poll: &Poll,
    body: impl FnOnce(&NtpServerContext) -> NtpResult<T>,
) -> NtpResult<T> {
    let ctx = NtpServerContext::setup(ptf, dut, family, server_poll)?;
    let result = body(&ctx);
    let teardown = ctx.teardown(ptf, dut);
    match (result, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Long jump clock perturbation
// ---------------------------------------------------------------------------

/// The DUT with ntp stopped and its clock set back.
#[derive(Debug)]
pub struct LongJumpFixture {
    long_jump_was_enabled: bool,
    start_dut: i64,
    started: Instant,
}

impl LongJumpFixture {
    /// Record the current long-jump state and clock, stop ntp and set the
    /// DUT clock back by `time_forward` seconds.
    pub fn setup(dut: &RemoteHost, time_forward: i64) -> NtpResult<Self> {
        let long_jump_was_enabled = long_jump_enabled(dut)?;

        let start_dut = dut.epoch_now()?;
        let started = Instant::now();

        dut.service(NTP_SERVICE, ServiceAction::Stop)?;
        dut.set_epoch(start_dut - time_forward)?;

        Ok(Self {
            long_jump_was_enabled,
            start_dut,
            started,
        })
    }

    pub fn long_jump_was_enabled(&self) -> bool {
        self.long_jump_was_enabled
    }

    /// Where the DUT clock would be had it never been touched.
    pub fn expected_epoch(&self) -> i64 {
        self.start_dut + self.started.elapsed().as_secs() as i64
    }

    /// Put the clock back and restore the recorded long-jump option.
    /// Every step runs even when an earlier one fails; the first failure is
    /// returned.
    pub fn teardown(self, dut: &RemoteHost) -> NtpResult<()> {
        let mut first_err = None;
        keep_first(&mut first_err, dut.service(NTP_SERVICE, ServiceAction::Stop));
        keep_first(&mut first_err, dut.set_epoch(self.expected_epoch()));
        keep_first(&mut first_err, config_long_jump(dut, self.long_jump_was_enabled));
        first_err.map_or(Ok(()), Err)
    }
}

/// Run `body` with the DUT clock set back by `time_forward` seconds.
pub fn with_long_jump_fixture<T>(
    dut: &RemoteHost,
    time_forward: i64,
    body: impl FnOnce(&LongJumpFixture) -> NtpResult<T>,
) -> NtpResult<T> {
    let fixture = LongJumpFixture::setup(dut, time_forward)?;
    let result = body(&fixture);
    let teardown = fixture.teardown(dut);
    match (result, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
    }
}
