//! `dut_ntp` — NTP checks for a network device under test.
//!
//! The harness drives a DUT and a companion PTF host over SSH.  It points
//! the DUT at an NTP server on the PTF host, perturbs the DUT clock,
//! switches ntpd between long-jump and slew mode and waits for the daemon
//! to report synchronisation again.
//!
//! - [`poll`] — bounded polling (`wait_until`)
//! - [`backend`] — command transports (SSH, local)
//! - [`host`] — synchronous host facade: commands, files, services, clock
//! - [`ntp`] — ntpd flavour detection, long-jump config, status checks
//! - [`fixture`] — setup/teardown scopes
//! - [`suite`] — the test cases and their runner

pub mod backend;
pub mod config;
pub mod errors;
pub mod fixture;
pub mod host;
pub mod logging;
pub mod ntp;
pub mod poll;
pub mod suite;
pub mod testbed;
