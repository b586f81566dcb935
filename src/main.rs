//! dut-ntp — NTP long-jump and sync checks for a device under test.
//!
//! # Commands
//!
//! - `dut-ntp run`       — Run the NTP test cases against the testbed
//! - `dut-ntp status`    — Ask the DUT's ntpstat once
//! - `dut-ntp wait`      — Poll the DUT until ntp reports synchronised
//! - `dut-ntp long-jump` — Show or switch ntpd's long-jump option
//!
//! # Exit codes
//!
//! - 0 — Success
//! - 1 — A test failed, or the DUT is not synchronised
//! - 2 — Infrastructure error (bad config, connection failure, …)

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use dut_ntp::config::{Config, DEFAULT_CONFIG_PATH};
use dut_ntp::fixture::AddressFamily;
use dut_ntp::logging;
use dut_ntp::ntp;
use dut_ntp::suite::{self, TestCase};
use dut_ntp::testbed::Testbed;

/// NTP long-jump and sync checks for a device under test.
///
/// The testbed (DUT, PTF host and timing) is read from a TOML file.
#[derive(Debug, Parser)]
#[command(name = "dut-ntp", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Testbed configuration file.
    #[arg(
        long,
        short,
        global = true,
        value_name = "FILE",
        env = "DUT_NTP_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the NTP test cases.
    Run {
        /// Case to run; repeat to select several.  Defaults to all.
        #[arg(long = "case", value_enum)]
        cases: Vec<CaseArg>,

        /// Address family used to reach the PTF NTP server.
        #[arg(long, value_enum, default_value_t = FamilyArg::Both)]
        family: FamilyArg,
    },
    /// Check once whether the DUT reports synchronised.
    Status,
    /// Poll the DUT until it reports synchronised.
    Wait {
        /// Seconds to wait in total (default from config).
        #[arg(long)]
        timeout: Option<u64>,
        /// Seconds between checks (default from config).
        #[arg(long)]
        interval: Option<u64>,
        /// Seconds to wait before the first check (default from config).
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Show or switch ntpd's long-jump option on the DUT.
    LongJump {
        #[arg(value_enum)]
        action: LongJumpAction,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CaseArg {
    Sync,
    LongJumpEnabled,
    LongJumpDisabled,
}

impl From<CaseArg> for TestCase {
    fn from(arg: CaseArg) -> Self {
        match arg {
            CaseArg::Sync => TestCase::NtpSync,
            CaseArg::LongJumpEnabled => TestCase::LongJumpEnabled,
            CaseArg::LongJumpDisabled => TestCase::LongJumpDisabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FamilyArg {
    V4,
    V6,
    Both,
}

impl FamilyArg {
    fn families(self) -> Vec<AddressFamily> {
        match self {
            FamilyArg::V4 => vec![AddressFamily::V4],
            FamilyArg::V6 => vec![AddressFamily::V6],
            FamilyArg::Both => vec![AddressFamily::V4, AddressFamily::V6],
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LongJumpAction {
    Enable,
    Disable,
    Show,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::setup_logging(logging::level_for_verbosity(cli.verbose)) {
        eprintln!("{e}");
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Execute the selected command.  `Ok(false)` means the checks ran but did
/// not pass.
fn run(cli: Cli) -> Result<bool> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load testbed config {}", cli.config.display()))?;
    let testbed = Testbed::connect(&config).context("Failed to connect to testbed")?;

    match cli.command {
        Command::Run { cases, family } => {
            let cases: Vec<TestCase> = if cases.is_empty() {
                TestCase::ALL.to_vec()
            } else {
                cases.into_iter().map(TestCase::from).collect()
            };
            let report = suite::run_suite(&testbed, &cases, &family.families());
            println!("{report}");
            Ok(report.is_success())
        }
        Command::Status => {
            let synced = ntp::check_ntp_status(&testbed.dut)?;
            println!(
                "{}: {}",
                testbed.dut.hostname(),
                if synced { "synchronised" } else { "unsynchronised" }
            );
            Ok(synced)
        }
        Command::Wait {
            timeout,
            interval,
            delay,
        } => {
            let mut poll = testbed.timing.sync;
            if let Some(secs) = timeout {
                poll.timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = interval {
                poll.interval = Duration::from_secs(secs);
            }
            if let Some(secs) = delay {
                poll.delay = Duration::from_secs(secs);
            }
            info!("waiting up to {:?} for {} to sync", poll.timeout, testbed.dut.hostname());
            let synced = ntp::wait_for_sync(&testbed.dut, &poll)?;
            println!(
                "{}: {}",
                testbed.dut.hostname(),
                if synced { "synchronised" } else { "timed out" }
            );
            Ok(synced)
        }
        Command::LongJump { action } => {
            match action {
                LongJumpAction::Enable => ntp::config_long_jump(&testbed.dut, true)?,
                LongJumpAction::Disable => ntp::config_long_jump(&testbed.dut, false)?,
                LongJumpAction::Show => {}
            }
            let enabled = ntp::long_jump_enabled(&testbed.dut)?;
            println!(
                "{}: long jump {}",
                testbed.dut.hostname(),
                if enabled { "enabled" } else { "disabled" }
            );
            Ok(true)
        }
    }
}
