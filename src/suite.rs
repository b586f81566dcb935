//! The NTP test cases and the runner that parametrises them over address
//! families.

use log::{error, info, warn};
use std::fmt;
use std::time::{Duration, Instant};

use crate::errors::{NtpResult, NtpTestError, ensure};
use crate::fixture::{AddressFamily, NtpServerContext, with_long_jump_fixture};
use crate::ntp::{config_long_jump, run_ntp, wait_for_sync};
use crate::testbed::Testbed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestCase {
    /// Force a sync against the PTF server and wait for ntpstat.
    NtpSync,
    /// Step a clock that is an hour behind with `-g`.
    LongJumpEnabled,
    /// Recover a clock that is an hour behind in slew mode.
    LongJumpDisabled,
}

impl TestCase {
    pub const ALL: [TestCase; 3] = [
        TestCase::LongJumpEnabled,
        TestCase::LongJumpDisabled,
        TestCase::NtpSync,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TestCase::NtpSync => "ntp_sync",
            TestCase::LongJumpEnabled => "long_jump_enabled",
            TestCase::LongJumpDisabled => "long_jump_disabled",
        }
    }

    pub fn run(self, testbed: &Testbed) -> NtpResult<()> {
        match self {
            TestCase::NtpSync => run_ntp(&testbed.dut, &testbed.timing.sync),
            TestCase::LongJumpEnabled => long_jump_case(testbed, true),
            TestCase::LongJumpDisabled => long_jump_case(testbed, false),
        }
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn long_jump_case(testbed: &Testbed, enable: bool) -> NtpResult<()> {
    let dut = &testbed.dut;
    with_long_jump_fixture(dut, testbed.timing.time_forward, |_| {
        config_long_jump(dut, enable)?;
        let message = if enable {
            "NTP long jump enable failed"
        } else {
            "NTP long jump disable failed"
        };
        ensure(wait_for_sync(dut, &testbed.timing.sync)?, message)
    })
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
}

impl Outcome {
    fn from_result(result: &NtpResult<()>) -> Self {
        match result {
            Ok(()) => Outcome::Passed,
            Err(NtpTestError::Skipped(reason)) => Outcome::Skipped(reason.clone()),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub case: TestCase,
    pub family: AddressFamily,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub results: Vec<CaseResult>,
    /// Fixture teardowns that failed after their cases had run.
    pub teardown_errors: Vec<String>,
}

impl Report {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.teardown_errors.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.results {
            let secs = r.elapsed.as_secs_f64();
            match &r.outcome {
                Outcome::Passed => writeln!(f, "PASSED  {}[{}] ({secs:.1}s)", r.case, r.family)?,
                Outcome::Failed(msg) => {
                    writeln!(f, "FAILED  {}[{}] ({secs:.1}s): {msg}", r.case, r.family)?
                }
                Outcome::Skipped(msg) => writeln!(f, "SKIPPED {}[{}]: {msg}", r.case, r.family)?,
            }
        }
        for msg in &self.teardown_errors {
            writeln!(f, "ERROR   teardown: {msg}")?;
        }
        write!(
            f,
            "{} passed, {} failed, {} skipped",
            self.passed(),
            self.failed(),
            self.skipped()
        )?;
        if !self.teardown_errors.is_empty() {
            write!(f, ", {} teardown error(s)", self.teardown_errors.len())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Run `cases` once per address family, each family inside its own NTP
/// server context.
pub fn run_suite(testbed: &Testbed, cases: &[TestCase], families: &[AddressFamily]) -> Report {
    let mut report = Report::default();

    for &family in families {
        info!("=== {family} ===");
        let ctx = match NtpServerContext::setup(
            &testbed.ptf,
            &testbed.dut,
            family,
            &testbed.timing.server,
        ) {
            Ok(ctx) => ctx,
            Err(e) => {
                let setup_result = Err(match e {
                    NtpTestError::Skipped(reason) => NtpTestError::Skipped(reason),
                    other => NtpTestError::Internal(format!("ntp server setup: {other}")),
                });
                let outcome = Outcome::from_result(&setup_result);
                warn!("{family}: {outcome:?}");
                for &case in cases {
                    report.results.push(CaseResult {
                        case,
                        family,
                        outcome: outcome.clone(),
                        elapsed: Duration::ZERO,
                    });
                }
                continue;
            }
        };

        for &case in cases {
            info!("--- {case}[{family}] ---");
            let start = Instant::now();
            let result = case.run(testbed);
            let outcome = Outcome::from_result(&result);
            match &outcome {
                Outcome::Passed => info!("{case}[{family}] passed"),
                Outcome::Failed(msg) => error!("{case}[{family}] failed: {msg}"),
                Outcome::Skipped(msg) => warn!("{case}[{family}] skipped: {msg}"),
            }
            report.results.push(CaseResult {
                case,
                family,
                outcome,
                elapsed: start.elapsed(),
            });
        }

        if let Err(e) = ctx.teardown(&testbed.ptf, &testbed.dut) {
            error!("{family}: ntp server teardown failed: {e}");
            report.teardown_errors.push(format!("{family}: {e}"));
        }
    }

    report
}
