//! Logger setup for the CLI.
//!
//! Records from this crate are shown at the level picked with `-v`; records
//! from dependencies (openssh, tokio) only at `warn` and above.  Everything
//! goes to stderr.

use log::{Level, LevelFilter};

/// Map the number of `-v` flags to a level.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// ANSI colour code for a level.
fn level_colour(level: Level) -> u8 {
    match level {
        Level::Error => 31,
        Level::Warn => 33,
        Level::Info => 32,
        Level::Debug => 34,
        Level::Trace => 36,
    }
}

pub fn setup_logging(level: LevelFilter) -> Result<(), String> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} \x1b[{}m{:<5}\x1b[0m {}: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                level_colour(record.level()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Warn)
        .level_for("dut_ntp", level)
        .chain(std::io::stderr())
        .apply()
        .map_err(|e| format!("cannot set up logger: {e}"))
}
