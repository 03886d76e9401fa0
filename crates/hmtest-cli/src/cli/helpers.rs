use hmtest_core::domain::{HarnessError, HarnessResult};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub(super) const LOG_FILTER_ENV: &str = "HMTEST_LOG";

#[derive(clap::Args, Debug, Default)]
pub(super) struct LoggingFlags {
    /// Increase diagnostic verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors on stderr
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

impl LoggingFlags {
    fn level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Installs the stderr subscriber. `HMTEST_LOG` takes precedence over the
/// verbosity flags.
pub(super) fn init_tracing(flags: &LoggingFlags) {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(flags.level()));
    // A subscriber may already be installed when the CLI is driven in-process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub(super) fn current_working_dir() -> HarnessResult<PathBuf> {
    std::env::current_dir().map_err(|source| {
        HarnessError::io_system(
            "IO.CLI_CURRENT_DIR",
            format!("failed to read current working directory: {}", source),
        )
    })
}
