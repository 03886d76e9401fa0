mod commands;
mod helpers;

use clap::Parser;
use hmtest_core::domain::HarnessError;

pub fn run_from_env() -> i32 {
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let harness_error = error.as_harness_error();
            eprintln!("{}", harness_error.diagnostic_line());
            eprintln!("{}", harness_error.fatal_exit_line());
            harness_error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("hmtest".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            helpers::init_tracing(&cli.logging);
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "hmtest",
    version,
    about = "Acceptance harness for the sumstat harmoniser"
)]
struct Cli {
    #[command(flatten)]
    logging: helpers::LoggingFlags,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Prepare the reference fixture, run every scenario and verify its outputs
    Run(commands::RunArgs),
    /// Compress and index a reference VCF
    Prepare(commands::PrepareArgs),
    /// Compare output files against golden files
    Verify(commands::VerifyArgs),
    /// Print SHA-256 digests of files
    Digest(commands::DigestArgs),
    /// Print the scenario table with rendered command lines
    List(commands::ListArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_harness_command(args),
        CliCommand::Prepare(args) => commands::run_prepare_command(args),
        CliCommand::Verify(args) => commands::run_verify_command(args),
        CliCommand::Digest(args) => commands::run_digest_command(args),
        CliCommand::List(args) => commands::run_list_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Harness(HarnessError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<HarnessError> for CliError {
    fn from(error: HarnessError) -> Self {
        Self::Harness(error)
    }
}

impl CliError {
    fn as_harness_error(&self) -> HarnessError {
        match self {
            Self::Usage(message) => {
                HarnessError::input_validation("INPUT.CLI_USAGE", message.clone())
            }
            Self::Harness(error) => error.clone(),
            Self::Internal(error) => HarnessError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
