use super::CliError;
use super::helpers::current_working_dir;
use anyhow::Context;
use hmtest_core::common::{HarnessConfig, resolve_path};
use hmtest_core::common::config::{
    DEFAULT_COMPRESS_TOOL, DEFAULT_EXPECTED_DIR, DEFAULT_INDEX_TOOL, DEFAULT_LOG_PATH,
    DEFAULT_OUTPUT_DIR, DEFAULT_REFERENCE_PATTERN, DEFAULT_REFERENCE_SOURCE, DEFAULT_REPORT_PATH,
    DEFAULT_SUMSTATS_PATH, DEFAULT_TOOL_PATH,
};
use hmtest_core::domain::HarnessError;
use hmtest_core::modules::digest::digest_file;
use hmtest_core::modules::fixture::prepare_fixture;
use hmtest_core::modules::harness::{render_human_summary, render_verdict_line, run_harness};
use hmtest_core::modules::runner::{ProcessExecutor, ToolLog, invocation_for};
use hmtest_core::modules::scenarios::ScenarioTable;
use hmtest_core::modules::verifier::{OutputPair, verify_outputs};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(clap::Args)]
pub(super) struct LayoutFlags {
    /// Directory the harness and the tool run in
    #[arg(long, default_value = ".")]
    working_dir: PathBuf,

    /// Harmoniser executable
    #[arg(long, default_value = DEFAULT_TOOL_PATH)]
    tool: PathBuf,

    /// Summary-statistics input handed to every scenario
    #[arg(long, default_value = DEFAULT_SUMSTATS_PATH)]
    sumstats: PathBuf,

    /// Reference path pattern; '#' stands for the chromosome
    #[arg(long, default_value = DEFAULT_REFERENCE_PATTERN)]
    reference_pattern: String,

    /// Directory receiving scenario outputs
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Directory holding golden files
    #[arg(long, default_value = DEFAULT_EXPECTED_DIR)]
    expected_dir: PathBuf,

    /// JSON scenario manifest replacing the built-in table
    #[arg(long = "scenarios", value_name = "MANIFEST")]
    scenario_manifest: Option<PathBuf>,

    /// Only run scenarios whose name matches this glob (repeatable)
    #[arg(long = "only", value_name = "GLOB")]
    only: Vec<String>,
}

#[derive(clap::Args)]
pub(super) struct FixtureFlags {
    /// Block compressor used for the reference fixture
    #[arg(long, default_value = DEFAULT_COMPRESS_TOOL)]
    compress_tool: PathBuf,

    /// Indexer used for the reference fixture
    #[arg(long, default_value = DEFAULT_INDEX_TOOL)]
    index_tool: PathBuf,

    /// Shared stdout log for every tool invocation
    #[arg(long, default_value = DEFAULT_LOG_PATH)]
    log: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct RunArgs {
    #[command(flatten)]
    layout: LayoutFlags,

    #[command(flatten)]
    fixture: FixtureFlags,

    /// Uncompressed reference VCF to prepare
    #[arg(long, default_value = DEFAULT_REFERENCE_SOURCE)]
    reference_source: PathBuf,

    /// JSON report output path
    #[arg(long, default_value = DEFAULT_REPORT_PATH)]
    report: PathBuf,

    /// Reuse an already prepared fixture
    #[arg(long)]
    skip_fixture: bool,

    /// Judge scenarios on output digests alone
    #[arg(long)]
    ignore_tool_status: bool,

    /// Exit 0 even when scenarios fail
    #[arg(long)]
    exit_zero: bool,
}

#[derive(clap::Args)]
pub(super) struct PrepareArgs {
    /// Uncompressed reference VCF
    #[arg(value_name = "SOURCE", default_value = DEFAULT_REFERENCE_SOURCE)]
    source: PathBuf,

    /// Directory the tools run in
    #[arg(long, default_value = ".")]
    working_dir: PathBuf,

    #[command(flatten)]
    fixture: FixtureFlags,
}

#[derive(clap::Args)]
pub(super) struct VerifyArgs {
    /// Produced file (pairs positionally with --expected)
    #[arg(long, required = true, value_name = "PATH")]
    actual: Vec<PathBuf>,

    /// Golden file
    #[arg(long, required = true, value_name = "PATH")]
    expected: Vec<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct DigestArgs {
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct ListArgs {
    #[command(flatten)]
    layout: LayoutFlags,
}

impl LayoutFlags {
    fn apply(self, config: &mut HarnessConfig, invocation_dir: &Path) {
        config.working_dir = resolve_path(invocation_dir, &self.working_dir);
        config.tool_path = self.tool;
        config.sumstats_path = self.sumstats;
        config.reference_pattern = self.reference_pattern;
        config.output_dir = self.output_dir;
        config.expected_dir = self.expected_dir;
        config.scenario_manifest = self.scenario_manifest;
        config.scenario_filters = self.only;
    }
}

impl FixtureFlags {
    fn apply(self, config: &mut HarnessConfig) {
        config.compress_tool = self.compress_tool;
        config.index_tool = self.index_tool;
        config.log_path = self.log;
    }
}

impl RunArgs {
    fn into_config(self, invocation_dir: &Path) -> (HarnessConfig, bool) {
        let mut config = HarnessConfig::default();
        self.layout.apply(&mut config, invocation_dir);
        self.fixture.apply(&mut config);
        config.reference_source = self.reference_source;
        config.report_path = self.report;
        config.skip_fixture = self.skip_fixture;
        config.require_tool_success = !self.ignore_tool_status;
        (config, self.exit_zero)
    }
}

pub(super) fn run_harness_command(args: RunArgs) -> Result<i32, CliError> {
    let invocation_dir = current_working_dir()?;
    let (config, exit_zero) = args.into_config(&invocation_dir);
    debug!(working_dir = %config.working_dir.display(), "resolved harness configuration");

    let report = run_harness(&config, &ProcessExecutor, |scenario| {
        println!("{}", render_verdict_line(scenario));
    })?;
    println!("{}", render_human_summary(&report));
    println!(
        "JSON report: {}",
        config.resolve(&config.report_path).display()
    );

    if report.passed || exit_zero { Ok(0) } else { Ok(1) }
}

pub(super) fn run_prepare_command(args: PrepareArgs) -> Result<i32, CliError> {
    let invocation_dir = current_working_dir()?;
    let mut config = HarnessConfig::with_working_dir(resolve_path(
        &invocation_dir,
        &args.working_dir,
    ));
    config.reference_source = args.source;
    args.fixture.apply(&mut config);

    let mut log = ToolLog::open(config.resolve(&config.log_path))?;
    let report = prepare_fixture(&config, &ProcessExecutor, &mut log);
    log.close()?;

    let mut stdout = std::io::stdout().lock();
    for step in &report.steps {
        writeln!(
            stdout,
            "{:?}: {} ({})",
            step.step,
            step.command,
            step.outcome.describe()
        )
        .context("failed to write preparation step")?;
    }
    if let Some(error) = report.launch_failure() {
        return Err(error.into());
    }
    if report.prepared {
        writeln!(stdout, "Fixture prepared: {}", report.compressed)
            .context("failed to write preparation summary")?;
        Ok(0)
    } else {
        writeln!(stdout, "Fixture NOT prepared: {}", report.source)
            .context("failed to write preparation summary")?;
        Ok(1)
    }
}

pub(super) fn run_verify_command(args: VerifyArgs) -> Result<i32, CliError> {
    if args.actual.len() != args.expected.len() {
        return Err(CliError::Usage(format!(
            "--actual was given {} time(s) but --expected {} time(s); they pair positionally",
            args.actual.len(),
            args.expected.len()
        )));
    }

    let invocation_dir = current_working_dir()?;
    let pairs = args
        .actual
        .iter()
        .zip(&args.expected)
        .map(|(actual, expected)| {
            OutputPair::new(
                resolve_path(&invocation_dir, actual),
                resolve_path(&invocation_dir, expected),
            )
        })
        .collect::<Vec<_>>();
    let verdict = verify_outputs(&pairs);

    let mut stdout = std::io::stdout().lock();
    for output in &verdict.outputs {
        let status = if output.passed { "PASS" } else { "FAIL" };
        writeln!(stdout, "Testing {}: {}", output.actual_path, status)
            .context("failed to write verdict")?;
        if let Some(reason) = &output.reason {
            writeln!(stdout, "  {}", reason).context("failed to write verdict")?;
        }
    }

    if verdict.passed { Ok(0) } else { Ok(1) }
}

pub(super) fn run_digest_command(args: DigestArgs) -> Result<i32, CliError> {
    let mut stdout = std::io::stdout().lock();
    for file in &args.files {
        let digest = digest_file(file).map_err(HarnessError::from)?;
        writeln!(stdout, "{}  {}", digest.hex, file.display())
            .context("failed to write digest line")?;
    }
    Ok(0)
}

pub(super) fn run_list_command(args: ListArgs) -> Result<i32, CliError> {
    let invocation_dir = current_working_dir()?;
    let mut config = HarnessConfig::default();
    args.layout.apply(&mut config, &invocation_dir);

    let table = ScenarioTable::for_config(&config).map_err(HarnessError::from)?;
    let mut stdout = std::io::stdout().lock();
    for scenario in table.scenarios() {
        let invocation = invocation_for(scenario, &config).map_err(HarnessError::from)?;
        writeln!(stdout, "{}\n  {}", scenario.name, invocation.command_line())
            .context("failed to write scenario listing")?;
    }
    Ok(0)
}
