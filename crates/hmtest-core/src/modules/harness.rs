use super::digest::DIGEST_ALGORITHM;
use super::fixture::{Fixture, FixtureReport, prepare_fixture};
use super::runner::{ToolLog, invocation_for, run_scenario};
use super::scenarios::ScenarioTable;
use super::traits::ToolExecutor;
use super::verifier::{OutputPair, OutputVerdict, output_pairs, verify_outputs};
use crate::common::HarnessConfig;
use crate::common::config::normalize_path;
use crate::domain::{HarnessError, HarnessResult, Scenario, ScenarioPhase, ToolOutcome};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub generated_at_unix_seconds: u64,
    pub passed: bool,
    pub working_dir: String,
    pub tool_path: String,
    pub log_path: String,
    pub digest_algorithm: &'static str,
    pub fixture: Option<FixtureReport>,
    pub scenario_count: usize,
    pub passed_scenario_count: usize,
    pub failed_scenario_count: usize,
    pub scenarios: Vec<ScenarioReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The tool could not be launched or did not exit cleanly.
    ToolFailure,
    /// The tool exited cleanly but an output differs from its golden file.
    OutputMismatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub passed: bool,
    pub failure: Option<FailureKind>,
    pub phase: ScenarioPhase,
    pub command: String,
    pub tool: ToolOutcome,
    pub outputs: Vec<OutputVerdict>,
}

/// Prepares the fixture, then runs and verifies every selected scenario in
/// order. `on_verdict` is called as soon as each scenario is verified.
///
/// Scenario failures never stop the run; only harness-level problems
/// (unreadable scenario table, unwritable output directory, log or report)
/// are returned as errors.
pub fn run_harness(
    config: &HarnessConfig,
    executor: &impl ToolExecutor,
    mut on_verdict: impl FnMut(&ScenarioReport),
) -> HarnessResult<HarnessReport> {
    let table = ScenarioTable::for_config(config)?;
    let output_dir = config.resolve(&config.output_dir);
    fs::create_dir_all(&output_dir).map_err(|source| {
        HarnessError::io_system(
            "IO.HARNESS_OUTPUT_DIR",
            format!(
                "failed to create output directory '{}': {}",
                output_dir.display(),
                source
            ),
        )
    })?;

    let mut log = ToolLog::open(config.resolve(&config.log_path))?;
    debug!(log = %log.path().display(), "opened tool log");
    let fixture = if config.skip_fixture {
        info!("fixture preparation skipped");
        None
    } else {
        let report = prepare_fixture(config, executor, &mut log);
        check_fixture_reachable(config);
        Some(report)
    };

    let mut scenarios = Vec::with_capacity(table.len());
    let mut outcome = Ok(());
    for scenario in table.scenarios() {
        match execute_scenario(scenario, config, executor, &mut log) {
            Ok(report) => {
                on_verdict(&report);
                scenarios.push(report);
            }
            Err(error) => {
                outcome = Err(error);
                break;
            }
        }
    }
    let closed = log.close();
    outcome?;
    closed?;

    let scenario_count = scenarios.len();
    let passed_scenario_count = scenarios.iter().filter(|scenario| scenario.passed).count();
    let failed_scenario_count = scenario_count.saturating_sub(passed_scenario_count);

    let report = HarnessReport {
        generated_at_unix_seconds: current_unix_timestamp_seconds(),
        passed: failed_scenario_count == 0,
        working_dir: normalize_path(&config.working_dir),
        tool_path: normalize_path(&config.tool_path),
        log_path: normalize_path(&config.log_path),
        digest_algorithm: DIGEST_ALGORITHM,
        fixture,
        scenario_count,
        passed_scenario_count,
        failed_scenario_count,
        scenarios,
    };

    write_report_file(&config.resolve(&config.report_path), &report)?;
    Ok(report)
}

fn execute_scenario(
    scenario: &Scenario,
    config: &HarnessConfig,
    executor: &impl ToolExecutor,
    log: &mut ToolLog,
) -> HarnessResult<ScenarioReport> {
    let mut phase = ScenarioPhase::Pending;
    let command = invocation_for(scenario, config)?.command_line();
    let pairs = output_pairs(scenario, config);
    clear_stale_outputs(scenario, &pairs)?;

    phase = enter(scenario, phase);
    let tool = run_scenario(scenario, config, executor, log)?;
    phase = enter(scenario, phase);

    let verdict = verify_outputs(&pairs);
    phase = enter(scenario, phase);

    let failure = if config.require_tool_success && !tool.is_success() {
        Some(FailureKind::ToolFailure)
    } else if !verdict.passed {
        Some(FailureKind::OutputMismatch)
    } else {
        None
    };

    Ok(ScenarioReport {
        name: scenario.name.clone(),
        passed: failure.is_none(),
        failure,
        phase,
        command,
        tool,
        outputs: verdict.outputs,
    })
}

/// Removes outputs left by an earlier run so only files this invocation
/// writes are digested.
fn clear_stale_outputs(scenario: &Scenario, pairs: &[OutputPair]) -> HarnessResult<()> {
    for pair in pairs {
        match fs::remove_file(&pair.actual_path) {
            Ok(()) => debug!(
                scenario = %scenario.name,
                output = %pair.actual_path.display(),
                "removed stale output"
            ),
            Err(source) if source.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(HarnessError::io_system(
                    "IO.HARNESS_STALE_OUTPUT",
                    format!(
                        "failed to remove stale output '{}': {}",
                        pair.actual_path.display(),
                        source
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn enter(scenario: &Scenario, phase: ScenarioPhase) -> ScenarioPhase {
    let next = phase.advance().unwrap_or(phase);
    debug!(scenario = %scenario.name, from = %phase, to = %next, "scenario phase");
    next
}

fn check_fixture_reachable(config: &HarnessConfig) {
    let fixture = Fixture::for_source(config.resolve(&config.reference_source));
    match config.reference_chromosome(&fixture.compressed) {
        Some(chromosome) => debug!(
            chromosome = %chromosome,
            reference = %config.reference_for_chromosome(&chromosome).display(),
            "fixture reachable through reference pattern"
        ),
        None => warn!(
            compressed = %fixture.compressed.display(),
            pattern = %config.reference_pattern,
            "prepared fixture is not reachable through the reference pattern"
        ),
    }
}

pub fn render_verdict_line(report: &ScenarioReport) -> String {
    match report.failure {
        None => format!("Testing {}: PASS", report.name),
        Some(FailureKind::OutputMismatch) => format!("Testing {}: FAIL", report.name),
        Some(FailureKind::ToolFailure) => format!(
            "Testing {}: FAIL (tool {})",
            report.name,
            report.tool.describe()
        ),
    }
}

pub fn render_human_summary(report: &HarnessReport) -> String {
    let mut lines = Vec::new();
    if let Some(fixture) = &report.fixture {
        if fixture.prepared {
            lines.push(format!("Fixture: prepared ({})", fixture.compressed));
        } else {
            let failed = fixture
                .steps
                .iter()
                .filter(|step| !step.outcome.is_success())
                .map(|step| format!("{:?}: {}", step.step, step.outcome.describe()))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Fixture: NOT prepared ({})", failed));
        }
    }
    lines.push(format!(
        "Scenarios: {} total ({} passed, {} failed)",
        report.scenario_count, report.passed_scenario_count, report.failed_scenario_count
    ));

    for scenario in report.scenarios.iter().filter(|scenario| !scenario.passed) {
        if let Some(first_failure) = scenario.outputs.iter().find(|output| !output.passed) {
            let reason = first_failure
                .reason
                .as_deref()
                .unwrap_or("digest comparison failed without a reason");
            lines.push(format!(
                "  {}: {} ({})",
                scenario.name, first_failure.actual_path, reason
            ));
        } else if scenario.failure == Some(FailureKind::ToolFailure) {
            lines.push(format!(
                "  {}: outputs match but tool reported {}",
                scenario.name,
                scenario.tool.describe()
            ));
        }
    }

    lines.join("\n")
}

fn write_report_file(report_path: &Path, report: &HarnessReport) -> HarnessResult<()> {
    if let Some(parent_dir) = report_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|source| {
            HarnessError::io_system(
                "IO.HARNESS_REPORT",
                format!(
                    "failed to create report directory '{}': {}",
                    parent_dir.display(),
                    source
                ),
            )
        })?;
    }

    let report_json = serde_json::to_string_pretty(report).map_err(|source| {
        HarnessError::internal(
            "SYS.HARNESS_REPORT",
            format!(
                "failed to serialize report '{}': {}",
                report_path.display(),
                source
            ),
        )
    })?;
    fs::write(report_path, report_json).map_err(|source| {
        HarnessError::io_system(
            "IO.HARNESS_REPORT",
            format!("failed to write report '{}': {}", report_path.display(), source),
        )
    })
}

fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
