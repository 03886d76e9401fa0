//! Reference-panel fixture preparation: block-compress the source VCF and
//! build a positional index next to it.

use super::runner::{StdoutTarget, ToolInvocation, ToolLog, resolve_program};
use super::traits::ToolExecutor;
use crate::common::HarnessConfig;
use crate::common::config::normalize_path;
use crate::domain::{HarnessError, ToolOutcome};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const COMPRESSED_SUFFIX: &str = ".gz";
pub const INDEX_SUFFIX: &str = ".tbi";
pub const INDEX_PRESET: &str = "vcf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub source: PathBuf,
    pub compressed: PathBuf,
    pub index: PathBuf,
}

impl Fixture {
    pub fn for_source(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let compressed = with_suffix(&source, COMPRESSED_SUFFIX);
        let index = with_suffix(&compressed, INDEX_SUFFIX);
        Self {
            source,
            compressed,
            index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureStep {
    Compress,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureStepReport {
    pub step: FixtureStep,
    pub command: String,
    pub outcome: ToolOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureReport {
    pub source: String,
    pub compressed: String,
    pub index: String,
    pub prepared: bool,
    pub steps: Vec<FixtureStepReport>,
}

impl FixtureReport {
    /// A fixture tool that could not be started at all, as opposed to one
    /// that ran and exited unsuccessfully.
    pub fn launch_failure(&self) -> Option<HarnessError> {
        self.steps.iter().find_map(|step| match &step.outcome {
            ToolOutcome::LaunchFailed { message } => Some(HarnessError::tool_execution(
                "RUN.FIXTURE_TOOL",
                format!("failed to launch '{}': {}", step.command, message),
            )),
            _ => None,
        })
    }
}

/// Compresses then indexes the configured reference source.
///
/// Step failures are recorded and logged but never abort the run; a broken
/// fixture surfaces downstream as digest mismatches. The index step is not
/// attempted when compression failed.
pub fn prepare_fixture(
    config: &HarnessConfig,
    executor: &impl ToolExecutor,
    log: &mut ToolLog,
) -> FixtureReport {
    let fixture = Fixture::for_source(config.resolve(&config.reference_source));
    info!(source = %fixture.source.display(), "preparing reference fixture");

    let compress = ToolInvocation::new(
        resolve_program(config, &config.compress_tool),
        vec![OsString::from("-c"), fixture.source.clone().into_os_string()],
        &config.working_dir,
    )
    .with_stdout(StdoutTarget::File(fixture.compressed.clone()));
    let compress_report = run_step(FixtureStep::Compress, &compress, executor, log);

    let index = ToolInvocation::new(
        resolve_program(config, &config.index_tool),
        vec![
            OsString::from("-f"),
            OsString::from("-p"),
            OsString::from(INDEX_PRESET),
            fixture.compressed.clone().into_os_string(),
        ],
        &config.working_dir,
    );
    let index_report = if compress_report.outcome.is_success() {
        run_step(FixtureStep::Index, &index, executor, log)
    } else {
        FixtureStepReport {
            step: FixtureStep::Index,
            command: index.command_line(),
            outcome: ToolOutcome::NotRun,
        }
    };

    let steps = vec![compress_report, index_report];
    let prepared = steps.iter().all(|step| step.outcome.is_success());
    FixtureReport {
        source: normalize_path(&fixture.source),
        compressed: normalize_path(&fixture.compressed),
        index: normalize_path(&fixture.index),
        prepared,
        steps,
    }
}

fn run_step(
    step: FixtureStep,
    invocation: &ToolInvocation,
    executor: &impl ToolExecutor,
    log: &mut ToolLog,
) -> FixtureStepReport {
    let outcome = executor.execute(invocation, log);
    if !outcome.is_success() {
        warn!(
            step = ?step,
            command = %invocation.command_line(),
            outcome = %outcome.describe(),
            "fixture preparation step failed"
        );
    }
    FixtureStepReport {
        step,
        command: invocation.command_line(),
        outcome,
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}
