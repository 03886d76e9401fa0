pub mod errors;

pub use errors::{HarnessError, HarnessErrorCategory, HarnessResult};

use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::process::ExitStatus;

/// One acceptance scenario: a named invocation template plus the outputs it
/// must reproduce byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub args: Vec<String>,
    pub outputs: Vec<ScenarioOutput>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, args: Vec<String>, outputs: Vec<ScenarioOutput>) -> Self {
        Self {
            name: name.into(),
            args,
            outputs,
        }
    }

    pub fn output(&self, id: &str) -> Option<&ScenarioOutput> {
        self.outputs.iter().find(|output| output.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutput {
    /// Key used by `{output:<id>}` placeholders.
    pub id: String,
    /// File name written by the tool under the output directory.
    pub file: String,
    /// Golden file name under the expected-output directory.
    pub expected: String,
}

impl ScenarioOutput {
    pub fn new(id: impl Into<String>, file: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file: file.into(),
            expected: expected.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    #[default]
    Pending,
    Running,
    OutputsWritten,
    Verified,
}

impl ScenarioPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::OutputsWritten => "OUTPUTS_WRITTEN",
            Self::Verified => "VERIFIED",
        }
    }

    /// Next phase, or `None` once verified.
    pub const fn advance(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Running),
            Self::Running => Some(Self::OutputsWritten),
            Self::OutputsWritten => Some(Self::Verified),
            Self::Verified => None,
        }
    }
}

impl Display for ScenarioPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Succeeded,
    Exited { code: i32 },
    Terminated,
    LaunchFailed { message: String },
    NotRun,
}

impl ToolOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Succeeded;
        }
        match status.code() {
            Some(code) => Self::Exited { code },
            None => Self::Terminated,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Succeeded => "exit code 0".to_string(),
            Self::Exited { code } => format!("exit code {}", code),
            Self::Terminated => "terminated by signal".to_string(),
            Self::LaunchFailed { message } => format!("failed to launch: {}", message),
            Self::NotRun => "not run".to_string(),
        }
    }
}
