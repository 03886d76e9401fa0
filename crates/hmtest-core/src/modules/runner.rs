use super::scenarios::{ScenarioTableError, render_args};
use super::traits::ToolExecutor;
use crate::common::HarnessConfig;
use crate::common::config::normalize_path;
use crate::domain::{HarnessError, Scenario, ToolOutcome};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Shared stdout capture for every tool invocation in a run.
///
/// Opened once (truncating), cloned into each child's stdout, and released
/// by [`ToolLog::close`] or on drop.
#[derive(Debug)]
pub struct ToolLog {
    path: PathBuf,
    file: File,
}

impl ToolLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HarnessError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| {
                HarnessError::io_system(
                    "IO.HARNESS_LOG",
                    format!(
                        "failed to create log directory '{}': {}",
                        parent.display(),
                        source
                    ),
                )
            })?;
        }
        let file = File::create(&path).map_err(|source| {
            HarnessError::io_system(
                "IO.HARNESS_LOG",
                format!("failed to open log '{}': {}", path.display(), source),
            )
        })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A handle sharing the log's file offset, suitable as a child's stdout.
    pub fn stdio(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.file.try_clone()?))
    }

    pub fn close(mut self) -> Result<(), HarnessError> {
        self.file
            .flush()
            .and_then(|()| self.file.sync_all())
            .map_err(|source| {
                HarnessError::io_system(
                    "IO.HARNESS_LOG",
                    format!("failed to close log '{}': {}", self.path.display(), source),
                )
            })
    }
}

impl Write for ToolLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget {
    Log,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: PathBuf,
    pub stdout: StdoutTarget,
}

impl ToolInvocation {
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<OsString>,
        current_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: current_dir.into(),
            stdout: StdoutTarget::Log,
        }
    }

    pub fn with_stdout(mut self, stdout: StdoutTarget) -> Self {
        self.stdout = stdout;
        self
    }

    /// Human-readable rendering for logs and reports; never executed.
    pub fn command_line(&self) -> String {
        std::iter::once(normalize_path(&self.program))
            .chain(self.args.iter().map(|arg| arg.to_string_lossy().into_owned()))
            .map(|token| quote_token(&token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Spawns the tool directly (no shell) and blocks until it exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ToolExecutor for ProcessExecutor {
    fn execute(&self, invocation: &ToolInvocation, log: &mut ToolLog) -> ToolOutcome {
        let stdout = match &invocation.stdout {
            StdoutTarget::Log => log.stdio(),
            StdoutTarget::File(path) => File::create(path).map(Stdio::from),
        };
        let stdout = match stdout {
            Ok(stdout) => stdout,
            Err(source) => {
                return ToolOutcome::LaunchFailed {
                    message: format!("failed to prepare stdout: {}", source),
                };
            }
        };

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.current_dir)
            .stdout(stdout);

        match command.status() {
            Ok(status) => ToolOutcome::from_status(status),
            Err(source) => ToolOutcome::LaunchFailed {
                message: source.to_string(),
            },
        }
    }
}

/// Program paths containing a directory component are anchored at the
/// working directory; bare names are left for `PATH` lookup.
pub fn resolve_program(config: &HarnessConfig, program: &Path) -> PathBuf {
    let bare_name = matches!(
        program.components().collect::<Vec<_>>().as_slice(),
        [Component::Normal(_)]
    );
    if bare_name {
        program.to_path_buf()
    } else {
        config.resolve(program)
    }
}

pub fn invocation_for(
    scenario: &Scenario,
    config: &HarnessConfig,
) -> Result<ToolInvocation, ScenarioTableError> {
    Ok(ToolInvocation::new(
        resolve_program(config, &config.tool_path),
        render_args(scenario, config)?,
        &config.working_dir,
    ))
}

/// Runs one scenario's tool invocation, appending its stdout to `log`.
pub fn run_scenario(
    scenario: &Scenario,
    config: &HarnessConfig,
    executor: &impl ToolExecutor,
    log: &mut ToolLog,
) -> Result<ToolOutcome, HarnessError> {
    let invocation = invocation_for(scenario, config)?;
    info!(
        scenario = %scenario.name,
        command = %invocation.command_line(),
        "running scenario"
    );

    let outcome = executor.execute(&invocation, log);
    if outcome.is_success() {
        info!(scenario = %scenario.name, "tool finished");
    } else {
        warn!(
            scenario = %scenario.name,
            outcome = %outcome.describe(),
            "tool did not finish cleanly"
        );
    }
    Ok(outcome)
}

fn quote_token(token: &str) -> String {
    if !token.is_empty()
        && !token
            .chars()
            .any(|character| character.is_whitespace() || character == '\'' || character == '"')
    {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::{
        ProcessExecutor, StdoutTarget, ToolInvocation, ToolLog, invocation_for, resolve_program,
        run_scenario,
    };
    use crate::common::HarnessConfig;
    use crate::domain::ToolOutcome;
    use crate::modules::scenarios::ScenarioTable;
    use crate::modules::traits::ToolExecutor;
    use crate::modules::verifier::output_pairs;
    use std::cell::RefCell;
    use std::ffi::OsString;
    use std::fs;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct EchoExecutor {
        calls: RefCell<Vec<ToolInvocation>>,
    }

    impl ToolExecutor for EchoExecutor {
        fn execute(&self, invocation: &ToolInvocation, log: &mut ToolLog) -> ToolOutcome {
            let line = invocation
                .args
                .iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(log, "{}", line).expect("log should accept writes");
            self.calls.borrow_mut().push(invocation.clone());
            ToolOutcome::Exited { code: 1 }
        }
    }

    #[test]
    fn invocation_uses_resolved_tool_and_working_dir() {
        let config = HarnessConfig::with_working_dir("/work/tests");
        let table = ScenarioTable::builtin();
        let invocation = invocation_for(&table.scenarios()[0], &config).expect("should render");

        assert_eq!(
            invocation.program,
            PathBuf::from("/work/tests/../bin/sumstat_harmoniser")
        );
        assert_eq!(invocation.current_dir, PathBuf::from("/work/tests"));
        assert_eq!(invocation.stdout, StdoutTarget::Log);
        assert_eq!(invocation.args[5], "output/test.strand_counts.tsv");
        assert!(
            invocation
                .command_line()
                .ends_with("--effAl_col effect_allele --otherAl_col other_allele")
        );
    }

    #[cfg(unix)]
    #[test]
    fn output_arguments_match_the_paths_the_verifier_reads() {
        let mut config = HarnessConfig::with_working_dir("/work/tests");
        config.output_dir = PathBuf::from("out\\dir");
        let table = ScenarioTable::builtin();
        let scenario = &table.scenarios()[0];

        let invocation = invocation_for(scenario, &config).expect("should render");
        let pairs = output_pairs(scenario, &config);

        assert_eq!(invocation.args[5], "out\\dir/test.strand_counts.tsv");
        assert_eq!(
            invocation.current_dir.join(&invocation.args[5]),
            pairs[0].actual_path
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_reach_the_tool_unchanged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut config = HarnessConfig::with_working_dir("/work/tests");
        config.output_dir = PathBuf::from(OsStr::from_bytes(b"out\xff"));
        let table = ScenarioTable::builtin();
        let scenario = &table.scenarios()[0];

        let invocation = invocation_for(scenario, &config).expect("should render");
        let pairs = output_pairs(scenario, &config);

        assert_eq!(
            invocation.args[5].as_bytes(),
            b"out\xff/test.strand_counts.tsv"
        );
        assert_eq!(
            invocation.current_dir.join(&invocation.args[5]),
            pairs[0].actual_path
        );
    }

    #[test]
    fn bare_program_names_stay_on_path() {
        let config = HarnessConfig::with_working_dir("/work");
        assert_eq!(
            resolve_program(&config, Path::new("bgzip")),
            PathBuf::from("bgzip")
        );
        assert_eq!(
            resolve_program(&config, Path::new("./bgzip")),
            PathBuf::from("/work/./bgzip")
        );
    }

    #[test]
    fn command_line_quotes_tokens_with_whitespace() {
        let invocation = ToolInvocation::new(
            "tool",
            vec![
                OsString::from("--palin_mode"),
                OsString::from("a b"),
                OsString::new(),
            ],
            ".",
        );
        assert_eq!(invocation.command_line(), "tool --palin_mode 'a b' ''");
    }

    #[test]
    fn log_is_shared_across_invocations_and_closed_once() {
        let temp = TempDir::new().expect("tempdir should be created");
        let config = HarnessConfig::with_working_dir(temp.path());
        let table = ScenarioTable::builtin();
        let executor = EchoExecutor {
            calls: RefCell::new(Vec::new()),
        };

        let log_path = temp.path().join("output/stdout.txt");
        let mut log = ToolLog::open(&log_path).expect("log should open");
        for scenario in table.scenarios() {
            let outcome =
                run_scenario(scenario, &config, &executor, &mut log).expect("scenario should run");
            assert_eq!(outcome, ToolOutcome::Exited { code: 1 });
        }
        log.close().expect("log should close");

        assert_eq!(executor.calls.borrow().len(), 3);
        let content = fs::read_to_string(&log_path).expect("log should be readable");
        assert_eq!(content.lines().count(), 3);
        assert!(content.lines().nth(1).unwrap_or_default().ends_with("--palin_mode infer"));
    }

    #[test]
    fn missing_program_is_reported_as_launch_failure() {
        let temp = TempDir::new().expect("tempdir should be created");
        let mut log = ToolLog::open(temp.path().join("stdout.txt")).expect("log should open");
        let invocation = ToolInvocation::new(
            temp.path().join("does-not-exist"),
            Vec::new(),
            temp.path(),
        );

        let outcome = ProcessExecutor.execute(&invocation, &mut log);
        assert!(matches!(outcome, ToolOutcome::LaunchFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn process_executor_appends_child_stdout_and_maps_exit_codes() {
        let temp = TempDir::new().expect("tempdir should be created");
        let script = write_script(temp.path(), "tool.sh", "echo \"run $1\"\nexit \"$2\"\n");
        let log_path = temp.path().join("stdout.txt");
        let mut log = ToolLog::open(&log_path).expect("log should open");

        let ok = shell_invocation(&script, &["first", "0"], temp.path());
        let failing = shell_invocation(&script, &["second", "7"], temp.path());

        assert_eq!(ProcessExecutor.execute(&ok, &mut log), ToolOutcome::Succeeded);
        assert_eq!(
            ProcessExecutor.execute(&failing, &mut log),
            ToolOutcome::Exited { code: 7 }
        );
        log.close().expect("log should close");

        assert_eq!(
            fs::read_to_string(&log_path).expect("log should be readable"),
            "run first\nrun second\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn process_executor_can_redirect_stdout_to_a_file() {
        let temp = TempDir::new().expect("tempdir should be created");
        let script = write_script(temp.path(), "cat.sh", "printf 'payload'\n");
        let target = temp.path().join("captured.bin");
        let mut log = ToolLog::open(temp.path().join("stdout.txt")).expect("log should open");

        let invocation = shell_invocation(&script, &[], temp.path())
            .with_stdout(StdoutTarget::File(target.clone()));
        assert_eq!(
            ProcessExecutor.execute(&invocation, &mut log),
            ToolOutcome::Succeeded
        );
        assert_eq!(
            fs::read_to_string(&target).expect("capture should exist"),
            "payload"
        );
    }

    // Scripts run through `sh` so they never need the exec bit.
    #[cfg(unix)]
    fn shell_invocation(script: &Path, args: &[&str], dir: &Path) -> ToolInvocation {
        let mut tokens = vec![script.as_os_str().to_os_string()];
        tokens.extend(args.iter().map(OsString::from));
        ToolInvocation::new("/bin/sh", tokens, dir)
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("script should be written");
        path
    }
}
