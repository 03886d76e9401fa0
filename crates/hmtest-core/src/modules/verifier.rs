use super::digest::{DigestError, FileDigest, digest_file, first_divergence};
use crate::common::HarnessConfig;
use crate::common::config::normalize_path;
use crate::domain::Scenario;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OutputPair {
    pub actual_path: PathBuf,
    pub expected_path: PathBuf,
}

impl OutputPair {
    pub fn new(actual_path: impl Into<PathBuf>, expected_path: impl Into<PathBuf>) -> Self {
        Self {
            actual_path: actual_path.into(),
            expected_path: expected_path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputVerdict {
    pub actual_path: String,
    pub expected_path: String,
    pub passed: bool,
    pub reason: Option<String>,
    pub actual_digest: Option<FileDigest>,
    pub expected_digest: Option<FileDigest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    pub outputs: Vec<OutputVerdict>,
}

impl Verdict {
    pub fn first_failure(&self) -> Option<&OutputVerdict> {
        self.outputs.iter().find(|output| !output.passed)
    }
}

/// Pairs each declared output with its golden file, resolved against the
/// working directory.
pub fn output_pairs(scenario: &Scenario, config: &HarnessConfig) -> Vec<OutputPair> {
    scenario
        .outputs
        .iter()
        .map(|output| {
            OutputPair::new(
                config.resolve(&config.output_path(&output.file)),
                config.resolve(&config.expected_path(&output.expected)),
            )
        })
        .collect()
}

/// Passes only when every actual digest equals its expected digest.
pub fn verify_outputs(pairs: &[OutputPair]) -> Verdict {
    let outputs: Vec<OutputVerdict> = pairs.iter().map(verify_pair).collect();
    let passed = !outputs.is_empty() && outputs.iter().all(|output| output.passed);
    Verdict { passed, outputs }
}

fn verify_pair(pair: &OutputPair) -> OutputVerdict {
    let actual = digest_file(&pair.actual_path);
    let expected = digest_file(&pair.expected_path);

    let reason = match (&actual, &expected) {
        (Ok(actual), Ok(expected)) if actual.hex == expected.hex => None,
        (Ok(actual), Ok(expected)) => Some(mismatch_reason(pair, actual, expected)),
        (Err(error), _) => Some(access_reason("actual", error)),
        (_, Err(error)) => Some(access_reason("expected", error)),
    };

    let verdict = OutputVerdict {
        actual_path: normalize_path(&pair.actual_path),
        expected_path: normalize_path(&pair.expected_path),
        passed: reason.is_none(),
        reason,
        actual_digest: actual.ok(),
        expected_digest: expected.ok(),
    };
    debug!(
        actual = %verdict.actual_path,
        expected = %verdict.expected_path,
        passed = verdict.passed,
        "compared output digest"
    );
    verdict
}

fn mismatch_reason(pair: &OutputPair, actual: &FileDigest, expected: &FileDigest) -> String {
    let location = match first_divergence(&pair.expected_path, &pair.actual_path) {
        Ok(Some(offset)) => format!("first difference at byte {}", offset),
        Ok(None) => "no byte difference found on re-read".to_string(),
        Err(error) => format!("re-read failed: {}", error),
    };
    format!(
        "Digest mismatch ({}; expected={} bytes, actual={} bytes).",
        location, expected.bytes, actual.bytes
    )
}

fn access_reason(side: &str, error: &DigestError) -> String {
    if error.is_not_found() {
        format!("Missing {} output", side)
    } else {
        format!("Unreadable {} output: {}", side, error)
    }
}

#[cfg(test)]
mod tests {
    use super::{OutputPair, output_pairs, verify_outputs};
    use crate::common::HarnessConfig;
    use crate::modules::scenarios::ScenarioTable;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    #[test]
    fn identical_outputs_pass() {
        let temp = TempDir::new().expect("tempdir should be created");
        let expected = write_file(temp.path(), "expected/a.tsv", "chrom\tpos\n1\t100\n");
        let actual = write_file(temp.path(), "output/a.tsv", "chrom\tpos\n1\t100\n");

        let verdict = verify_outputs(&[OutputPair::new(&actual, &expected)]);
        assert!(verdict.passed);
        assert!(verdict.first_failure().is_none());
        let output = &verdict.outputs[0];
        assert_eq!(output.actual_digest, output.expected_digest);
    }

    #[test]
    fn both_outputs_must_match_for_a_pass() {
        let temp = TempDir::new().expect("tempdir should be created");
        let pairs = vec![
            OutputPair::new(
                write_file(temp.path(), "output/h.tsv", "same\n"),
                write_file(temp.path(), "expected/h.tsv", "same\n"),
            ),
            OutputPair::new(
                write_file(temp.path(), "output/s.tsv", "n=10\n"),
                write_file(temp.path(), "expected/s.tsv", "n=11\n"),
            ),
        ];

        let verdict = verify_outputs(&pairs);
        assert!(!verdict.passed);
        assert!(verdict.outputs[0].passed);
        let failure = verdict.first_failure().expect("second output should fail");
        assert!(failure.actual_path.ends_with("output/s.tsv"));
        assert_eq!(
            failure.reason.as_deref(),
            Some("Digest mismatch (first difference at byte 3; expected=5 bytes, actual=5 bytes).")
        );
    }

    #[test]
    fn missing_files_fail_with_named_side() {
        let temp = TempDir::new().expect("tempdir should be created");
        let expected = write_file(temp.path(), "expected/a.tsv", "x\n");
        let actual = write_file(temp.path(), "output/b.tsv", "x\n");

        let missing_actual = verify_outputs(&[OutputPair::new(
            temp.path().join("output/a.tsv"),
            &expected,
        )]);
        assert!(!missing_actual.passed);
        assert_eq!(
            missing_actual.outputs[0].reason.as_deref(),
            Some("Missing actual output")
        );
        assert!(missing_actual.outputs[0].expected_digest.is_some());

        let missing_expected = verify_outputs(&[OutputPair::new(
            &actual,
            temp.path().join("expected/b.tsv"),
        )]);
        assert_eq!(
            missing_expected.outputs[0].reason.as_deref(),
            Some("Missing expected output")
        );
    }

    #[test]
    fn empty_pair_list_never_passes() {
        assert!(!verify_outputs(&[]).passed);
    }

    #[test]
    fn output_pairs_resolve_output_and_expected_dirs() {
        let config = HarnessConfig::with_working_dir("/work");
        let table = ScenarioTable::builtin();
        let pairs = output_pairs(&table.scenarios()[2], &config);

        assert_eq!(pairs.len(), 2);
        assert_eq!(
            pairs[0].actual_path,
            PathBuf::from("/work/output/test.palin_forward.harmonised.tsv")
        );
        assert_eq!(
            pairs[1].expected_path,
            PathBuf::from("/work/expected_output/test.palin_forward.stats.expected.tsv")
        );
    }

    fn write_file(root: &Path, relative_path: &str, content: &str) -> PathBuf {
        let path = root.join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir should be created");
        }
        fs::write(&path, content).expect("file should be written");
        path
    }
}
