//! Harness configuration.
//!
//! Every path is kept exactly as configured so it can be handed to the
//! external tool verbatim; [`HarnessConfig::resolve`] anchors a path at the
//! working directory when the harness itself needs to touch the file.

use std::path::{Path, PathBuf};

pub const DEFAULT_TOOL_PATH: &str = "../bin/sumstat_harmoniser";
pub const DEFAULT_SUMSTATS_PATH: &str = "test_data/sum_stats.testdata.tsv";
pub const DEFAULT_REFERENCE_SOURCE: &str = "test_data/reference_chr1_vcf.testdata.vcf";
pub const DEFAULT_REFERENCE_PATTERN: &str = "test_data/reference_chr#_vcf.testdata.vcf.gz";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_EXPECTED_DIR: &str = "expected_output";
pub const DEFAULT_LOG_PATH: &str = "output/stdout.txt";
pub const DEFAULT_REPORT_PATH: &str = "output/report.json";
pub const DEFAULT_COMPRESS_TOOL: &str = "bgzip";
pub const DEFAULT_INDEX_TOOL: &str = "tabix";

/// Token standing in for "any chromosome" in the reference pattern.
pub const CHROMOSOME_WILDCARD: char = '#';

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub working_dir: PathBuf,
    pub tool_path: PathBuf,
    pub sumstats_path: PathBuf,
    pub reference_source: PathBuf,
    pub reference_pattern: String,
    pub output_dir: PathBuf,
    pub expected_dir: PathBuf,
    pub log_path: PathBuf,
    pub report_path: PathBuf,
    pub compress_tool: PathBuf,
    pub index_tool: PathBuf,
    pub scenario_manifest: Option<PathBuf>,
    pub scenario_filters: Vec<String>,
    pub skip_fixture: bool,
    pub require_tool_success: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            tool_path: PathBuf::from(DEFAULT_TOOL_PATH),
            sumstats_path: PathBuf::from(DEFAULT_SUMSTATS_PATH),
            reference_source: PathBuf::from(DEFAULT_REFERENCE_SOURCE),
            reference_pattern: DEFAULT_REFERENCE_PATTERN.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            expected_dir: PathBuf::from(DEFAULT_EXPECTED_DIR),
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            compress_tool: PathBuf::from(DEFAULT_COMPRESS_TOOL),
            index_tool: PathBuf::from(DEFAULT_INDEX_TOOL),
            scenario_manifest: None,
            scenario_filters: Vec::new(),
            skip_fixture: false,
            require_tool_success: true,
        }
    }
}

impl HarnessConfig {
    pub fn with_working_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Self::default()
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_path(&self.working_dir, path)
    }

    /// Path handed to the tool for an output file name.
    pub fn output_path(&self, file: &str) -> PathBuf {
        self.output_dir.join(file)
    }

    pub fn expected_path(&self, file: &str) -> PathBuf {
        self.expected_dir.join(file)
    }

    /// Concrete reference path for one chromosome.
    pub fn reference_for_chromosome(&self, chromosome: &str) -> PathBuf {
        PathBuf::from(
            self.reference_pattern
                .replace(CHROMOSOME_WILDCARD, chromosome),
        )
    }

    /// Chromosome token under which `path` is reachable through the
    /// reference pattern, if any.
    pub fn reference_chromosome(&self, path: &Path) -> Option<String> {
        let (prefix, suffix) = self.reference_pattern.split_once(CHROMOSOME_WILDCARD)?;
        let prefix = normalize_path(&self.resolve(Path::new(prefix)));
        let candidate = normalize_path(path);
        let chromosome = candidate
            .strip_prefix(prefix.as_str())?
            .strip_suffix(suffix)?;
        (!chromosome.is_empty() && !chromosome.contains('/')).then(|| chromosome.to_string())
    }
}

pub fn resolve_path(working_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::{HarnessConfig, resolve_path};
    use std::path::{Path, PathBuf};

    #[test]
    fn defaults_follow_test_directory_layout() {
        let config = HarnessConfig::default();
        assert_eq!(config.tool_path, PathBuf::from("../bin/sumstat_harmoniser"));
        assert_eq!(config.log_path, PathBuf::from("output/stdout.txt"));
        assert!(config.require_tool_success);
        assert!(config.scenario_manifest.is_none());
    }

    #[test]
    fn relative_paths_resolve_against_working_dir() {
        let config = HarnessConfig::with_working_dir("/data/tests");
        assert_eq!(
            config.resolve(Path::new("output/stdout.txt")),
            PathBuf::from("/data/tests/output/stdout.txt")
        );
        assert_eq!(
            resolve_path(Path::new("/data/tests"), Path::new("/abs/file.tsv")),
            PathBuf::from("/abs/file.tsv")
        );
    }

    #[test]
    fn reference_pattern_expands_per_chromosome() {
        let config = HarnessConfig::default();
        assert_eq!(
            config.reference_for_chromosome("1"),
            PathBuf::from("test_data/reference_chr1_vcf.testdata.vcf.gz")
        );
        assert_eq!(
            config.output_path("test.strand_counts.tsv"),
            PathBuf::from("output/test.strand_counts.tsv")
        );
    }

    #[test]
    fn reference_chromosome_matches_prepared_fixture() {
        let config = HarnessConfig::with_working_dir("/data/tests");
        assert_eq!(
            config.reference_chromosome(Path::new(
                "/data/tests/test_data/reference_chr1_vcf.testdata.vcf.gz"
            )),
            Some("1".to_string())
        );
        assert_eq!(
            config.reference_chromosome(Path::new(
                "/data/tests/test_data/reference_chr1_vcf.testdata.vcf"
            )),
            None
        );

        let mut literal = HarnessConfig::default();
        literal.reference_pattern = "panel.vcf.gz".to_string();
        assert_eq!(
            literal.reference_chromosome(Path::new("./panel.vcf.gz")),
            None
        );
    }
}
