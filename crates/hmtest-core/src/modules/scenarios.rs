use crate::common::HarnessConfig;
use crate::domain::{HarnessError, Scenario, ScenarioOutput};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
struct ScenarioTemplate {
    name: &'static str,
    args: &'static [&'static str],
    outputs: &'static [OutputTemplate],
}

#[derive(Debug, Clone, Copy)]
struct OutputTemplate {
    id: &'static str,
    file: &'static str,
    expected: &'static str,
}

const BUILTIN_SCENARIOS: [ScenarioTemplate; 3] = [
    ScenarioTemplate {
        name: "--strand_counts",
        args: &[
            "--sumstats",
            "{sumstats}",
            "--vcf",
            "{reference}",
            "--strand_counts",
            "{output:strand_counts}",
            "--chrom_col",
            "chrom",
            "--pos_col",
            "pos",
            "--effAl_col",
            "effect_allele",
            "--otherAl_col",
            "other_allele",
        ],
        outputs: &[OutputTemplate {
            id: "strand_counts",
            file: "test.strand_counts.tsv",
            expected: "test.strand_counts.expected.tsv",
        }],
    },
    ScenarioTemplate {
        name: "--palin_mode infer",
        args: &[
            "--sumstats",
            "{sumstats}",
            "--vcf",
            "{reference}",
            "--hm_sumstats",
            "{output:harmonised}",
            "--hm_statfile",
            "{output:stats}",
            "--chrom_col",
            "chrom",
            "--pos_col",
            "pos",
            "--effAl_col",
            "effect_allele",
            "--otherAl_col",
            "other_allele",
            "--eaf_col",
            "eaf",
            "--beta_col",
            "beta",
            "--infer_maf_threshold",
            "0.42",
            "--af_vcf_field",
            "AF_NFE",
            "--palin_mode",
            "infer",
        ],
        outputs: &[
            OutputTemplate {
                id: "harmonised",
                file: "test.palin_infer.harmonised.tsv",
                expected: "test.palin_infer.harmonised.expected.tsv",
            },
            OutputTemplate {
                id: "stats",
                file: "test.palin_infer.stats.tsv",
                expected: "test.palin_infer.stats.expected.tsv",
            },
        ],
    },
    ScenarioTemplate {
        name: "--palin_mode forward",
        args: &[
            "--sumstats",
            "{sumstats}",
            "--vcf",
            "{reference}",
            "--hm_sumstats",
            "{output:harmonised}",
            "--hm_statfile",
            "{output:stats}",
            "--chrom_col",
            "chrom",
            "--pos_col",
            "pos",
            "--effAl_col",
            "effect_allele",
            "--otherAl_col",
            "other_allele",
            "--eaf_col",
            "eaf",
            "--beta_col",
            "beta",
            "--palin_mode",
            "forward",
        ],
        outputs: &[
            OutputTemplate {
                id: "harmonised",
                file: "test.palin_forward.harmonised.tsv",
                expected: "test.palin_forward.harmonised.expected.tsv",
            },
            OutputTemplate {
                id: "stats",
                file: "test.palin_forward.stats.tsv",
                expected: "test.palin_forward.stats.expected.tsv",
            },
        ],
    },
];

impl ScenarioTemplate {
    fn to_scenario(self) -> Scenario {
        Scenario::new(
            self.name,
            self.args.iter().map(|arg| arg.to_string()).collect(),
            self.outputs
                .iter()
                .map(|output| ScenarioOutput::new(output.id, output.file, output.expected))
                .collect(),
        )
    }
}

/// Ordered, validated list of scenarios for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioTable {
    scenarios: Vec<Scenario>,
}

impl ScenarioTable {
    pub fn builtin() -> Self {
        Self {
            scenarios: BUILTIN_SCENARIOS
                .iter()
                .copied()
                .map(ScenarioTemplate::to_scenario)
                .collect(),
        }
    }

    pub fn new(scenarios: Vec<Scenario>) -> Result<Self, ScenarioTableError> {
        let table = Self { scenarios };
        table.validate()?;
        Ok(table)
    }

    pub fn from_manifest_path(path: impl AsRef<Path>) -> Result<Self, ScenarioTableError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|source| ScenarioTableError::ReadManifest {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_manifest_str(&content, path)
    }

    pub fn from_manifest_json(manifest_json: &str) -> Result<Self, ScenarioTableError> {
        Self::from_manifest_str(manifest_json, Path::new("<inline-manifest>"))
    }

    /// Built-in table unless the config names a manifest, narrowed by the
    /// configured name filters.
    pub fn for_config(config: &HarnessConfig) -> Result<Self, ScenarioTableError> {
        let table = match &config.scenario_manifest {
            Some(path) => Self::from_manifest_path(config.resolve(path))?,
            None => Self::builtin(),
        };
        table.filtered(&config.scenario_filters)
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Keeps scenarios whose name matches any pattern; no patterns keeps all.
    pub fn filtered(self, patterns: &[String]) -> Result<Self, ScenarioTableError> {
        if patterns.is_empty() {
            return Ok(self);
        }

        let matcher = compile_filters(patterns)?;
        let scenarios: Vec<Scenario> = self
            .scenarios
            .into_iter()
            .filter(|scenario| matcher.is_match(&scenario.name))
            .collect();
        if scenarios.is_empty() {
            return Err(ScenarioTableError::NoScenarioSelected {
                patterns: patterns.to_vec(),
            });
        }
        Ok(Self { scenarios })
    }

    fn from_manifest_str(content: &str, path: &Path) -> Result<Self, ScenarioTableError> {
        let raw: RawManifest =
            serde_json::from_str(content).map_err(|source| ScenarioTableError::ParseManifest {
                path: path.to_path_buf(),
                source,
            })?;
        let scenarios = raw
            .scenarios
            .into_iter()
            .map(|scenario| {
                Scenario::new(
                    scenario.name,
                    scenario.args,
                    scenario
                        .outputs
                        .into_iter()
                        .map(|output| ScenarioOutput::new(output.id, output.file, output.expected))
                        .collect(),
                )
            })
            .collect();
        Self::new(scenarios)
    }

    fn validate(&self) -> Result<(), ScenarioTableError> {
        if self.scenarios.is_empty() {
            return Err(ScenarioTableError::Empty);
        }

        let defaults = HarnessConfig::default();
        let mut names = BTreeSet::new();
        for scenario in &self.scenarios {
            if !names.insert(scenario.name.as_str()) {
                return Err(ScenarioTableError::DuplicateScenario(scenario.name.clone()));
            }
            if scenario.outputs.is_empty() {
                return Err(ScenarioTableError::NoOutputs(scenario.name.clone()));
            }

            let mut output_ids = BTreeSet::new();
            for output in &scenario.outputs {
                if !output_ids.insert(output.id.as_str()) {
                    return Err(ScenarioTableError::DuplicateOutput {
                        scenario: scenario.name.clone(),
                        id: output.id.clone(),
                    });
                }
            }

            render_args(scenario, &defaults)?;
        }
        Ok(())
    }
}

/// Substitutes `{sumstats}`, `{reference}` and `{output:<id>}` in every
/// argument. Paths are spliced in as raw OS strings, byte for byte as
/// configured. The chromosome wildcard in the reference pattern is passed
/// through untouched.
pub fn render_args(
    scenario: &Scenario,
    config: &HarnessConfig,
) -> Result<Vec<OsString>, ScenarioTableError> {
    scenario
        .args
        .iter()
        .map(|token| render_token(token, scenario, config))
        .collect()
}

fn render_token(
    token: &str,
    scenario: &Scenario,
    config: &HarnessConfig,
) -> Result<OsString, ScenarioTableError> {
    let mut rendered = OsString::with_capacity(token.len());
    let mut rest = token;
    while let Some(start) = rest.find('{') {
        let Some(length) = rest[start..].find('}') else {
            break;
        };
        let key = &rest[start + 1..start + length];
        rendered.push(&rest[..start]);
        rendered.push(placeholder_value(key, scenario, config)?);
        rest = &rest[start + length + 1..];
    }
    rendered.push(rest);
    Ok(rendered)
}

fn placeholder_value(
    key: &str,
    scenario: &Scenario,
    config: &HarnessConfig,
) -> Result<OsString, ScenarioTableError> {
    match key {
        "sumstats" => Ok(config.sumstats_path.clone().into_os_string()),
        "reference" => Ok(OsString::from(&config.reference_pattern)),
        _ => {
            let Some(id) = key.strip_prefix("output:") else {
                return Err(ScenarioTableError::UnknownPlaceholder {
                    scenario: scenario.name.clone(),
                    placeholder: key.to_string(),
                });
            };
            scenario
                .output(id)
                .map(|output| config.output_path(&output.file).into_os_string())
                .ok_or_else(|| ScenarioTableError::UnknownOutput {
                    scenario: scenario.name.clone(),
                    id: id.to_string(),
                })
        }
    }
}

fn compile_filters(patterns: &[String]) -> Result<GlobSet, ScenarioTableError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| ScenarioTableError::InvalidFilter {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|source| ScenarioTableError::InvalidFilter {
            pattern: patterns.join(", "),
            source,
        })
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioTableError {
    #[error("failed to read scenario manifest '{}': {source}", path.display())]
    ReadManifest {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse scenario manifest '{}': {source}", path.display())]
    ParseManifest {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("scenario table is empty")]
    Empty,
    #[error("duplicate scenario name '{0}'")]
    DuplicateScenario(String),
    #[error("scenario '{0}' declares no expected outputs")]
    NoOutputs(String),
    #[error("scenario '{scenario}' declares output '{id}' more than once")]
    DuplicateOutput { scenario: String, id: String },
    #[error("scenario '{scenario}' uses unknown placeholder '{{{placeholder}}}'")]
    UnknownPlaceholder {
        scenario: String,
        placeholder: String,
    },
    #[error("scenario '{scenario}' references undeclared output '{id}'")]
    UnknownOutput { scenario: String, id: String },
    #[error("invalid scenario filter '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        source: globset::Error,
    },
    #[error("no scenario matches filter(s) {patterns:?}")]
    NoScenarioSelected { patterns: Vec<String> },
}

impl From<ScenarioTableError> for HarnessError {
    fn from(error: ScenarioTableError) -> Self {
        let message = error.to_string();
        match error {
            ScenarioTableError::ReadManifest { .. } => {
                HarnessError::io_system("IO.SCENARIO_MANIFEST", message)
            }
            ScenarioTableError::ParseManifest { .. } => {
                HarnessError::input_validation("INPUT.SCENARIO_MANIFEST", message)
            }
            ScenarioTableError::InvalidFilter { .. }
            | ScenarioTableError::NoScenarioSelected { .. } => {
                HarnessError::input_validation("INPUT.SCENARIO_FILTER", message)
            }
            ScenarioTableError::Empty
            | ScenarioTableError::DuplicateScenario(_)
            | ScenarioTableError::NoOutputs(_)
            | ScenarioTableError::DuplicateOutput { .. }
            | ScenarioTableError::UnknownPlaceholder { .. }
            | ScenarioTableError::UnknownOutput { .. } => {
                HarnessError::input_validation("INPUT.SCENARIO_TABLE", message)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    scenarios: Vec<RawScenario>,
}

#[derive(Debug, Deserialize)]
struct RawScenario {
    name: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    outputs: Vec<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    id: String,
    file: String,
    expected: String,
}
