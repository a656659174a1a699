use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::GhaperfError;
use crate::providers::github::JobNameRules;

const CANDIDATES: [&str; 4] = ["ghaperf.yaml", "ghaperf.yml", "ghaperf.toml", "ghaperf.json"];

const TEMPLATE: &str = r#"# ghaperf configuration
#
# Job name patterns are regular expressions matched against the whole job
# name, so `build` matches only "build" while `build.*` also matches
# "build (ubuntu-latest)".

# Only analyze jobs matching one of these patterns. Empty means all jobs.
job_names: []

# Never analyze jobs matching one of these patterns. Wins over job_names.
excluded_job_names: []

# Rename jobs before aggregating them, e.g. to merge the legs of a matrix.
# The first matching pattern wins and `$1` refers to a capture group:
#
# job_name_mappings:
#   'test \((.*)\)': test
job_name_mappings: {}

output:
  # summary, json or markdown
  format: summary
  pretty: false
"#;

/// Configuration file structure for ghaperf.
///
/// Selects and renames jobs before aggregation. Loaded from the current
/// directory or a given path, in YAML, TOML or JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Patterns of job names to analyze
    #[serde(default, alias = "job-names")]
    pub job_names: Vec<String>,

    /// Patterns of job names to leave out
    #[serde(default, alias = "excluded-job-names")]
    pub excluded_job_names: Vec<String>,

    /// Pattern to normalized name, applied in order
    #[serde(default, alias = "job-name-mappings")]
    pub job_name_mappings: IndexMap<String, String>,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(skip)]
    patterns: JobNamePatterns,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
    Markdown,
}

#[derive(Debug, Clone, Default)]
struct JobNamePatterns {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    mappings: Vec<(Regex, String)>,
}

/// Compiles a pattern that must match the whole job name.
fn anchored(pattern: &str) -> std::result::Result<Regex, GhaperfError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| GhaperfError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl Config {
    /// Builds a configuration from job name rules, validating every pattern.
    #[cfg(test)]
    pub fn new(
        job_names: Vec<String>,
        excluded_job_names: Vec<String>,
        job_name_mappings: IndexMap<String, String>,
    ) -> std::result::Result<Self, GhaperfError> {
        let mut config = Self {
            job_names,
            excluded_job_names,
            job_name_mappings,
            ..Self::default()
        };
        config.compile()?;
        Ok(config)
    }

    fn compile(&mut self) -> std::result::Result<(), GhaperfError> {
        self.patterns = JobNamePatterns {
            include: self
                .job_names
                .iter()
                .map(|p| anchored(p))
                .collect::<std::result::Result<_, _>>()?,
            exclude: self
                .excluded_job_names
                .iter()
                .map(|p| anchored(p))
                .collect::<std::result::Result<_, _>>()?,
            mappings: self
                .job_name_mappings
                .iter()
                .map(|(p, name)| Ok((anchored(p)?, name.clone())))
                .collect::<std::result::Result<_, GhaperfError>>()?,
        };
        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./ghaperf.yaml
    /// 3. ./ghaperf.yml
    /// 4. ./ghaperf.toml
    /// 5. ./ghaperf.json
    ///
    /// Returns default configuration if no file is found. A specified path
    /// that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_dir(Path::new(".")),
        }
    }

    fn load_from_dir(dir: &Path) -> Result<Self> {
        for candidate in CANDIDATES {
            let path = dir.join(candidate);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let mut config: Self = match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        config
            .compile()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        log::debug!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Writes a commented configuration template.
    ///
    /// # Errors
    ///
    /// Refuses to overwrite an existing file.
    pub fn write_template(path: Option<&Path>) -> Result<PathBuf> {
        let path = path.map_or_else(|| PathBuf::from(CANDIDATES[0]), Path::to_path_buf);

        if path.exists() {
            bail!("Config file already exists: {}", path.display());
        }

        std::fs::write(&path, TEMPLATE)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(path)
    }
}

impl JobNameRules for Config {
    fn include(&self, job_name: &str) -> bool {
        if self.patterns.exclude.iter().any(|re| re.is_match(job_name)) {
            return false;
        }
        self.patterns.include.is_empty()
            || self.patterns.include.iter().any(|re| re.is_match(job_name))
    }

    fn normalize_job_name(&self, job_name: &str) -> String {
        self.patterns
            .mappings
            .iter()
            .find(|(re, _)| re.is_match(job_name))
            .map_or_else(
                || job_name.to_string(),
                |(re, name)| re.replace(job_name, name.as_str()).into_owned(),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn rules(include: &[&str], exclude: &[&str], mappings: &[(&str, &str)]) -> Config {
        Config::new(
            include.iter().map(ToString::to_string).collect(),
            exclude.iter().map(ToString::to_string).collect(),
            mappings
                .iter()
                .map(|(p, n)| (p.to_string(), n.to_string()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.job_names.is_empty());
        assert_eq!(config.output.format, OutputFormat::Summary);
        assert!(!config.output.pretty);
        assert!(config.include("anything"));
        assert_eq!(config.normalize_job_name("build"), "build");
    }

    #[test]
    fn test_patterns_match_whole_name() {
        let config = rules(&["build"], &[], &[]);
        assert!(config.include("build"));
        assert!(!config.include("build (ubuntu)"));
        assert!(!config.include("prebuild"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let config = rules(&["test.*"], &["test \\(windows\\)"], &[]);
        assert!(config.include("test (ubuntu)"));
        assert!(!config.include("test (windows)"));
        assert!(!config.include("lint"));
    }

    #[test]
    fn test_first_mapping_wins() {
        let config = rules(
            &[],
            &[],
            &[("test \\(.*\\)", "test"), ("test \\(ubuntu\\)", "ubuntu")],
        );
        assert_eq!(config.normalize_job_name("test (ubuntu)"), "test");
        assert_eq!(config.normalize_job_name("lint"), "lint");
    }

    #[test]
    fn test_mapping_expands_captures() {
        let config = rules(&[], &[], &[("(\\w+) / .*", "$1")]);
        assert_eq!(config.normalize_job_name("deploy / staging"), "deploy");
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let result = Config::new(vec!["build(".to_string()], vec![], IndexMap::new());
        assert!(matches!(
            result,
            Err(GhaperfError::InvalidPattern { pattern, .. }) if pattern == "build("
        ));
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            temp_file,
            r#"
job_names:
  - "test.*"
excluded_job_names:
  - "test \\(windows\\)"
job_name_mappings:
  "test \\(.*\\)": test
output:
  format: markdown
"#
        )
        .unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.output.format, OutputFormat::Markdown);
        assert!(!config.include("test (windows)"));
        assert_eq!(config.normalize_job_name("test (macos)"), "test");
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            temp_file,
            r#"
excluded-job-names = ["docs"]

[output]
format = "json"
pretty = true
"#
        )
        .unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);
        assert!(!config.include("docs"));
    }

    #[test]
    fn test_load_json_config_keeps_mapping_order() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(
            temp_file,
            r#"{{"job_name_mappings": {{"b.*": "second", "a.*": "first"}}}}"#
        )
        .unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        let keys: Vec<_> = config.job_name_mappings.keys().collect();
        assert_eq!(keys, vec!["b.*", "a.*"]);
    }

    #[test]
    fn test_load_invalid_pattern_fails() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "job_names: ['[unclosed']\n").unwrap();

        assert!(Config::load(Some(temp_file.path())).is_err());
    }

    #[test]
    fn test_load_nonexistent_config_fails() {
        assert!(Config::load(Some(Path::new("nonexistent.yaml"))).is_err());
    }

    #[test]
    fn test_load_from_dir_candidates() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("ghaperf.toml"),
            "job_names = [\"build\"]\n",
        )
        .unwrap();

        let config = Config::load_from_dir(temp_dir.path()).unwrap();
        assert_eq!(config.job_names, vec!["build"]);
    }

    #[test]
    fn test_load_from_empty_dir_is_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_dir(temp_dir.path()).unwrap();
        assert!(config.job_names.is_empty());
    }

    #[test]
    fn test_template_loads() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("ghaperf.yaml");

        let written = Config::write_template(Some(&path)).unwrap();
        assert_eq!(written, path);

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.job_name_mappings.is_empty());
        assert_eq!(config.output.format, OutputFormat::Summary);
    }

    #[test]
    fn test_template_never_overwrites() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("ghaperf.yaml");
        std::fs::write(&path, "job_names: []\n").unwrap();

        assert!(Config::write_template(Some(&path)).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "job_names: []\n");
    }
}
