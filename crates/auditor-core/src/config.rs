//! Audit configuration
//!
//! Settings come from a YAML file (`~/.aws_auditor.yml` by default). A missing
//! file yields the defaults. Ignore patterns are compiled once, before any
//! inventory is fetched, so a bad pattern fails the run up front.

use crate::error::{AuditError, Result};
use crate::record::ResourceKind;
use crate::report::AuditMode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_FILE_NAME: &str = ".aws_auditor.yml";
pub const DEFAULT_TAG_NAME: &str = "no-reserved-instance";
pub const DEFAULT_REASON_TAG_NAME: &str = "reason";
pub const DEFAULT_RETIREMENT_WINDOW_DAYS: u32 = 7;

/// What to do with a payload the normalizer rejects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Log a warning, record it on the report and continue.
    #[default]
    Skip,
    /// Fail the whole audit unit.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Tag key marking a resource as exempt until the date it carries.
    pub tag_name: Option<String>,
    /// Disables the watched tag even when `tag_name` is set.
    pub no_tag: bool,
    pub reason_tag_name: String,
    pub ignore_instances_patterns: Vec<String>,
    pub retirement_window_days: u32,
    pub kinds: Vec<ResourceKind>,
    pub regions: Vec<String>,
    pub mode: AuditMode,
    pub on_malformed: MalformedPolicy,
    pub display_name: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            tag_name: Some(DEFAULT_TAG_NAME.to_string()),
            no_tag: false,
            reason_tag_name: DEFAULT_REASON_TAG_NAME.to_string(),
            ignore_instances_patterns: Vec::new(),
            retirement_window_days: DEFAULT_RETIREMENT_WINDOW_DAYS,
            kinds: ResourceKind::ALL.to_vec(),
            regions: Vec::new(),
            mode: AuditMode::All,
            on_malformed: MalformedPolicy::Skip,
            display_name: None,
        }
    }
}

/// Path of the per-user config file (`~/.aws_auditor.yml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

impl AuditConfig {
    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_yaml(&content).map_err(|reason| AuditError::ConfigError {
            path: path.display().to_string(),
            reason,
        })?;
        info!("Loaded audit configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }

    /// The effective watched tag, honoring `no_tag`.
    pub fn watched_tag(&self) -> Option<&str> {
        if self.no_tag {
            None
        } else {
            self.tag_name.as_deref().filter(|name| !name.is_empty())
        }
    }

    /// Validate and compile into the form the engine consumes.
    pub fn compile(&self) -> Result<CompiledConfig> {
        let ignore = IgnorePatterns::compile(&self.ignore_instances_patterns)?;
        let mut kinds = self.kinds.clone();
        kinds.sort();
        kinds.dedup();

        Ok(CompiledConfig {
            watched_tag: self.watched_tag().map(str::to_string),
            reason_tag: self.reason_tag_name.clone(),
            ignore,
            retirement_window_days: self.retirement_window_days,
            kinds,
            regions: self.regions.clone(),
            mode: self.mode,
            on_malformed: self.on_malformed,
        })
    }
}

/// Validated configuration shared read-only by every audit unit.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub watched_tag: Option<String>,
    pub reason_tag: String,
    pub ignore: IgnorePatterns,
    pub retirement_window_days: u32,
    pub kinds: Vec<ResourceKind>,
    pub regions: Vec<String>,
    pub mode: AuditMode,
    pub on_malformed: MalformedPolicy,
}

impl Default for CompiledConfig {
    fn default() -> Self {
        Self {
            watched_tag: Some(DEFAULT_TAG_NAME.to_string()),
            reason_tag: DEFAULT_REASON_TAG_NAME.to_string(),
            ignore: IgnorePatterns::default(),
            retirement_window_days: DEFAULT_RETIREMENT_WINDOW_DAYS,
            kinds: ResourceKind::ALL.to_vec(),
            regions: Vec::new(),
            mode: AuditMode::All,
            on_malformed: MalformedPolicy::Skip,
        }
    }
}

/// User-supplied regular expressions naming resources to leave out of the
/// capacity math.
#[derive(Debug, Clone, Default)]
pub struct IgnorePatterns {
    patterns: Vec<Regex>,
}

impl IgnorePatterns {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| AuditError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Split a comma separated list (`"kitchen, auto"`) into patterns.
    pub fn split_list(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.patterns.iter().any(|regex| regex.is_match(candidate))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, AuditConfig::default());
        assert_eq!(config.watched_tag(), Some(DEFAULT_TAG_NAME));
        assert_eq!(config.retirement_window_days, 7);
    }

    #[test]
    fn loads_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "tag_name: keep-on-demand\nignore_instances_patterns:\n  - kitchen\n  - auto\nretirement_window_days: 14\nkinds: [ec2, rds]\nregions: [us-east-1]\nmode: instances\non_malformed: abort"
        )
        .unwrap();

        let config = AuditConfig::load(file.path()).unwrap();
        assert_eq!(config.watched_tag(), Some("keep-on-demand"));
        assert_eq!(config.ignore_instances_patterns, vec!["kitchen", "auto"]);
        assert_eq!(config.retirement_window_days, 14);
        assert_eq!(config.kinds, vec![ResourceKind::Ec2, ResourceKind::Rds]);
        assert_eq!(config.mode, AuditMode::Instances);
        assert_eq!(config.on_malformed, MalformedPolicy::Abort);
        assert_eq!(config.reason_tag_name, DEFAULT_REASON_TAG_NAME);
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "retirement_window_days: [not, a, number]").unwrap();

        let err = AuditConfig::load(file.path()).unwrap_err();
        match err {
            AuditError::ConfigError { path, .. } => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("Expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn no_tag_disables_watched_tag() {
        let config = AuditConfig {
            no_tag: true,
            ..AuditConfig::default()
        };
        assert_eq!(config.watched_tag(), None);
        assert_eq!(config.compile().unwrap().watched_tag, None);
    }

    #[test]
    fn invalid_pattern_fails_compile() {
        let config = AuditConfig {
            ignore_instances_patterns: vec!["kitchen".to_string(), "(unclosed".to_string()],
            ..AuditConfig::default()
        };
        match config.compile().unwrap_err() {
            AuditError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("Expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn split_list_trims_entries() {
        assert_eq!(
            IgnorePatterns::split_list("kitchen, auto,, ^ci-"),
            vec!["kitchen", "auto", "^ci-"]
        );
    }

    #[test]
    fn patterns_match_substrings() {
        let patterns = IgnorePatterns::compile(&["kitchen", "^auto-"]).unwrap();
        assert!(patterns.is_match("test-kitchen-01"));
        assert!(patterns.is_match("auto-scaled"));
        assert!(!patterns.is_match("web-auto-1"));
        assert_eq!(patterns.len(), 2);
    }

    #[test]
    fn compile_dedups_kinds() {
        let config = AuditConfig {
            kinds: vec![ResourceKind::Cache, ResourceKind::Ec2, ResourceKind::Cache],
            ..AuditConfig::default()
        };
        assert_eq!(
            config.compile().unwrap().kinds,
            vec![ResourceKind::Ec2, ResourceKind::Cache]
        );
    }
}
