//! Sync and scan task definitions

use super::error::SyncError;
use super::record::FileSet;
use crate::filter::{LimitSet, PatternSet};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Comparison policy deciding which source files become pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Rule {
    /// Size or modification time differs
    #[default]
    Standard,

    /// Source is strictly newer
    Newer,

    /// Source is strictly larger
    Larger,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::Standard => "standard",
            Rule::Newer => "newer",
            Rule::Larger => "larger",
        }
    }
}

impl FromStr for Rule {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "standard" => Ok(Rule::Standard),
            "newer" => Ok(Rule::Newer),
            "larger" => Ok(Rule::Larger),
            other => Err(SyncError::Validation(format!(
                "Unknown rule '{}' (expected standard, newer or larger)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Rule {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rule> for String {
    fn from(rule: Rule) -> Self {
        rule.as_str().to_string()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a task a scan fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    Source,
    Target,
}

impl ScanMode {
    /// Record set this scan writes into
    pub fn file_set(&self) -> FileSet {
        match self {
            ScanMode::Source => FileSet::Source,
            ScanMode::Target => FileSet::Target,
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.file_set().fmt(f)
    }
}

fn default_enabled() -> bool {
    true
}

/// One unit of work: mirror `source_folder` into `target_folder`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub source_folder: String,
    pub target_folder: String,

    /// Where scripts and reports go; falls back to the configured batch folder
    #[serde(default)]
    pub batch_folder: Option<PathBuf>,

    #[serde(default)]
    pub rule: Rule,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub file_patterns: Vec<String>,

    #[serde(default)]
    pub limits: Vec<String>,
}

impl SyncTask {
    pub fn new(source_folder: impl Into<String>, target_folder: impl Into<String>) -> Self {
        Self {
            source_folder: source_folder.into(),
            target_folder: target_folder.into(),
            batch_folder: None,
            rule: Rule::Standard,
            enabled: true,
            file_patterns: Vec::new(),
            limits: Vec::new(),
        }
    }

    /// Build the scan task for one side of this sync
    pub fn scan_task(&self, mode: ScanMode, use_journal: bool) -> Result<ScanTask, SyncError> {
        let root = match mode {
            ScanMode::Source => &self.source_folder,
            ScanMode::Target => &self.target_folder,
        };
        ScanTask::new(
            root.clone(),
            self.file_patterns.clone(),
            self.rule,
            self.limits.clone(),
            mode,
            use_journal,
        )
    }
}

/// An ordered list of sync tasks loaded from a JSON profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub tasks: Vec<SyncTask>,
}

impl Profile {
    /// Load and parse a profile file
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        if !path.is_file() {
            return Err(SyncError::Validation(format!(
                "Profile file does not exist: {}",
                path.display()
            )));
        }

        let text = std::fs::read_to_string(path)?;
        let profile: Profile = serde_json::from_str(&text).map_err(|e| {
            SyncError::Validation(format!("Invalid profile {}: {}", path.display(), e))
        })?;

        if profile.tasks.is_empty() {
            return Err(SyncError::Validation(format!(
                "Profile {} contains no tasks",
                path.display()
            )));
        }

        Ok(profile)
    }
}

/// Immutable description of one scan pass, with its filters compiled
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub root: String,
    pub rule: Rule,
    pub mode: ScanMode,
    pub use_journal: bool,
    patterns: PatternSet,
    limits: LimitSet,
    raw_limits: Vec<String>,
}

impl ScanTask {
    pub fn new(
        root: String,
        patterns: Vec<String>,
        rule: Rule,
        limits: Vec<String>,
        mode: ScanMode,
        use_journal: bool,
    ) -> Result<Self, SyncError> {
        let compiled_patterns = PatternSet::compile(&patterns)?;
        let compiled_limits = LimitSet::parse(&limits, Utc::now())?;

        Ok(Self {
            root,
            rule,
            mode,
            use_journal,
            patterns: compiled_patterns,
            limits: compiled_limits,
            raw_limits: limits,
        })
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn limits(&self) -> &LimitSet {
        &self.limits
    }

    /// Limit tokens as originally written
    pub fn raw_limits(&self) -> &[String] {
        &self.raw_limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_parsing_is_case_insensitive() {
        assert_eq!("Standard".parse::<Rule>().expect("parse"), Rule::Standard);
        assert_eq!("NEWER".parse::<Rule>().expect("parse"), Rule::Newer);
        assert_eq!("larger".parse::<Rule>().expect("parse"), Rule::Larger);
    }

    #[test]
    fn test_unknown_rule_is_validation_error() {
        let err = "bigger".parse::<Rule>().unwrap_err();
        assert!(err.is_validation_error());
        assert!(err.to_string().contains("bigger"));
    }

    #[test]
    fn test_rule_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Rule::Newer).expect("serialize");
        assert_eq!(json, "\"newer\"");
        let rule: Rule = serde_json::from_str("\"Larger\"").expect("deserialize");
        assert_eq!(rule, Rule::Larger);
        assert!(serde_json::from_str::<Rule>("\"sideways\"").is_err());
    }

    #[test]
    fn test_profile_task_defaults() {
        let json = r#"{ "tasks": [ { "source_folder": "C:\\src", "target_folder": "D:\\dst" } ] }"#;
        let profile: Profile = serde_json::from_str(json).expect("parse profile");
        let task = &profile.tasks[0];

        assert!(task.enabled);
        assert_eq!(task.rule, Rule::Standard);
        assert!(task.batch_folder.is_none());
        assert!(task.file_patterns.is_empty());
    }

    #[test]
    fn test_profile_rejects_unknown_rule() {
        let json = r#"{ "tasks": [ { "source_folder": "a", "target_folder": "b", "rule": "bigger" } ] }"#;
        assert!(serde_json::from_str::<Profile>(json).is_err());
    }

    #[test]
    fn test_scan_task_compiles_filters() {
        let mut task = SyncTask::new("src", "dst");
        task.file_patterns = vec!["*.log".to_string()];
        task.limits = vec!["sizemin=1K".to_string()];

        let scan = task.scan_task(ScanMode::Target, false).expect("build scan task");
        assert_eq!(scan.root, "dst");
        assert_eq!(scan.mode.file_set(), FileSet::Target);
        assert!(scan.patterns().is_match("app.LOG"));
        assert!(!scan.limits().matches(10, Utc::now()));
    }

    #[test]
    fn test_scan_task_rejects_bad_limit() {
        let mut task = SyncTask::new("src", "dst");
        task.limits = vec!["sizemin=lots".to_string()];
        assert!(task.scan_task(ScanMode::Source, false).is_err());
    }
}
