use crate::error::{RemedyError, Result};
use crate::script::CommandTemplate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const CONFIG_FILE: &str = "remedy.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// EmptyTicketPolicy
// ---------------------------------------------------------------------------

/// What to do with a ticket whose body yielded no runnable command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyTicketPolicy {
    /// Post the report so the ticket shows it was looked at. Never closed.
    #[default]
    Comment,
    /// Leave the ticket untouched.
    Skip,
}

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_github_api")]
    pub api_url: String,
    /// `owner/name`
    pub repository: String,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_timeout() -> u64 {
    60
}

// ---------------------------------------------------------------------------
// RecordStoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordStoreConfig {
    pub api_url: String,
    #[serde(default = "default_redcap_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Run with `{action}` set to `unlock` before and `lock` after each replay.
    pub lock_command: CommandTemplate,
    /// Label → importer to replay for tickets carrying that label.
    #[serde(default)]
    pub rerun: BTreeMap<String, CommandTemplate>,
}

fn default_redcap_token_env() -> String {
    "REDCAP_TOKEN".to_string()
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_title_filter")]
    pub title_filter: String,
    #[serde(default)]
    pub empty_ticket_policy: EmptyTicketPolicy,
    /// Whether a ticket may close when some of its commands were dropped
    /// during parsing but every executed command succeeded.
    #[serde(default = "default_close_with_warnings")]
    pub close_with_parse_warnings: bool,
    pub tracker: TrackerConfig,
    pub record_store: RecordStoreConfig,
}

pub fn default_title_filter() -> String {
    "redcap_import_record:Failed to import into REDCap".to_string()
}

fn default_close_with_warnings() -> bool {
    true
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RemedyError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)?;
        Ok(cfg)
    }

    pub fn rerun_labels(&self) -> impl Iterator<Item = &str> {
        self.record_store.rerun.keys().map(String::as_str)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let repo = self.tracker.repository.trim();
        if repo.is_empty() || repo.split('/').filter(|p| !p.is_empty()).count() != 2 {
            warnings.push(ConfigWarning::error(format!(
                "tracker.repository '{}' must be 'owner/name'",
                self.tracker.repository
            )));
        }

        if self.title_filter.trim().is_empty() {
            warnings.push(ConfigWarning::warning(
                "title_filter is empty: every labeled ticket will be scraped",
            ));
        }

        if self.record_store.lock_command.is_empty() {
            warnings.push(ConfigWarning::error("record_store.lock_command is empty"));
        } else if !self
            .record_store
            .lock_command
            .0
            .iter()
            .any(|a| a.contains("{action}"))
        {
            warnings.push(ConfigWarning::error(
                "record_store.lock_command never uses {action}: lock and unlock would run the same command",
            ));
        }
        for name in self.record_store.lock_command.unknown_placeholders() {
            warnings.push(ConfigWarning::warning(format!(
                "unknown placeholder '{{{name}}}' in record_store.lock_command"
            )));
        }

        if self.record_store.rerun.is_empty() {
            warnings.push(ConfigWarning::warning(
                "record_store.rerun is empty: no label can be resolved",
            ));
        }
        for (label, template) in &self.record_store.rerun {
            if template.is_empty() {
                warnings.push(ConfigWarning::error(format!(
                    "rerun command for label '{label}' is empty"
                )));
            }
            for name in template.unknown_placeholders() {
                warnings.push(ConfigWarning::warning(format!(
                    "unknown placeholder '{{{name}}}' in rerun command for label '{label}'"
                )));
            }
        }

        for (key, secs) in [
            ("tracker.timeout_seconds", self.tracker.timeout_seconds),
            ("record_store.timeout_seconds", self.record_store.timeout_seconds),
        ] {
            if secs == 0 {
                warnings.push(ConfigWarning::error(format!("{key} must be greater than 0")));
            }
        }

        warnings
    }

    pub fn has_errors(warnings: &[ConfigWarning]) -> bool {
        warnings.iter().any(|w| w.level == WarnLevel::Error)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
tracker:
  repository: ncanda/operations
record_store:
  api_url: https://redcap.example.org/api/
  lock_command: [exec_redcap_locking_data, --study-id, "{study_id}", --forms, "{form}", "--{action}"]
  rerun:
    update_visit_data: [update_visit_data, --study-id, "{study_id}", --forms, "{form}"]
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.title_filter, default_title_filter());
        assert_eq!(cfg.empty_ticket_policy, EmptyTicketPolicy::Comment);
        assert!(cfg.close_with_parse_warnings);
        assert_eq!(cfg.tracker.api_url, "https://api.github.com");
        assert_eq!(cfg.tracker.token_env, "GITHUB_TOKEN");
        assert_eq!(cfg.record_store.token_env, "REDCAP_TOKEN");
        assert_eq!(cfg.record_store.timeout_seconds, 60);
        assert_eq!(cfg.rerun_labels().collect::<Vec<_>>(), vec!["update_visit_data"]);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn empty_ticket_policy_parses() {
        let yaml = format!("empty_ticket_policy: skip\n{MINIMAL}");
        let cfg = Config::from_yaml(&yaml).unwrap();
        assert_eq!(cfg.empty_ticket_policy, EmptyTicketPolicy::Skip);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, MINIMAL).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.tracker.repository, "ncanda/operations");
        assert_eq!(
            loaded.record_store.lock_command,
            Config::from_yaml(MINIMAL).unwrap().record_store.lock_command
        );
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, RemedyError::ConfigNotFound(_)));
    }

    #[test]
    fn validate_flags_bad_repository_and_lock_without_action() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.tracker.repository = "just-a-name".into();
        cfg.record_store.lock_command = CommandTemplate::new(["lock", "{study_id}"]);
        let warnings = cfg.validate();
        assert!(Config::has_errors(&warnings));
        assert!(warnings.iter().any(|w| w.message.contains("owner/name")));
        assert!(warnings.iter().any(|w| w.message.contains("{action}")));
    }

    #[test]
    fn validate_flags_unknown_placeholders_and_empty_rerun() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.record_store
            .rerun
            .insert("import_mr_sessions".into(), CommandTemplate::new(["x", "{visit}"]));
        cfg.record_store
            .rerun
            .insert("update_summary_forms".into(), CommandTemplate::new(Vec::<String>::new()));
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("{visit}")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("update_summary_forms")));
    }

    #[test]
    fn validate_zero_timeout() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.tracker.timeout_seconds = 0;
        assert!(Config::has_errors(&cfg.validate()));
    }
}
