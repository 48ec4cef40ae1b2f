use chrono::{Duration, Weekday};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use earbot::deadline::DeadlinePolicy;
use earbot::host::GithubConfig;
use earbot::roster::{ScoreBounds, StoreOptions};
use earbot::selection::{InstitutionTable, ScoringPolicy, Selector};
use earbot::workflow::WorkflowRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub github: GithubSection,
    pub roster: RosterSection,
    pub projects: ProjectsSection,
    pub scoring: ScoringSection,
    /// Canonical institution tag -> raw spellings found in rosters and bodies
    pub institutions: BTreeMap<String, Vec<String>>,
    pub deadline: DeadlineSection,
    pub sweep: SweepSection,
    pub report: ReportSection,
    pub notify: NotifySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubSection {
    pub api_url: String,
    /// `owner/name`; `GITHUB_REPOSITORY` overrides it
    pub repository: Option<String>,
    /// Environment variable holding the API token
    pub token_env: String,
    pub bot_login: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            api_url: earbot::host::github::GITHUB_API_URL.to_string(),
            repository: None,
            token_env: "GITHUB_TOKEN".to_string(),
            bot_login: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterSection {
    pub roster_path: PathBuf,
    pub ledger_path: PathBuf,
    /// Directory for per-request state (`requests.jsonl`)
    pub state_dir: PathBuf,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub stale_lock_secs: u64,
}

impl Default for RosterSection {
    fn default() -> Self {
        Self {
            roster_path: PathBuf::from("rev/reviewers_list.csv"),
            ledger_path: PathBuf::from("rev/EAR_reviews.csv"),
            state_dir: PathBuf::from("rev/state"),
            max_retries: 5,
            retry_backoff_ms: 200,
            stale_lock_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectsSection {
    pub valid: Vec<String>,
    pub artifact_extension: String,
}

impl Default for ProjectsSection {
    fn default() -> Self {
        Self {
            valid: vec![
                "ERGA-BGE".to_string(),
                "ERGA-Pilot".to_string(),
                "ERGA-Community".to_string(),
            ],
            artifact_extension: ".pdf".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSection {
    pub new_reviewer_bonus: i64,
    pub priority_bonus: i64,
    pub supervisor_penalty: i64,
    pub review_decrement: i64,
    pub timeout_penalty: i64,
    pub institution_increment: i64,
    pub score_floor: Option<i64>,
    pub score_ceiling: Option<i64>,
    pub priority_tags: Vec<String>,
    pub priority_institutions: Vec<String>,
}

impl Default for ScoringSection {
    fn default() -> Self {
        let policy = ScoringPolicy::default();
        let bounds = ScoreBounds::default();
        Self {
            new_reviewer_bonus: policy.new_reviewer_bonus,
            priority_bonus: policy.priority_bonus,
            supervisor_penalty: policy.supervisor_penalty,
            review_decrement: 1,
            timeout_penalty: 1,
            institution_increment: 1,
            score_floor: bounds.floor,
            score_ceiling: bounds.ceiling,
            priority_tags: policy.priority_tags,
            priority_institutions: policy.priority_institutions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlineSection {
    pub budget_hours: i64,
    pub non_business_days: Vec<Weekday>,
    pub utc_offset_minutes: i32,
    pub zone_label: String,
}

impl Default for DeadlineSection {
    fn default() -> Self {
        let policy = DeadlinePolicy::default();
        Self {
            budget_hours: policy.budget_hours,
            non_business_days: policy.non_business_days,
            utc_offset_minutes: policy.utc_offset_minutes,
            zone_label: policy.zone_label,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSection {
    pub stale_after_hours: i64,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self { stale_after_hours: 168 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Checkout root the artifact paths are relative to
    pub workspace_dir: PathBuf,
    /// Prints report YAML for `{input}`; unset disables regeneration
    pub extract_command: Option<String>,
    /// Renders `{input}` (YAML) into `{output}`
    pub render_command: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("."),
            extract_command: None,
            render_command: None,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    /// Incoming webhook; `EARBOT_WEBHOOK_URL` overrides it. Unset logs only.
    pub webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            log_file: None,
            github: GithubSection::default(),
            roster: RosterSection::default(),
            projects: ProjectsSection::default(),
            scoring: ScoringSection::default(),
            institutions: BTreeMap::new(),
            deadline: DeadlineSection::default(),
            sweep: SweepSection::default(),
            report: ReportSection::default(),
            notify: NotifySection::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Values the CI runner provides through the environment win over the file
    fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(repository) = var("GITHUB_REPOSITORY").filter(|v| !v.is_empty()) {
            self.github.repository = Some(repository);
        }
        if let Some(url) = var("EARBOT_WEBHOOK_URL").filter(|v| !v.is_empty()) {
            self.notify.webhook_url = Some(url);
        }
        if let Some(workspace) = var("GITHUB_WORKSPACE").filter(|v| !v.is_empty()) {
            if self.report.workspace_dir == Path::new(".") {
                self.report.workspace_dir = PathBuf::from(workspace);
            }
        }
    }

    pub fn github(&self) -> Result<GithubConfig> {
        let repository = self
            .github
            .repository
            .clone()
            .ok_or_else(|| eyre!("No repository configured (set github.repository or GITHUB_REPOSITORY)"))?;
        let token = std::env::var(&self.github.token_env)
            .with_context(|| format!("Missing API token in ${}", self.github.token_env))?;

        let mut config = GithubConfig::new(repository, token);
        config.api_url = self.github.api_url.clone();
        config.bot_login = self.github.bot_login.clone();
        config.timeout = std::time::Duration::from_secs(self.github.timeout_secs);
        Ok(config)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_retries: self.roster.max_retries,
            retry_backoff: std::time::Duration::from_millis(self.roster.retry_backoff_ms),
            stale_lock_after: std::time::Duration::from_secs(self.roster.stale_lock_secs),
        }
    }

    pub fn selector(&self) -> Selector {
        let policy = ScoringPolicy {
            new_reviewer_bonus: self.scoring.new_reviewer_bonus,
            priority_bonus: self.scoring.priority_bonus,
            supervisor_penalty: self.scoring.supervisor_penalty,
            priority_tags: self.scoring.priority_tags.clone(),
            priority_institutions: self.scoring.priority_institutions.clone(),
        };
        Selector::new(policy, InstitutionTable::new(&self.institutions))
    }

    pub fn rules(&self) -> WorkflowRules {
        WorkflowRules {
            valid_projects: self.projects.valid.clone(),
            artifact_extension: self.projects.artifact_extension.clone(),
            review_decrement: self.scoring.review_decrement,
            timeout_penalty: self.scoring.timeout_penalty,
            institution_increment: self.scoring.institution_increment,
            bounds: ScoreBounds {
                floor: self.scoring.score_floor,
                ceiling: self.scoring.score_ceiling,
            },
            stale_after: Duration::hours(self.sweep.stale_after_hours),
            ..WorkflowRules::default()
        }
    }

    pub fn deadline(&self) -> DeadlinePolicy {
        DeadlinePolicy {
            budget_hours: self.deadline.budget_hours,
            non_business_days: self.deadline.non_business_days.clone(),
            utc_offset_minutes: self.deadline.utc_offset_minutes,
            zone_label: self.deadline.zone_label.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.roster.roster_path, PathBuf::from("rev/reviewers_list.csv"));
        assert_eq!(config.deadline.budget_hours, 100);
        assert_eq!(config.deadline.non_business_days, vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(config.scoring.score_floor, Some(0));
        assert_eq!(config.rules().error_label, "Error!");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("earbot.yml");
        fs::write(
            &path,
            "scoring:\n  priority_institutions: [uni-a]\n  score_floor: null\ninstitutions:\n  uni-a: [University of A, UniA]\ndeadline:\n  non_business_days: [Sun]\n",
        )
        .unwrap();

        let config = Config::load_file(Some(&path)).unwrap();
        assert_eq!(config.scoring.priority_institutions, vec!["uni-a"]);
        assert_eq!(config.scoring.score_floor, None);
        assert_eq!(config.scoring.new_reviewer_bonus, 50);
        assert_eq!(config.institutions["uni-a"].len(), 2);
        assert_eq!(config.deadline().non_business_days, vec![Weekday::Sun]);
        assert!(config.selector().institutions().same("UniA", "University of A"));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let missing = PathBuf::from("/nonexistent/earbot.yml");
        assert!(Config::load_file(Some(&missing)).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GITHUB_REPOSITORY", "ERGA-consortium/EARs"),
            ("EARBOT_WEBHOOK_URL", "https://hooks.example.org/x"),
            ("GITHUB_WORKSPACE", "/work/EARs"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.github.repository.as_deref(), Some("ERGA-consortium/EARs"));
        assert_eq!(config.notify.webhook_url.as_deref(), Some("https://hooks.example.org/x"));
        assert_eq!(config.report.workspace_dir, PathBuf::from("/work/EARs"));
    }

    #[test]
    fn test_rules_from_config() {
        let mut config = Config::default();
        config.sweep.stale_after_hours = 24;
        config.projects.valid = vec!["DToL".to_string()];
        let rules = config.rules();
        assert_eq!(rules.stale_after, Duration::hours(24));
        assert_eq!(rules.project("dtol"), Some("DToL"));
    }
}
