//! Pipeline configuration stored in `lifecycle.toml`, plus the environment overlay.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::retry::RetryPolicy;
use crate::core::types::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL, DeployEnvironment, DeploymentConfig};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lifecycle.toml";
/// Environment variable holding the generation service credential.
pub const CREDENTIAL_ENV: &str = "DEEPSEEK_API_KEY";
/// Environment variables checked (in order) for the target repository URL.
pub const REPO_URL_ENVS: [&str; 2] = ["REPO_URL", "repo_url"];

/// Pipeline configuration (TOML).
///
/// Every section and field is optional; missing values fall back to the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Settings {
    pub generation: GenerationSettings,
    pub repository: RepositorySettings,
    pub testing: TestingSettings,
    pub deployment: DeploymentSettings,
    pub monitoring: MonitoringSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationSettings {
    pub endpoint: String,
    pub model: String,
    /// Output budget for review, test and validation requests.
    pub max_output_tokens: u32,
    /// Output budget for code generation requests.
    pub code_max_output_tokens: u32,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.deepseek.com/v1/chat/completions".to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            code_max_output_tokens: 2000,
            max_attempts: 3,
            retry_delay_secs: 2,
            request_timeout_secs: 120,
        }
    }
}

impl GenerationSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_delay_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepositorySettings {
    /// Checkout directory, relative to the working directory unless absolute.
    pub path: PathBuf,
    /// Used when no URL is passed on the command line or in the environment.
    pub default_url: Option<String>,
    /// Pause after each forced-cleanup step.
    pub settle_delay_ms: u64,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("repository"),
            default_url: None,
            settle_delay_ms: 1000,
        }
    }
}

impl RepositorySettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct TestingSettings {
    /// Extra test commands run inside the checkout (e.g. `[["npm", "test"]]`).
    pub commands: Vec<Vec<String>>,
    /// Per-command timeout. Unset waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl TestingSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeploymentSettings {
    pub script: PathBuf,
    /// Interpreter and flags; the absolute script path is appended.
    pub command: Vec<String>,
    /// Unset waits indefinitely.
    pub timeout_secs: Option<u64>,
    pub port: u16,
    pub environment: DeployEnvironment,
    pub health_check_endpoint: String,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            script: PathBuf::from("deploy.ps1"),
            command: ["powershell", "-ExecutionPolicy", "Bypass", "-File"]
                .map(str::to_string)
                .to_vec(),
            timeout_secs: None,
            port: 3000,
            environment: DeployEnvironment::Development,
            health_check_endpoint: "/health".to_string(),
        }
    }
}

impl DeploymentSettings {
    /// Configuration submitted for validation before deploying.
    pub fn target(&self) -> DeploymentConfig {
        DeploymentConfig {
            port: self.port,
            environment: self.environment,
            health_check_endpoint: self.health_check_endpoint.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitoringSettings {
    pub health_url: String,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            health_url: "http://localhost:3000/health".to_string(),
            max_attempts: 3,
            retry_delay_secs: 2,
            request_timeout_secs: 10,
        }
    }
}

impl MonitoringSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_delay_secs))
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let generation = &self.generation;
        if generation.endpoint.trim().is_empty() {
            return Err(anyhow!("generation.endpoint must be non-empty"));
        }
        if generation.model.trim().is_empty() {
            return Err(anyhow!("generation.model must be non-empty"));
        }
        if generation.max_output_tokens == 0 || generation.code_max_output_tokens == 0 {
            return Err(anyhow!("generation token budgets must be > 0"));
        }
        if generation.max_attempts == 0 {
            return Err(anyhow!("generation.max_attempts must be > 0"));
        }
        if generation.request_timeout_secs == 0 {
            return Err(anyhow!("generation.request_timeout_secs must be > 0"));
        }
        if self.repository.path.as_os_str().is_empty() {
            return Err(anyhow!("repository.path must be non-empty"));
        }
        if self
            .testing
            .commands
            .iter()
            .any(|command| command.first().is_none_or(|program| program.trim().is_empty()))
        {
            return Err(anyhow!("testing.commands entries must be non-empty arrays"));
        }
        if self.deployment.script.as_os_str().is_empty() {
            return Err(anyhow!("deployment.script must be non-empty"));
        }
        if self.deployment.command.is_empty() || self.deployment.command[0].trim().is_empty() {
            return Err(anyhow!("deployment.command must be a non-empty array"));
        }
        if self.monitoring.health_url.trim().is_empty() {
            return Err(anyhow!("monitoring.health_url must be non-empty"));
        }
        if self.monitoring.max_attempts == 0 {
            return Err(anyhow!("monitoring.max_attempts must be > 0"));
        }
        if self.monitoring.request_timeout_secs == 0 {
            return Err(anyhow!("monitoring.request_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(settings)
}

/// Values taken from the process environment (after `.env` is loaded).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub credential: Option<String>,
    pub repo_url: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            credential: non_blank(CREDENTIAL_ENV),
            repo_url: REPO_URL_ENVS.iter().find_map(|name| non_blank(name)),
        }
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("repo_url", &self.repo_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.generation.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.repository.path, PathBuf::from("repository"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lifecycle.toml");
        fs::write(
            &path,
            r#"
[repository]
default_url = "https://example.com/app.git"

[deployment]
environment = "staging"
command = ["sh"]
script = "deploy.sh"

[testing]
commands = [["npm", "test"]]
"#,
        )
        .expect("write");

        let settings = load_settings(&path).expect("load");
        assert_eq!(
            settings.repository.default_url.as_deref(),
            Some("https://example.com/app.git")
        );
        assert_eq!(settings.repository.settle_delay_ms, 1000);
        assert_eq!(settings.deployment.environment, DeployEnvironment::Staging);
        assert_eq!(settings.deployment.port, 3000);
        assert_eq!(settings.testing.commands, vec![vec!["npm", "test"]]);
        assert_eq!(settings.monitoring, MonitoringSettings::default());
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lifecycle.toml");
        fs::write(&path, "[generation]\nmax_attempts = 0\n").expect("write");
        let err = load_settings(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_attempts"), "{err:#}");
    }

    #[test]
    fn empty_test_command_is_rejected() {
        let mut settings = Settings::default();
        settings.testing.commands = vec![Vec::new()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_environment_fails_to_parse() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("lifecycle.toml");
        fs::write(&path, "[deployment]\nenvironment = \"moon\"\n").expect("write");
        assert!(load_settings(&path).is_err());
    }

    #[test]
    fn secrets_prefer_upper_case_repo_url_and_ignore_blanks() {
        let secrets = Secrets::from_lookup(|name| match name {
            "DEEPSEEK_API_KEY" => Some("  ".to_string()),
            "REPO_URL" => Some("https://a.example/x.git".to_string()),
            "repo_url" => Some("https://b.example/y.git".to_string()),
            _ => None,
        });
        assert_eq!(secrets.credential, None);
        assert_eq!(secrets.repo_url.as_deref(), Some("https://a.example/x.git"));

        let fallback = Secrets::from_lookup(|name| {
            (name == "repo_url").then(|| "https://b.example/y.git".to_string())
        });
        assert_eq!(fallback.repo_url.as_deref(), Some("https://b.example/y.git"));
    }

    #[test]
    fn secrets_debug_hides_credential() {
        let secrets = Secrets {
            credential: Some("sk-very-secret".to_string()),
            repo_url: None,
        };
        let rendered = format!("{secrets:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
