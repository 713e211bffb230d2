use crate::Result;
use crate::depsdev::{DEFAULT_BIGQUERY_URL, DEFAULT_DATASET, DEFAULT_LOCATION};
use crate::github::{DEFAULT_API_URL, DEFAULT_GRAPHQL_URL};
use crate::http::{DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS};
use camino::Utf8Path;
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use url::Url;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Configuration file looked for in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "criticality.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of repositories collected concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    #[serde(default = "default_github_graphql_url")]
    pub github_graphql_url: String,

    /// Maximum sends per upstream request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait after the first attempt when a secondary rate limit is hit
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub depsdev: DepsDevConfig,
}

/// Which signal sources are registered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
#[expect(clippy::struct_excessive_bools, reason = "one switch per source")]
pub struct SourcesConfig {
    #[serde(default = "enabled")]
    pub github_repo: bool,

    #[serde(default = "enabled")]
    pub github_issues: bool,

    #[serde(default = "enabled")]
    pub github_mentions: bool,

    #[serde(default = "enabled")]
    pub depsdev: bool,
}

/// Settings for the deps.dev dependents source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DepsDevConfig {
    /// Project owning the dataset
    #[serde(default)]
    pub project: Option<String>,

    #[serde(default = "default_dataset")]
    pub dataset: String,

    #[serde(default = "default_location")]
    pub location: String,

    /// Default table expiration of the dataset, in days
    #[serde(default = "default_dataset_ttl_days")]
    pub dataset_ttl_days: u64,

    #[serde(default = "default_bigquery_url")]
    pub api_url: String,
}

const fn default_workers() -> usize {
    1
}

fn default_github_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_github_graphql_url() -> String {
    DEFAULT_GRAPHQL_URL.to_string()
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_initial_delay_secs() -> u64 {
    DEFAULT_INITIAL_DELAY.as_secs()
}

const fn enabled() -> bool {
    true
}

fn default_dataset() -> String {
    DEFAULT_DATASET.to_string()
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

const fn default_dataset_ttl_days() -> u64 {
    7
}

fn default_bigquery_url() -> String {
    DEFAULT_BIGQUERY_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            github_api_url: default_github_api_url(),
            github_graphql_url: default_github_graphql_url(),
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
            sources: SourcesConfig::default(),
            depsdev: DepsDevConfig::default(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            github_repo: true,
            github_issues: true,
            github_mentions: true,
            depsdev: true,
        }
    }
}

impl Default for DepsDevConfig {
    fn default() -> Self {
        Self {
            project: None,
            dataset: default_dataset(),
            location: default_location(),
            dataset_ttl_days: default_dataset_ttl_days(),
            api_url: default_bigquery_url(),
        }
    }
}

impl DepsDevConfig {
    #[must_use]
    pub const fn dataset_ttl(&self) -> Duration {
        Duration::from_hours(self.dataset_ttl_days.saturating_mul(24))
    }
}

impl Config {
    /// Load configuration from a file or use defaults
    ///
    /// Without an explicit path, `criticality.toml` in the working directory is used if present.
    pub fn load(config_path: Option<&Utf8Path>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path, text)
        } else {
            let path = Utf8Path::new(DEFAULT_CONFIG_FILE);
            match fs::read_to_string(path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn github_api_url(&self) -> Result<Url> {
        parse_url("github_api_url", &self.github_api_url)
    }

    pub fn github_graphql_url(&self) -> Result<Url> {
        parse_url("github_graphql_url", &self.github_graphql_url)
    }

    pub fn bigquery_url(&self) -> Result<Url> {
        parse_url("depsdev.api_url", &self.depsdev.api_url)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(app_err!("workers must be at least 1"));
        }

        if self.max_attempts == 0 {
            return Err(app_err!("max_attempts must be at least 1"));
        }

        let _ = self.github_api_url()?;
        let _ = self.github_graphql_url()?;
        let _ = self.bigquery_url()?;

        if self.depsdev.dataset.is_empty() {
            return Err(app_err!("depsdev.dataset must not be empty"));
        }

        if self.depsdev.dataset_ttl_days == 0 {
            return Err(app_err!("depsdev.dataset_ttl_days must be at least 1"));
        }

        Ok(())
    }
}

fn parse_url(key: &str, value: &str) -> Result<Url> {
    Url::parse(value).into_app_err_with(|| format!("{key} is not a valid URL: '{value}'"))
}
