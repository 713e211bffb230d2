//! Arguments, logging and plumbing shared by the collecting commands.

use super::config::Config;
use crate::Result;
use crate::collector::Collector;
use crate::depsdev::{BigQuery, Dependents, DepsDevSource, Warehouse};
use crate::github::{GitHubClient, GitHubRepoFactory, IssuesSource, MentionsSource, RepoSource};
use crate::http::{ReqwestTransport, RetryTransport, github_retry_options, server_error_retry_options};
use crate::output::Output;
use crate::repo::Resolver;
use crate::sources::Registry;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, ValueEnum};
use core::time::Duration;
use ohno::{IntoAppError, app_err, bail};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "  commands";

/// Timeout applied to each individual HTTP request.
const HTTP_TIMEOUT: Duration = Duration::from_mins(1);

/// Path meaning stdin or stdout.
const STDIO_PATH: &str = "-";

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Arguments shared by every command that talks to GitHub
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Path to configuration file (default is `criticality.toml` if present)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Number of concurrent workers (overrides the configuration file)
    #[arg(long, short = 'w', value_name = "N")]
    pub workers: Option<usize>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    pub log_level: LogLevel,
}

impl CommonArgs {
    /// Initialise logging, then load the configuration with command-line overrides applied.
    pub fn setup(&self) -> Result<Config> {
        init_logging(self.log_level);

        let mut config = Config::load(self.config.as_deref())?;
        if let Some(workers) = self.workers {
            if workers == 0 {
                bail!("--workers must be at least 1");
            }
            config.workers = workers;
        }

        Ok(config)
    }
}

/// Arguments controlling the deps.dev source
#[derive(Args, Debug, Clone, Default)]
pub struct DepsDevArgs {
    /// Disable collection of signals from deps.dev
    #[arg(long, help_heading = "deps.dev")]
    pub depsdev_disable: bool,

    /// Google Cloud project that owns the deps.dev dataset
    #[arg(long, value_name = "PROJECT", env = "GCP_PROJECT", help_heading = "deps.dev")]
    pub gcp_project: Option<String>,

    /// BigQuery dataset holding derived dependent counts
    #[arg(long, value_name = "NAME", help_heading = "deps.dev")]
    pub depsdev_dataset: Option<String>,

    /// OAuth access token for BigQuery
    #[arg(long, value_name = "TOKEN", env = "GCP_ACCESS_TOKEN", hide_env_values = true, help_heading = "deps.dev")]
    pub gcp_access_token: Option<String>,
}

/// Initialize logger based on log level
pub fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    // A second command in the same process (tests) keeps the first logger.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .try_init();
}

/// Open a line-oriented input; `-` reads stdin.
pub fn open_input(path: &Utf8Path) -> Result<Box<dyn BufRead + Send>> {
    if path == STDIO_PATH {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }

    let file = File::open(path).into_app_err_with(|| format!("opening input file '{path}'"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// How an output file that already exists is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Fail if the file exists
    CreateNew,

    /// Replace the file's contents
    Truncate,

    /// Add to the end of the file
    Append,
}

/// Arguments controlling what happens to an existing output file
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct OutputModeArgs {
    /// Replace the output file if it already exists
    #[arg(long, conflicts_with = "append")]
    pub force: bool,

    /// Append to the output file if it already exists
    #[arg(long)]
    pub append: bool,
}

impl OutputModeArgs {
    #[must_use]
    pub const fn mode(self) -> OutputMode {
        if self.append {
            OutputMode::Append
        } else if self.force {
            OutputMode::Truncate
        } else {
            OutputMode::CreateNew
        }
    }
}

/// Create an output; `-` writes stdout.
pub fn create_output(path: &Utf8Path, mode: OutputMode) -> Result<Output> {
    if path == STDIO_PATH {
        return Ok(Box::new(io::stdout()));
    }

    let mut options = OpenOptions::new();
    let _ = match mode {
        OutputMode::CreateNew => options.write(true).create_new(true),
        OutputMode::Truncate => options.write(true).create(true).truncate(true),
        OutputMode::Append => options.append(true).create(true),
    };

    let file = options.open(path).into_app_err_with(|| match mode {
        OutputMode::CreateNew => format!("creating output file '{path}' (use --force to overwrite or --append to extend)"),
        OutputMode::Truncate | OutputMode::Append => format!("opening output file '{path}'"),
    })?;
    Ok(Box::new(io::BufWriter::new(file)))
}

/// Parse one repository URL per non-blank line.
pub fn read_urls(input: impl BufRead) -> impl Iterator<Item = Result<Url>> {
    input.lines().filter_map(|line| match line {
        Ok(line) => {
            let line = line.trim();
            (!line.is_empty()).then(|| Url::parse(line).into_app_err_with(|| format!("parsing project URL '{line}'")))
        }
        Err(e) => Some(Err(e).into_app_err("reading input")),
    })
}

/// A GitHub client using the configured endpoints and retry policy.
pub fn github_client(config: &Config, token: Option<&str>) -> Result<GitHubClient> {
    if token.is_none() {
        log::warn!(target: LOG_TARGET, "No GitHub token given; requests are heavily rate limited");
    }

    let authorization = token.map(|t| format!("Bearer {t}"));
    let transport = ReqwestTransport::new(authorization.as_deref(), HTTP_TIMEOUT)?;
    let http = RetryTransport::new(
        Arc::new(transport),
        github_retry_options(config.max_attempts, config.initial_delay()),
    );

    Ok(GitHubClient::new(http, config.github_api_url()?, config.github_graphql_url()?))
}

async fn depsdev_source(config: &Config, args: &DepsDevArgs) -> Result<DepsDevSource> {
    let project = args
        .gcp_project
        .clone()
        .or_else(|| config.depsdev.project.clone())
        .ok_or_else(|| app_err!("deps.dev needs a Google Cloud project: pass --gcp-project, set depsdev.project, or use --depsdev-disable"))?;
    let token = args
        .gcp_access_token
        .as_deref()
        .into_app_err("deps.dev needs a BigQuery access token in GCP_ACCESS_TOKEN, or use --depsdev-disable")?;
    let dataset = args.depsdev_dataset.clone().unwrap_or_else(|| config.depsdev.dataset.clone());

    let transport = ReqwestTransport::new(Some(&format!("Bearer {token}")), HTTP_TIMEOUT)?;
    let warehouse = BigQuery::new(
        RetryTransport::new(Arc::new(transport), server_error_retry_options(config.max_attempts)),
        config.bigquery_url()?,
        project,
        config.depsdev.location.clone(),
    );
    let dependents = Dependents::new(Arc::new(warehouse) as Arc<dyn Warehouse>, dataset, config.depsdev.dataset_ttl()).await?;
    Ok(DepsDevSource::new(Arc::new(dependents)))
}

/// Register the GitHub factory and every enabled source.
pub async fn build_collector(config: &Config, common: &CommonArgs, depsdev: &DepsDevArgs) -> Result<Collector> {
    let client = github_client(config, common.github_token.as_deref())?;

    let mut resolver = Resolver::new();
    resolver.register(Box::new(GitHubRepoFactory::new(client.clone())));

    let mut registry = Registry::new();
    if config.sources.github_repo {
        registry.register(Arc::new(RepoSource))?;
    }
    if config.sources.github_issues {
        registry.register(Arc::new(IssuesSource))?;
    }
    if config.sources.github_mentions {
        registry.register(Arc::new(MentionsSource::new(client)))?;
    }

    if !config.sources.depsdev || depsdev.depsdev_disable {
        log::warn!(target: LOG_TARGET, "deps.dev signal source is disabled");
    } else {
        registry.register(Arc::new(depsdev_source(config, depsdev).await?))?;
        log::info!(target: LOG_TARGET, "deps.dev signal source enabled");
    }

    Ok(Collector::new(resolver, registry))
}
