use super::client::GitHubClient;
use super::legacy;
use crate::Result;
use crate::pagination::Variables;
use crate::repo::{Repo, RepoFactory, RepoSpec, Resolution};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use core::any::Any;
use futures::FutureExt;
use futures::future::BoxFuture;
use ohno::{EnrichableExt, IntoAppError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "    github";

/// Host handled by [`GitHubRepoFactory`].
pub const GITHUB_HOST: &str = "github.com";

const COMMIT_LOOKBACK_DAYS: i64 = 365;

const BASIC_DATA_QUERY: &str = r#"query($repositoryOwner: String!, $repositoryName: String!, $legacyCommitLookback: GitTimestamp!) {
  repository(owner: $repositoryOwner, name: $repositoryName) {
    name
    owner { login }
    licenseInfo { name }
    stargazerCount
    url
    createdAt
    updatedAt
    primaryLanguage { name }
    defaultBranchRef {
      target {
        ... on Commit {
          authoredDate
          recentCommits: history(since: $legacyCommitLookback) { totalCount }
        }
      }
    }
    tags: refs(refPrefix: "refs/tags/") { totalCount }
  }
}"#;

#[derive(Debug, Clone, Deserialize)]
pub struct Login {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCount {
    pub total_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCommit {
    pub authored_date: Option<DateTime<Utc>>,
    pub recent_commits: Option<TotalCount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchRef {
    pub target: Option<LastCommit>,
}

/// Repository metadata fetched when the repository is resolved.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicRepoData {
    pub name: String,
    pub owner: Login,
    pub license_info: Option<Named>,
    pub stargazer_count: u64,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub primary_language: Option<Named>,
    pub default_branch_ref: Option<BranchRef>,
    pub tags: Option<TotalCount>,
}

impl BasicRepoData {
    fn last_commit(&self) -> Option<&LastCommit> {
        self.default_branch_ref.as_ref()?.target.as_ref()
    }

    /// Authored date of the last commit on the default branch.
    #[must_use]
    pub fn last_commit_date(&self) -> Option<DateTime<Utc>> {
        self.last_commit()?.authored_date
    }

    /// Commits on the default branch during the last year.
    #[must_use]
    pub fn recent_commit_count(&self) -> u64 {
        self.last_commit().and_then(|c| c.recent_commits).map_or(0, |c| c.total_count)
    }

    #[must_use]
    pub fn tag_count(&self) -> u64 {
        self.tags.map_or(0, |t| t.total_count)
    }
}

#[derive(Deserialize)]
struct BasicDataResponse {
    repository: Option<BasicRepoData>,
}

/// A repository hosted on GitHub.
#[derive(Debug)]
pub struct GitHubRepo {
    client: GitHubClient,
    url: Url,
    data: BasicRepoData,
    created: DateTime<Utc>,
}

impl GitHubRepo {
    #[must_use]
    pub const fn client(&self) -> &GitHubClient {
        &self.client
    }

    #[must_use]
    pub const fn data(&self) -> &BasicRepoData {
        &self.data
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.data.owner.login
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.data.name
    }

    /// Date of the first commit, or GitHub's creation date if that is earlier.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created
    }

    /// Date of the last commit on the default branch.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.data.last_commit_date()
    }
}

impl Repo for GitHubRepo {
    fn url(&self) -> &Url {
        &self.url
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Resolves `github.com` URLs into [`GitHubRepo`]s.
#[derive(Debug, Clone)]
pub struct GitHubRepoFactory {
    client: GitHubClient,
}

impl GitHubRepoFactory {
    #[must_use]
    pub const fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    async fn resolve(&self, url: &Url) -> Result<Resolution> {
        let spec = match RepoSpec::parse(url) {
            Ok(spec) => spec,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Skipping '{url}': {e}");
                return Ok(Resolution::Unsupported);
            }
        };

        log::debug!(target: LOG_TARGET, "Fetching basic data for '{spec}'");
        let lookback = Utc::now() - TimeDelta::days(COMMIT_LOOKBACK_DAYS);
        let mut vars = Variables::new();
        let _ = vars.insert("repositoryOwner".into(), json!(spec.owner()));
        let _ = vars.insert("repositoryName".into(), json!(spec.name()));
        let _ = vars.insert(
            "legacyCommitLookback".into(),
            json!(lookback.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        let result = self.client.graphql::<BasicDataResponse>(BASIC_DATA_QUERY, &vars).await?;
        if result.is_not_found() {
            return Ok(Resolution::NotFound);
        }
        if result.is_forbidden() {
            return Ok(Resolution::Inaccessible);
        }

        let Some(data) = result
            .into_data()
            .map_err(|e| e.enrich_with(|| format!("querying basic data for '{spec}'")))?
            .repository
        else {
            return Ok(Resolution::NotFound);
        };

        log::debug!(target: LOG_TARGET, "Fetching created time for '{spec}'");
        let created = legacy::fetch_created_time(&self.client, &data.owner.login, &data.name, data.created_at).await?;
        let canonical = Url::parse(&data.url).into_app_err_with(|| format!("invalid repository URL '{}'", data.url))?;

        Ok(Resolution::Found(Arc::new(GitHubRepo {
            client: self.client.clone(),
            url: canonical,
            data,
            created,
        })))
    }
}

impl RepoFactory for GitHubRepoFactory {
    fn matches(&self, url: &Url) -> bool {
        url.host_str() == Some(GITHUB_HOST)
    }

    fn create<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Resolution>> {
        self.resolve(url).boxed()
    }
}

/// The [`GitHubRepo`] behind a resolved repository, if it is one.
#[must_use]
pub fn as_github(repo: &dyn Repo) -> Option<&GitHubRepo> {
    repo.as_any().downcast_ref()
}
