//! Signal sets collected from GitHub repository metadata.

use super::legacy::{self, IssueState};
use super::repo::{GitHubRepo, as_github};
use crate::Result;
use crate::repo::Repo;
use crate::signals::SignalSet;
use crate::sources::Source;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use ohno::IntoAppError;

const LOG_TARGET: &str = "    github";

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

crate::signal_set! {
    /// General repository signals.
    pub struct RepoSet in "repo" {
        url: String,
        language: String,
        license: String,
        star_count: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        created_since: i64 => legacy,
        updated_since: i64 => legacy,
        contributor_count: i64 => legacy,
        org_count: i64 => legacy,
        commit_frequency: f64 => legacy,
        recent_release_count: i64 => legacy,
    }
}

crate::signal_set! {
    /// Issue activity signals.
    pub struct IssuesSet in "issues" {
        updated_issues_count: i64 => legacy,
        closed_issues_count: i64 => legacy,
        issue_comment_frequency: f64 => legacy,
    }
}

fn github_repo(repo: &dyn Repo) -> Result<&GitHubRepo> {
    as_github(repo).into_app_err_with(|| format!("'{}' is not a GitHub repository", repo.url()))
}

/// Produces [`RepoSet`] for GitHub repositories.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepoSource;

impl RepoSource {
    async fn collect(repo: &GitHubRepo) -> Result<RepoSet> {
        let now = Utc::now();
        let data = repo.data();
        let client = repo.client();
        let (owner, name) = (repo.owner(), repo.name());

        let mut set = RepoSet::default();
        set.url.set(repo.url().to_string());
        if let Some(language) = &data.primary_language {
            set.language.set(language.name.clone());
        }
        if let Some(license) = &data.license_info {
            set.license.set(license.name.clone());
        }
        set.star_count.set(to_i64(data.stargazer_count));
        set.created_at.set(repo.created_at());
        set.created_since.set(legacy::time_delta(now, repo.created_at(), legacy::SINCE_UNIT));
        if let Some(updated) = repo.updated_at() {
            set.updated_at.set(updated);
            set.updated_since.set(legacy::time_delta(now, updated, legacy::SINCE_UNIT));
        }
        set.commit_frequency.set(legacy::commit_frequency(data.recent_commit_count()));

        log::debug!(target: LOG_TARGET, "Fetching contributors for {owner}/{name}");
        set.contributor_count.set(to_i64(legacy::fetch_total_contributors(client, owner, name).await?));

        log::debug!(target: LOG_TARGET, "Fetching org count for {owner}/{name}");
        set.org_count.set(to_i64(legacy::fetch_org_count(client, owner, name).await?));

        log::debug!(target: LOG_TARGET, "Fetching releases for {owner}/{name}");
        let releases = legacy::fetch_release_count(client, owner, name, legacy::RELEASE_LOOKBACK_DAYS).await?;
        let releases = if releases == 0 {
            legacy::releases_from_tags(data.tag_count(), repo.created_at(), now)
        } else {
            releases
        };
        set.recent_release_count.set(to_i64(releases));

        Ok(set)
    }
}

impl Source for RepoSource {
    fn empty_set(&self) -> Box<dyn SignalSet> {
        Box::new(RepoSet::default())
    }

    fn is_supported(&self, repo: &dyn Repo) -> bool {
        as_github(repo).is_some()
    }

    fn get<'a>(&'a self, repo: &'a dyn Repo, _job_id: &'a str) -> BoxFuture<'a, Result<Box<dyn SignalSet>>> {
        async move {
            let set = Self::collect(github_repo(repo)?).await?;
            Ok(Box::new(set) as Box<dyn SignalSet>)
        }
        .boxed()
    }
}

/// Produces [`IssuesSet`] for GitHub repositories.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssuesSource;

impl IssuesSource {
    async fn collect(repo: &GitHubRepo) -> Result<IssuesSet> {
        let client = repo.client();
        let (owner, name) = (repo.owner(), repo.name());
        let mut set = IssuesSet::default();

        log::debug!(target: LOG_TARGET, "Fetching closed issues for {owner}/{name}");
        let closed = legacy::fetch_issue_count(client, owner, name, IssueState::Closed, legacy::ISSUE_LOOKBACK).await?;
        set.closed_issues_count.set(to_i64(closed));

        log::debug!(target: LOG_TARGET, "Fetching updated issues for {owner}/{name}");
        let updated = legacy::fetch_issue_count(client, owner, name, IssueState::All, legacy::ISSUE_LOOKBACK).await?;
        set.updated_issues_count.set(to_i64(updated));

        if updated == 0 {
            set.issue_comment_frequency.set(0.0);
            return Ok(set);
        }

        log::debug!(target: LOG_TARGET, "Fetching comment frequency for {owner}/{name}");
        let frequency = match legacy::fetch_issue_comment_count(client, owner, name, legacy::ISSUE_LOOKBACK).await? {
            Some(comments) => legacy::comment_frequency(comments, updated),
            None => legacy::TOO_MANY_COMMENTS_FREQUENCY,
        };
        set.issue_comment_frequency.set(frequency);

        Ok(set)
    }
}

impl Source for IssuesSource {
    fn empty_set(&self) -> Box<dyn SignalSet> {
        Box::new(IssuesSet::default())
    }

    fn is_supported(&self, repo: &dyn Repo) -> bool {
        as_github(repo).is_some()
    }

    fn get<'a>(&'a self, repo: &'a dyn Repo, _job_id: &'a str) -> BoxFuture<'a, Result<Box<dyn SignalSet>>> {
        async move {
            let set = Self::collect(github_repo(repo)?).await?;
            Ok(Box::new(set) as Box<dyn SignalSet>)
        }
        .boxed()
    }
}
