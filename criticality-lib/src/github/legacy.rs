//! Signal fetchers that reproduce the classic criticality score's definitions.

use super::client::{GitHubClient, has_next_page, last_page, rest_error_message};
use super::pages::{GraphQlPages, PageInfo};
use crate::Result;
use crate::pagination::{Cursor, PagedQuery, Variables};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use core::time::Duration;
use ohno::bail;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;

const LOG_TARGET: &str = "    legacy";

/// Unit for the `*_since` signals.
pub const SINCE_UNIT: Duration = Duration::from_hours(30 * 24);

/// How far back issue activity is counted, 2160 days.
pub const ISSUE_LOOKBACK: Duration = Duration::from_hours(90 * 24 * 24);

/// How far back releases are counted.
pub const RELEASE_LOOKBACK_DAYS: i64 = 365;

pub const MAX_CONTRIBUTORS: u64 = 5000;
pub const MAX_ISSUES: u64 = 5000;
pub const MAX_TOP_CONTRIBUTORS: u32 = 15;
pub const TOO_MANY_CONTRIBUTORS_ORG_COUNT: u64 = 10;
pub const TOO_MANY_COMMENTS_FREQUENCY: f64 = 2.0;

const RELEASES_PER_PAGE: u32 = 100;
const CREATED_TIME_ATTEMPTS: u32 = 5;
const TOO_LARGE_MESSAGE: &str = "list is too large";

const RELEASES_QUERY: &str = "query($repositoryOwner: String!, $repositoryName: String!, $perPage: Int!, $endCursor: String) {
  repository(owner: $repositoryOwner, name: $repositoryName) {
    releases(orderBy: {direction: DESC, field: CREATED_AT}, first: $perPage, after: $endCursor) {
      nodes { createdAt }
      pageInfo { endCursor hasNextPage }
      totalCount
    }
  }
}";

/// Whole `unit`s between two instants, in either order.
#[must_use]
pub fn time_delta(a: DateTime<Utc>, b: DateTime<Utc>, unit: Duration) -> i64 {
    let delta = (a - b).abs().to_std().unwrap_or_default();
    i64::try_from(delta.as_secs() / unit.as_secs().max(1)).unwrap_or(i64::MAX)
}

/// Round to `places` decimal places.
#[must_use]
pub fn round(value: f64, places: i32) -> f64 {
    let m = 10_f64.powi(places);
    (value * m).round() / m
}

/// Strip legal suffixes and punctuation so that spellings of one company compare equal.
#[must_use]
pub fn normalize_company(company: &str) -> String {
    company
        .to_lowercase()
        .replace("inc.", "")
        .replace("llc", "")
        .replace(['@', ' '], "")
        .trim_end_matches(',')
        .to_string()
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn lookback_start(lookback: Duration) -> DateTime<Utc> {
    Utc::now() - TimeDelta::from_std(lookback).unwrap_or_else(|_| TimeDelta::zero())
}

fn is_too_large(response: &crate::http::HttpResponse) -> bool {
    response.status == StatusCode::FORBIDDEN && rest_error_message(response).contains(TOO_LARGE_MESSAGE)
}

/// Count the items of a `per_page=1` listing: the last page number, or the single page's length.
fn count_from_single_item_pages(response: &crate::http::HttpResponse) -> Result<u64> {
    if response.status == StatusCode::NO_CONTENT {
        return Ok(0);
    }

    if has_next_page(response)
        && let Some(last) = last_page(response)
    {
        return Ok(last);
    }

    let items: Vec<serde_json::Value> = response.json()?;
    Ok(items.len() as u64)
}

#[derive(Deserialize)]
struct CommitItem {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    committer: Option<Signature>,
}

#[derive(Deserialize)]
struct Signature {
    date: Option<DateTime<Utc>>,
}

impl CommitItem {
    fn date(&self) -> Option<DateTime<Utc>> {
        self.commit.committer.as_ref()?.date
    }
}

/// The date of the oldest commit at or before `earliest_so_far`, or `earliest_so_far` itself if
/// there is none.
///
/// Repositories imported into GitHub report their import time as their creation time; the
/// oldest commit is a better estimate of when the project started.
pub async fn fetch_created_time(
    client: &GitHubClient,
    owner: &str,
    name: &str,
    earliest_so_far: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let path = format!("repos/{owner}/{name}/commits");
    let until = rfc3339(earliest_so_far);

    let response = client.rest_get(&path, &[("until", &until), ("per_page", "1")]).await?;
    if response.status == StatusCode::CONFLICT {
        // Empty repository.
        return Ok(earliest_so_far);
    }

    let mut response = response.error_for_status()?;
    let mut last = last_page(&response);
    if !has_next_page(&response) || last == Some(1) {
        let commits: Vec<CommitItem> = response.json()?;
        return Ok(commits.first().and_then(CommitItem::date).unwrap_or(earliest_so_far));
    }

    // New commits may land between requests and shift the last page, so chase it a few times.
    let mut attempts = CREATED_TIME_ATTEMPTS;
    while let Some(page) = last {
        if attempts == 0 {
            break;
        }
        attempts -= 1;

        let page = page.to_string();
        response = client
            .rest_get(&path, &[("until", &until), ("per_page", "1"), ("page", &page)])
            .await?
            .error_for_status()?;
        last = last_page(&response);
        if !has_next_page(&response) {
            break;
        }
        log::debug!(target: LOG_TARGET, "Last commit page of {owner}/{name} moved, retrying");
    }

    let commits: Vec<CommitItem> = response.json()?;
    match commits.last().and_then(CommitItem::date) {
        Some(date) => Ok(date),
        None => bail!("commits disappeared for GitHub repository '{owner}/{name}'"),
    }
}

/// Number of contributors, including anonymous ones, capped at [`MAX_CONTRIBUTORS`].
pub async fn fetch_total_contributors(client: &GitHubClient, owner: &str, name: &str) -> Result<u64> {
    let response = client
        .rest_get(&format!("repos/{owner}/{name}/contributors"), &[("per_page", "1"), ("anon", "1")])
        .await?;
    if is_too_large(&response) {
        return Ok(MAX_CONTRIBUTORS);
    }

    let count = count_from_single_item_pages(&response.error_for_status()?)?;
    Ok(count.min(MAX_CONTRIBUTORS))
}

#[derive(Deserialize)]
struct Contributor {
    login: Option<String>,
}

/// Number of distinct companies among the top contributors.
pub async fn fetch_org_count(client: &GitHubClient, owner: &str, name: &str) -> Result<u64> {
    let per_page = MAX_TOP_CONTRIBUTORS.to_string();
    let response = client
        .rest_get(&format!("repos/{owner}/{name}/contributors"), &[("per_page", &per_page)])
        .await?;
    if is_too_large(&response) {
        return Ok(TOO_MANY_CONTRIBUTORS_ORG_COUNT);
    }

    let response = response.error_for_status()?;
    if response.status == StatusCode::NO_CONTENT {
        return Ok(0);
    }

    let contributors: Vec<Contributor> = response.json()?;
    let logins: Vec<&str> = contributors
        .iter()
        .filter_map(|c| c.login.as_deref())
        .filter(|login| !login.is_empty() && !login.ends_with("[bot]"))
        .collect();
    if logins.is_empty() {
        return Ok(0);
    }

    let users = client.batch_user_companies(&logins).await?;
    let orgs: HashSet<String> = users
        .iter()
        .filter_map(|u| u.company.as_deref())
        .filter(|company| !company.is_empty())
        .map(normalize_company)
        .collect();

    Ok(orgs.len() as u64)
}

#[derive(Deserialize)]
struct ReleasesPage {
    repository: Option<ReleasesRepository>,
}

#[derive(Deserialize)]
struct ReleasesRepository {
    releases: Releases,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Releases {
    nodes: Vec<ReleaseNode>,
    page_info: PageInfo,
    total_count: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseNode {
    created_at: DateTime<Utc>,
}

impl ReleasesPage {
    fn releases(&self) -> Option<&Releases> {
        self.repository.as_ref().map(|r| &r.releases)
    }
}

impl PagedQuery for ReleasesPage {
    type Item = DateTime<Utc>;

    fn total(&self) -> usize {
        self.releases().map_or(0, |r| r.total_count)
    }

    fn len(&self) -> usize {
        self.releases().map_or(0, |r| r.nodes.len())
    }

    fn get(&self, index: usize) -> Option<DateTime<Utc>> {
        self.releases()?.nodes.get(index).map(|n| n.created_at)
    }

    fn has_next_page(&self) -> bool {
        self.releases().is_some_and(|r| r.page_info.has_next_page)
    }

    fn next_page_vars(&self) -> Variables {
        self.releases().map(|r| r.page_info.next_page_vars()).unwrap_or_default()
    }
}

/// Number of releases created within the last `lookback_days` days.
pub async fn fetch_release_count(client: &GitHubClient, owner: &str, name: &str, lookback_days: i64) -> Result<u64> {
    let mut vars = Variables::new();
    let _ = vars.insert("repositoryOwner".into(), json!(owner));
    let _ = vars.insert("repositoryName".into(), json!(name));
    let _ = vars.insert("perPage".into(), json!(RELEASES_PER_PAGE));
    let _ = vars.insert("endCursor".into(), serde_json::Value::Null);

    let pages = GraphQlPages::<ReleasesPage>::new(client, RELEASES_QUERY);
    let mut cursor = Cursor::query(&pages, vars).await?;
    let cutoff = Utc::now() - TimeDelta::days(lookback_days);

    let mut total = 0;
    while let Some(created) = cursor.next_item().await? {
        // Newest first, so the first old release ends the count.
        if created < cutoff {
            break;
        }
        total += 1;
    }

    Ok(total)
}

/// Issue states accepted by the issue listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum IssueState {
    All,
    Open,
    Closed,
}

/// Number of issues in `state` updated within `lookback`.
///
/// The endpoint fails with a server error when there are too many issues; that counts as
/// [`MAX_ISSUES`].
pub async fn fetch_issue_count(
    client: &GitHubClient,
    owner: &str,
    name: &str,
    state: IssueState,
    lookback: Duration,
) -> Result<u64> {
    let since = rfc3339(lookback_start(lookback));
    let response = client
        .rest_get(
            &format!("repos/{owner}/{name}/issues"),
            &[("since", &since), ("state", state.as_ref()), ("per_page", "1")],
        )
        .await?;
    if response.status.is_server_error() {
        log::debug!(target: LOG_TARGET, "Too many {state} issues for {owner}/{name}");
        return Ok(MAX_ISSUES);
    }

    count_from_single_item_pages(&response.error_for_status()?)
}

/// Number of issue comments made within `lookback`, or `None` if there are too many to count.
pub async fn fetch_issue_comment_count(client: &GitHubClient, owner: &str, name: &str, lookback: Duration) -> Result<Option<u64>> {
    let since = rfc3339(lookback_start(lookback));
    let response = client
        .rest_get(
            &format!("repos/{owner}/{name}/issues/comments"),
            &[("since", &since), ("per_page", "1")],
        )
        .await?;
    if response.status.is_server_error() {
        log::debug!(target: LOG_TARGET, "Too many issue comments for {owner}/{name}");
        return Ok(None);
    }

    count_from_single_item_pages(&response.error_for_status()?).map(Some)
}

/// Commits per week, from a yearly commit count.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "commit counts are far below 2^52")]
pub fn commit_frequency(commits_last_year: u64) -> f64 {
    round(commits_last_year as f64 / 52.0, 2)
}

/// Comments per updated issue.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "issue counts are far below 2^52")]
pub fn comment_frequency(comments: u64, updated_issues: u64) -> f64 {
    if updated_issues == 0 {
        0.0
    } else {
        round(comments as f64 / updated_issues as f64, 2)
    }
}

/// Releases per year estimated from the tag count, for projects that do not publish releases.
#[must_use]
pub fn releases_from_tags(tags: u64, created: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let days = (now - created).num_days();
    match u64::try_from(days) {
        Ok(days) if days > 0 => tags * RELEASE_LOOKBACK_DAYS.unsigned_abs() / days,
        _ => 0,
    }
}
