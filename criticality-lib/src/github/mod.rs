//! GitHub: API client, repository resolution, signal sources and repository search.

mod client;
mod legacy;
mod mentions;
mod pages;
mod repo;
mod search;
mod sources;

pub use client::{
    DEFAULT_API_URL, DEFAULT_GRAPHQL_URL, GitHubClient, GraphQlError, GraphQlResult, UserCompany, has_next_page, last_page,
    rest_error_message,
};
pub use legacy::{
    IssueState, fetch_created_time, fetch_issue_comment_count, fetch_issue_count, fetch_org_count, fetch_release_count,
    fetch_total_contributors,
};
pub use mentions::{MentionSet, MentionsSource};
pub use pages::{GraphQlPages, PageInfo};
pub use repo::{BasicRepoData, GITHUB_HOST, GitHubRepo, GitHubRepoFactory, as_github};
pub use search::{MAX_SEARCH_PAGE_SIZE, RepoSearchPage, repo_search};
pub use sources::{IssuesSet, IssuesSource, RepoSet, RepoSource};
