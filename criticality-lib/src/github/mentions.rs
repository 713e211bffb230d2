use super::client::GitHubClient;
use crate::Result;
use crate::repo::Repo;
use crate::signals::SignalSet;
use crate::sources::Source;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;

const LOG_TARGET: &str = "  mentions";

crate::signal_set! {
    /// How often a repository is mentioned in commit messages across GitHub.
    pub struct MentionSet in "github_mentions" {
        github_mention_count: i64 => legacy,
    }
}

#[derive(Deserialize)]
struct SearchTotal {
    total_count: u64,
}

/// Counts commits on GitHub that mention a repository by `owner/name`.
#[derive(Debug, Clone)]
pub struct MentionsSource {
    client: GitHubClient,
}

impl MentionsSource {
    #[must_use]
    pub const fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    async fn mention_count(&self, repo: &dyn Repo) -> Result<u64> {
        let repo_name = repo.url().path().trim_matches('/');
        let query = format!("\"{repo_name}\"");
        log::debug!(target: LOG_TARGET, "Searching commits for {query}");

        let response = self
            .client
            .rest_get("search/commits", &[("q", &query), ("per_page", "1")])
            .await?
            .error_for_status()?;
        Ok(response.json::<SearchTotal>()?.total_count)
    }
}

impl Source for MentionsSource {
    fn empty_set(&self) -> Box<dyn SignalSet> {
        Box::new(MentionSet::default())
    }

    fn is_supported(&self, _repo: &dyn Repo) -> bool {
        true
    }

    fn get<'a>(&'a self, repo: &'a dyn Repo, _job_id: &'a str) -> BoxFuture<'a, Result<Box<dyn SignalSet>>> {
        async move {
            let mut set = MentionSet::default();
            set.github_mention_count
                .set(i64::try_from(self.mention_count(repo).await?).unwrap_or(i64::MAX));
            Ok(Box::new(set) as Box<dyn SignalSet>)
        }
        .boxed()
    }
}
