use super::dependents::Dependents;
use crate::Result;
use crate::repo::Repo;
use crate::signals::SignalSet;
use crate::sources::Source;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "   depsdev";

/// deps.dev project type for repositories hosted on GitHub.
pub const PROJECT_TYPE_GITHUB: &str = "GITHUB";

crate::signal_set! {
    /// Signals derived from deps.dev.
    pub struct DepsDevSet in "depsdev" {
        dependent_count: i64,
    }
}

/// Project name and type as deps.dev records them, if the host is one deps.dev tracks.
fn project_of(url: &Url) -> Option<(&str, &'static str)> {
    match url.host_str() {
        Some("github.com") => Some((url.path().trim_matches('/'), PROJECT_TYPE_GITHUB)),
        _ => None,
    }
}

/// Produces [`DepsDevSet`] from the derived dependents table.
#[derive(Debug, Clone)]
pub struct DepsDevSource {
    dependents: Arc<Dependents>,
}

impl DepsDevSource {
    #[must_use]
    pub const fn new(dependents: Arc<Dependents>) -> Self {
        Self { dependents }
    }
}

impl Source for DepsDevSource {
    fn empty_set(&self) -> Box<dyn SignalSet> {
        Box::new(DepsDevSet::default())
    }

    fn is_supported(&self, repo: &dyn Repo) -> bool {
        project_of(repo.url()).is_some()
    }

    fn get<'a>(&'a self, repo: &'a dyn Repo, job_id: &'a str) -> BoxFuture<'a, Result<Box<dyn SignalSet>>> {
        async move {
            let mut set = DepsDevSet::default();
            let Some((name, kind)) = project_of(repo.url()) else {
                return Ok(Box::new(set) as Box<dyn SignalSet>);
            };

            log::debug!(target: LOG_TARGET, "Fetching dependent count for {kind} project '{name}'");
            if let Some(count) = self.dependents.count(name, kind, job_id).await? {
                set.dependent_count.set(count);
            }
            Ok(Box::new(set) as Box<dyn SignalSet>)
        }
        .boxed()
    }
}
