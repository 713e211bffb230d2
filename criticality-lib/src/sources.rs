//! Pluggable signal sources and the registry that fans a repository out to them.

use crate::Result;
use crate::repo::Repo;
use crate::signals::{SignalSet, validate_set};
use core::fmt::{Debug, Display, Formatter};
use futures::future::BoxFuture;
use ohno::{AppError, app_err, bail};
use std::collections::HashSet;
use std::sync::Arc;

const LOG_TARGET: &str = "   sources";

/// A producer of one signal set.
pub trait Source: Send + Sync {
    /// A set with every field unset, used to discover the output schema.
    fn empty_set(&self) -> Box<dyn SignalSet>;

    fn is_supported(&self, repo: &dyn Repo) -> bool;

    /// Collect this source's signals for `repo`.
    ///
    /// `job_id` is an opaque token identifying the current run; sources that cache derived
    /// state may reuse it across calls sharing the same token.
    fn get<'a>(&'a self, repo: &'a dyn Repo, job_id: &'a str) -> BoxFuture<'a, Result<Box<dyn SignalSet>>>;
}

/// Why collecting a repository failed.
#[derive(Debug)]
pub enum CollectError {
    /// Two applicable sources share a namespace. This is a configuration error and callers
    /// should stop the run.
    Conflict(AppError),

    /// A source failed for this repository.
    Source(AppError),
}

impl Display for CollectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Conflict(e) => write!(f, "conflicting signal sources: {e}"),
            Self::Source(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for CollectError {}

/// The registered sources, in registration order.
#[derive(Default)]
pub struct Registry {
    sources: Vec<Arc<dyn Source>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source, rejecting duplicates and invalid schemas.
    pub fn register(&mut self, source: Arc<dyn Source>) -> Result<()> {
        let set = source.empty_set();
        if self.sources.iter().any(|s| Arc::ptr_eq(s, &source)) {
            bail!("source '{}' has already been registered", set.namespace());
        }

        validate_set(set.as_ref())?;
        log::debug!(target: LOG_TARGET, "Registered source '{}'", set.namespace());
        self.sources.push(source);
        Ok(())
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// One empty set per namespace, in registration order.
    #[must_use]
    pub fn empty_sets(&self) -> Vec<Box<dyn SignalSet>> {
        let mut seen = HashSet::new();
        self.sources
            .iter()
            .map(|s| s.empty_set())
            .filter(|set| seen.insert(set.namespace()))
            .collect()
    }

    fn sources_for(&self, repo: &dyn Repo) -> Result<Vec<&Arc<dyn Source>>> {
        let mut namespaces = HashSet::new();
        let mut applicable = Vec::new();

        for source in &self.sources {
            if !source.is_supported(repo) {
                continue;
            }

            let namespace = source.empty_set().namespace();
            if !namespaces.insert(namespace) {
                return Err(app_err!(
                    "more than one source for '{}' uses namespace '{namespace}'",
                    repo.url()
                ));
            }

            applicable.push(source);
        }

        Ok(applicable)
    }

    /// Run every applicable source against `repo`, in registration order.
    ///
    /// The first failing source aborts the collection; no partial results are returned.
    pub async fn collect(&self, repo: &dyn Repo, job_id: &str) -> core::result::Result<Vec<Box<dyn SignalSet>>, CollectError> {
        let sources = self.sources_for(repo).map_err(CollectError::Conflict)?;

        let mut sets = Vec::with_capacity(sources.len());
        for source in sources {
            let set = source.get(repo, job_id).await.map_err(CollectError::Source)?;
            sets.push(set);
        }

        Ok(sets)
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let namespaces: Vec<_> = self.sources.iter().map(|s| s.empty_set().namespace()).collect();
        f.debug_struct("Registry").field("sources", &namespaces).finish()
    }
}
