//! Resolve a repository URL and collect every applicable signal set for it.

use crate::repo::{Resolution, Resolver};
use crate::signals::SignalSet;
use crate::sources::{CollectError, Registry};
use core::result::Result as StdResult;
use url::Url;

const LOG_TARGET: &str = " collector";

/// What collecting one repository produced.
#[derive(Debug)]
pub enum Collected {
    Signals(Vec<Box<dyn SignalSet>>),

    /// The URL cannot be collected; the string says why.
    Uncollectable(String),
}

/// Ties repository resolution to the source registry.
#[derive(Debug)]
pub struct Collector {
    resolver: Resolver,
    registry: Registry,
}

impl Collector {
    #[must_use]
    pub const fn new(resolver: Resolver, registry: Registry) -> Self {
        Self { resolver, registry }
    }

    /// One empty set per output namespace, used to lay out output headers.
    #[must_use]
    pub fn empty_sets(&self) -> Vec<Box<dyn SignalSet>> {
        self.registry.empty_sets()
    }

    /// Collect the signals for `url`.
    ///
    /// Unsupported, missing and inaccessible repositories come back as
    /// [`Collected::Uncollectable`] rather than as errors.
    pub async fn collect(&self, url: &Url, job_id: &str) -> StdResult<Collected, CollectError> {
        let repo = match self.resolver.resolve(url).await.map_err(CollectError::Source)? {
            Resolution::Found(repo) => repo,
            Resolution::NotFound => return Ok(Collected::Uncollectable(format!("repository not found: {url}"))),
            Resolution::Inaccessible => return Ok(Collected::Uncollectable(format!("repository is inaccessible: {url}"))),
            Resolution::Unsupported => return Ok(Collected::Uncollectable(format!("unsupported url: {url}"))),
        };

        if repo.url() == url {
            log::info!(target: LOG_TARGET, "Collecting '{url}'");
        } else {
            log::info!(target: LOG_TARGET, "Collecting '{url}' (canonical '{}')", repo.url());
        }

        let sets = self.registry.collect(repo.as_ref(), job_id).await?;
        Ok(Collected::Signals(sets))
    }
}
