//! Resolved project repositories and the factories that create them.

mod spec;

pub use spec::RepoSpec;

use crate::Result;
use core::any::Any;
use core::fmt::Debug;
use futures::future::BoxFuture;
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "  resolver";

/// A resolved project repository.
///
/// Providers keep whatever metadata they fetched while resolving the repository on their
/// concrete type; sources recover it through [`as_any`](Self::as_any).
pub trait Repo: Debug + Send + Sync {
    /// The canonical URL of the repository.
    fn url(&self) -> &Url;

    fn as_any(&self) -> &dyn Any;
}

/// The outcome of resolving a repository URL.
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Arc<dyn Repo>),

    /// The provider reports no such repository.
    NotFound,

    /// The repository exists but the credentials in use cannot read it.
    Inaccessible,

    /// No registered factory handles the URL.
    Unsupported,
}

/// Creates [`Repo`] instances for the URLs of one provider.
pub trait RepoFactory: Send + Sync {
    fn matches(&self, url: &Url) -> bool;

    fn create<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<Resolution>>;
}

/// Dispatches repository URLs to the first factory that matches them.
#[derive(Default)]
pub struct Resolver {
    factories: Vec<Box<dyn RepoFactory>>,
}

impl Resolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Box<dyn RepoFactory>) {
        self.factories.push(factory);
    }

    pub async fn resolve(&self, url: &Url) -> Result<Resolution> {
        let Some(factory) = self.factories.iter().find(|f| f.matches(url)) else {
            log::debug!(target: LOG_TARGET, "No factory handles '{url}'");
            return Ok(Resolution::Unsupported);
        };

        factory.create(url).await
    }
}

impl Debug for Resolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Resolver").field("factories", &self.factories.len()).finish()
    }
}
