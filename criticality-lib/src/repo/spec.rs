use crate::Result;
use core::fmt::{Display, Formatter};
use ohno::{IntoAppError, bail};
use std::sync::Arc;
use url::Url;

/// A repository URL reduced to `scheme://host/owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoSpec {
    url: Arc<Url>,
    host: Arc<str>,
    owner: Arc<str>,
    name: Arc<str>,
}

impl RepoSpec {
    pub fn parse(url: &Url) -> Result<Self> {
        let segments: Vec<_> = url.path_segments().map(Iterator::collect).unwrap_or_default();

        let (Some(owner), Some(name)) = (segments.first(), segments.get(1)) else {
            bail!("invalid repository URL format: {url}");
        };

        if owner.is_empty() || name.is_empty() {
            bail!("invalid repository URL: empty owner or repository name: {url}");
        }

        let host = url.host_str().unwrap_or_default();
        let name = name.trim_end_matches(".git");
        let scheme = url.scheme();

        let clean_url =
            Url::parse(&format!("{scheme}://{host}/{owner}/{name}")).into_app_err("reconstructing repository URL")?;

        Ok(Self {
            host: Arc::from(host),
            owner: Arc::from(*owner),
            name: Arc::from(name),
            url: Arc::new(clean_url),
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for RepoSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.url)
    }
}
