use super::GitHubClient;
use crate::Result;
use crate::pagination::{PageSource, PagedQuery, Variables};
use core::fmt::{Debug, Formatter};
use core::marker::PhantomData;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Cursor-based GraphQL `pageInfo`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

impl PageInfo {
    /// Variables requesting the page after this one.
    #[must_use]
    pub fn next_page_vars(&self) -> Variables {
        let mut vars = Variables::new();
        let cursor = self
            .end_cursor
            .as_deref()
            .filter(|c| !c.is_empty())
            .map_or(serde_json::Value::Null, |c| serde_json::Value::String(c.to_string()));
        let _ = vars.insert("endCursor".into(), cursor);
        vars
    }
}

/// A [`PageSource`] that runs one GraphQL query and decodes each response as `Q`.
pub struct GraphQlPages<'a, Q> {
    client: &'a GitHubClient,
    query: &'static str,
    page: PhantomData<fn() -> Q>,
}

impl<'a, Q> GraphQlPages<'a, Q> {
    #[must_use]
    pub const fn new(client: &'a GitHubClient, query: &'static str) -> Self {
        Self {
            client,
            query,
            page: PhantomData,
        }
    }
}

impl<Q> Debug for GraphQlPages<'_, Q> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GraphQlPages").field("query", &self.query).finish_non_exhaustive()
    }
}

impl<Q> PageSource for GraphQlPages<'_, Q>
where
    Q: PagedQuery + DeserializeOwned + Send,
{
    type Page = Q;

    fn fetch_page(&self, vars: &Variables) -> impl Future<Output = Result<Q>> + Send {
        self.client.graphql_data(self.query, vars)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn empty_cursor_becomes_null() {
        let info = PageInfo {
            end_cursor: Some(String::new()),
            has_next_page: false,
        };
        assert_eq!(info.next_page_vars()["endCursor"], serde_json::Value::Null);

        let info = PageInfo {
            end_cursor: Some("Y3Vyc29y".into()),
            has_next_page: true,
        };
        assert_eq!(info.next_page_vars()["endCursor"], "Y3Vyc29y");
    }
}
