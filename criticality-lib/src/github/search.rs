use super::client::GitHubClient;
use super::pages::{GraphQlPages, PageInfo};
use crate::pagination::{PagedQuery, Variables};
use crate::search::RepoHit;
use serde::Deserialize;

const SEARCH_QUERY: &str = "query($query: String!, $perPage: Int!, $endCursor: String) {
  search(type: REPOSITORY, query: $query, first: $perPage, after: $endCursor) {
    repositoryCount
    nodes { ... on Repository { stargazerCount url } }
    pageInfo { endCursor hasNextPage }
  }
}";

/// Most results the search API will return per page.
pub const MAX_SEARCH_PAGE_SIZE: u32 = 100;

/// One page of repository search results.
#[derive(Debug, Deserialize)]
pub struct RepoSearchPage {
    search: SearchResults,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResults {
    repository_count: usize,
    nodes: Vec<SearchNode>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNode {
    stargazer_count: Option<u64>,
    url: Option<String>,
}

impl PagedQuery for RepoSearchPage {
    type Item = RepoHit;

    fn total(&self) -> usize {
        self.search.repository_count
    }

    fn len(&self) -> usize {
        self.search.nodes.len()
    }

    fn get(&self, index: usize) -> Option<RepoHit> {
        let node = self.search.nodes.get(index)?;
        Some(RepoHit {
            url: node.url.clone().unwrap_or_default(),
            stars: node.stargazer_count.unwrap_or_default(),
        })
    }

    fn has_next_page(&self) -> bool {
        self.search.page_info.has_next_page
    }

    fn next_page_vars(&self) -> Variables {
        self.search.page_info.next_page_vars()
    }
}

/// Page source for GitHub repository search, for use with [`crate::search::repos_by_stars`].
#[must_use]
pub const fn repo_search(client: &GitHubClient) -> GraphQlPages<'_, RepoSearchPage> {
    GraphQlPages::new(client, SEARCH_QUERY)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn search_page_decodes() {
        let json = r#"{"search": {
            "repositoryCount": 1234,
            "nodes": [
                {"stargazerCount": 99, "url": "https://github.com/a/b"},
                {"stargazerCount": 98, "url": "https://github.com/c/d"}
            ],
            "pageInfo": {"endCursor": "Y3Vyc29yOjI=", "hasNextPage": true}
        }}"#;

        let page: RepoSearchPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.total(), 1234);
        assert_eq!(page.len(), 2);
        assert_eq!(
            page.get(1),
            Some(RepoHit {
                url: "https://github.com/c/d".into(),
                stars: 98
            })
        );
        assert!(page.get(2).is_none());
        assert!(page.has_next_page());
        assert_eq!(page.next_page_vars()["endCursor"], "Y3Vyc29yOjI=");
    }
}
