//! Star-window enumeration of repository search results.
//!
//! Upstream search reports the full number of matches but only lets callers page through the
//! first thousand or so. To list everything, results are requested in descending star order
//! and, whenever a query could not be drained, the upper star bound is pulled down to just above
//! the last star count seen and the query re-issued. Successive windows overlap by a configurable
//! margin so that repositories whose star count moved between queries are not missed; a
//! de-duplication set keeps the overlap from producing duplicates.
//!
//! The de-duplication set is held in memory for the duration of one enumeration, which is fine
//! for the tens of thousands of repositories a single window query yields.

use crate::Result;
use crate::pagination::{Cursor, PageSource, PagedQuery, Variables};
use ohno::IntoAppError;
use serde_json::json;
use std::collections::HashSet;
use tokio::sync::mpsc;

const LOG_TARGET: &str = "    search";

/// A search hit: the repository URL and its star count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHit {
    pub url: String,
    pub stars: u64,
}

/// Parameters of one star-window enumeration.
#[derive(Debug, Clone)]
pub struct StarWindow {
    /// Search criteria, without any sort or star qualifiers.
    pub base_query: String,
    pub min_stars: u64,
    pub overlap: u64,
    pub per_page: u32,
}

/// How an enumeration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// Every matching repository was emitted.
    Complete { emitted: usize },

    /// Too many repositories share a star count near `stars` for the window to be narrowed
    /// below `max_stars`; the repositories emitted so far are only a subset.
    Incomplete { emitted: usize, stars: u64, max_stars: u64 },
}

/// Receives repository URLs as soon as they are discovered.
pub trait Emit: Send {
    fn emit(&mut self, url: String) -> impl Future<Output = Result<()>> + Send;
}

impl Emit for Vec<String> {
    async fn emit(&mut self, url: String) -> Result<()> {
        self.push(url);
        Ok(())
    }
}

impl Emit for mpsc::Sender<String> {
    async fn emit(&mut self, url: String) -> Result<()> {
        self.send(url).await.into_app_err("result channel closed")
    }
}

/// Build the search string for a star window. `max_stars` of `None` leaves the window open above.
#[must_use]
pub fn build_query(base_query: &str, min_stars: u64, max_stars: Option<u64>) -> String {
    match max_stars {
        Some(max) => format!("{base_query} sort:stars stars:{min_stars}..{max}"),
        None => format!("{base_query} sort:stars stars:>={min_stars}"),
    }
}

/// Emit the URL of every repository matching `window`, narrowing the star range as needed.
pub async fn repos_by_stars<S, E>(source: &S, window: &StarWindow, emit: &mut E) -> Result<WindowOutcome>
where
    S: PageSource,
    S::Page: PagedQuery<Item = RepoHit>,
    E: Emit,
{
    let mut emitted = HashSet::new();
    let mut max_stars: Option<u64> = None;

    loop {
        let query = build_query(&window.base_query, window.min_stars, max_stars);
        log::debug!(target: LOG_TARGET, "Searching '{query}'");

        let mut vars = Variables::new();
        let _ = vars.insert("query".into(), json!(query));
        let _ = vars.insert("perPage".into(), json!(window.per_page));
        let _ = vars.insert("endCursor".into(), serde_json::Value::Null);

        let mut cursor = Cursor::query(source, vars).await?;
        let total = cursor.total();
        let mut seen = 0_usize;
        let mut last_stars = 0_u64;

        while let Some(hit) = cursor.next_item().await? {
            seen += 1;
            last_stars = hit.stars;
            if emitted.insert(hit.url.clone()) {
                emit.emit(hit.url).await?;
            }
        }

        let remaining = total.saturating_sub(seen);
        if remaining == 0 {
            log::debug!(target: LOG_TARGET, "Finished '{}' with {} repositories", window.base_query, emitted.len());
            return Ok(WindowOutcome::Complete { emitted: emitted.len() });
        }

        let next_max = last_stars.saturating_add(window.overlap);
        log::debug!(
            target: LOG_TARGET,
            "{remaining} repositories left for '{}', narrowing to {}..{next_max}",
            window.base_query,
            window.min_stars
        );

        match max_stars {
            Some(current) if next_max >= current => {
                log::warn!(
                    target: LOG_TARGET,
                    "Unable to narrow '{}' below {current} stars ({remaining} repositories left)",
                    window.base_query
                );
                return Ok(WindowOutcome::Incomplete {
                    emitted: emitted.len(),
                    stars: last_stars,
                    max_stars: current,
                });
            }
            _ => max_stars = Some(next_max),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PAGE_CAP: usize = 1000;

    struct SearchPage {
        hits: Vec<RepoHit>,
        total: usize,
        offset: usize,
        more: bool,
    }

    impl PagedQuery for SearchPage {
        type Item = RepoHit;

        fn total(&self) -> usize {
            self.total
        }

        fn len(&self) -> usize {
            self.hits.len()
        }

        fn get(&self, index: usize) -> Option<RepoHit> {
            self.hits.get(index).cloned()
        }

        fn has_next_page(&self) -> bool {
            self.more
        }

        fn next_page_vars(&self) -> Variables {
            let mut vars = Variables::new();
            let _ = vars.insert("endCursor".into(), json!((self.offset + self.hits.len()).to_string()));
            vars
        }
    }

    /// A search index that, like the real one, stops paginating after `cap` results.
    struct FakeSearch {
        repos: Vec<RepoHit>,
        cap: usize,
        queries: Mutex<Vec<String>>,
    }

    impl FakeSearch {
        fn new(repos: Vec<RepoHit>, cap: usize) -> Self {
            Self {
                repos,
                cap,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn star_range(query: &str) -> (u64, u64) {
            let filter = query.rsplit("stars:").next().unwrap();
            if let Some(min) = filter.strip_prefix(">=") {
                (min.parse().unwrap(), u64::MAX)
            } else {
                let (min, max) = filter.split_once("..").unwrap();
                (min.parse().unwrap(), max.parse().unwrap())
            }
        }
    }

    impl PageSource for FakeSearch {
        type Page = SearchPage;

        async fn fetch_page(&self, vars: &Variables) -> Result<SearchPage> {
            let query = vars["query"].as_str().unwrap().to_string();
            let per_page = usize::try_from(vars["perPage"].as_u64().unwrap()).unwrap();
            let offset: usize = vars["endCursor"].as_str().map_or(0, |c| c.parse().unwrap());

            let (min, max) = Self::star_range(&query);
            let mut matching: Vec<_> = self.repos.iter().filter(|r| (min..=max).contains(&r.stars)).cloned().collect();
            matching.sort_by(|a, b| b.stars.cmp(&a.stars));

            let reachable = matching.len().min(self.cap);
            let end = (offset + per_page).min(reachable);
            let hits = matching.get(offset..end).map(<[RepoHit]>::to_vec).unwrap_or_default();

            if offset == 0 {
                self.queries.lock().unwrap().push(query);
            }

            Ok(SearchPage {
                hits,
                total: matching.len(),
                offset,
                more: end < reachable,
            })
        }
    }

    fn window(min_stars: u64, overlap: u64) -> StarWindow {
        StarWindow {
            base_query: "is:public".into(),
            min_stars,
            overlap,
            per_page: 100,
        }
    }

    #[test]
    fn query_has_open_or_closed_star_range() {
        assert_eq!(build_query("is:public", 10, None), "is:public sort:stars stars:>=10");
        assert_eq!(build_query("is:public", 10, Some(205)), "is:public sort:stars stars:10..205");
    }

    #[tokio::test]
    async fn emits_every_repository_exactly_once_past_the_cap() {
        let repos = (1..=2500)
            .map(|i| RepoHit {
                url: format!("https://github.com/o/r{i}"),
                stars: i,
            })
            .collect();
        let source = FakeSearch::new(repos, PAGE_CAP);

        let mut urls = Vec::new();
        let outcome = repos_by_stars(&source, &window(1, 5), &mut urls).await.unwrap();
        assert_eq!(outcome, WindowOutcome::Complete { emitted: 2500 });

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for url in &urls {
            *counts.entry(url.as_str()).or_default() += 1;
        }
        assert_eq!(counts.len(), 2500);
        assert!(counts.values().all(|&c| c == 1));

        let queries = source.queries.lock().unwrap();
        assert_eq!(queries[0], "is:public sort:stars stars:>=1");
        assert_eq!(queries[1], "is:public sort:stars stars:1..1506");
        assert_eq!(queries.len(), 3);
    }

    #[tokio::test]
    async fn identical_star_counts_make_enumeration_impossible() {
        let repos = (0..50)
            .map(|i| RepoHit {
                url: format!("https://github.com/o/same{i}"),
                stars: 42,
            })
            .collect();
        let source = FakeSearch::new(repos, 20);

        let mut urls = Vec::new();
        let outcome = repos_by_stars(&source, &window(1, 5), &mut urls).await.unwrap();
        assert_eq!(
            outcome,
            WindowOutcome::Incomplete {
                emitted: 20,
                stars: 42,
                max_stars: 47
            }
        );
        assert_eq!(urls.len(), 20);
        assert_eq!(source.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn small_result_sets_need_one_query() {
        let repos = (10..60)
            .map(|i| RepoHit {
                url: format!("https://github.com/o/r{i}"),
                stars: i,
            })
            .collect();
        let source = FakeSearch::new(repos, PAGE_CAP);

        let mut urls = Vec::new();
        let outcome = repos_by_stars(&source, &window(20, 5), &mut urls).await.unwrap();
        assert_eq!(outcome, WindowOutcome::Complete { emitted: 40 });
        assert_eq!(source.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn channel_emitter_streams_urls() {
        let repos = vec![RepoHit {
            url: "https://github.com/o/only".into(),
            stars: 100,
        }];
        let source = FakeSearch::new(repos, PAGE_CAP);

        let (mut tx, mut rx) = mpsc::channel(4);
        let outcome = repos_by_stars(&source, &window(1, 5), &mut tx).await.unwrap();
        drop(tx);

        assert_eq!(outcome, WindowOutcome::Complete { emitted: 1 });
        assert_eq!(rx.recv().await.as_deref(), Some("https://github.com/o/only"));
        assert_eq!(rx.recv().await, None);
    }
}
