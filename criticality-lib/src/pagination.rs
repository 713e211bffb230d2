//! Lazy, forward-only iteration over paged upstream queries.
//!
//! A [`PagedQuery`] is one decoded page of results: it knows how many items it holds, the total
//! reported upstream, whether another page follows and which variables request it. A
//! [`PageSource`] fetches a page for a set of variables. [`Cursor`] glues the two together and
//! only goes back upstream when it crosses a page boundary.

use crate::Result;
use core::fmt::{Debug, Formatter};

/// Variables sent with a page request. Next-page variables are merged into these.
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// One page of a paged query.
pub trait PagedQuery {
    type Item;

    /// Total number of items upstream; may change from page to page.
    fn total(&self) -> usize;

    /// Number of items in this page.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item `index` of this page.
    fn get(&self, index: usize) -> Option<Self::Item>;

    fn has_next_page(&self) -> bool;

    /// Variables to merge into the request for the following page.
    fn next_page_vars(&self) -> Variables;
}

/// Fetches pages of a [`PagedQuery`].
pub trait PageSource: Sync {
    type Page: PagedQuery + Send;

    fn fetch_page(&self, vars: &Variables) -> impl Future<Output = Result<Self::Page>> + Send;
}

/// Single-pass cursor over every item of a paged query.
pub struct Cursor<'a, S: PageSource> {
    source: &'a S,
    vars: Variables,
    page: S::Page,
    position: usize,
    finished: bool,
}

impl<S: PageSource> Debug for Cursor<'_, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cursor")
            .field("vars", &self.vars)
            .field("page_len", &self.page.len())
            .field("position", &self.position)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<'a, S: PageSource> Cursor<'a, S> {
    /// Fetch the first page; fails if that fetch fails.
    pub async fn query(source: &'a S, vars: Variables) -> Result<Self> {
        let page = source.fetch_page(&vars).await?;
        Ok(Self {
            source,
            vars,
            page,
            position: 0,
            finished: false,
        })
    }

    /// Total reported by the most recently fetched page.
    #[must_use]
    pub fn total(&self) -> usize {
        self.page.total()
    }

    /// The next item, or `None` once the sequence has ended.
    ///
    /// An empty page fetched after a page that claimed more were coming also ends the sequence.
    pub async fn next_item(&mut self) -> Result<Option<<S::Page as PagedQuery>::Item>> {
        if self.finished {
            return Ok(None);
        }

        if self.position >= self.page.len() {
            if !self.page.has_next_page() {
                self.finished = true;
                return Ok(None);
            }

            self.vars.extend(self.page.next_page_vars());
            self.page = self.source.fetch_page(&self.vars).await?;
            self.position = 0;

            if self.page.is_empty() {
                self.finished = true;
                return Ok(None);
            }
        }

        let item = self.page.get(self.position);
        self.position += 1;
        Ok(item)
    }
}
