//! Encoders that write collected signal sets, plus the URL writer used by enumeration.
//!
//! Every [`SignalWriter`] may be shared between workers: each record is written and flushed
//! under a lock, so records never interleave.

mod csv;
mod json;
mod text;
mod urls;

pub use csv::CsvWriter;
pub use json::JsonWriter;
pub use text::TextWriter;
pub use urls::{UrlFormat, UrlWriter};

use crate::Result;
use crate::signals::{SignalSet, as_map, field_names};
use clap::ValueEnum;
use std::collections::HashMap;
use std::io::Write;

/// A sink that [`SignalWriter`]s take ownership of.
pub type Output = Box<dyn Write + Send>;

/// An extra top-level column appended to each record, such as a score.
pub type ExtraField = (String, String);

/// Output encoding for collected signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Format {
    /// Comma separated values with a header row
    #[default]
    Csv,

    /// One JSON object per line
    Json,

    /// `field: value` lines, records separated by a blank line
    Text,
}

/// Writes one record per collected repository.
pub trait SignalWriter: Send + Sync {
    fn write_signals(&self, sets: &[Box<dyn SignalSet>], extra: &[ExtraField]) -> Result<()>;
}

/// Create a writer for `format`.
///
/// `empty_sets` and `extra_columns` fix the columns of the tabular formats.
#[must_use]
pub fn signal_writer(format: Format, out: Output, empty_sets: &[Box<dyn SignalSet>], extra_columns: &[String]) -> Box<dyn SignalWriter> {
    match format {
        Format::Csv => Box::new(CsvWriter::new(out, columns(empty_sets, extra_columns))),
        Format::Json => Box::new(JsonWriter::new(out)),
        Format::Text => Box::new(TextWriter::new(out, columns(empty_sets, extra_columns))),
    }
}

/// Qualified field names of every set followed by the extra columns.
fn columns(empty_sets: &[Box<dyn SignalSet>], extra_columns: &[String]) -> Vec<String> {
    empty_sets
        .iter()
        .flat_map(|set| field_names(set.as_ref()))
        .chain(extra_columns.iter().cloned())
        .collect()
}

/// Each set field and extra column rendered as text, keyed by column name. Unset fields are absent.
fn cells(sets: &[Box<dyn SignalSet>], extra: &[ExtraField]) -> HashMap<String, String> {
    sets.iter()
        .flat_map(|set| as_map(set.as_ref()))
        .filter_map(|(name, value)| value.map(|v| (name, v.to_string())))
        .chain(extra.iter().cloned())
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    crate::signal_set! {
        pub struct RepoSample in "repo" {
            url: String,
            star_count: i64,
            created_at: chrono::DateTime<chrono::Utc>,
            contributor_count: i64 => legacy,
        }
    }

    crate::signal_set! {
        pub struct IssueSample in "issues" {
            issue_comment_frequency: f64 => legacy,
        }
    }

    /// A cloneable in-memory sink.
    #[derive(Debug, Clone, Default)]
    pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    pub fn empty_sets() -> Vec<Box<dyn SignalSet>> {
        vec![Box::new(RepoSample::default()), Box::new(IssueSample::default())]
    }

    pub fn sample_sets(url: &str, stars: Option<i64>) -> Vec<Box<dyn SignalSet>> {
        let mut repo = RepoSample::default();
        repo.url.set(url.to_string());
        if let Some(stars) = stars {
            repo.star_count.set(stars);
        }
        repo.created_at.set(Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap());
        repo.contributor_count.set(12);

        let mut issues = IssueSample::default();
        issues.issue_comment_frequency.set(1.5);

        vec![Box::new(repo), Box::new(issues)]
    }

    #[test]
    fn columns_follow_sets_then_extras() {
        assert_eq!(
            columns(&empty_sets(), &["default_score".to_string()]),
            [
                "repo.url",
                "repo.star_count",
                "repo.created_at",
                "legacy.contributor_count",
                "legacy.issue_comment_frequency",
                "default_score"
            ]
        );
    }

    #[test]
    fn cells_skip_unset_values() {
        let cells = cells(&sample_sets("https://github.com/a/b", None), &[("score".into(), "0.5".into())]);
        assert_eq!(cells["repo.url"], "https://github.com/a/b");
        assert_eq!(cells["repo.created_at"], "2020-05-06T07:08:09Z");
        assert_eq!(cells["legacy.issue_comment_frequency"], "1.5");
        assert_eq!(cells["score"], "0.5");
        assert!(!cells.contains_key("repo.star_count"));
    }

    #[test]
    fn format_names() {
        assert_eq!(Format::Json.to_string(), "json");
        assert_eq!(Format::from_str("text", true).unwrap(), Format::Text);
    }
}
