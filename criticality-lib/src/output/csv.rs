use super::{ExtraField, Output, SignalWriter, cells};
use crate::Result;
use crate::signals::SignalSet;
use ohno::IntoAppError;
use std::sync::Mutex;

struct State {
    writer: csv::Writer<Output>,
    header_written: bool,
}

/// CSV with a header row written just before the first record.
pub struct CsvWriter {
    header: Vec<String>,
    state: Mutex<State>,
}

impl core::fmt::Debug for CsvWriter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CsvWriter").field("header", &self.header).finish_non_exhaustive()
    }
}

impl CsvWriter {
    #[must_use]
    pub fn new(out: Output, header: Vec<String>) -> Self {
        Self {
            header,
            state: Mutex::new(State {
                writer: csv::WriterBuilder::new().from_writer(out),
                header_written: false,
            }),
        }
    }
}

impl SignalWriter for CsvWriter {
    fn write_signals(&self, sets: &[Box<dyn SignalSet>], extra: &[ExtraField]) -> Result<()> {
        let mut cells = cells(sets, extra);
        let record: Vec<String> = self.header.iter().map(|c| cells.remove(c).unwrap_or_default()).collect();

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.header_written {
            state.writer.write_record(&self.header).into_app_err("writing CSV header")?;
            state.header_written = true;
        }

        state.writer.write_record(&record).into_app_err("writing CSV record")?;
        state.writer.flush().into_app_err("flushing CSV output")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::super::tests::{SharedBuffer, empty_sets, sample_sets};
    use super::super::{Format, signal_writer};
    use insta::assert_snapshot;

    #[test]
    fn header_then_records() {
        let buffer = SharedBuffer::default();
        let writer = signal_writer(Format::Csv, Box::new(buffer.clone()), &empty_sets(), &["default_score".to_string()]);
        assert_eq!(buffer.contents(), "");

        writer
            .write_signals(&sample_sets("https://github.com/a/b", Some(5)), &[("default_score".into(), "0.12345".into())])
            .unwrap();
        writer.write_signals(&sample_sets("https://github.com/c,d", None), &[]).unwrap();

        assert_snapshot!(buffer.contents(), @r#"
        repo.url,repo.star_count,repo.created_at,legacy.contributor_count,legacy.issue_comment_frequency,default_score
        https://github.com/a/b,5,2020-05-06T07:08:09Z,12,1.5,0.12345
        "https://github.com/c,d",,2020-05-06T07:08:09Z,12,1.5,
        "#);
    }
}
