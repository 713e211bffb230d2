use super::{ExtraField, Output, SignalWriter, cells};
use crate::Result;
use crate::signals::SignalSet;
use core::fmt::Write as _;
use ohno::IntoAppError;
use std::io::Write;
use std::sync::Mutex;

struct State {
    out: Output,
    first_written: bool,
}

/// Human readable `field: value` records separated by blank lines.
pub struct TextWriter {
    fields: Vec<String>,
    state: Mutex<State>,
}

impl core::fmt::Debug for TextWriter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TextWriter").field("fields", &self.fields).finish_non_exhaustive()
    }
}

impl TextWriter {
    #[must_use]
    pub fn new(out: Output, fields: Vec<String>) -> Self {
        Self {
            fields,
            state: Mutex::new(State { out, first_written: false }),
        }
    }
}

impl SignalWriter for TextWriter {
    fn write_signals(&self, sets: &[Box<dyn SignalSet>], extra: &[ExtraField]) -> Result<()> {
        let cells = cells(sets, extra);
        let mut text = String::new();
        for field in &self.fields {
            let value = cells.get(field).map_or("", String::as_str);
            let _ = writeln!(text, "{field}: {value}");
        }

        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.first_written {
            text.insert(0, '\n');
        }
        state.first_written = true;

        state.out.write_all(text.as_bytes()).into_app_err("writing text record")?;
        state.out.flush().into_app_err("flushing text output")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::super::tests::{SharedBuffer, empty_sets, sample_sets};
    use super::super::{Format, signal_writer};

    #[test]
    fn records_separated_by_blank_line() {
        let buffer = SharedBuffer::default();
        let writer = signal_writer(Format::Text, Box::new(buffer.clone()), &empty_sets(), &[]);

        writer.write_signals(&sample_sets("https://github.com/a/b", Some(1)), &[]).unwrap();
        writer.write_signals(&sample_sets("https://github.com/c/d", None), &[]).unwrap();

        assert_eq!(
            buffer.contents(),
            "repo.url: https://github.com/a/b\n\
             repo.star_count: 1\n\
             repo.created_at: 2020-05-06T07:08:09Z\n\
             legacy.contributor_count: 12\n\
             legacy.issue_comment_frequency: 1.5\n\
             \n\
             repo.url: https://github.com/c/d\n\
             repo.star_count: \n\
             repo.created_at: 2020-05-06T07:08:09Z\n\
             legacy.contributor_count: 12\n\
             legacy.issue_comment_frequency: 1.5\n"
        );
    }
}
