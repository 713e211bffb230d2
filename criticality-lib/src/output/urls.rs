use super::Output;
use crate::Result;
use clap::ValueEnum;
use ohno::IntoAppError;
use std::io::Write;

/// Header of the scorecard layout.
const SCORECARD_HEADER: [&str; 2] = ["repo", "metadata"];

/// Layout of an enumerated URL list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UrlFormat {
    /// One URL per line
    #[default]
    Text,

    /// CSV with `repo` and `metadata` columns, as consumed by OpenSSF Scorecard's batch tooling
    Scorecard,
}

enum Sink {
    Lines(Output),
    Csv(csv::Writer<Output>),
}

/// Writes enumerated URLs, flushing after each so progress survives a crash.
pub struct UrlWriter {
    sink: Sink,
    written: u64,
}

impl core::fmt::Debug for UrlWriter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UrlWriter").field("written", &self.written).finish_non_exhaustive()
    }
}

impl UrlWriter {
    /// Create a writer, emitting any header the layout needs.
    pub fn new(out: Output, format: UrlFormat) -> Result<Self> {
        let sink = match format {
            UrlFormat::Text => Sink::Lines(out),
            UrlFormat::Scorecard => {
                let mut writer = csv::Writer::from_writer(out);
                writer.write_record(SCORECARD_HEADER).into_app_err("writing scorecard header")?;
                writer.flush().into_app_err("flushing URL output")?;
                Sink::Csv(writer)
            }
        };

        Ok(Self { sink, written: 0 })
    }

    pub fn write_url(&mut self, url: &str) -> Result<()> {
        match &mut self.sink {
            Sink::Lines(out) => {
                writeln!(out, "{url}").into_app_err("writing URL")?;
                out.flush().into_app_err("flushing URL output")?;
            }
            Sink::Csv(writer) => {
                writer.write_record([url, ""]).into_app_err("writing URL")?;
                writer.flush().into_app_err("flushing URL output")?;
            }
        }

        self.written += 1;
        Ok(())
    }

    /// Number of URLs written so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }
}
