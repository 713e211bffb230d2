use super::Host;
use super::common::{CommonArgs, OutputModeArgs, create_output, github_client};
use super::progress_reporter::ProgressReporter;
use crate::Result;
use crate::github::{GitHubClient, MAX_SEARCH_PAGE_SIZE, repo_search};
use crate::output::{UrlFormat, UrlWriter};
use crate::search::{StarWindow, WindowOutcome, repos_by_stars};
use crate::worker_pool::{self, work_queue};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use core::sync::atomic::{AtomicU64, Ordering};
use ohno::{AppError, IntoAppError, bail};
use std::fs;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

const LOG_TARGET: &str = " enumerate";

/// URLs buffered per worker between the search workers and the writer.
const CHANNEL_DEPTH_PER_WORKER: usize = 100;

/// Earliest creation date GitHub has data for.
pub const GITHUB_EPOCH: NaiveDate = NaiveDate::from_ymd_opt(2008, 1, 1).expect("valid date");

/// What the marker file records about the output location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MarkerType {
    /// The output path exactly as given
    #[default]
    Full,

    /// The output path, without the scheme and bucket if it is a URL
    File,

    /// The directory holding the output
    Dir,
}

impl MarkerType {
    /// The marker file contents for `output`.
    #[must_use]
    pub fn describe(self, output: &str) -> String {
        if self == Self::Full {
            return output.to_string();
        }

        let path = match Url::parse(output) {
            Ok(url) if url.scheme() == "file" && url.host_str().is_none_or(str::is_empty) => url.path().to_string(),
            Ok(url) => url.path().trim_start_matches('/').to_string(),
            Err(_) => output.to_string(),
        };

        if self == Self::Dir {
            match Utf8Path::new(&path).parent() {
                Some(parent) if parent.as_str().is_empty() => ".".to_string(),
                Some(parent) => parent.to_string(),
                None => path,
            }
        } else {
            path
        }
    }
}

#[derive(Parser, Debug)]
pub struct EnumerateArgs {
    /// File to write repository URLs to (`-` writes stdout)
    #[arg(value_name = "OUT_FILE")]
    pub output: Utf8PathBuf,

    /// Earliest repository creation date to enumerate, no earlier than 2008-01-01
    #[arg(long, value_name = "DATE", default_value_t = GITHUB_EPOCH)]
    pub start_date: NaiveDate,

    /// Latest repository creation date to enumerate (default is today)
    #[arg(long, value_name = "DATE")]
    pub end_date: Option<NaiveDate>,

    /// Search criteria applied to every day
    #[arg(long, value_name = "QUERY", default_value = "is:public")]
    pub query: String,

    /// Only list repositories with at least this many stars
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub min_stars: u64,

    /// Star margin by which successive search windows overlap
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub star_overlap: u64,

    /// Fail instead of warning when a day cannot be fully enumerated
    #[arg(long)]
    pub require_min_stars: bool,

    /// Layout of the output file
    #[arg(long, value_enum, default_value_t = UrlFormat::Text)]
    pub format: UrlFormat,

    /// File that receives the output location once enumeration succeeds
    #[arg(long, value_name = "PATH")]
    pub marker: Option<Utf8PathBuf>,

    /// How the output location is written to the marker file
    #[arg(long, value_enum, default_value_t = MarkerType::Full)]
    pub marker_type: MarkerType,

    #[command(flatten)]
    pub output_mode: OutputModeArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Every day from `end` back to `start`, newest first.
fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    end.iter_days().rev().take_while(move |day| *day >= start)
}

struct SearchJob {
    client: GitHubClient,
    query: String,
    min_stars: u64,
    overlap: u64,
    require_min_stars: bool,
    days_done: AtomicU64,
}

impl SearchJob {
    async fn search_day(&self, day: NaiveDate, urls: &mut mpsc::Sender<String>) -> Result<()> {
        let window = StarWindow {
            base_query: format!("{} created:{}", self.query, day.format("%Y-%m-%d")),
            min_stars: self.min_stars,
            overlap: self.overlap,
            per_page: MAX_SEARCH_PAGE_SIZE,
        };

        match repos_by_stars(&repo_search(&self.client), &window, urls).await? {
            WindowOutcome::Complete { emitted } => {
                log::debug!(target: LOG_TARGET, "{day}: {emitted} repositories");
            }
            WindowOutcome::Incomplete { emitted, stars, max_stars } => {
                if self.require_min_stars {
                    bail!("unable to enumerate every repository created on {day}: too many near {stars} stars (below {max_stars})");
                }
                log::warn!(
                    target: LOG_TARGET,
                    "{day}: only {emitted} repositories listed; too many repositories near {stars} stars"
                );
            }
        }

        let _ = self.days_done.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub async fn process_enumerate<H: Host>(host: &mut H, args: &EnumerateArgs) -> Result<()> {
    let config = args.common.setup()?;

    if args.start_date < GITHUB_EPOCH {
        bail!("--start-date {} is before {GITHUB_EPOCH}, the earliest date GitHub has data for", args.start_date);
    }

    let end_date = args.end_date.unwrap_or_else(|| Utc::now().date_naive());
    if end_date < args.start_date {
        bail!("--end-date {end_date} is before --start-date {}", args.start_date);
    }

    let job = Arc::new(SearchJob {
        client: github_client(&config, args.common.github_token.as_deref())?,
        query: args.query.trim().to_string(),
        min_stars: args.min_stars,
        overlap: args.star_overlap,
        require_min_stars: args.require_min_stars,
        days_done: AtomicU64::new(0),
    });

    let mut writer = UrlWriter::new(create_output(&args.output, args.output_mode.mode())?, args.format)?;
    let (url_sender, mut url_receiver) = mpsc::channel::<String>(config.workers * CHANNEL_DEPTH_PER_WORKER);
    let written = Arc::new(AtomicU64::new(0));
    let writer_task = tokio::spawn({
        let written = Arc::clone(&written);
        async move {
            while let Some(url) = url_receiver.recv().await {
                writer.write_url(&url)?;
                written.store(writer.written(), Ordering::Relaxed);
            }
            Ok::<u64, AppError>(writer.written())
        }
    });

    let (day_sender, days) = work_queue::<NaiveDate>();
    let mut day_count = 0_u64;
    for day in days_between(args.start_date, end_date) {
        day_sender.push(day)?;
        day_count += 1;
    }
    drop(day_sender);
    log::info!(target: LOG_TARGET, "Enumerating {day_count} days from {end_date} back to {}", args.start_date);

    let progress = ProgressReporter::for_log_level(args.common.log_level);
    progress.set_phase("Enumerating");
    progress.set_message({
        let job = Arc::clone(&job);
        let written = Arc::clone(&written);
        move || {
            format!(
                "{} repositories, {}/{day_count} days",
                written.load(Ordering::Relaxed),
                job.days_done.load(Ordering::Relaxed)
            )
        }
    });

    let pool = worker_pool::run(config.workers, |_| {
        let job = Arc::clone(&job);
        let days = days.clone();
        let mut urls = url_sender.clone();
        async move {
            while let Some(day) = days.next().await {
                job.search_day(day, &mut urls).await?;
            }
            Ok(())
        }
    });
    drop(url_sender);

    let searched = pool.wait().await;
    let total = writer_task.await.into_app_err("URL writer task failed")?;
    progress.done();
    searched?;
    let total = total?;

    log::info!(target: LOG_TARGET, "Enumeration finished: {total} repositories");
    if let Some(marker) = &args.marker {
        let location = args.marker_type.describe(args.output.as_str());
        fs::write(marker, format!("{location}\n")).into_app_err_with(|| format!("writing marker file '{marker}'"))?;
    }

    if args.output != "-" {
        let _ = writeln!(host.output(), "Wrote {total} repository URLs to {}", args.output);
    }

    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn days_run_newest_first() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let days: Vec<_> = days_between(start, end).map(|d| d.to_string()).collect();
        assert_eq!(days, ["2024-03-01", "2024-02-29", "2024-02-28"]);
    }

    #[test]
    fn single_day() {
        let day = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        assert_eq!(days_between(day, day).count(), 1);
    }

    #[test]
    fn full_marker_keeps_the_location() {
        for location in ["gs://bucket/path/to/file.txt?arg", "/path/to/file.txt", "../path/to/file.txt", "::/path/to/file.txt"] {
            assert_eq!(MarkerType::Full.describe(location), location);
        }
    }

    #[test]
    fn file_marker_strips_urls_to_their_path() {
        let file = |location| MarkerType::File.describe(location);
        assert_eq!(file("gs://bucket/path/to/file.txt?arg"), "path/to/file.txt");
        assert_eq!(file("file:///path/to/file.txt?arg"), "/path/to/file.txt");
        assert_eq!(file("/path/to/file.txt"), "/path/to/file.txt");
        assert_eq!(file("../path/to/file.txt"), "../path/to/file.txt");
        assert_eq!(file("::/path/to/file.txt"), "::/path/to/file.txt");
    }

    #[test]
    fn dir_marker_names_the_parent() {
        let dir = |location| MarkerType::Dir.describe(location);
        assert_eq!(dir("gs://bucket/path/to/file.txt?arg"), "path/to");
        assert_eq!(dir("/path/to/file.txt"), "/path/to");
        assert_eq!(dir("../path/to/file.txt"), "../path/to");
        assert_eq!(dir("::/path/to/file.txt"), "::/path/to");
        assert_eq!(dir("repos.txt"), ".");
    }
}
