use super::Host;
use super::common::{CommonArgs, DepsDevArgs, OutputModeArgs, build_collector, create_output, open_input, read_urls};
use super::progress_reporter::ProgressReporter;
use crate::Result;
use crate::collector::{Collected, Collector};
use crate::output::{ExtraField, Format, SignalWriter, signal_writer};
use crate::scoring::{Scorer, format_score};
use crate::sources::CollectError;
use crate::worker_pool::{self, work_queue};
use camino::Utf8PathBuf;
use clap::{Args, Parser};
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use ohno::bail;
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "   collect";

#[derive(Parser, Debug)]
pub struct CollectArgs {
    /// File with one repository URL per line (`-` reads stdin)
    #[arg(value_name = "IN_FILE")]
    pub input: Utf8PathBuf,

    /// File to write the signals to (`-` writes stdout)
    #[arg(value_name = "OUT_FILE")]
    pub output: Utf8PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    pub format: Format,

    #[command(flatten)]
    pub output_mode: OutputModeArgs,

    /// Token identifying this run to sources that cache derived data between repositories
    #[arg(long, value_name = "ID", default_value = "")]
    pub job_id: String,

    #[command(flatten)]
    pub scoring: ScoringArgs,

    #[command(flatten)]
    pub depsdev: DepsDevArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments controlling the score column
#[derive(Args, Debug, Clone, Default)]
pub struct ScoringArgs {
    /// Scoring configuration file (default is the built-in configuration)
    #[arg(long, value_name = "PATH", help_heading = "Scoring")]
    pub scoring_config: Option<Utf8PathBuf>,

    /// Do not compute a score
    #[arg(long, conflicts_with_all = ["scoring_config", "scoring_column"], help_heading = "Scoring")]
    pub scoring_disable: bool,

    /// Name of the score column (default is derived from the scoring configuration)
    #[arg(long, value_name = "NAME", help_heading = "Scoring")]
    pub scoring_column: Option<String>,
}

impl ScoringArgs {
    /// The configured scorer, or `None` when scoring is disabled.
    pub fn scorer(&self) -> Result<Option<Scorer>> {
        if self.scoring_disable {
            return Ok(None);
        }

        let scorer = match &self.scoring_config {
            Some(path) => Scorer::load(path)?,
            None => Scorer::builtin()?,
        };

        Ok(Some(match &self.scoring_column {
            Some(name) if name.trim().is_empty() => bail!("--scoring-column must not be empty"),
            Some(name) => scorer.with_name(name.trim()),
            None => scorer,
        }))
    }
}

/// Everything a worker needs to turn a URL into an output record.
pub(super) struct CollectJob {
    pub collector: Arc<Collector>,
    pub writer: Box<dyn SignalWriter>,
    pub scorer: Option<Scorer>,
    pub job_id: String,
}

impl Debug for CollectJob {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CollectJob")
            .field("collector", &self.collector)
            .field("writer", &"<writer>")
            .field("scorer", &self.scorer)
            .field("job_id", &self.job_id)
            .finish()
    }
}

/// Outcome counts for one [`collect_all`] call.
#[derive(Debug, Default)]
pub(super) struct CollectStats {
    collected: AtomicU64,
    uncollectable: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicBool,
}

impl CollectStats {
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn summary(&self) -> String {
        format!(
            "{} collected, {} uncollectable, {} failed",
            self.collected.load(Ordering::Relaxed),
            self.uncollectable.load(Ordering::Relaxed),
            self.failed()
        )
    }
}

impl CollectJob {
    async fn collect_one(&self, url: &Url, stats: &CollectStats) -> Result<()> {
        let sets = match self.collector.collect(url, &self.job_id).await {
            Ok(Collected::Signals(sets)) => sets,
            Ok(Collected::Uncollectable(reason)) => {
                log::warn!(target: LOG_TARGET, "Skipping {reason}");
                let _ = stats.uncollectable.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(CollectError::Conflict(e)) => {
                stats.aborted.store(true, Ordering::Relaxed);
                return Err(e);
            }
            Err(CollectError::Source(e)) => {
                log::error!(target: LOG_TARGET, "Failed to collect '{url}': {e}");
                let _ = stats.failed.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        };

        let extra: Vec<ExtraField> = self
            .scorer
            .iter()
            .map(|scorer| (scorer.name().to_string(), scorer.score(&sets).map(format_score).unwrap_or_default()))
            .collect();

        self.writer.write_signals(&sets, &extra)?;
        let _ = stats.collected.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Collect every URL with `workers` concurrent workers.
///
/// Failures of individual repositories are counted, not returned. A namespace conflict or a
/// failing writer stops the run and is returned.
pub(super) async fn collect_all(
    job: Arc<CollectJob>,
    urls: impl IntoIterator<Item = Result<Url>>,
    workers: usize,
    progress: &ProgressReporter,
) -> Result<Arc<CollectStats>> {
    let stats = Arc::new(CollectStats::default());
    let (sender, queue) = work_queue::<Url>();

    let pool = worker_pool::run(workers, |_| {
        let job = Arc::clone(&job);
        let stats = Arc::clone(&stats);
        let queue = queue.clone();
        async move {
            while let Some(url) = queue.next().await {
                if stats.aborted.load(Ordering::Relaxed) {
                    break;
                }

                if let Err(e) = job.collect_one(&url, &stats).await {
                    stats.aborted.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }

            Ok(())
        }
    });

    progress.set_message({
        let stats = Arc::clone(&stats);
        move || stats.summary()
    });

    for url in urls {
        if stats.aborted.load(Ordering::Relaxed) {
            break;
        }

        match url {
            // A closed queue means every worker has stopped; the pool reports why.
            Ok(url) => {
                if sender.push(url).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::error!(target: LOG_TARGET, "{e}");
                let _ = stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    drop(sender);

    pool.wait().await?;
    log::info!(target: LOG_TARGET, "Finished: {}", stats.summary());
    Ok(stats)
}

pub async fn process_collect<H: Host>(host: &mut H, args: &CollectArgs) -> Result<()> {
    let config = args.common.setup()?;
    let scorer = args.scoring.scorer()?;
    let collector = build_collector(&config, &args.common, &args.depsdev).await?;

    let input = open_input(&args.input)?;
    let extra_columns: Vec<String> = scorer.iter().map(|s| s.name().to_string()).collect();
    let writer = signal_writer(
        args.format,
        create_output(&args.output, args.output_mode.mode())?,
        &collector.empty_sets(),
        &extra_columns,
    );

    let job = Arc::new(CollectJob {
        collector: Arc::new(collector),
        writer,
        scorer,
        job_id: args.job_id.clone(),
    });

    let progress = ProgressReporter::for_log_level(args.common.log_level);
    progress.set_phase("Collecting");
    let outcome = collect_all(job, read_urls(input), config.workers, &progress).await;
    progress.done();

    let failed = outcome?.failed();
    if failed > 0 {
        log::error!(target: LOG_TARGET, "{failed} repositories could not be collected");
        host.exit(1);
    }

    Ok(())
}
