use super::Host;
use super::collect::{CollectJob, ScoringArgs, collect_all};
use super::common::{CommonArgs, DepsDevArgs, OutputMode, build_collector, create_output, open_input, read_urls};
use super::progress_reporter::ProgressReporter;
use crate::Result;
use crate::batch::{MAX_SHARD_ATTEMPTS, Shard, ShardProcessor, ShardedRunner};
use crate::collector::Collector;
use crate::output::{Format, signal_writer};
use crate::scoring::Scorer;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use clap::Parser;
use core::num::NonZeroUsize;
use ohno::{IntoAppError, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::sync::Arc;
use url::Url;

const LOG_TARGET: &str = "    shards";

/// Name of the file written to the output directory once every shard has been handled.
pub const COMPLETION_MARKER: &str = ".complete";

/// Default run state file name, inside the output directory.
const DEFAULT_STATE_FILE: &str = ".run_state.json";

#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// File with one repository URL per line
    #[arg(value_name = "IN_FILE")]
    pub input: Utf8PathBuf,

    /// Directory receiving one CSV file per shard
    #[arg(value_name = "OUT_DIR")]
    pub output_dir: Utf8PathBuf,

    /// Repositories per shard
    #[arg(long, value_name = "N", default_value = "1000")]
    pub shard_size: NonZeroUsize,

    /// File recording progress between runs (default is `.run_state.json` in the output directory)
    #[arg(long, value_name = "PATH")]
    pub state_file: Option<Utf8PathBuf>,

    /// Attempts made on a shard before it is skipped
    #[arg(long, value_name = "N", default_value_t = MAX_SHARD_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    pub shard_attempts: u32,

    #[command(flatten)]
    pub scoring: ScoringArgs,

    #[command(flatten)]
    pub depsdev: DepsDevArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Contents of the completion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub shard_count: u32,
    pub job_time: DateTime<Utc>,
}

/// Path of the CSV file holding shard `index`.
#[must_use]
pub fn shard_path(output_dir: &Utf8Path, index: u32) -> Utf8PathBuf {
    output_dir.join(format!("shard-{index:06}.csv"))
}

/// The job token handed to sources for a run started at `job_time`.
fn job_id(job_time: DateTime<Utc>) -> String {
    job_time.format("%Y%m%d%H%M%S").to_string()
}

/// Collects each shard into its own CSV file.
struct ShardCollector {
    collector: Arc<Collector>,
    scorer: Option<Scorer>,
    output_dir: Utf8PathBuf,
    workers: usize,
    progress: ProgressReporter,
}

impl ShardProcessor<Url> for ShardCollector {
    async fn process(&self, shard: &Shard<Url>) -> Result<()> {
        let path = shard_path(&self.output_dir, shard.index);
        if path.exists() {
            log::info!(target: LOG_TARGET, "Shard {} already written to '{path}'", shard.index);
            return Ok(());
        }

        // Only a fully collected shard gets its final name, so a crash never leaves a
        // partial file that a restart would mistake for a finished one.
        let partial = path.with_extension("csv.partial");
        let extra_columns: Vec<String> = self.scorer.iter().map(|s| s.name().to_string()).collect();
        let job = Arc::new(CollectJob {
            collector: Arc::clone(&self.collector),
            writer: signal_writer(
                Format::Csv,
                create_output(&partial, OutputMode::Truncate)?,
                &self.collector.empty_sets(),
                &extra_columns,
            ),
            scorer: self.scorer.clone(),
            job_id: job_id(shard.job_time),
        });

        self.progress.set_phase(&format!("Shard {}", shard.index));
        let stats = collect_all(job, shard.items.iter().cloned().map(Ok), self.workers, &self.progress).await?;

        let failed = stats.failed();
        if failed > 0 {
            let _ = fs::remove_file(&partial);
            bail!("{failed} of {} repositories in shard {} failed", shard.items.len(), shard.index);
        }

        fs::rename(&partial, &path).into_app_err_with(|| format!("renaming '{partial}' to '{path}'"))?;
        log::info!(target: LOG_TARGET, "Wrote shard {} to '{path}'", shard.index);
        Ok(())
    }

    async fn complete(&self, shard_count: u32, job_time: DateTime<Utc>) -> Result<()> {
        let path = self.output_dir.join(COMPLETION_MARKER);
        let text = serde_json::to_string_pretty(&Completion { shard_count, job_time }).into_app_err("serializing completion marker")?;
        fs::write(&path, text).into_app_err_with(|| format!("writing completion marker '{path}'"))
    }
}

pub async fn process_batch<H: Host>(host: &mut H, args: &BatchArgs) -> Result<()> {
    let config = args.common.setup()?;
    let scorer = args.scoring.scorer()?;

    fs::create_dir_all(&args.output_dir).into_app_err_with(|| format!("creating output directory '{}'", args.output_dir))?;
    let state_file = args
        .state_file
        .clone()
        .unwrap_or_else(|| args.output_dir.join(DEFAULT_STATE_FILE));

    let collector = build_collector(&config, &args.common, &args.depsdev).await?;
    let processor = ShardCollector {
        collector: Arc::new(collector),
        scorer,
        output_dir: args.output_dir.clone(),
        workers: config.workers,
        progress: ProgressReporter::for_log_level(args.common.log_level),
    };

    let input = read_urls(open_input(&args.input)?);
    let runner = ShardedRunner::new(state_file, args.shard_size).with_max_attempts(args.shard_attempts);
    let outcome = runner.run(input, &processor).await;
    processor.progress.done();
    let summary = outcome?;

    let _ = writeln!(
        host.output(),
        "Processed {} repositories in {} of {} shards",
        summary.processed_items,
        summary.processed_shards,
        summary.shard_count
    );

    if summary.failed_shards > 0 {
        log::error!(target: LOG_TARGET, "{} shards could not be collected", summary.failed_shards);
        host.exit(1);
    }

    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn shard_files_are_zero_padded() {
        assert_eq!(shard_path(Utf8Path::new("out"), 7), Utf8Path::new("out/shard-000007.csv"));
        assert_eq!(shard_path(Utf8Path::new("out"), 1_234_567), Utf8Path::new("out/shard-1234567.csv"));
    }

    #[test]
    fn job_ids_are_table_safe() {
        let job_time = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(job_id(job_time), "20240102030405");
    }
}
