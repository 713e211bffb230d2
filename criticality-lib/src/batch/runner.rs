use super::{RunState, Shards, acquire_state_lock};
use crate::Result;
use chrono::{DateTime, Utc};
use core::num::NonZeroUsize;
use ohno::bail;
use std::path::PathBuf;

const LOG_TARGET: &str = "     batch";

/// Attempts made on one shard before it is abandoned.
pub const MAX_SHARD_ATTEMPTS: u32 = 7;

/// One shard of input handed to a [`ShardProcessor`].
#[derive(Debug, Clone)]
pub struct Shard<T> {
    pub index: u32,
    pub job_time: DateTime<Utc>,
    pub items: Vec<T>,
}

/// Processes shards for a [`ShardedRunner`].
pub trait ShardProcessor<T>: Sync {
    /// Process one shard. Called again for the same shard if it fails.
    fn process(&self, shard: &Shard<T>) -> impl Future<Output = Result<()>> + Send;

    /// Called once after every shard has been handled, before the run state is cleared.
    fn complete(&self, shard_count: u32, job_time: DateTime<Utc>) -> impl Future<Output = Result<()>> + Send;
}

/// Totals for one invocation of [`ShardedRunner::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Total shards in the input, including those handled by earlier invocations.
    pub shard_count: u32,

    /// Shards processed successfully by this invocation.
    pub processed_shards: u32,

    /// Items in the shards processed successfully by this invocation.
    pub processed_items: usize,

    /// Shards abandoned after exhausting their attempts.
    pub failed_shards: u32,
}

/// Drives a [`ShardProcessor`] over sharded input with resumable progress.
#[derive(Debug, Clone)]
pub struct ShardedRunner {
    state_path: PathBuf,
    shard_size: NonZeroUsize,
    max_attempts: u32,
}

impl ShardedRunner {
    #[must_use]
    pub fn new(state_path: impl Into<PathBuf>, shard_size: NonZeroUsize) -> Self {
        Self {
            state_path: state_path.into(),
            shard_size,
            max_attempts: MAX_SHARD_ATTEMPTS,
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub async fn run<T, I, P>(&self, input: I, processor: &P) -> Result<RunSummary>
    where
        T: Sync,
        I: Iterator<Item = Result<T>>,
        P: ShardProcessor<T>,
    {
        let _lock = acquire_state_lock(&self.state_path).await?;
        let mut state = RunState::load(&self.state_path, Utc::now())?;
        let mut shards = Shards::new(input, self.shard_size);

        if state.shard > 0 {
            log::info!(target: LOG_TARGET, "Resuming at shard {} (attempt {})", state.shard, state.attempt);
            for skipped in 0..state.shard {
                if shards.next().transpose()?.is_none() {
                    bail!(
                        "run state is at shard {} but the input only has {skipped} shards",
                        state.shard
                    );
                }
            }
        }

        let mut summary = RunSummary {
            shard_count: 0,
            processed_shards: 0,
            processed_items: 0,
            failed_shards: 0,
        };

        for items in shards {
            let shard = Shard {
                index: state.shard,
                job_time: state.job_time,
                items: items?,
            };
            log::info!(target: LOG_TARGET, "Processing shard {} ({} items)", shard.index, shard.items.len());

            let mut succeeded = false;
            while state.attempt < self.max_attempts {
                // Record the attempt before making it, so a crash mid-shard is visible on restart.
                state.attempt += 1;
                state.save()?;

                match processor.process(&shard).await {
                    Ok(()) => {
                        succeeded = true;
                        break;
                    }
                    Err(e) => {
                        log::warn!(
                            target: LOG_TARGET,
                            "Shard {} failed on attempt {}/{}: {e:#}",
                            shard.index,
                            state.attempt,
                            self.max_attempts
                        );
                    }
                }
            }

            if succeeded {
                summary.processed_shards += 1;
                summary.processed_items += shard.items.len();
            } else {
                log::error!(target: LOG_TARGET, "Giving up on shard {} after {} attempts", shard.index, state.attempt);
                summary.failed_shards += 1;
            }

            state.attempt = 0;
            state.shard += 1;
        }

        summary.shard_count = state.shard;
        processor.complete(state.shard, state.job_time).await?;
        state.clear()?;

        log::info!(
            target: LOG_TARGET,
            "Finished {} shards: {} items processed, {} shards failed",
            summary.shard_count,
            summary.processed_items,
            summary.failed_shards
        );
        Ok(summary)
    }
}
