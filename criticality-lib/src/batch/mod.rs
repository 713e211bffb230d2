//! Checkpointed, shard-at-a-time processing of a long input list.
//!
//! The input is split into fixed-size shards. Progress is persisted to a small JSON state file
//! before every attempt so that, after a restart, processing resumes at the shard that was in
//! flight instead of at the beginning. A shard that keeps failing is abandoned after a bounded
//! number of attempts and the run moves on.

mod run_state;
mod runner;
mod shards;
mod state_lock;

pub use run_state::RunState;
pub use runner::{MAX_SHARD_ATTEMPTS, RunSummary, Shard, ShardProcessor, ShardedRunner};
pub use shards::Shards;
pub use state_lock::{StateLockGuard, acquire_state_lock};
