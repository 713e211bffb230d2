//! Command-line interface and orchestration for criticality
//!
//! This module implements the CLI commands and wires the collection engine together:
//! configuration, the GitHub and deps.dev clients, the source registry, the worker pool,
//! and the output encoders.
//!
//! ## Commands
//!
//! - **collect**: Collect the signals of every repository listed in a file, optionally
//!   adding a score column, and write them as CSV, JSON lines or text
//! - **enumerate**: Search GitHub one creation day at a time and write the URL of every
//!   repository above a star threshold
//! - **batch**: Like collect, but split a long input into shards that are checkpointed so an
//!   interrupted run resumes where it stopped
//! - **init**: Generate a default configuration file
//!
//! ## Execution Flow
//!
//! The `run` function parses command-line arguments using clap and routes to the
//! appropriate command handler. The collecting commands share the `common` module, which
//! sets up logging, loads the configuration and assembles a `Collector` with every enabled
//! source.

mod batch;
mod collect;
mod common;
mod config;
mod enumerate;
mod host;
mod init;
mod progress_reporter;
mod run;

#[cfg(debug_assertions)]
pub use config::Config;

pub use batch::{BatchArgs, COMPLETION_MARKER, Completion, process_batch, shard_path};
pub use collect::{CollectArgs, ScoringArgs, process_collect};
pub use enumerate::{EnumerateArgs, GITHUB_EPOCH, MarkerType, process_enumerate};
pub use host::Host;
#[cfg(any(debug_assertions, test))]
pub use host::TestHost;
pub use init::{InitArgs, init_config};
pub use progress_reporter::ProgressReporter;
pub use run::run;
