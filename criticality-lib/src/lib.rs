#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for criticality
//!
//! This library holds the collection engine behind the `criticality` tool, which gathers
//! criticality signals for open-source repositories from rate-limited upstream APIs and folds
//! them into a score.
//!
//! # Module Organization
//!
//! - [`http`]: Retrying HTTP transport and its response classifiers
//! - [`pagination`]: Lazy cursor over paged upstream queries
//! - [`search`]: Star-window enumeration past the search result ceiling
//! - [`signals`]: Namespaced, tri-state signal sets
//! - [`repo`] and [`sources`]: Repository resolution and the pluggable source registry
//! - [`github`] and [`depsdev`]: The concrete upstream clients and their sources
//! - [`collector`]: Resolution plus fan-out for one repository
//! - [`worker_pool`] and [`batch`]: Concurrent and checkpointed execution
//! - [`output`] and [`scoring`]: Encoders and the weighted score
//! - [`commands`]: Command-line interface and orchestration

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[cfg(any(debug_assertions, test))]
pub mod batch;
#[cfg(not(any(debug_assertions, test)))]
mod batch;

#[cfg(any(debug_assertions, test))]
pub mod collector;
#[cfg(not(any(debug_assertions, test)))]
mod collector;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

#[cfg(any(debug_assertions, test))]
pub mod depsdev;
#[cfg(not(any(debug_assertions, test)))]
mod depsdev;

#[cfg(any(debug_assertions, test))]
pub mod github;
#[cfg(not(any(debug_assertions, test)))]
mod github;

#[cfg(any(debug_assertions, test))]
pub mod http;
#[cfg(not(any(debug_assertions, test)))]
mod http;

#[cfg(any(debug_assertions, test))]
pub mod output;
#[cfg(not(any(debug_assertions, test)))]
mod output;

#[cfg(any(debug_assertions, test))]
pub mod pagination;
#[cfg(not(any(debug_assertions, test)))]
mod pagination;

#[cfg(any(debug_assertions, test))]
pub mod repo;
#[cfg(not(any(debug_assertions, test)))]
mod repo;

#[cfg(any(debug_assertions, test))]
pub mod scoring;
#[cfg(not(any(debug_assertions, test)))]
mod scoring;

#[cfg(any(debug_assertions, test))]
pub mod search;
#[cfg(not(any(debug_assertions, test)))]
mod search;

#[cfg(any(debug_assertions, test))]
pub mod signals;
#[cfg(not(any(debug_assertions, test)))]
mod signals;

#[cfg(any(debug_assertions, test))]
pub mod sources;
#[cfg(not(any(debug_assertions, test)))]
mod sources;

#[cfg(any(debug_assertions, test))]
pub mod worker_pool;
#[cfg(not(any(debug_assertions, test)))]
mod worker_pool;

pub use crate::commands::{Host, run};
