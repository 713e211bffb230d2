//! Dependent counts derived from the public deps.dev dataset in BigQuery.
//!
//! The deps.dev snapshot is far too large to query per repository, so a derived table mapping
//! each project to its total dependent count is materialised once per job token inside a
//! dataset owned by the caller. Tables expire through the dataset's default table TTL.

mod bigquery;
mod dependents;
mod source;
mod warehouse;

pub use bigquery::{BigQuery, DEFAULT_BIGQUERY_URL, DEFAULT_LOCATION};
pub use dependents::{DEFAULT_DATASET, DEFAULT_DATASET_TTL, Dependents, table_name};
pub use source::{DepsDevSet, DepsDevSource, PROJECT_TYPE_GITHUB};
pub use warehouse::{ParamValue, QueryParam, Row, Warehouse};
