use crate::Result;
use chrono::{DateTime, TimeZone, Utc};
use core::time::Duration;
use futures::future::BoxFuture;
use ohno::{IntoAppError, app_err};
use serde_json::Value as JsonValue;

/// A typed value bound to a named query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    String(String),
    Timestamp(DateTime<Utc>),
}

/// A named query parameter, referenced as `@name` in SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    pub name: &'static str,
    pub value: ParamValue,
}

impl QueryParam {
    #[must_use]
    pub fn string(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: ParamValue::String(value.into()),
        }
    }

    #[must_use]
    pub const fn timestamp(name: &'static str, value: DateTime<Utc>) -> Self {
        Self {
            name,
            value: ParamValue::Timestamp(value),
        }
    }
}

/// One result row, as column name and raw cell value.
///
/// Warehouses hand back cells as strings; typed accessors parse on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, JsonValue)>,
}

impl Row {
    #[must_use]
    pub const fn new(columns: Vec<(String, JsonValue)>) -> Self {
        Self { columns }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.columns.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    fn cell(&self, column: &str) -> Result<&str> {
        match self.get(column) {
            Some(JsonValue::String(s)) => Ok(s),
            Some(JsonValue::Null) => Err(app_err!("column '{column}' is null")),
            Some(other) => Err(app_err!("column '{column}' holds unexpected value {other}")),
            None => Err(app_err!("column '{column}' missing from result row")),
        }
    }

    /// An `INT64` column.
    pub fn get_i64(&self, column: &str) -> Result<i64> {
        let cell = self.cell(column)?;
        cell.parse::<i64>().into_app_err_with(|| format!("column '{column}' is not an integer: '{cell}'"))
    }

    /// A `TIMESTAMP` column encoded as microseconds since the epoch.
    pub fn get_timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        let micros = self.get_i64(column)?;
        Utc.timestamp_micros(micros)
            .single()
            .into_app_err_with(|| format!("column '{column}' holds an out-of-range timestamp {micros}"))
    }
}

/// The SQL warehouse operations needed to maintain and query the dependents table.
pub trait Warehouse: Send + Sync {
    /// Project that owns datasets created through this warehouse.
    fn project(&self) -> &str;

    /// Run a query and return its first row, or `None` when it produced no rows.
    fn query_one<'a>(&'a self, sql: &'a str, params: &'a [QueryParam]) -> BoxFuture<'a, Result<Option<Row>>>;

    /// Run a statement that produces no result, waiting until it completes.
    fn execute<'a>(&'a self, sql: &'a str, params: &'a [QueryParam]) -> BoxFuture<'a, Result<()>>;

    /// The default table TTL of a dataset: `None` when the dataset does not exist,
    /// `Some(None)` when it exists without a TTL.
    fn dataset_ttl<'a>(&'a self, dataset: &'a str) -> BoxFuture<'a, Result<Option<Option<Duration>>>>;

    fn create_dataset<'a>(&'a self, dataset: &'a str, ttl: Duration) -> BoxFuture<'a, Result<()>>;

    fn update_dataset_ttl<'a>(&'a self, dataset: &'a str, ttl: Duration) -> BoxFuture<'a, Result<()>>;

    fn table_exists<'a>(&'a self, dataset: &'a str, table: &'a str) -> BoxFuture<'a, Result<bool>>;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> Row {
        Row::new(vec![
            ("DependentCount".into(), json!("42")),
            ("SnapshotTime".into(), json!("1672531200000000")),
            ("Missing".into(), JsonValue::Null),
        ])
    }

    #[test]
    fn typed_accessors() {
        let row = row();
        assert_eq!(row.get_i64("DependentCount").unwrap(), 42);
        assert_eq!(
            row.get_timestamp("SnapshotTime").unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn missing_and_null_columns_are_errors() {
        let row = row();
        let _ = row.get_i64("Nope").unwrap_err();
        let _ = row.get_i64("Missing").unwrap_err();
        let _ = row.get_timestamp("Missing").unwrap_err();
    }

    #[test]
    fn non_integer_cells_are_errors() {
        let row = Row::new(vec![("Count".into(), json!("x")), ("Negative".into(), json!("-7"))]);
        assert_eq!(row.get_i64("Negative").unwrap(), -7);

        let err = row.get_i64("Count").unwrap_err();
        assert!(err.to_string().contains("not an integer: 'x'"), "{err}");
    }
}
