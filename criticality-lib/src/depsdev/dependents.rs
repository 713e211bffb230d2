use super::warehouse::{QueryParam, Warehouse};
use crate::Result;
use core::time::Duration;
use ohno::{EnrichableExt, IntoAppError};
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "   depsdev";

/// Dataset holding the derived dependent count tables.
pub const DEFAULT_DATASET: &str = "depsdev_analysis";

/// Default table expiration applied to the dataset.
pub const DEFAULT_DATASET_TTL: Duration = Duration::from_hours(7 * 24);

const TABLE_PREFIX: &str = "dependent_counts";

const SNAPSHOT_QUERY: &str = "SELECT MAX(Time) AS SnapshotTime FROM `bigquery-public-data.deps_dev_v1.Snapshots`";

const DATA_QUERY: &str = "
CREATE TEMP TABLE rawDependentCounts(Name STRING, Version STRING, System STRING, DependentCount INT)
AS
  SELECT d.Dependency.Name as Name, d.Dependency.Version as Version, d.Dependency.System as System, COUNT(1) AS DependentCount
  FROM `bigquery-public-data.deps_dev_v1.Dependencies` AS d
  JOIN (SELECT System, Name, Version, ROW_NUMBER() OVER (PARTITION BY Name ORDER BY VersionInfo.Ordinal Desc) AS RowNumber
   FROM `bigquery-public-data.deps_dev_v1.PackageVersions`
   WHERE SnapshotAt = @part) AS lv ON (lv.RowNumber = 1 AND lv.Name = d.Name AND lv.Version = d.Version AND lv.System = d.System)
  WHERE d.SnapshotAt = @part
  GROUP BY Name, Version, System;

CREATE TABLE IF NOT EXISTS `{table}`
AS
WITH pvp AS (
    SELECT System, Name, Version, ProjectName, ProjectType
    FROM `bigquery-public-data.deps_dev_v1.PackageVersionToProject`
    WHERE SnapshotAt = @part
)
SELECT pvp.ProjectName AS ProjectName, pvp.ProjectType AS ProjectType, SUM(d.DependentCount) AS DependentCount
 FROM pvp
 JOIN rawDependentCounts AS d
      ON (pvp.System = d.System AND pvp.Name = d.Name AND pvp.Version = d.Version)
GROUP BY ProjectName, ProjectType;
";

const COUNT_QUERY: &str = "
SELECT DependentCount
FROM `{table}`
WHERE ProjectName = @projectname AND ProjectType = @projecttype;
";

/// Name of the dependent count table for a job token.
#[must_use]
pub fn table_name(job_id: &str) -> String {
    if job_id.is_empty() {
        TABLE_PREFIX.to_string()
    } else {
        format!("{TABLE_PREFIX}_{job_id}")
    }
}

#[derive(Debug, Clone)]
struct CachedQuery {
    job_id: String,
    count_query: String,
}

/// Looks up dependent counts, materialising the derived table on first use of each job token.
pub struct Dependents {
    warehouse: Arc<dyn Warehouse>,
    dataset: String,
    last_used: Mutex<Option<CachedQuery>>,
}

impl core::fmt::Debug for Dependents {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dependents")
            .field("project", &self.warehouse.project())
            .field("dataset", &self.dataset)
            .finish_non_exhaustive()
    }
}

impl Dependents {
    /// Make sure `dataset` exists with a default table TTL of `ttl`.
    pub async fn new(warehouse: Arc<dyn Warehouse>, dataset: impl Into<String>, ttl: Duration) -> Result<Self> {
        let dataset = dataset.into();

        match warehouse.dataset_ttl(&dataset).await.map_err(|e| e.enrich_with(|| format!("reading dataset '{dataset}'")))? {
            None => {
                log::debug!(target: LOG_TARGET, "Creating dependent count dataset '{dataset}'");
                warehouse
                    .create_dataset(&dataset, ttl)
                    .await
                    .map_err(|e| e.enrich_with(|| format!("creating dataset '{dataset}'")))?;
            }
            Some(current) if current != Some(ttl) => {
                warehouse
                    .update_dataset_ttl(&dataset, ttl)
                    .await
                    .map_err(|e| e.enrich_with(|| format!("updating dataset '{dataset}'")))?;
            }
            Some(_) => log::debug!(target: LOG_TARGET, "Dependent count dataset '{dataset}' exists"),
        }

        Ok(Self {
            warehouse,
            dataset,
            last_used: Mutex::new(None),
        })
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}.{table}", self.warehouse.project(), self.dataset)
    }

    fn cached(&self, job_id: &str) -> Option<String> {
        let guard = self.last_used.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.as_ref().filter(|c| c.job_id == job_id).map(|c| c.count_query.clone())
    }

    async fn count_query(&self, job_id: &str) -> Result<String> {
        if let Some(query) = self.cached(job_id) {
            return Ok(query);
        }

        let table = table_name(job_id);
        let qualified = self.qualified(&table);

        if self.warehouse.table_exists(&self.dataset, &table).await? {
            log::info!(target: LOG_TARGET, "Dependent count table '{qualified}' exists");
        } else {
            log::info!(target: LOG_TARGET, "Creating dependent count table '{qualified}'");
            let snapshot = self
                .warehouse
                .query_one(SNAPSHOT_QUERY, &[])
                .await
                .map_err(|e| e.enrich("reading latest deps.dev snapshot time"))?
                .map(|row| row.get_timestamp("SnapshotTime"))
                .transpose()?
                .into_app_err("deps.dev snapshot query returned no rows")?;

            let sql = DATA_QUERY.replace("{table}", &qualified);
            self.warehouse
                .execute(&sql, &[QueryParam::timestamp("part", snapshot)])
                .await
                .map_err(|e| e.enrich_with(|| format!("creating table '{qualified}'")))?;
        }

        let count_query = COUNT_QUERY.replace("{table}", &qualified);
        *self.last_used.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(CachedQuery {
            job_id: job_id.to_string(),
            count_query: count_query.clone(),
        });
        Ok(count_query)
    }

    /// The dependent count for a project, or `None` when deps.dev knows nothing about it.
    pub async fn count(&self, project_name: &str, project_type: &str, job_id: &str) -> Result<Option<i64>> {
        let query = self.count_query(job_id).await.map_err(|e| e.enrich("preparing dependent count query"))?;
        let params = [
            QueryParam::string("projectname", project_name),
            QueryParam::string("projecttype", project_type),
        ];

        let row = self.warehouse.query_one(&query, &params).await.map_err(|e| e.enrich("running dependent count query"))?;
        row.map(|r| r.get_i64("DependentCount")).transpose()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub(crate) mod tests {
    use super::super::warehouse::Row;
    use super::*;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use serde_json::json;

    /// Records every call and answers from canned state.
    #[derive(Debug, Default)]
    pub struct FakeWarehouse {
        pub ttl: Mutex<Option<Option<Duration>>>,
        pub tables: Mutex<Vec<String>>,
        pub counts: Vec<(String, i64)>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeWarehouse {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Warehouse for FakeWarehouse {
        fn project(&self) -> &str {
            "proj"
        }

        fn query_one<'a>(&'a self, sql: &'a str, params: &'a [QueryParam]) -> BoxFuture<'a, Result<Option<Row>>> {
            async move {
                if sql == SNAPSHOT_QUERY {
                    self.record("snapshot".into());
                    return Ok(Some(Row::new(vec![("SnapshotTime".into(), json!("1672531200000000"))])));
                }

                self.record("count".into());
                let name = params
                    .iter()
                    .find(|p| p.name == "projectname")
                    .map(|p| p.value.clone());
                Ok(self
                    .counts
                    .iter()
                    .find(|(n, _)| Some(super::super::warehouse::ParamValue::String(n.clone())) == name)
                    .map(|(_, c)| Row::new(vec![("DependentCount".into(), json!(c.to_string()))])))
            }
            .boxed()
        }

        fn execute<'a>(&'a self, sql: &'a str, _params: &'a [QueryParam]) -> BoxFuture<'a, Result<()>> {
            async move {
                let table = sql
                    .split("CREATE TABLE IF NOT EXISTS `")
                    .nth(1)
                    .and_then(|rest| rest.split('`').next())
                    .unwrap()
                    .rsplit('.')
                    .next()
                    .unwrap()
                    .to_string();
                self.record(format!("create {table}"));
                self.tables.lock().unwrap().push(table);
                Ok(())
            }
            .boxed()
        }

        fn dataset_ttl<'a>(&'a self, _dataset: &'a str) -> BoxFuture<'a, Result<Option<Option<Duration>>>> {
            async move { Ok(*self.ttl.lock().unwrap()) }.boxed()
        }

        fn create_dataset<'a>(&'a self, dataset: &'a str, ttl: Duration) -> BoxFuture<'a, Result<()>> {
            async move {
                self.record(format!("create_dataset {dataset}"));
                *self.ttl.lock().unwrap() = Some(Some(ttl));
                Ok(())
            }
            .boxed()
        }

        fn update_dataset_ttl<'a>(&'a self, dataset: &'a str, ttl: Duration) -> BoxFuture<'a, Result<()>> {
            async move {
                self.record(format!("update_dataset {dataset}"));
                *self.ttl.lock().unwrap() = Some(Some(ttl));
                Ok(())
            }
            .boxed()
        }

        fn table_exists<'a>(&'a self, _dataset: &'a str, table: &'a str) -> BoxFuture<'a, Result<bool>> {
            async move {
                self.record(format!("exists {table}"));
                Ok(self.tables.lock().unwrap().iter().any(|t| t == table))
            }
            .boxed()
        }
    }

    #[test]
    fn table_names() {
        assert_eq!(table_name(""), "dependent_counts");
        assert_eq!(table_name("20230101"), "dependent_counts_20230101");
    }

    #[tokio::test]
    async fn missing_dataset_is_created() {
        let warehouse = Arc::new(FakeWarehouse::default());
        let _ = Dependents::new(Arc::clone(&warehouse) as Arc<dyn Warehouse>, DEFAULT_DATASET, DEFAULT_DATASET_TTL)
            .await
            .unwrap();
        assert_eq!(warehouse.calls(), vec!["create_dataset depsdev_analysis"]);
    }

    #[tokio::test]
    async fn dataset_ttl_is_corrected() {
        let warehouse = Arc::new(FakeWarehouse {
            ttl: Mutex::new(Some(None)),
            ..FakeWarehouse::default()
        });
        let _ = Dependents::new(Arc::clone(&warehouse) as Arc<dyn Warehouse>, "ds", DEFAULT_DATASET_TTL)
            .await
            .unwrap();
        assert_eq!(warehouse.calls(), vec!["update_dataset ds"]);

        let warehouse = Arc::new(FakeWarehouse {
            ttl: Mutex::new(Some(Some(DEFAULT_DATASET_TTL))),
            ..FakeWarehouse::default()
        });
        let _ = Dependents::new(Arc::clone(&warehouse) as Arc<dyn Warehouse>, "ds", DEFAULT_DATASET_TTL)
            .await
            .unwrap();
        assert!(warehouse.calls().is_empty());
    }

    #[tokio::test]
    async fn table_created_once_per_job() {
        let warehouse = Arc::new(FakeWarehouse {
            ttl: Mutex::new(Some(Some(DEFAULT_DATASET_TTL))),
            counts: vec![("a/b".into(), 12)],
            ..FakeWarehouse::default()
        });
        let deps = Dependents::new(Arc::clone(&warehouse) as Arc<dyn Warehouse>, "ds", DEFAULT_DATASET_TTL)
            .await
            .unwrap();

        assert_eq!(deps.count("a/b", "GITHUB", "j1").await.unwrap(), Some(12));
        assert_eq!(deps.count("c/d", "GITHUB", "j1").await.unwrap(), None);
        assert_eq!(
            warehouse.calls(),
            vec!["exists dependent_counts_j1", "snapshot", "create dependent_counts_j1", "count", "count"]
        );

        // A new token re-checks; switching back finds the existing table.
        let _ = deps.count("a/b", "GITHUB", "").await.unwrap();
        let _ = deps.count("a/b", "GITHUB", "j1").await.unwrap();
        assert_eq!(
            warehouse.calls()[5..],
            [
                "exists dependent_counts",
                "snapshot",
                "create dependent_counts",
                "count",
                "exists dependent_counts_j1",
                "count"
            ]
        );
    }
}
