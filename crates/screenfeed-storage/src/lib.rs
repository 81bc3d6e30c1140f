//! Upstream catalog client and the SQLite persistence layer.
//!
//! The client side issues one GET per dataset against the catalog API and
//! gathers the results keyed by dataset, so a failed feed is visible to the
//! caller instead of silently shifting positions. The store side owns table
//! lifecycle, atomic batch upserts, and the read queries behind the KPI
//! report.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::warn;

use screenfeed_core::{ColumnValue, DatasetId, DatasetSpec, MappedRow};

pub const CRATE_NAME: &str = "screenfeed-storage";

const DEFAULT_API_HOST: &str = "imdb188.p.rapidapi.com";
const DEFAULT_SEARCH_QUERY: &str = "movie";

/// Credentials and routing for the catalog API, passed in explicitly at
/// construction time rather than read from process-wide state.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_host: String,
    pub api_key: String,
    pub search_query: String,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_host =
            std::env::var("SCREENFEED_API_HOST").unwrap_or_else(|_| DEFAULT_API_HOST.to_string());
        let api_key = std::env::var("SCREENFEED_API_KEY")
            .map_err(|_| anyhow::anyhow!("SCREENFEED_API_KEY is not set"))?;
        let search_query = std::env::var("SCREENFEED_SEARCH_QUERY")
            .unwrap_or_else(|_| DEFAULT_SEARCH_QUERY.to_string());
        Ok(Self {
            api_host,
            api_key,
            search_query,
        })
    }

    /// Full request URL for one dataset's feed.
    pub fn endpoint(&self, dataset: DatasetId) -> String {
        match dataset {
            DatasetId::PopularCelebrities => {
                format!("https://{}/api/v1/getPopularCelebrities", self.api_host)
            }
            DatasetId::WeeklyTop10 => format!("https://{}/api/v1/getWeekTop10", self.api_host),
            DatasetId::MovieSearch => format!(
                "https://{}/api/v1/searchIMDB?query={}",
                self.api_host, self.search_query
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("feed returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// HTTP client for the three catalog feeds.
pub struct CatalogClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl CatalogClient {
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("building http client: {e}"))?;
        Ok(Self { http, config })
    }

    /// Fetches one dataset's feed. Non-2xx responses surface the raw status;
    /// any JSON body that parses is passed through unmodified.
    pub async fn fetch(&self, dataset: DatasetId) -> Result<Value, FetchError> {
        let url = self.config.endpoint(dataset);
        let response = self
            .http
            .get(&url)
            .header("x-rapidapi-key", &self.config.api_key)
            .header("x-rapidapi-host", &self.config.api_host)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.json().await?)
    }

    /// Fetches every dataset in order and returns the outcomes keyed by
    /// dataset. A failed feed is recorded under its key and does not block
    /// the remaining fetches.
    pub async fn gather(&self) -> BTreeMap<DatasetId, Result<Value, FetchError>> {
        let mut outcomes = BTreeMap::new();
        for dataset in DatasetId::all() {
            let outcome = self.fetch(dataset).await;
            if let Err(err) = &outcome {
                warn!(dataset = %dataset, error = %err, "feed fetch failed, skipping dataset");
            }
            outcomes.insert(dataset, outcome);
        }
        outcomes
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("row for table {table} has {got} values, schema expects {want}")]
    RowWidth {
        table: &'static str,
        want: usize,
        got: usize,
    },
}

/// Aggregates over one table's numeric column. `AVG` ignores NULL cells, so
/// `mean` is `None` only when no non-NULL value exists; `count` covers every
/// row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableKpis {
    pub mean: Option<f64>,
    pub count: i64,
}

/// Per-category aggregates over the movies table.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryKpis {
    pub q: String,
    pub mean_year: Option<f64>,
    pub count: i64,
}

/// One row of the latest-movies report.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieReportRow {
    pub title: String,
    pub year: Option<i64>,
    pub stars: String,
    pub q: String,
}

/// SQLite-backed catalog store. One pool, one writer.
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub async fn connect(database_path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            database_path.display()
        ))?
        .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Brings the dataset's table into its expected state for a load.
    /// Datasets flagged for reset drop the table first so stale chart rows
    /// never survive a run; the others create the table only when absent.
    pub async fn ensure_table(&self, spec: &DatasetSpec) -> Result<(), StoreError> {
        if spec.reset_before_load {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", spec.table))
                .execute(&self.pool)
                .await?;
        }
        self.create_table(spec).await
    }

    /// Creates the dataset's table when absent, never dropping existing
    /// rows. Read paths rely on this so a report over a fresh store sees
    /// empty tables instead of query errors.
    pub async fn create_table(&self, spec: &DatasetSpec) -> Result<(), StoreError> {
        let columns = spec
            .fields
            .iter()
            .map(|f| {
                if f.column == spec.key_column {
                    format!("{} {} PRIMARY KEY", f.column, f.ty.sql_affinity())
                } else {
                    format!("{} {}", f.column, f.ty.sql_affinity())
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({columns})",
            spec.table
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Writes a mapped batch in one transaction. Re-running the same batch
    /// replaces rows by primary key instead of duplicating them; any failure
    /// rolls the whole batch back.
    pub async fn upsert_all(
        &self,
        spec: &DatasetSpec,
        rows: &[MappedRow],
    ) -> Result<usize, StoreError> {
        let columns = spec
            .fields
            .iter()
            .map(|f| f.column)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; spec.fields.len()].join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({columns}) VALUES ({placeholders})",
            spec.table
        );

        let mut tx = self.pool.begin().await?;
        for row in rows {
            if row.values.len() != spec.fields.len() {
                return Err(StoreError::RowWidth {
                    table: spec.table,
                    want: spec.fields.len(),
                    got: row.values.len(),
                });
            }
            let mut query = sqlx::query(&sql);
            for value in &row.values {
                query = match value {
                    ColumnValue::Null => query.bind(None::<String>),
                    ColumnValue::Text(s) => query.bind(s.clone()),
                    ColumnValue::Integer(n) => query.bind(*n),
                    ColumnValue::Real(f) => query.bind(*f),
                };
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    async fn table_kpis(&self, table: &str, column: &str) -> Result<TableKpis, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT AVG({column}) AS mean, COUNT(*) AS count FROM {table}"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(TableKpis {
            mean: row.try_get("mean")?,
            count: row.try_get("count")?,
        })
    }

    /// Average height and row count over the celebrity table.
    pub async fn celebrity_kpis(&self) -> Result<TableKpis, StoreError> {
        self.table_kpis("popular_celebrities", "height").await
    }

    /// Average rating and row count over the weekly chart table.
    pub async fn weekly_top_kpis(&self) -> Result<TableKpis, StoreError> {
        self.table_kpis("weekly_top_10", "rating").await
    }

    /// Average release year and movie count per category label, ordered by
    /// category for stable output.
    pub async fn movie_kpis_by_category(&self) -> Result<Vec<CategoryKpis>, StoreError> {
        let rows = sqlx::query(
            "SELECT q, AVG(year) AS mean_year, COUNT(*) AS count FROM movies GROUP BY q ORDER BY q",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(CategoryKpis {
                    q: row.try_get("q")?,
                    mean_year: row.try_get("mean_year")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// The newest movies by release year. SQLite treats NULL as smaller than
    /// every number, so unknown years sort to the end under DESC.
    pub async fn latest_movies(&self, limit: i64) -> Result<Vec<MovieReportRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT title, year, stars, q FROM movies ORDER BY year DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(MovieReportRow {
                    title: row.try_get("title")?,
                    year: row.try_get("year")?,
                    stars: row.try_get("stars")?,
                    q: row.try_get("q")?,
                })
            })
            .collect()
    }
}
