//! Ingestion pipeline: gather the catalog feeds, normalize and map each
//! dataset, land the rows in the store, and render the KPI report over what
//! was persisted.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use screenfeed_adapters::{flatten_records, map_records};
use screenfeed_core::DatasetId;
use screenfeed_storage::{ApiConfig, CatalogClient, CatalogStore, FetchError};

pub const CRATE_NAME: &str = "screenfeed-sync";

const DEFAULT_DATABASE_PATH: &str = "./imdb_data.db";
const REPORT_LIMIT: i64 = 10;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_path: PathBuf,
    pub api: ApiConfig,
}

impl IngestConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_path = std::env::var("SCREENFEED_DB")
            .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string())
            .into();
        Ok(Self {
            database_path,
            api: ApiConfig::from_env()?,
        })
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Rows landed per dataset table.
    pub rows_by_dataset: BTreeMap<String, usize>,
    /// Datasets whose feed failed and were dropped from this run.
    pub skipped_datasets: Vec<String>,
}

pub struct IngestPipeline {
    store: CatalogStore,
    client: CatalogClient,
}

impl IngestPipeline {
    pub async fn new(config: &IngestConfig) -> anyhow::Result<Self> {
        let store = CatalogStore::connect(&config.database_path)
            .await
            .with_context(|| {
                format!("opening catalog store at {}", config.database_path.display())
            })?;
        for dataset in DatasetId::all() {
            store
                .create_table(dataset.spec())
                .await
                .with_context(|| format!("creating table for {dataset}"))?;
        }
        let client = CatalogClient::new(config.api.clone())?;
        Ok(Self { store, client })
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Runs one full ingestion pass. Each dataset whose feed arrived is
    /// mapped and landed; datasets with a failed feed are skipped and
    /// recorded in the summary. A mapping or storage failure inside a
    /// dataset aborts the run.
    pub async fn run_once(&self) -> anyhow::Result<IngestRunSummary> {
        let outcomes = self.client.gather().await;
        self.run_with(outcomes).await
    }

    /// Lands one run's worth of already-gathered feed outcomes. Split out
    /// from `run_once` so partial-failure runs can be driven without a live
    /// feed.
    pub async fn run_with(
        &self,
        mut outcomes: BTreeMap<DatasetId, Result<Value, FetchError>>,
    ) -> anyhow::Result<IngestRunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "ingestion run starting");

        let mut rows_by_dataset = BTreeMap::new();
        let mut skipped_datasets = Vec::new();
        for dataset in DatasetId::all() {
            match outcomes.remove(&dataset) {
                Some(Ok(payload)) => {
                    let landed = self.ingest_document(dataset, &payload).await?;
                    rows_by_dataset.insert(dataset.to_string(), landed);
                }
                _ => skipped_datasets.push(dataset.to_string()),
            }
        }

        let summary = IngestRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            rows_by_dataset,
            skipped_datasets,
        };
        info!(
            %run_id,
            landed = summary.rows_by_dataset.values().sum::<usize>(),
            skipped = summary.skipped_datasets.len(),
            "ingestion run finished"
        );
        Ok(summary)
    }

    /// Normalizes, maps, and lands one dataset's feed payload. The whole
    /// batch commits atomically; one bad record means nothing lands.
    pub async fn ingest_document(&self, dataset: DatasetId, payload: &Value) -> anyhow::Result<usize> {
        let spec = dataset.spec();
        let records = flatten_records(payload, spec)
            .with_context(|| format!("normalizing {dataset} feed"))?;
        let rows = map_records(spec, &records)
            .with_context(|| format!("mapping {dataset} records"))?;
        self.store
            .ensure_table(spec)
            .await
            .with_context(|| format!("preparing table {}", spec.table))?;
        let landed = self
            .store
            .upsert_all(spec, &rows)
            .await
            .with_context(|| format!("landing rows into {}", spec.table))?;
        info!(dataset = %dataset, rows = landed, "dataset landed");
        Ok(landed)
    }
}

/// Convenience entry point for the CLI: configure from the environment and
/// run one ingestion pass.
pub async fn run_ingest_from_env() -> anyhow::Result<IngestRunSummary> {
    let config = IngestConfig::from_env()?;
    let pipeline = IngestPipeline::new(&config).await?;
    pipeline.run_once().await
}

fn fmt_mean(mean: Option<f64>) -> String {
    match mean {
        Some(value) => format!("{value:.2}"),
        None => "n/a".to_string(),
    }
}

fn fmt_year(year: Option<i64>) -> String {
    match year {
        Some(value) => value.to_string(),
        None => "n/a".to_string(),
    }
}

/// Renders the four KPI blocks over the persisted catalog.
pub async fn render_report(store: &CatalogStore) -> anyhow::Result<String> {
    let mut out = String::new();

    let celebs = store.celebrity_kpis().await.context("celebrity KPIs")?;
    writeln!(out, "Celebrity KPIs (Average Height and Celebrity Count):")?;
    writeln!(out, "  average_height: {}", fmt_mean(celebs.mean))?;
    writeln!(out, "  celebrity_count: {}", celebs.count)?;
    writeln!(out)?;

    let weekly = store.weekly_top_kpis().await.context("weekly chart KPIs")?;
    writeln!(out, "Weekly Top 10 KPIs (Average Rating and Movie Count):")?;
    writeln!(out, "  average_rating: {}", fmt_mean(weekly.mean))?;
    writeln!(out, "  movie_count: {}", weekly.count)?;
    writeln!(out)?;

    let categories = store
        .movie_kpis_by_category()
        .await
        .context("movie KPIs by category")?;
    writeln!(
        out,
        "Movie KPIs (Average Year of Release and Movie Count per Category):"
    )?;
    for kpis in &categories {
        writeln!(
            out,
            "  {:<12} mean_year: {:<8} count: {}",
            kpis.q,
            fmt_mean(kpis.mean_year),
            kpis.count
        )?;
    }
    writeln!(out)?;

    let latest = store
        .latest_movies(REPORT_LIMIT)
        .await
        .context("latest movies report")?;
    writeln!(out, "Movie Report (Latest 10 Movies):")?;
    for row in &latest {
        writeln!(
            out,
            "  {:<40} {:<6} {:<12} {}",
            row.title,
            fmt_year(row.year),
            row.q,
            row.stars
        )?;
    }

    Ok(out)
}
