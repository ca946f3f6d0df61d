//! Core sync logic for seatable-mysync.

use crate::clear::{self, ClearOutcome};
use crate::config::{AppConfig, QuerySpec, TaskConfig};
use crate::error::{Error, Result};
use crate::load;
use crate::merge;
use crate::metrics::Metrics;
use crate::mysql::MySqlClient;
use crate::seatable::SeaTableClient;
use crate::transform::{self, RawRow, Record};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Report for one task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    /// Task name
    pub task: String,
    /// Destination table
    pub table_name: String,
    /// Whether the task completed
    pub success: bool,
    /// Rows deleted while clearing the table
    pub rows_deleted: usize,
    /// Clearing rounds executed
    pub clear_rounds: usize,
    /// Rows fetched across all datasets
    pub rows_fetched: usize,
    /// Rows loaded into the destination table
    pub rows_loaded: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Error message if failed
    pub error: Option<String>,
}

/// Aggregated result of a sequence of task runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Whether every task completed
    pub success: bool,
    /// Per-task reports, in run order
    pub tasks: Vec<TaskReport>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp when the run completed
    pub completed_at: String,
}

impl SyncSummary {
    /// Get total rows loaded across all tasks.
    pub fn total_rows_loaded(&self) -> usize {
        self.tasks.iter().map(|t| t.rows_loaded).sum()
    }

    /// Get the names of failed tasks.
    pub fn failed_tasks(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| !t.success)
            .map(|t| t.task.as_str())
            .collect()
    }
}

/// Outcome of the per-task pipeline, before reporting.
struct PipelineStats {
    rows_deleted: usize,
    clear_rounds: usize,
    rows_fetched: usize,
    rows_loaded: usize,
}

/// Main sync client: runs configured tasks against their sources and bases.
pub struct SyncClient {
    config: AppConfig,
    metrics: Metrics,
}

impl SyncClient {
    /// Create a new sync client.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            metrics: Metrics::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get the metrics collector.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Test connectivity for every configured task: the MySQL source, the
    /// database selection, and the task's SeaTable token.
    pub async fn test_connectivity(&self) -> Result<()> {
        if self.config.tasks.is_empty() {
            warn!("No tasks configured");
            return Ok(());
        }

        for entry in &self.config.tasks {
            let source = self.config.source(&entry.source).ok_or_else(|| {
                Error::config(format!(
                    "task '{}' references unknown source '{}'",
                    entry.name, entry.source
                ))
            })?;

            let mysql = MySqlClient::connect(source, &entry.database).await?;
            let ping = mysql.ping().await;
            mysql.close().await;
            ping?;
            info!("MySQL OK for task '{}'", entry.name);

            let token = entry.api_token()?;
            let store =
                SeaTableClient::connect(&self.config.seatable, &token, self.config.retry.clone())
                    .await?;
            store.ping().await?;
            info!("SeaTable OK for task '{}'", entry.name);
        }

        Ok(())
    }

    /// Run one task to completion.
    #[instrument(skip(self), fields(task = %name))]
    pub async fn run_task(&self, name: &str) -> Result<TaskReport> {
        let start = Instant::now();

        let entry = self
            .config
            .task(name)
            .ok_or_else(|| Error::config(format!("unknown task '{}'", name)))?;
        let source = self.config.source(&entry.source).ok_or_else(|| {
            Error::config(format!(
                "task '{}' references unknown source '{}'",
                name, entry.source
            ))
        })?;
        let task = TaskConfig::from_file(&entry.config_file)?;
        let token = entry.api_token()?;

        info!(
            "Starting task '{}': {} datasets into table '{}'",
            name,
            task.data_mappings.len(),
            task.table_name()
        );

        let store =
            SeaTableClient::connect(&self.config.seatable, &token, self.config.retry.clone())
                .await?;
        let mysql = MySqlClient::connect(source, &entry.database).await?;

        // The pool is released on every exit path, including failures.
        let result = self.run_pipeline(&task, &mysql, &store).await;
        mysql.close().await;

        self.metrics.record_task(result.is_ok());
        let stats = result.inspect_err(|e| error!("Task '{}' failed: {}", name, e))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Task '{}' completed in {}ms: {} rows deleted, {} rows loaded",
            name, duration_ms, stats.rows_deleted, stats.rows_loaded
        );

        Ok(TaskReport {
            task: name.to_string(),
            table_name: task.table_name().to_string(),
            success: true,
            rows_deleted: stats.rows_deleted,
            clear_rounds: stats.clear_rounds,
            rows_fetched: stats.rows_fetched,
            rows_loaded: stats.rows_loaded,
            duration_ms,
            error: None,
        })
    }

    /// Run a sequence of tasks, capturing per-task failures instead of
    /// stopping at the first one.
    pub async fn run_tasks(&self, names: &[String]) -> SyncSummary {
        let start = Instant::now();
        let mut reports = Vec::with_capacity(names.len());

        for name in names {
            let task_start = Instant::now();
            match self.run_task(name).await {
                Ok(report) => reports.push(report),
                Err(e) => reports.push(TaskReport {
                    task: name.clone(),
                    table_name: String::new(),
                    success: false,
                    rows_deleted: 0,
                    clear_rounds: 0,
                    rows_fetched: 0,
                    rows_loaded: 0,
                    duration_ms: task_start.elapsed().as_millis() as u64,
                    error: Some(e.to_string()),
                }),
            }
        }

        let success = reports.iter().all(|r| r.success);
        SyncSummary {
            success,
            tasks: reports,
            duration_ms: start.elapsed().as_millis() as u64,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// The per-task pipeline: clear, fetch, transform, merge, load.
    async fn run_pipeline(
        &self,
        task: &TaskConfig,
        mysql: &MySqlClient,
        store: &SeaTableClient,
    ) -> Result<PipelineStats> {
        // Clear first; the table must be verifiably empty before loading.
        let (rows_deleted, clear_rounds) =
            match clear::clear_table(store, task.table_name(), task.chunk_size).await? {
                ClearOutcome::Cleared { rounds, deleted } => {
                    self.metrics.record_clear(rounds as u64, deleted as u64);
                    (deleted, rounds)
                }
                ClearOutcome::Blocked { deleted, remaining } => {
                    self.metrics.record_clear(0, deleted as u64);
                    return Err(Error::ClearTable {
                        table: task.table_name().to_string(),
                        remaining,
                    });
                }
            };

        let mut rows_fetched = 0usize;
        let mut primary: Vec<Record> = Vec::new();
        let mut auxiliary: Vec<(String, Vec<Record>)> = Vec::new();

        for spec in &task.data_mappings {
            let raw = mysql.execute_query(&spec.description, &spec.sql()).await?;
            self.metrics.record_sql_query();
            rows_fetched += raw.len();

            let records = project_dataset(&raw, spec)?;
            if spec.is_primary() {
                primary = records;
            } else {
                auxiliary.push((spec.description.clone(), records));
            }
        }

        let primary = merge_datasets(task, primary, auxiliary)?;

        let rows_loaded = load::load_rows(store, task.table_name(), &primary, task.chunk_size).await?;
        self.metrics.record_rows_loaded(rows_loaded as u64);

        Ok(PipelineStats {
            rows_deleted,
            clear_rounds,
            rows_fetched,
            rows_loaded,
        })
    }
}

/// Project every raw row of one dataset through its field mapping.
fn project_dataset(rows: &[RawRow], spec: &QuerySpec) -> Result<Vec<Record>> {
    rows.iter()
        .map(|row| {
            transform::project(row, &spec.field_mappings)
                .map_err(|e| Error::validation(format!("dataset '{}': {}", spec.description, e)))
        })
        .collect()
}

/// Apply every stashed auxiliary dataset to the primary set, in
/// configuration order. Merge rules are resolved by dataset description.
fn merge_datasets(
    task: &TaskConfig,
    mut primary: Vec<Record>,
    auxiliary: Vec<(String, Vec<Record>)>,
) -> Result<Vec<Record>> {
    for (description, records) in &auxiliary {
        let rule = task
            .data_mappings
            .iter()
            .find(|m| &m.description == description)
            .and_then(|m| m.merge_rule.as_ref())
            .ok_or_else(|| {
                Error::validation(format!("no merge rule found for dataset '{}'", description))
            })?;
        merge::apply(&mut primary, records, rule);
    }
    Ok(primary)
}
