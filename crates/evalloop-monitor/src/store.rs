//! SQLite-backed monitoring store.

use std::path::Path;
use std::sync::Mutex;

use evalloop_core::{ApplicationResult, ResultKind, ResultStatus, ScoredTable};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::now_ms;
use crate::trace::{
    DatasetArtifact, DatasetSummary, ResultQuery, ResultRecord, RunQuery, RunRecord, RunStatus,
    StepRecord, StepStatus,
};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Lock error")]
    Lock,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// SQLite-backed store for dataset artifacts, monitoring results and run traces.
pub struct MonitorStore {
    conn: Mutex<Connection>,
}

const RESULT_COLUMNS: &str =
    "id, name, value, kind, status, extra_data, end_infer_time, created_at";

const RUN_COLUMNS: &str = "run_id, pipeline_id, pipeline_name, timestamp, args, total_elapsed_ms, \
     steps_succeeded, steps_failed, steps_skipped, status, error";

impl MonitorStore {
    /// Opens (or creates) a store at the given database path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS artifacts (
                key TEXT NOT NULL,
                tag TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                row_count INTEGER NOT NULL,
                rows TEXT NOT NULL,
                PRIMARY KEY (key, tag)
            );

            CREATE TABLE IF NOT EXISTS results (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                value REAL NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                extra_data TEXT NOT NULL,
                end_infer_time TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                pipeline_id TEXT NOT NULL,
                pipeline_name TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                args TEXT NOT NULL,
                total_elapsed_ms INTEGER NOT NULL,
                steps_succeeded INTEGER NOT NULL,
                steps_failed INTEGER NOT NULL,
                steps_skipped INTEGER NOT NULL,
                status TEXT NOT NULL,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS steps (
                record_id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                function TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                outputs TEXT NOT NULL,
                error TEXT,
                FOREIGN KEY (run_id) REFERENCES runs(run_id)
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_created ON artifacts(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_results_name ON results(name, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_runs_timestamp ON runs(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_steps_run ON steps(run_id);
            "#,
        )?;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Artifacts
    // ─────────────────────────────────────────────────────────────────────────

    /// Stores a scored table under `key`/`tag`, replacing any earlier table
    /// logged with the same pair.
    pub fn log_dataset(&self, key: &str, table: &ScoredTable, tag: &str) -> Result<(), StoreError> {
        let rows = serde_json::to_string(table)?;
        let conn = self.lock()?;

        conn.execute(
            r#"INSERT OR REPLACE INTO artifacts (key, tag, created_at, row_count, rows)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![key, tag, now_ms(), table.len() as i64, rows],
        )?;

        tracing::debug!(key, tag, rows = table.len(), "Logged dataset artifact");
        Ok(())
    }

    pub fn get_dataset(&self, key: &str, tag: &str) -> Result<Option<DatasetArtifact>, StoreError> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT key, tag, created_at, rows FROM artifacts WHERE key = ?1 AND tag = ?2",
                params![key, tag],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((key, tag, created_at, rows)) = row else {
            return Ok(None);
        };

        Ok(Some(DatasetArtifact {
            key,
            tag,
            created_at,
            rows: serde_json::from_str(&rows)?,
        }))
    }

    /// Lists artifacts, newest first, optionally for one key.
    pub fn list_datasets(&self, key: Option<&str>) -> Result<Vec<DatasetSummary>, StoreError> {
        let conn = self.lock()?;

        let mut sql = String::from("SELECT key, tag, created_at, row_count FROM artifacts");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(key) = key {
            sql.push_str(" WHERE key = ?");
            params_vec.push(Box::new(key.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC, tag DESC");

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok(DatasetSummary {
                key: row.get(0)?,
                tag: row.get(1)?,
                created_at: row.get(2)?,
                row_count: row.get(3)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn delete_dataset(&self, key: &str, tag: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "DELETE FROM artifacts WHERE key = ?1 AND tag = ?2",
            params![key, tag],
        )?;
        Ok(n > 0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Results
    // ─────────────────────────────────────────────────────────────────────────

    /// Persists a monitoring result and returns its record.
    pub fn insert_result(
        &self,
        result: &ApplicationResult,
        end_infer_time: &str,
    ) -> Result<ResultRecord, StoreError> {
        let record = ResultRecord {
            id: uuid::Uuid::new_v4().to_string(),
            result: result.clone(),
            end_infer_time: end_infer_time.to_string(),
            created_at: now_ms(),
        };
        let extra_data = serde_json::to_string(&record.result.extra_data)?;
        let conn = self.lock()?;

        conn.execute(
            r#"INSERT INTO results
               (id, name, value, kind, status, extra_data, end_infer_time, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                record.id,
                record.result.name,
                record.result.value,
                record.result.kind.as_str(),
                record.result.status.as_str(),
                extra_data,
                record.end_infer_time,
                record.created_at,
            ],
        )?;

        Ok(record)
    }

    /// Most recently stored result for a metric name.
    pub fn latest_result(&self, name: &str) -> Result<Option<ResultRecord>, StoreError> {
        let query = ResultQuery {
            name: Some(name.to_string()),
            limit: Some(1),
            ..Default::default()
        };
        Ok(self.list_results(&query)?.into_iter().next())
    }

    /// Lists results, newest first.
    pub fn list_results(&self, query: &ResultQuery) -> Result<Vec<ResultRecord>, StoreError> {
        let conn = self.lock()?;

        let mut sql = format!("SELECT {} FROM results WHERE 1=1", RESULT_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref name) = query.name {
            sql.push_str(" AND name = ?");
            params_vec.push(Box::new(name.clone()));
        }

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }

        // rowid breaks ties between results stored within the same millisecond
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        push_paging(&mut sql, query.limit, query.offset);

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), raw_result)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?.decode()?);
        }
        Ok(results)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Runs
    // ─────────────────────────────────────────────────────────────────────────

    pub fn insert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let args = serde_json::to_string(&run.args)?;
        let conn = self.lock()?;

        conn.execute(
            &format!(
                "INSERT INTO runs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                RUN_COLUMNS
            ),
            params![
                run.run_id,
                run.pipeline_id,
                run.pipeline_name,
                run.timestamp,
                args,
                run.total_elapsed_ms,
                run.steps_succeeded,
                run.steps_failed,
                run.steps_skipped,
                run.status.as_str(),
                run.error,
            ],
        )?;

        Ok(())
    }

    pub fn update_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute(
            r#"UPDATE runs SET
               total_elapsed_ms = ?1, steps_succeeded = ?2, steps_failed = ?3,
               steps_skipped = ?4, status = ?5, error = ?6
               WHERE run_id = ?7"#,
            params![
                run.total_elapsed_ms,
                run.steps_succeeded,
                run.steps_failed,
                run.steps_skipped,
                run.status.as_str(),
                run.error,
                run.run_id,
            ],
        )?;

        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let conn = self.lock()?;

        let raw = conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE run_id = ?1", RUN_COLUMNS),
                params![run_id],
                raw_run,
            )
            .optional()?;

        raw.map(RawRun::decode).transpose()
    }

    /// Lists runs, newest first.
    pub fn list_runs(&self, query: &RunQuery) -> Result<Vec<RunRecord>, StoreError> {
        let conn = self.lock()?;

        let mut sql = format!("SELECT {} FROM runs WHERE 1=1", RUN_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref pid) = query.pipeline_id {
            sql.push_str(" AND pipeline_id = ?");
            params_vec.push(Box::new(pid.clone()));
        }

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }

        sql.push_str(" ORDER BY timestamp DESC, rowid DESC");
        push_paging(&mut sql, query.limit, query.offset);

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), raw_run)?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?.decode()?);
        }
        Ok(runs)
    }

    pub fn insert_step(&self, step: &StepRecord) -> Result<(), StoreError> {
        let outputs = serde_json::to_string(&step.outputs)?;
        let conn = self.lock()?;

        conn.execute(
            r#"INSERT INTO steps
               (record_id, run_id, step_id, function, status, start_time, end_time, outputs, error)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                step.record_id,
                step.run_id,
                step.step_id,
                step.function,
                step.status.as_str(),
                step.start_time,
                step.end_time,
                outputs,
                step.error,
            ],
        )?;

        Ok(())
    }

    /// Steps of a run in execution order.
    pub fn get_steps(&self, run_id: &str) -> Result<Vec<StepRecord>, StoreError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"SELECT record_id, run_id, step_id, function, status, start_time, end_time, outputs, error
               FROM steps WHERE run_id = ?1 ORDER BY start_time, rowid"#,
        )?;

        let rows = stmt.query_map(params![run_id], |row| {
            let status: String = row.get(4)?;
            let outputs: String = row.get(7)?;
            Ok((
                StepRecord {
                    record_id: row.get(0)?,
                    run_id: row.get(1)?,
                    step_id: row.get(2)?,
                    function: row.get(3)?,
                    status: StepStatus::Failed,
                    start_time: row.get(5)?,
                    end_time: row.get(6)?,
                    outputs: Default::default(),
                    error: row.get(8)?,
                },
                status,
                outputs,
            ))
        })?;

        let mut steps = Vec::new();
        for row in rows {
            let (mut step, status, outputs) = row?;
            step.status = StepStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown step status {}", status)))?;
            step.outputs = serde_json::from_str(&outputs)?;
            steps.push(step);
        }
        Ok(steps)
    }

    /// Deletes a run and its steps.
    pub fn delete_run(&self, run_id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM steps WHERE run_id = ?1", params![run_id])?;
        conn.execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Summary
    // ─────────────────────────────────────────────────────────────────────────

    /// Aggregate counts for the dashboard.
    pub fn summary(&self) -> Result<MonitorSummary, StoreError> {
        let conn = self.lock()?;

        let (total_results, detected_results, mean_value) = conn.query_row(
            r#"SELECT
               COUNT(*),
               COALESCE(SUM(CASE WHEN status = 'detected' THEN 1 ELSE 0 END), 0),
               AVG(value)
               FROM results"#,
            [],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?, row.get::<_, Option<f64>>(2)?)),
        )?;

        let (total_runs, failed_runs) = conn.query_row(
            r#"SELECT
               COUNT(*),
               COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0)
               FROM runs"#,
            [],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;

        let total_artifacts: u64 = conn.query_row("SELECT COUNT(*) FROM artifacts", [], |r| r.get(0))?;

        let detected_ratio = match total_results {
            0 => 0.0,
            n => detected_results as f64 / n as f64,
        };

        Ok(MonitorSummary {
            total_results,
            detected_results,
            detected_ratio,
            mean_value,
            total_runs,
            failed_runs,
            total_artifacts,
        })
    }
}

/// Aggregate store summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub total_results: u64,
    pub detected_results: u64,
    pub detected_ratio: f64,
    /// Mean result value, `None` when no results are stored.
    pub mean_value: Option<f64>,
    pub total_runs: u64,
    pub failed_runs: u64,
    pub total_artifacts: u64,
}

fn push_paging(sql: &mut String, limit: Option<u32>, offset: Option<u32>) {
    match (limit, offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
        // SQLite only accepts OFFSET after a LIMIT
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
        (None, None) => {}
    }
}

/// Result columns before JSON and enum decoding.
struct RawResult {
    id: String,
    name: String,
    value: f64,
    kind: String,
    status: String,
    extra_data: String,
    end_infer_time: String,
    created_at: i64,
}

fn raw_result(row: &Row<'_>) -> rusqlite::Result<RawResult> {
    Ok(RawResult {
        id: row.get(0)?,
        name: row.get(1)?,
        value: row.get(2)?,
        kind: row.get(3)?,
        status: row.get(4)?,
        extra_data: row.get(5)?,
        end_infer_time: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl RawResult {
    fn decode(self) -> Result<ResultRecord, StoreError> {
        let kind = ResultKind::parse(&self.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown result kind {}", self.kind)))?;
        let status = ResultStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown result status {}", self.status)))?;

        Ok(ResultRecord {
            id: self.id,
            result: ApplicationResult {
                name: self.name,
                value: self.value,
                kind,
                status,
                extra_data: serde_json::from_str(&self.extra_data)?,
            },
            end_infer_time: self.end_infer_time,
            created_at: self.created_at,
        })
    }
}

struct RawRun {
    record: RunRecord,
    status: String,
    args: String,
}

fn raw_run(row: &Row<'_>) -> rusqlite::Result<RawRun> {
    Ok(RawRun {
        record: RunRecord {
            run_id: row.get(0)?,
            pipeline_id: row.get(1)?,
            pipeline_name: row.get(2)?,
            timestamp: row.get(3)?,
            args: serde_json::Value::Null,
            total_elapsed_ms: row.get(5)?,
            steps_succeeded: row.get(6)?,
            steps_failed: row.get(7)?,
            steps_skipped: row.get(8)?,
            status: RunStatus::Running,
            error: row.get(10)?,
        },
        status: row.get(9)?,
        args: row.get(4)?,
    })
}

impl RawRun {
    fn decode(self) -> Result<RunRecord, StoreError> {
        let status = RunStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown run status {}", self.status)))?;
        Ok(RunRecord {
            status,
            args: serde_json::from_str(&self.args)?,
            ..self.record
        })
    }
}
