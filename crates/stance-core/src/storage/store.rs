use super::rows::{BatchRow, BatchStatus, LinkResultRow};
use anyhow::Context;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite connection lock poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(super::schema::DDL)
            .context("failed to create schema")?;
        Ok(())
    }

    pub fn insert_batch(&self, batch: &BatchRow) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO batches(id, created_at, finished_at, status, record_count, input_digest, labels_json, models_json, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                batch.id,
                batch.created_at,
                batch.finished_at,
                batch.status.as_str(),
                batch.record_count as i64,
                batch.input_digest,
                serde_json::to_string(&batch.labels)?,
                serde_json::to_string(&batch.models)?,
                batch.error,
            ],
        )
        .context("insert batch")?;
        Ok(())
    }

    pub fn finish_batch(
        &self,
        id: &str,
        status: BatchStatus,
        finished_at: &str,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE batches SET status = ?2, finished_at = ?3, error = ?4 WHERE id = ?1",
            params![id, status.as_str(), finished_at, error],
        )?;
        if n == 0 {
            anyhow::bail!("unknown batch {}", id);
        }
        Ok(())
    }

    pub fn get_batch(&self, id: &str) -> anyhow::Result<Option<BatchRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, created_at, finished_at, status, record_count, input_digest, labels_json, models_json, error
                 FROM batches WHERE id = ?1",
                params![id],
                row_to_batch,
            )
            .optional()?;
        Ok(row)
    }

    /// Most recent first.
    pub fn list_batches(&self) -> anyhow::Result<Vec<BatchRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, finished_at, status, record_count, input_digest, labels_json, models_json, error
             FROM batches ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], row_to_batch)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Insert one link's table in a single transaction.
    pub fn insert_link_results(&self, batch_id: &str, rows: &[LinkResultRow]) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO link_results(batch_id, link_index, record_index, model, predicted_label, raw_label, confidence, label_logprobs_json, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for r in rows {
                stmt.execute(params![
                    batch_id,
                    r.link_index as i64,
                    r.record_index as i64,
                    r.model,
                    r.predicted_label,
                    r.raw_label,
                    r.confidence,
                    serde_json::to_string(&r.label_logprobs)?,
                    r.error,
                ])
                .with_context(|| {
                    format!(
                        "insert link {} result for record {}",
                        r.link_index, r.record_index
                    )
                })?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Rows of one link's table, in input order.
    pub fn fetch_link_results(
        &self,
        batch_id: &str,
        link_index: usize,
    ) -> anyhow::Result<Vec<LinkResultRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT link_index, record_index, model, predicted_label, raw_label, confidence, label_logprobs_json, error
             FROM link_results
             WHERE batch_id = ?1 AND link_index = ?2
             ORDER BY record_index ASC",
        )?;
        let rows = stmt.query_map(params![batch_id, link_index as i64], |row| {
            Ok(LinkResultRow {
                link_index: row.get::<_, i64>(0)? as usize,
                record_index: row.get::<_, i64>(1)? as usize,
                model: row.get(2)?,
                predicted_label: row.get(3)?,
                raw_label: row.get(4)?,
                confidence: row.get(5)?,
                label_logprobs: json_column::<BTreeMap<String, f64>>(row, 6)?,
                error: row.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Link positions with a persisted table, with their row counts.
    pub fn link_counts(&self, batch_id: &str) -> anyhow::Result<Vec<(usize, usize)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT link_index, COUNT(*) FROM link_results
             WHERE batch_id = ?1 GROUP BY link_index ORDER BY link_index",
        )?;
        let rows = stmt.query_map(params![batch_id], |row| {
            Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as usize))
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

fn row_to_batch(row: &rusqlite::Row<'_>) -> rusqlite::Result<BatchRow> {
    Ok(BatchRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        finished_at: row.get(2)?,
        status: BatchStatus::parse(&row.get::<_, String>(3)?),
        record_count: row.get::<_, i64>(4)? as usize,
        input_digest: row.get(5)?,
        labels: json_column(row, 6)?,
        models: json_column(row, 7)?,
        error: row.get(8)?,
    })
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
