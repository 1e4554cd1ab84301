//! [libs/infra/store/src/repositories/baseline.rs]

use libsql::{params, Row};
use tracing::instrument;
use vm_domain::entities::Baseline;

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::support::{decode_string_list, encode_string_list};

pub struct BaselineRepository {
    store: Store,
}

impl BaselineRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Upsert keyed on `(cluster_id, vendor, model)` per spec.md §3.
    #[instrument(skip(self, baseline))]
    pub async fn upsert(&self, baseline: &Baseline) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        conn.execute(
            "INSERT INTO baselines (cluster_id, vendor, model, expected_main_version, \
             allowed_main_globs_json, note, effective_from) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(cluster_id, vendor, model) DO UPDATE SET \
             expected_main_version = excluded.expected_main_version, \
             allowed_main_globs_json = excluded.allowed_main_globs_json, \
             note = excluded.note, effective_from = excluded.effective_from",
            params![
                baseline.cluster_id.clone(),
                baseline.vendor.clone(),
                baseline.model.clone(),
                baseline.expected_main_version.clone(),
                encode_string_list(&baseline.allowed_main_globs),
                baseline.note.clone(),
                baseline.effective_from.map(|ts| ts.to_rfc3339()),
            ],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "baseline.upsert"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, cluster_id: &str, vendor: &str, model: &str) -> Result<Option<Baseline>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                "SELECT cluster_id, vendor, model, expected_main_version, allowed_main_globs_json, \
                 note, effective_from FROM baselines WHERE cluster_id=?1 AND vendor=?2 AND model=?3",
                params![cluster_id, vendor, model],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, cluster_id: Option<&str>) -> Result<Vec<Baseline>, DbError> {
        let conn = self.store.connection().await?;
        let (sql, values): (&str, Vec<libsql::Value>) = match cluster_id {
            Some(c) => (
                "SELECT cluster_id, vendor, model, expected_main_version, allowed_main_globs_json, \
                 note, effective_from FROM baselines WHERE cluster_id=?1 ORDER BY vendor, model",
                vec![libsql::Value::Text(c.to_string())],
            ),
            None => (
                "SELECT cluster_id, vendor, model, expected_main_version, allowed_main_globs_json, \
                 note, effective_from FROM baselines ORDER BY cluster_id, vendor, model",
                vec![],
            ),
        };
        let mut rows = conn.query(sql, values).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row(&row)?);
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, cluster_id: &str, vendor: &str, model: &str) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        conn.execute(
            "DELETE FROM baselines WHERE cluster_id=?1 AND vendor=?2 AND model=?3",
            params![cluster_id, vendor, model],
        )
        .await?;
        Ok(())
    }
}

fn map_row(row: &Row) -> Result<Baseline, DbError> {
    let globs_raw: String = row.get(4)?;
    let effective_from_raw: Option<String> = row.get(6)?;
    Ok(Baseline {
        cluster_id: row.get(0)?,
        vendor: row.get(1)?,
        model: row.get(2)?,
        expected_main_version: row.get(3)?,
        allowed_main_globs: decode_string_list(&globs_raw),
        note: row.get(5)?,
        effective_from: effective_from_raw
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&chrono::Utc)))
            .transpose()
            .map_err(|e| DbError::Mapping(format!("invalid effective_from: {e}")))?,
    })
}
