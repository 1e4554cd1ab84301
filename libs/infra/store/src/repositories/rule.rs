//! [libs/infra/store/src/repositories/rule.rs]
//!
//! Same shape as the baseline repository per spec.md §4.1.

use libsql::{params, Row};
use tracing::instrument;
use vm_domain::entities::{ControlledFileRule, RuleMode};

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::support::{decode_string_list, encode_string_list};

pub struct RuleRepository {
    store: Store,
}

impl RuleRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self, rule))]
    pub async fn upsert(&self, rule: &ControlledFileRule) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        conn.execute(
            "INSERT INTO controlled_file_rules (cluster_id, vendor, model, paths_json, mode, \
             max_bytes, note) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(cluster_id, vendor, model) DO UPDATE SET \
             paths_json = excluded.paths_json, mode = excluded.mode, \
             max_bytes = excluded.max_bytes, note = excluded.note",
            params![
                rule.cluster_id.clone(),
                rule.vendor.clone(),
                rule.model.clone(),
                encode_string_list(&rule.paths),
                rule.mode.as_str(),
                rule.max_bytes as i64,
                rule.note.clone(),
            ],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "rule.upsert"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, cluster_id: &str, vendor: &str, model: &str) -> Result<Option<ControlledFileRule>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                "SELECT cluster_id, vendor, model, paths_json, mode, max_bytes, note \
                 FROM controlled_file_rules WHERE cluster_id=?1 AND vendor=?2 AND model=?3",
                params![cluster_id, vendor, model],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, cluster_id: Option<&str>) -> Result<Vec<ControlledFileRule>, DbError> {
        let conn = self.store.connection().await?;
        let (sql, values): (&str, Vec<libsql::Value>) = match cluster_id {
            Some(c) => (
                "SELECT cluster_id, vendor, model, paths_json, mode, max_bytes, note \
                 FROM controlled_file_rules WHERE cluster_id=?1 ORDER BY vendor, model",
                vec![libsql::Value::Text(c.to_string())],
            ),
            None => (
                "SELECT cluster_id, vendor, model, paths_json, mode, max_bytes, note \
                 FROM controlled_file_rules ORDER BY cluster_id, vendor, model",
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
            "DELETE FROM controlled_file_rules WHERE cluster_id=?1 AND vendor=?2 AND model=?3",
            params![cluster_id, vendor, model],
        )
        .await?;
        Ok(())
    }
}

fn map_row(row: &Row) -> Result<ControlledFileRule, DbError> {
    let paths_raw: String = row.get(3)?;
    let mode_raw: String = row.get(4)?;
    Ok(ControlledFileRule {
        cluster_id: row.get(0)?,
        vendor: row.get(1)?,
        model: row.get(2)?,
        paths: decode_string_list(&paths_raw),
        mode: RuleMode::parse(&mode_raw),
        max_bytes: row.get::<i64>(5)? as u32,
        note: row.get(6)?,
    })
}
