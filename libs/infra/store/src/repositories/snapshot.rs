//! [libs/infra/store/src/repositories/snapshot.rs]

use libsql::{params, Row};
use tracing::instrument;
use vm_domain::entities::Snapshot;

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::support::{decode_json, encode_json, now, parse_timestamp, to_rfc3339};

const COLUMNS: &str = "id, device_id, observed_at, success, http_status, latency_ms, error, \
    protocol_version, main_version, firmware_version, payload_json";

#[allow(clippy::too_many_arguments)]
pub struct NewSnapshot<'a> {
    pub device_id: &'a str,
    pub success: bool,
    pub http_status: Option<u16>,
    pub latency_ms: Option<i64>,
    pub error: Option<&'a str>,
    pub protocol_version: Option<i32>,
    pub main_version: Option<&'a str>,
    pub firmware_version: Option<&'a str>,
    pub payload: Option<&'a serde_json::Value>,
}

pub struct SnapshotRepository {
    store: Store,
}

impl SnapshotRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Appends a new row; snapshots are never updated or deleted (§4.1).
    #[instrument(skip(self, snapshot))]
    pub async fn record(&self, snapshot: NewSnapshot<'_>) -> Result<i64, DbError> {
        let conn = self.store.connection().await?;
        let observed_at = to_rfc3339(&now());
        conn.execute(
            "INSERT INTO device_snapshots (device_id, observed_at, success, http_status, \
             latency_ms, error, protocol_version, main_version, firmware_version, payload_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                snapshot.device_id,
                observed_at,
                snapshot.success as i64,
                snapshot.http_status.map(|v| v as i64),
                snapshot.latency_ms,
                snapshot.error,
                snapshot.protocol_version,
                snapshot.main_version,
                snapshot.firmware_version,
                snapshot.payload.map(encode_json),
            ],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "snapshot.record"))?;

        let mut rows = conn.query("SELECT last_insert_rowid()", ()).await?;
        let row = rows.next().await?.ok_or_else(|| DbError::Mapping("no rowid after insert".into()))?;
        Ok(row.get(0)?)
    }

    #[instrument(skip(self))]
    pub async fn get_latest(&self, device_id: &str) -> Result<Option<Snapshot>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM device_snapshots WHERE device_id = ?1 \
                     ORDER BY observed_at DESC, id DESC LIMIT 1"
                ),
                params![device_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_latest_success(&self, device_id: &str) -> Result<Option<Snapshot>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM device_snapshots WHERE device_id = ?1 AND success = 1 \
                     ORDER BY observed_at DESC, id DESC LIMIT 1"
                ),
                params![device_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        device_id: &str,
        limit: u32,
        offset: u32,
        success_only: bool,
    ) -> Result<Vec<Snapshot>, DbError> {
        let conn = self.store.connection().await?;
        let mut sql = format!("SELECT {COLUMNS} FROM device_snapshots WHERE device_id = ?1");
        if success_only {
            sql.push_str(" AND success = 1");
        }
        sql.push_str(" ORDER BY observed_at DESC, id DESC LIMIT ?2 OFFSET ?3");
        let mut rows = conn
            .query(&sql, params![device_id, limit as i64, offset as i64])
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row(&row)?);
        }
        Ok(out)
    }
}

fn map_row(row: &Row) -> Result<Snapshot, DbError> {
    let observed_raw: String = row.get(2)?;
    let http_status_raw: Option<i64> = row.get(4)?;
    let payload_raw: Option<String> = row.get(10)?;
    Ok(Snapshot {
        id: row.get(0)?,
        device_id: row.get(1)?,
        observed_at: parse_timestamp(&observed_raw)?,
        success: row.get::<i64>(3)? != 0,
        http_status: http_status_raw.map(|v| v as u16),
        latency_ms: row.get(5)?,
        error: row.get(6)?,
        protocol_version: row.get(7)?,
        main_version: row.get(8)?,
        firmware_version: row.get(9)?,
        payload: payload_raw.map(|s| decode_json(&s)).transpose()?,
    })
}
