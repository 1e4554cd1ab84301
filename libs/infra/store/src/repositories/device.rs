//! [libs/infra/store/src/repositories/device.rs]

use libsql::{params, Row};
use tracing::instrument;
use vm_domain::entities::{AuthType, Device};

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::support::{now, parse_timestamp, to_rfc3339};

const COLUMNS: &str = "id, cluster_id, device_key, vendor, model, line_no, ip, port, protocol, path, \
    auth_type, auth_token, enabled, last_state, last_state_at, created_at, updated_at";

pub enum UpsertAction {
    Created,
    Updated,
}

/// Fields a caller may change via the partial-update endpoint (§4.1
/// `update(partial fields)`). `None` leaves the column untouched;
/// the two genuinely-nullable text columns use `Option<Option<String>>`
/// so a caller can distinguish "leave as-is" from "clear it".
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub cluster_id: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub line_no: Option<Option<String>>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub path: Option<String>,
    pub auth_type: Option<AuthType>,
    pub auth_token: Option<Option<String>>,
    pub enabled: Option<bool>,
}

pub struct DeviceRepository {
    store: Store,
}

impl DeviceRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        id: &str,
        cluster_id: &str,
        device_key: &str,
        vendor: &str,
        model: &str,
        ip: &str,
        port: u16,
        protocol: &str,
        path: &str,
        auth_type: AuthType,
        auth_token: Option<&str>,
    ) -> Result<Device, DbError> {
        let conn = self.store.connection().await?;
        let ts = to_rfc3339(&now());
        conn.execute(
            &format!(
                "INSERT INTO devices ({COLUMNS}) VALUES \
                (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?8, ?9, ?10, ?11, 1, NULL, NULL, ?12, ?12)"
            ),
            params![
                id,
                cluster_id,
                device_key,
                vendor,
                model,
                ip,
                port as i64,
                protocol,
                path,
                auth_type.as_str(),
                auth_token,
                ts.clone()
            ],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "device.create"))?;

        self.get(id).await?.ok_or_else(|| DbError::NotFound(format!("device {id} after create")))
    }

    /// `upsert_by_key` (§4.1): creates the device if `device_key` is new,
    /// otherwise updates its connection fields in place. Returns the row
    /// id and whether it was created or updated.
    #[instrument(skip(self))]
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_by_key(
        &self,
        cluster_id: &str,
        device_key: &str,
        vendor: &str,
        model: &str,
        ip: &str,
        port: u16,
        protocol: &str,
        path: &str,
    ) -> Result<(String, UpsertAction), DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query("SELECT id FROM devices WHERE device_key = ?1", params![device_key])
            .await?;

        if let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let ts = to_rfc3339(&now());
            conn.execute(
                "UPDATE devices SET cluster_id=?1, vendor=?2, model=?3, ip=?4, port=?5, \
                 protocol=?6, path=?7, updated_at=?8 WHERE id=?9",
                params![cluster_id, vendor, model, ip, port as i64, protocol, path, ts, id.clone()],
            )
            .await?;
            return Ok((id, UpsertAction::Updated));
        }

        let id = Device::new_id();
        self.create(
            &id, cluster_id, device_key, vendor, model, ip, port, protocol, path, AuthType::None, None,
        )
        .await?;
        Ok((id, UpsertAction::Created))
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: DeviceUpdate) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();

        macro_rules! set_field {
            ($col:literal, $val:expr) => {{
                sets.push(format!("{} = ?{}", $col, sets.len() + 1));
                values.push($val);
            }};
        }

        if let Some(v) = &patch.cluster_id {
            set_field!("cluster_id", libsql::Value::Text(v.clone()));
        }
        if let Some(v) = &patch.vendor {
            set_field!("vendor", libsql::Value::Text(v.clone()));
        }
        if let Some(v) = &patch.model {
            set_field!("model", libsql::Value::Text(v.clone()));
        }
        if let Some(v) = &patch.line_no {
            set_field!(
                "line_no",
                v.clone().map(libsql::Value::Text).unwrap_or(libsql::Value::Null)
            );
        }
        if let Some(v) = &patch.ip {
            set_field!("ip", libsql::Value::Text(v.clone()));
        }
        if let Some(v) = patch.port {
            set_field!("port", libsql::Value::Integer(v as i64));
        }
        if let Some(v) = &patch.protocol {
            set_field!("protocol", libsql::Value::Text(v.clone()));
        }
        if let Some(v) = &patch.path {
            set_field!("path", libsql::Value::Text(v.clone()));
        }
        if let Some(v) = patch.auth_type {
            set_field!("auth_type", libsql::Value::Text(v.as_str().to_string()));
        }
        if let Some(v) = &patch.auth_token {
            set_field!(
                "auth_token",
                v.clone().map(libsql::Value::Text).unwrap_or(libsql::Value::Null)
            );
        }
        if let Some(v) = patch.enabled {
            set_field!("enabled", libsql::Value::Integer(if v { 1 } else { 0 }));
        }

        if sets.is_empty() {
            return Ok(());
        }

        set_field!("updated_at", libsql::Value::Text(to_rfc3339(&now())));
        values.push(libsql::Value::Text(id.to_string()));
        let sql = format!("UPDATE devices SET {} WHERE id = ?{}", sets.join(", "), sets.len() + 1);
        conn.execute(&sql, values).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_state(&self, id: &str, state: &str) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        let ts = to_rfc3339(&now());
        conn.execute(
            "UPDATE devices SET last_state = ?1, last_state_at = ?2 WHERE id = ?3",
            params![state, ts, id],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        conn.execute("DELETE FROM devices WHERE id = ?1", params![id]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<Device>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(&format!("SELECT {COLUMNS} FROM devices WHERE id = ?1"), params![id])
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_by_key(&self, device_key: &str) -> Result<Option<Device>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {COLUMNS} FROM devices WHERE device_key = ?1"),
                params![device_key],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, cluster_id: Option<&str>, enabled_only: bool) -> Result<Vec<Device>, DbError> {
        let conn = self.store.connection().await?;
        let mut sql = format!("SELECT {COLUMNS} FROM devices WHERE 1=1");
        let mut values: Vec<libsql::Value> = Vec::new();
        if let Some(cluster_id) = cluster_id {
            values.push(libsql::Value::Text(cluster_id.to_string()));
            sql.push_str(&format!(" AND cluster_id = ?{}", values.len()));
        }
        if enabled_only {
            sql.push_str(" AND enabled = 1");
        }
        sql.push_str(" ORDER BY device_key");
        let mut rows = conn.query(&sql, values).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row(&row)?);
        }
        Ok(out)
    }
}

fn map_row(row: &Row) -> Result<Device, DbError> {
    let auth_type_raw: String = row.get(10)?;
    let created_raw: String = row.get(15)?;
    let updated_raw: String = row.get(16)?;
    let last_state_at_raw: Option<String> = row.get(14)?;

    Ok(Device {
        id: row.get(0)?,
        cluster_id: row.get(1)?,
        device_key: row.get(2)?,
        vendor: row.get(3)?,
        model: row.get(4)?,
        line_no: row.get(5)?,
        ip: row.get(6)?,
        port: row.get::<i64>(7)? as u16,
        protocol: row.get(8)?,
        path: row.get(9)?,
        auth_type: AuthType::parse(&auth_type_raw),
        auth_token: row.get(11)?,
        enabled: row.get::<i64>(12)? != 0,
        last_state: row.get(13)?,
        last_state_at: last_state_at_raw.map(|s| parse_timestamp(&s)).transpose()?,
        created_at: parse_timestamp(&created_raw)?,
        updated_at: parse_timestamp(&updated_raw)?,
    })
}
