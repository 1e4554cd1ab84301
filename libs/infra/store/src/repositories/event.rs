//! [libs/infra/store/src/repositories/event.rs]

use libsql::{params, Row};
use tracing::instrument;
use vm_domain::entities::Event;

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::support::{decode_json, encode_json, now, parse_timestamp, to_rfc3339};

const COLUMNS: &str = "id, device_id, created_at, event_type, old_state, new_state, message, payload_json";

pub struct NewEvent<'a> {
    pub device_id: &'a str,
    pub event_type: &'a str,
    pub old_state: Option<&'a str>,
    pub new_state: Option<&'a str>,
    pub message: Option<&'a str>,
    pub payload: Option<&'a serde_json::Value>,
}

pub struct EventRepository {
    store: Store,
}

impl EventRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self, event))]
    pub async fn create(&self, event: NewEvent<'_>) -> Result<i64, DbError> {
        let conn = self.store.connection().await?;
        conn.execute(
            "INSERT INTO events (device_id, created_at, event_type, old_state, new_state, \
             message, payload_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.device_id,
                to_rfc3339(&now()),
                event.event_type,
                event.old_state,
                event.new_state,
                event.message,
                event.payload.map(encode_json),
            ],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "event.create"))?;

        let mut rows = conn.query("SELECT last_insert_rowid()", ()).await?;
        let row = rows.next().await?.ok_or_else(|| DbError::Mapping("no rowid after insert".into()))?;
        Ok(row.get(0)?)
    }

    #[instrument(skip(self))]
    pub async fn list(&self, limit: u32, device_id: Option<&str>) -> Result<Vec<Event>, DbError> {
        let conn = self.store.connection().await?;
        let (sql, values): (String, Vec<libsql::Value>) = match device_id {
            Some(id) => (
                format!("SELECT {COLUMNS} FROM events WHERE device_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"),
                vec![libsql::Value::Text(id.to_string()), libsql::Value::Integer(limit as i64)],
            ),
            None => (
                format!("SELECT {COLUMNS} FROM events ORDER BY created_at DESC, id DESC LIMIT ?1"),
                vec![libsql::Value::Integer(limit as i64)],
            ),
        };
        let mut rows = conn.query(&sql, values).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row(&row)?);
        }
        Ok(out)
    }

    /// Latest unacknowledged `controlled_files_change` event for a device,
    /// if any — the sticky marker the status view joins against (§4.4/§9).
    #[instrument(skip(self))]
    pub async fn latest_unacknowledged_controlled_files_change(
        &self,
        device_id: &str,
    ) -> Result<Option<Event>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM events e \
                     WHERE e.device_id = ?1 AND e.event_type = 'controlled_files_change' \
                     AND NOT EXISTS ( \
                         SELECT 1 FROM events a \
                         WHERE a.device_id = e.device_id AND a.event_type = 'controlled_files_ack' \
                         AND a.created_at > e.created_at \
                     ) \
                     ORDER BY e.created_at DESC, e.id DESC LIMIT 1"
                ),
                params![device_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }
}

fn map_row(row: &Row) -> Result<Event, DbError> {
    let created_raw: String = row.get(2)?;
    let payload_raw: Option<String> = row.get(7)?;
    Ok(Event {
        id: row.get(0)?,
        device_id: row.get(1)?,
        created_at: parse_timestamp(&created_raw)?,
        event_type: row.get(3)?,
        old_state: row.get(4)?,
        new_state: row.get(5)?,
        message: row.get(6)?,
        payload: payload_raw.map(|s| decode_json(&s)).transpose()?,
    })
}
