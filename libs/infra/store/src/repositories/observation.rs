//! [libs/infra/store/src/repositories/observation.rs]

use libsql::{params, Row};
use tracing::instrument;
use vm_domain::entities::{ControlledFileObservation, ObservationSource};

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::support::{now, parse_timestamp, to_rfc3339};

const COLUMNS: &str = "device_id, path, fingerprint, snapshot_id, content_b64, encoding, \
    content_type, truncated, source, created_at";

pub struct NewObservation<'a> {
    pub device_id: &'a str,
    pub path: &'a str,
    pub fingerprint: &'a str,
    pub snapshot_id: i64,
    pub content_b64: Option<&'a str>,
    pub encoding: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub truncated: bool,
    pub source: ObservationSource,
}

pub struct ObservationRepository {
    store: Store,
}

impl ObservationRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Content-addressed, write-once on `(device_id, path, fingerprint)`
    /// (§4.1). Re-recording the same fingerprint is a no-op.
    #[instrument(skip(self, observation))]
    pub async fn record(&self, observation: NewObservation<'_>) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        conn.execute(
            "INSERT OR IGNORE INTO controlled_file_observations \
             (device_id, path, fingerprint, snapshot_id, content_b64, encoding, content_type, \
              truncated, source, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                observation.device_id,
                observation.path,
                observation.fingerprint,
                observation.snapshot_id,
                observation.content_b64,
                observation.encoding,
                observation.content_type,
                observation.truncated as i64,
                observation.source.as_str(),
                to_rfc3339(&now()),
            ],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "observation.record"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(
        &self,
        device_id: &str,
        path: &str,
        fingerprint: &str,
    ) -> Result<Option<ControlledFileObservation>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM controlled_file_observations \
                     WHERE device_id = ?1 AND path = ?2 AND fingerprint = ?3"
                ),
                params![device_id, path, fingerprint],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }
}

fn map_row(row: &Row) -> Result<ControlledFileObservation, DbError> {
    let source_raw: String = row.get(8)?;
    let created_raw: String = row.get(9)?;
    Ok(ControlledFileObservation {
        device_id: row.get(0)?,
        path: row.get(1)?,
        fingerprint: row.get(2)?,
        snapshot_id: row.get(3)?,
        content_b64: row.get(4)?,
        encoding: row.get(5)?,
        content_type: row.get(6)?,
        truncated: row.get::<i64>(7)? != 0,
        source: if source_raw == "fetch" {
            ObservationSource::Fetch
        } else {
            ObservationSource::Inline
        },
        created_at: parse_timestamp(&created_raw)?,
    })
}
