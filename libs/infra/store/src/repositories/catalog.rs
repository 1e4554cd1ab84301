//! [libs/infra/store/src/repositories/catalog.rs]

use libsql::{params, Row};
use tracing::instrument;
use vm_domain::entities::VersionCatalogEntry;

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::support::parse_timestamp;

pub struct CatalogRepository {
    store: Store,
}

impl CatalogRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self, entry))]
    pub async fn upsert(&self, entry: &VersionCatalogEntry) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        conn.execute(
            "INSERT INTO version_catalog (vendor, model, main_version, changelog_md, \
             released_at, risk_level, checksum) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(vendor, model, main_version) DO UPDATE SET \
             changelog_md = excluded.changelog_md, released_at = excluded.released_at, \
             risk_level = excluded.risk_level, checksum = excluded.checksum",
            params![
                entry.vendor.clone(),
                entry.model.clone(),
                entry.main_version.clone(),
                entry.changelog_md.clone(),
                entry.released_at.map(|ts| ts.to_rfc3339()),
                entry.risk_level.clone(),
                entry.checksum.clone(),
            ],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "catalog.upsert"))?;
        Ok(())
    }

    /// Insert-or-ignore (§4.1 `ensure_entry`): auto-created with all
    /// metadata NULL the first time a device reports a new version.
    #[instrument(skip(self))]
    pub async fn ensure_entry(&self, vendor: &str, model: &str, main_version: &str) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        conn.execute(
            "INSERT OR IGNORE INTO version_catalog (vendor, model, main_version) VALUES (?1, ?2, ?3)",
            params![vendor, model, main_version],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, vendor: &str, model: &str, main_version: &str) -> Result<Option<VersionCatalogEntry>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                "SELECT vendor, model, main_version, changelog_md, released_at, risk_level, checksum \
                 FROM version_catalog WHERE vendor=?1 AND model=?2 AND main_version=?3",
                params![vendor, model, main_version],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, vendor: Option<&str>, model: Option<&str>) -> Result<Vec<VersionCatalogEntry>, DbError> {
        let conn = self.store.connection().await?;
        let mut sql = "SELECT vendor, model, main_version, changelog_md, released_at, risk_level, checksum \
                       FROM version_catalog WHERE 1=1"
            .to_string();
        let mut values: Vec<libsql::Value> = Vec::new();
        if let Some(v) = vendor {
            values.push(libsql::Value::Text(v.to_string()));
            sql.push_str(&format!(" AND vendor = ?{}", values.len()));
        }
        if let Some(m) = model {
            values.push(libsql::Value::Text(m.to_string()));
            sql.push_str(&format!(" AND model = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY vendor, model, main_version");
        let mut rows = conn.query(&sql, values).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row(&row)?);
        }
        Ok(out)
    }
}

fn map_row(row: &Row) -> Result<VersionCatalogEntry, DbError> {
    let released_at_raw: Option<String> = row.get(4)?;
    Ok(VersionCatalogEntry {
        vendor: row.get(0)?,
        model: row.get(1)?,
        main_version: row.get(2)?,
        changelog_md: row.get(3)?,
        released_at: released_at_raw.map(|s| parse_timestamp(&s)).transpose()?,
        risk_level: row.get(5)?,
        checksum: row.get(6)?,
    })
}
