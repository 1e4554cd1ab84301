//! [libs/infra/store/src/repositories/cluster.rs]

use libsql::params;
use tracing::instrument;
use vm_domain::entities::Cluster;

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::support::{now, parse_timestamp, to_rfc3339};

pub struct ClusterRepository {
    store: Store,
}

impl ClusterRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, id: &str, name: &str, description: Option<&str>) -> Result<Cluster, DbError> {
        let conn = self.store.connection().await?;
        let created_at = now();
        conn.execute(
            "INSERT INTO clusters (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, description, to_rfc3339(&created_at)],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "cluster.create"))?;

        Ok(Cluster {
            id: id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at,
        })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Option<Cluster>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, description, created_at FROM clusters WHERE id = ?1",
                params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Cluster>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, description, created_at FROM clusters WHERE name = ?1",
                params![name],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Cluster>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query("SELECT id, name, description, created_at FROM clusters ORDER BY name", ())
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(map_row(&row)?);
        }
        Ok(out)
    }
}

fn map_row(row: &libsql::Row) -> Result<Cluster, DbError> {
    let created_raw: String = row.get(3)?;
    Ok(Cluster {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_timestamp(&created_raw)?,
    })
}
