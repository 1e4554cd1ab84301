//! [libs/infra/store/src/client.rs]
//!
//! Connection wrapper around libsql. The embedded database is always a
//! local file (or `:memory:` for tests) — spec.md §4.1 calls for "one file
//! per process" with single-writer concurrency, so the teacher's
//! remote/Turso-cloud branch has no counterpart here (see DESIGN.md).

use std::sync::Arc;

use libsql::{Builder, Connection, Database};
use tracing::{info, instrument};

use crate::errors::DbError;
use crate::schema::apply_schema;

#[derive(Clone)]
pub struct Store {
    database: Arc<Database>,
    /// Keeps an in-memory database alive for the lifetime of the `Store` —
    /// without a held connection, SQLite would drop the schema as soon as
    /// the bootstrap connection above is dropped.
    _memory_anchor: Option<Arc<Connection>>,
}

impl Store {
    #[instrument]
    pub async fn connect(database_path: &str) -> Result<Self, DbError> {
        if database_path.is_empty() {
            return Err(DbError::Connection("database path must not be empty".into()));
        }

        info!(database_path, "opening store");
        let is_memory = database_path == ":memory:";

        let database = Builder::new_local(database_path)
            .build()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        let database = Arc::new(database);

        let bootstrap_conn = database.connect().map_err(|e| DbError::Connection(e.to_string()))?;
        enable_foreign_keys(&bootstrap_conn).await?;
        apply_schema(&bootstrap_conn)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let memory_anchor = if is_memory { Some(Arc::new(bootstrap_conn)) } else { None };

        Ok(Self {
            database,
            _memory_anchor: memory_anchor,
        })
    }

    pub async fn connection(&self) -> Result<Connection, DbError> {
        let conn = self.database.connect().map_err(|e| DbError::Connection(e.to_string()))?;
        enable_foreign_keys(&conn).await?;
        Ok(conn)
    }
}

/// SQLite/libsql default foreign-key enforcement to OFF per connection;
/// without this the `ON DELETE CASCADE` clauses in `schema.rs` never fire.
async fn enable_foreign_keys(conn: &Connection) -> Result<(), DbError> {
    conn.execute("PRAGMA foreign_keys = ON;", ())
        .await
        .map_err(|e| DbError::Connection(e.to_string()))?;
    Ok(())
}
