//! [libs/infra/store/src/schema.rs]
//!
//! Forward-only schema (§6 "Persisted state layout"). Base tables are
//! created with `CREATE TABLE IF NOT EXISTS`; columns added after the
//! initial cut are applied as idempotent `ALTER TABLE ADD COLUMN`
//! statements, tolerating SQLite's "duplicate column name" error on
//! repeat boot — the same mechanism `original_source/db.py`'s `_migrate`
//! uses.

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, warn};

const BASE_TABLES: &[(&str, &str)] = &[
    (
        "clusters",
        r#"
        CREATE TABLE IF NOT EXISTS clusters (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at TEXT NOT NULL
        );
    "#,
    ),
    (
        "devices",
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            cluster_id TEXT NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
            device_key TEXT NOT NULL UNIQUE,
            vendor TEXT NOT NULL,
            model TEXT NOT NULL,
            ip TEXT NOT NULL,
            port INTEGER NOT NULL,
            protocol TEXT NOT NULL,
            path TEXT NOT NULL,
            auth_type TEXT NOT NULL DEFAULT 'none',
            auth_token TEXT,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#,
    ),
    (
        "baselines",
        r#"
        CREATE TABLE IF NOT EXISTS baselines (
            cluster_id TEXT NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
            vendor TEXT NOT NULL,
            model TEXT NOT NULL,
            expected_main_version TEXT NOT NULL,
            note TEXT,
            effective_from TEXT,
            PRIMARY KEY (cluster_id, vendor, model)
        );
    "#,
    ),
    (
        "version_catalog",
        r#"
        CREATE TABLE IF NOT EXISTS version_catalog (
            vendor TEXT NOT NULL,
            model TEXT NOT NULL,
            main_version TEXT NOT NULL,
            changelog_md TEXT,
            released_at TEXT,
            risk_level TEXT,
            checksum TEXT,
            PRIMARY KEY (vendor, model, main_version)
        );
    "#,
    ),
    (
        "controlled_file_rules",
        r#"
        CREATE TABLE IF NOT EXISTS controlled_file_rules (
            cluster_id TEXT NOT NULL REFERENCES clusters(id) ON DELETE CASCADE,
            vendor TEXT NOT NULL,
            model TEXT NOT NULL,
            paths_json TEXT NOT NULL DEFAULT '[]',
            mode TEXT NOT NULL DEFAULT 'auto',
            max_bytes INTEGER NOT NULL DEFAULT 65536,
            note TEXT,
            PRIMARY KEY (cluster_id, vendor, model)
        );
    "#,
    ),
    (
        "device_snapshots",
        r#"
        CREATE TABLE IF NOT EXISTS device_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            observed_at TEXT NOT NULL,
            success INTEGER NOT NULL,
            http_status INTEGER,
            latency_ms INTEGER,
            error TEXT,
            protocol_version INTEGER,
            main_version TEXT,
            firmware_version TEXT,
            payload_json TEXT
        );
    "#,
    ),
    (
        "controlled_file_observations",
        r#"
        CREATE TABLE IF NOT EXISTS controlled_file_observations (
            device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            snapshot_id INTEGER NOT NULL REFERENCES device_snapshots(id) ON DELETE CASCADE,
            content_b64 TEXT,
            encoding TEXT,
            content_type TEXT,
            truncated INTEGER NOT NULL DEFAULT 0,
            source TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (device_id, path, fingerprint)
        );
    "#,
    ),
    (
        "events",
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            event_type TEXT NOT NULL,
            old_state TEXT,
            new_state TEXT,
            message TEXT,
            payload_json TEXT
        );
    "#,
    ),
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'admin',
            created_at TEXT NOT NULL
        );
    "#,
    ),
    (
        "sessions",
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
    "#,
    ),
];

/// Columns introduced after the initial schema cut (§6). Device's
/// `last_state`/`last_state_at`/`line_no` and baseline's
/// `allowed_main_globs_json` are exactly the evolutionary columns spec.md
/// names explicitly.
const EVOLUTIONARY_COLUMNS: &[(&str, &str)] = &[
    ("DEVICE_LAST_STATE", "ALTER TABLE devices ADD COLUMN last_state TEXT"),
    (
        "DEVICE_LAST_STATE_AT",
        "ALTER TABLE devices ADD COLUMN last_state_at TEXT",
    ),
    ("DEVICE_LINE_NO", "ALTER TABLE devices ADD COLUMN line_no TEXT"),
    (
        "BASELINE_ALLOWED_GLOBS",
        "ALTER TABLE baselines ADD COLUMN allowed_main_globs_json TEXT NOT NULL DEFAULT '[]'",
    ),
];

const INDEXES: &[(&str, &str)] = &[
    (
        "IDX_DEVICES_CLUSTER",
        "CREATE INDEX IF NOT EXISTS idx_devices_cluster ON devices(cluster_id);",
    ),
    (
        "IDX_SNAPSHOTS_DEVICE",
        "CREATE INDEX IF NOT EXISTS idx_snapshots_device ON device_snapshots(device_id, observed_at);",
    ),
    (
        "IDX_EVENTS_DEVICE",
        "CREATE INDEX IF NOT EXISTS idx_events_device ON events(device_id, created_at);",
    ),
    (
        "IDX_SESSIONS_EXPIRY",
        "CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON sessions(expires_at);",
    ),
];

pub async fn apply_schema(conn: &Connection) -> Result<()> {
    info!("applying schema");
    create_base_tables(conn).await?;
    apply_evolutionary_columns(conn).await?;
    create_indexes(conn).await?;
    info!("schema up to date");
    Ok(())
}

async fn create_base_tables(conn: &Connection) -> Result<()> {
    for (name, sql) in BASE_TABLES {
        debug!(table = name, "creating table");
        conn.execute(sql, ()).await.with_context(|| format!("creating table {name}"))?;
    }
    Ok(())
}

async fn apply_evolutionary_columns(conn: &Connection) -> Result<()> {
    for (name, sql) in EVOLUTIONARY_COLUMNS {
        match conn.execute(sql, ()).await {
            Ok(_) => debug!(column = name, "applied evolutionary column"),
            Err(e) => {
                let message = e.to_string();
                if message.contains("duplicate column name") {
                    debug!(column = name, "evolutionary column already present");
                } else {
                    warn!(column = name, error = %message, "evolutionary column check incomplete");
                }
            }
        }
    }
    Ok(())
}

async fn create_indexes(conn: &Connection) -> Result<()> {
    for (name, sql) in INDEXES {
        debug!(index = name, "creating index");
        conn.execute(sql, ()).await.with_context(|| format!("creating index {name}"))?;
    }
    Ok(())
}
