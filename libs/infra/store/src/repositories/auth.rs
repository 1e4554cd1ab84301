//! [libs/infra/store/src/repositories/auth.rs]
//!
//! Password hashing follows the teacher's PBKDF2-HMAC-SHA256 pattern.
//! Salt bytes come from `uuid::Uuid::new_v4()` rather than a dedicated
//! `rand` dependency (see DESIGN.md) — 16 bytes of UUID v4 randomness is
//! plenty for a per-user salt that only needs to prevent rainbow-table
//! reuse across accounts, not to be unpredictable on its own.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use libsql::{params, Row};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::instrument;
use uuid::Uuid;
use vm_domain::entities::{Session, User};

use crate::client::Store;
use crate::errors::DbError;
use crate::repositories::support::{now, parse_timestamp, to_rfc3339};

const PBKDF2_ROUNDS: u32 = 200_000;
const HASH_LEN: usize = 32;

fn hash_password(password: &str, salt: &[u8]) -> String {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut out);
    format!("pbkdf2-sha256${PBKDF2_ROUNDS}${}${}", BASE64.encode(salt), BASE64.encode(out))
}

fn verify_password(password: &str, encoded: &str) -> bool {
    let parts: Vec<&str> = encoded.split('$').collect();
    let [algo, rounds, salt_b64, hash_b64] = parts.as_slice() else {
        return false;
    };
    if *algo != "pbkdf2-sha256" {
        return false;
    }
    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    let Ok(salt) = BASE64.decode(salt_b64) else {
        return false;
    };
    let Ok(expected) = BASE64.decode(hash_b64) else {
        return false;
    };
    let mut actual = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, rounds, &mut actual);
    constant_time_eq(&actual, &expected)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct UserRepository {
    store: Store,
}

impl UserRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self, password))]
    pub async fn create_user(&self, id: &str, username: &str, password: &str, role: &str) -> Result<User, DbError> {
        let conn = self.store.connection().await?;
        let salt = *Uuid::new_v4().as_bytes();
        let password_hash = hash_password(password, &salt);
        let created_at = now();
        conn.execute(
            "INSERT INTO users (id, username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, username, password_hash.clone(), role, to_rfc3339(&created_at)],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "auth.create_user"))?;

        Ok(User {
            id: id.to_string(),
            username: username.to_string(),
            password_hash,
            role: role.to_string(),
            created_at,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?1",
                params![username],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_user_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Verifies a login attempt; `Some(user)` on success, `None` on a
    /// missing user or wrong password — callers must not distinguish the
    /// two in the response they send back.
    #[instrument(skip(self, password))]
    pub async fn verify_user(&self, username: &str, password: &str) -> Result<Option<User>, DbError> {
        let Some(user) = self.get_by_username(username).await? else {
            return Ok(None);
        };
        if verify_password(password, &user.password_hash) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }
}

fn map_user_row(row: &Row) -> Result<User, DbError> {
    let created_raw: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
        created_at: parse_timestamp(&created_raw)?,
    })
}

pub struct SessionRepository {
    store: Store,
}

impl SessionRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn create_session(&self, user_id: &str, ttl_seconds: i64) -> Result<Session, DbError> {
        let conn = self.store.connection().await?;
        let token = Uuid::new_v4().to_string();
        let created_at = now();
        let expires_at = created_at + chrono::Duration::seconds(ttl_seconds);
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![token.clone(), user_id, to_rfc3339(&created_at), to_rfc3339(&expires_at)],
        )
        .await
        .map_err(|e| DbError::from_libsql(e, "auth.create_session"))?;

        Ok(Session {
            token,
            user_id: user_id.to_string(),
            created_at,
            expires_at,
        })
    }

    /// Looks up the session's owning user, rejecting (and not touching)
    /// expired sessions. Valid reads extend the session's `expires_at` by
    /// `ttl_seconds` — activity keeps a session alive.
    #[instrument(skip(self))]
    pub async fn get_session_user(&self, token: &str, ttl_seconds: i64) -> Result<Option<User>, DbError> {
        let conn = self.store.connection().await?;
        let mut rows = conn
            .query(
                "SELECT u.id, u.username, u.password_hash, u.role, u.created_at, s.expires_at \
                 FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.token = ?1",
                params![token],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let expires_raw: String = row.get(5)?;
        let expires_at = parse_timestamp(&expires_raw)?;
        if expires_at <= now() {
            return Ok(None);
        }

        let user = map_user_row(&row)?;

        let new_expiry = now() + chrono::Duration::seconds(ttl_seconds);
        conn.execute(
            "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
            params![to_rfc3339(&new_expiry), token],
        )
        .await?;

        Ok(Some(user))
    }

    #[instrument(skip(self))]
    pub async fn delete_session(&self, token: &str) -> Result<(), DbError> {
        let conn = self.store.connection().await?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token]).await?;
        Ok(())
    }
}
