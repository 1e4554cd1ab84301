//! Small shared helpers so each repository doesn't re-derive the same
//! timestamp/JSON plumbing.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::DbError;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Mapping(format!("invalid timestamp '{raw}': {e}")))
}

pub fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub fn encode_json(value: &Value) -> String {
    value.to_string()
}

pub fn decode_json(raw: &str) -> Result<Value, DbError> {
    serde_json::from_str(raw).map_err(|e| DbError::Mapping(format!("invalid json payload: {e}")))
}

pub fn encode_string_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}
