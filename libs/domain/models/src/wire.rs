//! DVP v1 wire contract (§6). These types model exactly the untyped JSON
//! devices emit — per §9's design note, the payload is deliberately not
//! forced into a strict schema; unknown/extra fields are ignored by
//! `serde(default)`, and both spelling variants devices use in the field
//! (`supplier`/`vendor`, `device_type`/`model`) are accepted via `alias`.

use serde::{Deserialize, Serialize};

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DvpDeviceInfo {
    pub id: Option<String>,
    pub serial: Option<String>,
    #[serde(alias = "supplier")]
    pub vendor: Option<String>,
    #[serde(alias = "device_type")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DvpVersions {
    pub main: Option<String>,
    pub firmware: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DvpMainVersionInfo {
    pub changelog_md: Option<String>,
    pub released_at: Option<String>,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DvpFileEntry {
    pub path: String,
    pub checksum: Option<String>,
    pub size: Option<i64>,
    pub mtime: Option<String>,
    pub encoding: Option<String>,
    pub content_type: Option<String>,
    pub content_b64: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DvpDocEntry {
    pub name: String,
    pub content_type: Option<String>,
    pub encoding: Option<String>,
    pub checksum: Option<String>,
    pub content_b64: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DvpPayload {
    pub protocol: Option<String>,
    pub protocol_version: Option<serde_json::Value>,
    #[serde(default)]
    pub device: DvpDeviceInfo,
    #[serde(default)]
    pub versions: DvpVersions,
    pub main_version_info: Option<DvpMainVersionInfo>,
    pub files: Option<Vec<DvpFileEntry>>,
    pub docs: Option<Vec<DvpDocEntry>>,
}

/// Response shape of `GET /.well-known/device-version/file?path=...`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileFetchResponse {
    pub path: Option<String>,
    pub content_b64: String,
    pub encoding: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InferredIdentity {
    pub device_serial: String,
    pub supplier: String,
    pub device_type: String,
}

/// Infers `(device_serial, supplier, device_type)` from a DVP payload for
/// `/register` and `/discover` (§6). `serial` takes precedence over `id`
/// when both are present; this is the superset the manager implements —
/// the original poller only ever looked at `id`.
pub fn infer_identity(payload: &DvpPayload) -> Option<InferredIdentity> {
    let device_serial = non_empty(&payload.device.serial).or_else(|| non_empty(&payload.device.id))?;
    let supplier = non_empty(&payload.device.vendor)?;
    let device_type = non_empty(&payload.device.model)?;
    Some(InferredIdentity {
        device_serial,
        supplier,
        device_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_takes_precedence_over_id() {
        let payload = DvpPayload {
            device: DvpDeviceInfo {
                id: Some("id-1".into()),
                serial: Some("serial-1".into()),
                vendor: Some("Acme".into()),
                model: Some("Widget".into()),
            },
            ..Default::default()
        };
        let identity = infer_identity(&payload).unwrap();
        assert_eq!(identity.device_serial, "serial-1");
    }

    #[test]
    fn falls_back_to_id_when_serial_absent() {
        let payload = DvpPayload {
            device: DvpDeviceInfo {
                id: Some("id-1".into()),
                serial: None,
                vendor: Some("Acme".into()),
                model: Some("Widget".into()),
            },
            ..Default::default()
        };
        let identity = infer_identity(&payload).unwrap();
        assert_eq!(identity.device_serial, "id-1");
    }

    #[test]
    fn missing_required_field_yields_none() {
        let payload = DvpPayload {
            device: DvpDeviceInfo {
                id: Some("id-1".into()),
                vendor: Some("Acme".into()),
                model: None,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(infer_identity(&payload).is_none());
    }

    #[test]
    fn supplier_alias_deserializes_into_vendor() {
        let raw = r#"{"supplier":"Acme","device_type":"Widget","id":"x"}"#;
        let info: DvpDeviceInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.vendor.as_deref(), Some("Acme"));
        assert_eq!(info.model.as_deref(), Some("Widget"));
    }
}
