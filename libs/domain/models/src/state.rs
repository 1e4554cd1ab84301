//! The device state machine (§4.4). `DeviceState` is the pure output of
//! the state function; `never_polled` is not a member here because it is
//! never produced by the Reconciler — only by the aggregated status view
//! for a device with zero snapshots (§4.4).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Offline,
    NoBaseline,
    Ok,
    Mismatch,
    FilesChanged,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Offline => "offline",
            DeviceState::NoBaseline => "no_baseline",
            DeviceState::Ok => "ok",
            DeviceState::Mismatch => "mismatch",
            DeviceState::FilesChanged => "files_changed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "offline" => Some(DeviceState::Offline),
            "no_baseline" => Some(DeviceState::NoBaseline),
            "ok" => Some(DeviceState::Ok),
            "mismatch" => Some(DeviceState::Mismatch),
            "files_changed" => Some(DeviceState::FilesChanged),
            _ => None,
        }
    }
}

pub const NEVER_POLLED: &str = "never_polled";
