use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device state as reported by a discovery poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unauthorized,
    Other(String),
}

impl DeviceStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "device" => DeviceStatus::Online,
            "offline" => DeviceStatus::Offline,
            "unauthorized" => DeviceStatus::Unauthorized,
            other => DeviceStatus::Other(other.to_string()),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, DeviceStatus::Online)
    }
}

/// One tracked endpoint. `identifier` is a physical serial or a
/// `host:port` address and never changes once the device is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub identifier: String,
    pub status: DeviceStatus,
    pub model: Option<String>,
    pub last_seen: DateTime<Utc>,
    /// Consecutive discovery polls in which the device was absent.
    pub consecutive_misses: u32,
}

/// One `<identifier> <status> [key:value ...]` line from a discovery poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    pub identifier: String,
    pub status: DeviceStatus,
    pub model: Option<String>,
}

/// Static device properties assembled from one `getprop` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub identifier: String,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub brand: Option<String>,
    pub android_version: Option<String>,
    pub api_level: Option<String>,
    pub cpu_abi: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_status_strings() {
        assert_eq!(DeviceStatus::from_raw("device"), DeviceStatus::Online);
        assert_eq!(DeviceStatus::from_raw("offline"), DeviceStatus::Offline);
        assert_eq!(
            DeviceStatus::from_raw("unauthorized"),
            DeviceStatus::Unauthorized
        );
        assert_eq!(
            DeviceStatus::from_raw("recovery"),
            DeviceStatus::Other("recovery".to_string())
        );
    }

    #[test]
    fn device_serializes_with_snake_case_status() {
        let device = Device {
            identifier: "ABC123".to_string(),
            status: DeviceStatus::Online,
            model: Some("Pixel_7".to_string()),
            last_seen: Utc::now(),
            consecutive_misses: 0,
        };
        let json = serde_json::to_value(&device).expect("serializable");
        assert_eq!(json["identifier"], "ABC123");
        assert_eq!(json["status"], "online");
    }
}
