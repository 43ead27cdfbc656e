use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session-wide knobs. The eviction thresholds are deliberately two
/// independent values because poll cadence is controlled by the caller,
/// not by this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Bridge executable; plain `adb` resolves through PATH.
    pub program: String,
    pub command_timeout_secs: u64,
    /// Installs and file transfers routinely outlast the generic
    /// command timeout.
    pub transfer_timeout_secs: u64,
    /// Overall bound for the composite screen-capture unit.
    pub capture_timeout_secs: u64,
    pub max_missed_polls: u32,
    pub offline_timeout_secs: u64,
    /// Token prepended to shell commands while privileged mode is on.
    pub privileged_token: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "adb".to_string(),
            command_timeout_secs: 10,
            transfer_timeout_secs: 120,
            capture_timeout_secs: 10,
            max_missed_polls: 3,
            offline_timeout_secs: 300,
            privileged_token: "busybox".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn offline_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.offline_timeout_secs as i64)
    }
}

pub fn normalize_program_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

pub fn resolve_program(configured: &str) -> String {
    let normalized = normalize_program_path(configured);
    if normalized.is_empty() {
        "adb".to_string()
    } else {
        normalized
    }
}

pub fn validate_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("bridge command is empty".to_string());
    }
    if program == "adb" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("bridge path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("bridge executable not found at the configured path".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = BridgeConfig::default();
        assert_eq!(config.max_missed_polls, 3);
        assert_eq!(config.offline_timeout(), chrono::Duration::minutes(5));
        assert_eq!(config.command_timeout(), Duration::from_secs(10));
        assert_eq!(config.capture_timeout(), Duration::from_secs(10));
        assert_eq!(config.privileged_token, "busybox");
    }

    #[test]
    fn strips_wrapping_quotes() {
        assert_eq!(
            normalize_program_path("  \"/opt/android/platform-tools/adb\"  "),
            "/opt/android/platform-tools/adb"
        );
        assert_eq!(
            normalize_program_path("  '/opt/android/platform-tools/adb'  "),
            "/opt/android/platform-tools/adb"
        );
    }

    #[test]
    fn resolves_empty_to_default() {
        assert_eq!(resolve_program(""), "adb");
        assert_eq!(resolve_program("   "), "adb");
    }

    #[test]
    fn validates_nonexistent_path() {
        let err = validate_program("/this/path/should/not/exist/adb").unwrap_err();
        assert!(err.to_lowercase().contains("not found"));
    }
}
