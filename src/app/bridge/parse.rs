use std::collections::HashMap;

use regex::Regex;

use crate::app::models::{DeviceStatus, DiscoveryRecord};

/// The tool itself (not a device) is in a bad state; the registry must be
/// left untouched when one of these surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryFault {
    /// A line reading exactly `adb [server]`: the server process is wedged.
    ToolUnhealthy { line: String },
    /// Client/server version skew; adb restarts itself mid-command.
    VersionMismatch { line: String },
}

/// Parses one `devices -l` poll into discovery records.
///
/// The sentinel for a wedged server is matched only when the line consists
/// of exactly the two tokens `adb [server]`. Any other line starting with
/// `adb` is a tool meta line: it is skipped, never fatal, so a poll is
/// never aborted by tool chatter around real devices.
pub fn parse_discovery_output(output: &str) -> Result<Vec<DiscoveryRecord>, DiscoveryFault> {
    if output.contains("doesn't match") {
        let line = output
            .lines()
            .find(|line| line.contains("doesn't match"))
            .unwrap_or("")
            .trim()
            .to_string();
        return Err(DiscoveryFault::VersionMismatch { line });
    }

    let mut records = Vec::new();
    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() || line.to_lowercase().contains("list of devices") {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            continue;
        }

        if tokens.len() == 2 && tokens[0] == "adb" && tokens[1] == "[server]" {
            return Err(DiscoveryFault::ToolUnhealthy {
                line: line.to_string(),
            });
        }

        // Meta lines such as `* daemon not running ...` or `adb I 01-01 ...`
        // describe the tool, not a device.
        if tokens[0] == "*" || tokens[0] == "adb" || tokens[1].starts_with('[') {
            continue;
        }

        let model = tokens
            .iter()
            .skip(2)
            .find_map(|token| token.strip_prefix("model:"))
            .map(str::to_string);

        records.push(DiscoveryRecord {
            identifier: tokens[0].to_string(),
            status: DeviceStatus::from_raw(tokens[1]),
            model,
        });
    }

    Ok(records)
}

pub fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(str::to_string)
        .filter(|pkg| !pkg.is_empty())
        .collect()
}

pub fn parse_getprop_map(output: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('[') {
            continue;
        }
        let Some((key_part, value_part)) = trimmed.split_once("]: [") else {
            continue;
        };
        let key = key_part.trim_start_matches('[').trim();
        let value = value_part.trim_end_matches(']').trim();
        if !key.is_empty() {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

/// The last non-empty line of `cmd package resolve-activity --brief`,
/// which must look like `com.example/.MainActivity`.
pub fn parse_launch_activity(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .filter(|line| line.contains('/'))
        .map(str::to_string)
}

/// Newline-delimited `host:port` targets; blank lines and `#` comments are
/// ignored, malformed entries are dropped.
pub fn parse_target_list(text: &str) -> Vec<String> {
    let Ok(pattern) = Regex::new(r"^[A-Za-z0-9_.\-]+:\d{1,5}$") else {
        return Vec::new();
    };
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| pattern.is_match(line))
        .map(str::to_string)
        .collect()
}
