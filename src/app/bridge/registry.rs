use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::app::config::BridgeConfig;
use crate::app::error::BridgeError;
use crate::app::models::{Device, DeviceStatus, DiscoveryRecord};

/// Process-wide cache of known devices, reconciled against each discovery
/// poll. Absence is tolerated for a few polls before eviction so a single
/// flaky poll does not drop an otherwise healthy device.
///
/// All access goes through one RwLock; reconciliation holds the writer
/// lock for its full two-phase pass and performs no subprocess work while
/// holding it.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    max_missed_polls: u32,
    offline_timeout: Duration,
}

impl DeviceRegistry {
    pub fn new(max_missed_polls: u32, offline_timeout: Duration) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            max_missed_polls,
            offline_timeout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.max_missed_polls, config.offline_timeout())
    }

    /// Applies one discovery poll. Phase one updates every sighted device
    /// (insert or refresh, misses reset to zero) before phase two touches
    /// any unsighted entry, so an identifier reappearing under a different
    /// status is never counted as both present and missing. Returns a
    /// snapshot copy of the surviving devices, sorted by identifier.
    pub fn reconcile(
        &self,
        records: &[DiscoveryRecord],
        now: DateTime<Utc>,
        trace_id: &str,
    ) -> Result<Vec<Device>, BridgeError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| BridgeError::internal("device registry lock poisoned", trace_id))?;

        let mut sighted: HashSet<&str> = HashSet::with_capacity(records.len());
        for record in records {
            sighted.insert(record.identifier.as_str());
            match devices.get_mut(&record.identifier) {
                Some(device) => {
                    device.status = record.status.clone();
                    if record.model.is_some() {
                        device.model = record.model.clone();
                    }
                    if now > device.last_seen {
                        device.last_seen = now;
                    }
                    device.consecutive_misses = 0;
                    debug!(
                        trace_id = %trace_id,
                        identifier = %device.identifier,
                        status = ?device.status,
                        "refreshed device"
                    );
                }
                None => {
                    info!(
                        trace_id = %trace_id,
                        identifier = %record.identifier,
                        status = ?record.status,
                        "new device"
                    );
                    devices.insert(
                        record.identifier.clone(),
                        Device {
                            identifier: record.identifier.clone(),
                            status: record.status.clone(),
                            model: record.model.clone(),
                            last_seen: now,
                            consecutive_misses: 0,
                        },
                    );
                }
            }
        }

        devices.retain(|identifier, device| {
            if sighted.contains(identifier.as_str()) {
                return true;
            }
            device.consecutive_misses += 1;
            let stale = now - device.last_seen > self.offline_timeout;
            if device.consecutive_misses >= self.max_missed_polls || stale {
                info!(
                    trace_id = %trace_id,
                    identifier = %identifier,
                    misses = device.consecutive_misses,
                    stale = stale,
                    "evicting device"
                );
                return false;
            }
            debug!(
                trace_id = %trace_id,
                identifier = %identifier,
                misses = device.consecutive_misses,
                "device missed poll"
            );
            true
        });

        Ok(sorted_snapshot(&devices))
    }

    /// Marks an explicitly connected address as present without waiting
    /// for the next poll to sight it.
    pub fn mark_connected(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
        trace_id: &str,
    ) -> Result<(), BridgeError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| BridgeError::internal("device registry lock poisoned", trace_id))?;
        let device = devices
            .entry(identifier.to_string())
            .or_insert_with(|| Device {
                identifier: identifier.to_string(),
                status: DeviceStatus::Online,
                model: None,
                last_seen: now,
                consecutive_misses: 0,
            });
        if now > device.last_seen {
            device.last_seen = now;
        }
        device.consecutive_misses = 0;
        Ok(())
    }

    /// Explicit eviction; errors on an unknown identifier.
    pub fn remove(&self, identifier: &str, trace_id: &str) -> Result<(), BridgeError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| BridgeError::internal("device registry lock poisoned", trace_id))?;
        if devices.remove(identifier).is_none() {
            return Err(BridgeError::invalid_input(
                format!("unknown device {identifier}"),
                trace_id,
            ));
        }
        info!(trace_id = %trace_id, identifier = %identifier, "removed device");
        Ok(())
    }

    /// Like `remove`, but silently ignores an unknown identifier.
    pub fn forget(&self, identifier: &str, trace_id: &str) -> Result<(), BridgeError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| BridgeError::internal("device registry lock poisoned", trace_id))?;
        devices.remove(identifier);
        Ok(())
    }

    /// Stable copy of the current devices, sorted by identifier.
    pub fn snapshot(&self, trace_id: &str) -> Result<Vec<Device>, BridgeError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| BridgeError::internal("device registry lock poisoned", trace_id))?;
        Ok(sorted_snapshot(&devices))
    }
}

fn sorted_snapshot(devices: &HashMap<String, Device>) -> Vec<Device> {
    let mut snapshot: Vec<Device> = devices.values().cloned().collect();
    snapshot.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    snapshot
}
