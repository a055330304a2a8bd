//! In-memory location/device directory with TTL-based refresh.
//!
//! The directory holds the last full sync from the providers. Reads keep
//! serving the previous snapshot while a refresh is due — a stale directory
//! answers lookups, [`Directory::needs_refresh`] tells the caller to
//! resync. A snapshot is replaced wholesale; there are no partial updates.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use kvitto_core::{DeviceStatus, NormalizedDevice, NormalizedLocation};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::activity::{activity_report, ActivityReport};

struct DirectoryState {
    locations: HashMap<String, NormalizedLocation>,
    devices: HashMap<String, NormalizedDevice>,
    last_refreshed: Option<DateTime<Utc>>,
}

/// Shared location/device directory. Cheap to read, replaced atomically on
/// sync.
pub struct Directory {
    ttl: Duration,
    inner: RwLock<DirectoryState>,
}

/// Snapshot counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryStats {
    pub locations: usize,
    pub devices: usize,
    pub online_devices: usize,
    /// Seconds since the last sync, `None` before the first one.
    pub age_secs: Option<i64>,
}

impl Directory {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(DirectoryState {
                locations: HashMap::new(),
                devices: HashMap::new(),
                last_refreshed: None,
            }),
        }
    }

    /// True when the directory has never been synced or the last sync is at
    /// least one TTL old.
    pub async fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        let state = self.inner.read().await;
        match state.last_refreshed {
            None => true,
            Some(at) => now - at >= self.ttl,
        }
    }

    /// Replaces the whole snapshot with a fresh sync.
    ///
    /// The location→device index is derived here from each device's
    /// `location_id`; callers never maintain it by hand. Devices pointing
    /// at a location missing from this sync are kept but logged — a
    /// provider listing inconsistency, not a reason to drop the device.
    pub async fn replace(
        &self,
        locations: Vec<NormalizedLocation>,
        devices: Vec<NormalizedDevice>,
        now: DateTime<Utc>,
    ) {
        let mut location_map: HashMap<String, NormalizedLocation> = locations
            .into_iter()
            .map(|mut loc| {
                loc.device_ids.clear();
                (loc.id.clone(), loc)
            })
            .collect();

        let mut device_map = HashMap::with_capacity(devices.len());
        for device in devices {
            match location_map.get_mut(&device.location_id) {
                Some(loc) => {
                    loc.device_ids.insert(device.id.clone());
                }
                None => {
                    tracing::warn!(
                        device_id = %device.id,
                        location_id = %device.location_id,
                        "device references a location missing from this sync"
                    );
                }
            }
            device_map.insert(device.id.clone(), device);
        }

        let mut state = self.inner.write().await;
        state.locations = location_map;
        state.devices = device_map;
        state.last_refreshed = Some(now);
        tracing::debug!(
            locations = state.locations.len(),
            devices = state.devices.len(),
            "directory snapshot replaced"
        );
    }

    pub async fn location(&self, id: &str) -> Option<NormalizedLocation> {
        self.inner.read().await.locations.get(id).cloned()
    }

    pub async fn locations(&self) -> Vec<NormalizedLocation> {
        let state = self.inner.read().await;
        let mut all: Vec<_> = state.locations.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Devices belonging to one location, via the derived index.
    pub async fn devices_for(&self, location_id: &str) -> Vec<NormalizedDevice> {
        let state = self.inner.read().await;
        let Some(loc) = state.locations.get(location_id) else {
            return Vec::new();
        };
        loc.device_ids
            .iter()
            .filter_map(|id| state.devices.get(id).cloned())
            .collect()
    }

    pub async fn device(&self, id: &str) -> Option<NormalizedDevice> {
        self.inner.read().await.devices.get(id).cloned()
    }

    /// Activity report for one location's devices, recomputed on every
    /// call relative to `now`.
    pub async fn activity(&self, location_id: &str, now: DateTime<Utc>) -> ActivityReport {
        let devices = self.devices_for(location_id).await;
        activity_report(&devices, now)
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> DirectoryStats {
        let state = self.inner.read().await;
        DirectoryStats {
            locations: state.locations.len(),
            devices: state.devices.len(),
            online_devices: state
                .devices
                .values()
                .filter(|d| d.status == DeviceStatus::Online)
                .count(),
            age_secs: state.last_refreshed.map(|at| (now - at).num_seconds()),
        }
    }
}
