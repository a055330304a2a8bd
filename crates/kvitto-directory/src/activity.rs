//! Device activity reporting.
//!
//! A read-side view over the directory's device snapshot, recomputed on
//! every call — nothing here is cached, so "minutes since last seen" is
//! always relative to the caller's `now`.

use chrono::{DateTime, Utc};
use kvitto_core::{DeviceStatus, NormalizedDevice};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct DeviceActivity {
    pub id: String,
    pub name: String,
    pub status: DeviceStatus,
    /// `None` when the provider never reported a heartbeat for the device.
    pub minutes_since_last_seen: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityReport {
    pub total: usize,
    pub online: usize,
    pub devices: Vec<DeviceActivity>,
}

/// Builds the activity report for one location's devices.
///
/// Devices are ordered most-recently-seen first; devices without a
/// heartbeat sort last.
#[must_use]
pub fn activity_report(devices: &[NormalizedDevice], now: DateTime<Utc>) -> ActivityReport {
    let mut rows: Vec<DeviceActivity> = devices
        .iter()
        .map(|d| DeviceActivity {
            id: d.id.clone(),
            name: d.name.clone(),
            status: d.status,
            minutes_since_last_seen: d.last_seen_at.map(|at| (now - at).num_minutes()),
        })
        .collect();

    rows.sort_by_key(|row| match row.minutes_since_last_seen {
        Some(minutes) => (0, minutes),
        None => (1, i64::MAX),
    });

    ActivityReport {
        total: rows.len(),
        online: devices.iter().filter(|d| d.status == DeviceStatus::Online).count(),
        devices: rows,
    }
}
