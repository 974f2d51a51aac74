//! Parameter discovery cache
//!
//! Discovery (names + declared ranges) is one slow round-trip per device, so
//! results are cached per (track, device). Entries have no TTL: device
//! indices only change when something is deleted, replaced, or loaded, and
//! each of those paths invalidates explicitly.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// One discovered parameter: index, name, declared range.
///
/// Declared bounds are sometimes wrong (a `[0,1]` report for a control whose
/// true range is wider); the value curves compensate, this struct just
/// records what the host said.
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    pub index: usize,
    pub name: String,
    pub min: f32,
    pub max: f32,
}

/// Discovered state of one device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub track: usize,
    pub device: usize,
    pub name: String,
    /// Some third-party devices refuse parameter listing entirely.
    pub accessible: bool,
    pub params: Vec<ParamDescriptor>,
}

impl DeviceInfo {
    /// Resolve a human parameter name to an index.
    ///
    /// Exact case-insensitive match first, then substring in either
    /// direction; first hit wins.
    pub fn param_index(&self, wanted: &str) -> Option<usize> {
        let needle = wanted.to_lowercase();

        for p in &self.params {
            if p.name.to_lowercase() == needle {
                return Some(p.index);
            }
        }
        for p in &self.params {
            if p.name.to_lowercase().contains(&needle) {
                return Some(p.index);
            }
        }
        for p in &self.params {
            let name = p.name.to_lowercase();
            if !name.is_empty() && needle.contains(&name) {
                return Some(p.index);
            }
        }
        None
    }

    pub fn descriptor(&self, index: usize) -> Option<&ParamDescriptor> {
        self.params.get(index)
    }
}

/// Cache counters for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub inaccessible: usize,
}

/// Thread-safe per-(track, device) cache of [`DeviceInfo`].
#[derive(Default)]
pub struct ParameterCache {
    entries: Mutex<HashMap<(usize, usize), Arc<DeviceInfo>>>,
}

impl ParameterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track: usize, device: usize) -> Option<Arc<DeviceInfo>> {
        self.entries.lock().get(&(track, device)).cloned()
    }

    pub fn insert(&self, info: DeviceInfo) -> Arc<DeviceInfo> {
        let info = Arc::new(info);
        self.entries
            .lock()
            .insert((info.track, info.device), Arc::clone(&info));
        info
    }

    /// Drop one entry. Returns whether it existed.
    pub fn invalidate(&self, track: usize, device: usize) -> bool {
        self.entries.lock().remove(&(track, device)).is_some()
    }

    /// Drop every entry for a track. Returns how many were removed.
    pub fn invalidate_track(&self, track: usize) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(t, _), _| *t != track);
        before - entries.len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            entries: entries.len(),
            inaccessible: entries.values().filter(|i| !i.accessible).count(),
        }
    }
}
