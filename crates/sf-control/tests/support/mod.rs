//! In-memory fake host for controller tests.
//!
//! Behaves like the real thing at the `LiveApi` seam: loads are appended to
//! a per-track device list, parameter values live in normalized space, and a
//! few switches script the failure modes the controller has to survive.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use sf_control::{ControlError, ControlResult, LiveApi, OscType, SetOutcome};
use sf_osc::OscError;

#[derive(Clone)]
pub struct FakeParam {
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub value: f32,
}

pub fn param(name: &str, min: f32, max: f32) -> FakeParam {
    FakeParam {
        name: name.to_string(),
        min,
        max,
        value: 0.0,
    }
}

#[derive(Clone)]
pub struct FakeDevice {
    pub name: String,
    pub params: Vec<FakeParam>,
    pub enabled: bool,
}

#[derive(Default)]
pub struct Counters {
    pub loads: u32,
    pub deletes: u32,
    pub sets: u32,
    pub name_queries: u32,
    pub probes: u32,
}

pub struct FakeState {
    pub tracks: Vec<Vec<FakeDevice>>,
    /// Devices the loader can instantiate
    pub catalog: HashMap<String, Vec<FakeParam>>,
    /// Loads the loader confirms but that never actually land
    pub vanishing: HashSet<String>,
    /// Loads that land but whose loader reply is lost
    pub lost_replies: HashSet<String>,
    /// Whether set_parameter confirms writes via readback
    pub verify_sets: bool,
    pub counters: Counters,
}

pub struct FakeLive {
    pub state: Mutex<FakeState>,
}

impl FakeLive {
    pub fn new(tracks: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                tracks: vec![Vec::new(); tracks],
                catalog: HashMap::new(),
                vanishing: HashSet::new(),
                lost_replies: HashSet::new(),
                verify_sets: true,
                counters: Counters::default(),
            }),
        })
    }

    pub fn add_to_catalog(&self, name: &str, params: Vec<FakeParam>) {
        self.state.lock().catalog.insert(name.to_string(), params);
    }

    pub fn device_value(&self, track: usize, device: usize, param: usize) -> f32 {
        self.state.lock().tracks[track][device].params[param].value
    }

    pub fn eq_eight_params() -> Vec<FakeParam> {
        vec![
            param("Device On", 0.0, 1.0),
            param("1 Frequency A", 0.0, 1.0),
            param("1 Gain A", -15.0, 15.0),
            param("1 Resonance A", 0.0, 1.0),
            param("1 Filter Type A", 0.0, 7.0),
            param("1 Filter On A", 0.0, 1.0),
        ]
    }

    pub fn compressor_params() -> Vec<FakeParam> {
        vec![
            param("Device On", 0.0, 1.0),
            param("Threshold", -70.0, 6.0),
            param("Ratio", 1.0, 100.0),
            param("Attack", 0.0, 1.0),
            param("Release", 0.0, 1.0),
            param("Output Gain", -36.0, 36.0),
            param("Dry/Wet", 0.0, 1.0),
        ]
    }
}

impl LiveApi for FakeLive {
    fn track_count(&self) -> ControlResult<usize> {
        Ok(self.state.lock().tracks.len())
    }

    fn device_count(&self, track: usize) -> ControlResult<usize> {
        let state = self.state.lock();
        state
            .tracks
            .get(track)
            .map(|t| t.len())
            .ok_or_else(|| ControlError::NoReply("/live/track/get/num_devices".to_string()))
    }

    fn device_names(&self, track: usize) -> ControlResult<Vec<String>> {
        let state = self.state.lock();
        state
            .tracks
            .get(track)
            .map(|t| t.iter().map(|d| d.name.clone()).collect())
            .ok_or_else(|| ControlError::NoReply("/live/track/get/devices/name".to_string()))
    }

    fn parameter_names(&self, track: usize, device: usize) -> ControlResult<Vec<String>> {
        let mut state = self.state.lock();
        state.counters.name_queries += 1;
        state
            .tracks
            .get(track)
            .and_then(|t| t.get(device))
            .map(|d| d.params.iter().map(|p| p.name.clone()).collect())
            .ok_or_else(|| ControlError::NoReply("/live/device/get/parameters/name".to_string()))
    }

    fn parameter_ranges(
        &self,
        track: usize,
        device: usize,
    ) -> ControlResult<(Vec<f32>, Vec<f32>)> {
        let state = self.state.lock();
        state
            .tracks
            .get(track)
            .and_then(|t| t.get(device))
            .map(|d| {
                (
                    d.params.iter().map(|p| p.min).collect(),
                    d.params.iter().map(|p| p.max).collect(),
                )
            })
            .ok_or_else(|| ControlError::NoReply("/live/device/get/parameters/min".to_string()))
    }

    fn parameter_value(
        &self,
        track: usize,
        device: usize,
        param: usize,
    ) -> ControlResult<Option<f32>> {
        let state = self.state.lock();
        Ok(state
            .tracks
            .get(track)
            .and_then(|t| t.get(device))
            .and_then(|d| d.params.get(param))
            .map(|p| p.value))
    }

    fn set_parameter(
        &self,
        track: usize,
        device: usize,
        param: usize,
        normalized: f32,
        _verify: bool,
    ) -> ControlResult<SetOutcome> {
        let mut state = self.state.lock();
        state.counters.sets += 1;
        let verify_sets = state.verify_sets;
        let slot = state
            .tracks
            .get_mut(track)
            .and_then(|t| t.get_mut(device))
            .and_then(|d| d.params.get_mut(param));
        match slot {
            Some(p) => {
                p.value = normalized;
                Ok(SetOutcome {
                    success: true,
                    verified: verify_sets,
                    attempts: 1,
                    actual: verify_sets.then(|| OscType::Float(normalized)),
                })
            }
            None => Ok(SetOutcome {
                success: true,
                verified: false,
                attempts: 1,
                actual: None,
            }),
        }
    }

    fn load_device(&self, track: usize, name: &str, position: i32) -> ControlResult<()> {
        let mut state = self.state.lock();
        state.counters.loads += 1;

        if state.vanishing.contains(name) {
            // Loader said yes; the device never appears.
            return Ok(());
        }
        let Some(params) = state.catalog.get(name).cloned() else {
            return Err(ControlError::Osc(OscError::Loader(format!(
                "unknown device '{}'",
                name
            ))));
        };
        let lost = state.lost_replies.contains(name);

        let device = FakeDevice {
            name: name.to_string(),
            params,
            enabled: true,
        };
        let devices = state
            .tracks
            .get_mut(track)
            .ok_or_else(|| ControlError::NoReply("/loader/device/load".to_string()))?;
        if position < 0 || position as usize >= devices.len() {
            devices.push(device);
        } else {
            devices.insert(position as usize, device);
        }

        if lost {
            return Err(ControlError::Osc(OscError::LoaderTimeout(0)));
        }
        Ok(())
    }

    fn delete_device(&self, track: usize, device: usize) -> ControlResult<()> {
        let mut state = self.state.lock();
        state.counters.deletes += 1;
        if let Some(devices) = state.tracks.get_mut(track) {
            if device < devices.len() {
                devices.remove(device);
            }
        }
        Ok(())
    }

    fn set_device_enabled(&self, track: usize, device: usize, enabled: bool) -> ControlResult<()> {
        let mut state = self.state.lock();
        if let Some(d) = state.tracks.get_mut(track).and_then(|t| t.get_mut(device)) {
            d.enabled = enabled;
        }
        Ok(())
    }

    fn probe(&self) -> ControlResult<()> {
        self.state.lock().counters.probes += 1;
        Ok(())
    }
}
