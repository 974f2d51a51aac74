//! In-memory fake host for pipeline tests.
//!
//! Same seam as production (`LiveApi`), with scripted failure modes and
//! counters so tests can assert what traffic a run actually produced.

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
    pub sets: u32,
    pub probes: u32,
}

pub struct FakeState {
    pub tracks: Vec<Vec<FakeDevice>>,
    pub catalog: HashMap<String, Vec<FakeParam>>,
    /// Loads the loader confirms but that never actually land
    pub vanishing: HashSet<String>,
    /// Whether set_parameter confirms writes via readback
    pub verify_sets: bool,
    /// Device indices in deletion order
    pub deleted_order: Vec<usize>,
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
                verify_sets: true,
                deleted_order: Vec::new(),
                counters: Counters::default(),
            }),
        })
    }

    /// Fake with the usual stock suspects loadable.
    pub fn with_stock_catalog(tracks: usize) -> Arc<Self> {
        let fake = Self::new(tracks);
        fake.add_to_catalog(
            "EQ Eight",
            vec![
                param("Device On", 0.0, 1.0),
                param("1 Frequency A", 0.0, 1.0),
                param("1 Gain A", -15.0, 15.0),
                param("1 Resonance A", 0.0, 1.0),
                param("1 Filter Type A", 0.0, 7.0),
            ],
        );
        fake.add_to_catalog(
            "Compressor",
            vec![
                param("Device On", 0.0, 1.0),
                param("Threshold", -70.0, 6.0),
                param("Ratio", 1.0, 100.0),
                param("Attack", 0.0, 1.0),
                param("Output Gain", -36.0, 36.0),
                param("Dry/Wet", 0.0, 1.0),
            ],
        );
        fake.add_to_catalog(
            "Reverb",
            vec![
                param("Device On", 0.0, 1.0),
                param("Predelay", 0.0, 1.0),
                param("Decay Time", 0.0, 1.0),
                param("Dry/Wet", 0.0, 1.0),
            ],
        );
        fake
    }

    pub fn add_to_catalog(&self, name: &str, params: Vec<FakeParam>) {
        self.state.lock().catalog.insert(name.to_string(), params);
    }

    pub fn device_names_on(&self, track: usize) -> Vec<String> {
        self.state.lock().tracks[track]
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn device_value(&self, track: usize, device: usize, param: usize) -> f32 {
        self.state.lock().tracks[track][device].params[param].value
    }

    pub fn sets(&self) -> u32 {
        self.state.lock().counters.sets
    }

    pub fn loads(&self) -> u32 {
        self.state.lock().counters.loads
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
        let state = self.state.lock();
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
            return Ok(());
        }
        let Some(params) = state.catalog.get(name).cloned() else {
            return Err(ControlError::Osc(OscError::Loader(format!(
                "unknown device '{}'",
                name
            ))));
        };

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
        Ok(())
    }

    fn delete_device(&self, track: usize, device: usize) -> ControlResult<()> {
        let mut state = self.state.lock();
        state.deleted_order.push(device);
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
