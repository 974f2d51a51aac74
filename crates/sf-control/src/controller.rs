//! Reliable parameter controller
//!
//! Composes the transport primitive, the discovery cache, and the value
//! curves into the operations callers actually want:
//! - wait for a freshly instantiated device to become addressable
//! - load a device and resolve its index by observing the count change
//! - set a parameter by human name and human value, verified
//! - batch writes with per-name outcomes
//!
//! Instantiation on the host is fire-and-forget; the readiness poller turns
//! it into a synchronous barrier by polling uncached device info until the
//! parameter list is populated.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sf_osc::{last_numeric, OscError};

use crate::api::LiveApi;
use crate::cache::{DeviceInfo, ParamDescriptor, ParameterCache};
use crate::curve::{self, Curve};
use crate::error::{ControlError, ControlResult};

/// Timing and tolerance knobs for the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Readiness polling budget after a load request
    pub ready_timeout_ms: u64,
    /// Interval between readiness/count polls
    pub poll_interval_ms: u64,
    /// Minimum settle time after issuing a load, before polling
    pub load_min_delay_ms: u64,
    /// Gap between writes in a batch
    pub inter_param_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 8000,
            poll_interval_ms: 150,
            load_min_delay_ms: 500,
            inter_param_delay_ms: 50,
        }
    }
}

impl ControllerConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn inter_param_delay(&self) -> Duration {
        Duration::from_millis(self.inter_param_delay_ms)
    }
}

/// Outcome of a verified device load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub success: bool,
    pub device_index: Option<usize>,
    pub device_name: String,
    pub message: String,
}

/// Outcome of one by-name parameter write.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSet {
    pub name: String,
    pub index: Option<usize>,
    pub requested: f32,
    pub normalized_sent: Option<f32>,
    /// Verified readback, denormalized to human units
    pub actual: Option<f32>,
    pub curve: Option<Curve>,
    pub success: bool,
    pub verified: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

impl ParamSet {
    fn not_found(name: &str, value: f32, device_name: &str) -> Self {
        Self {
            name: name.to_string(),
            index: None,
            requested: value,
            normalized_sent: None,
            actual: None,
            curve: None,
            success: false,
            verified: false,
            attempts: 0,
            error: Some(format!(
                "parameter '{}' not found on {}",
                name, device_name
            )),
        }
    }
}

/// Outcome of a batch write.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Names that never resolved to an index; tracked apart from failures
    pub not_found: Vec<String>,
    pub details: Vec<ParamSet>,
}

/// Reliable parameter control over a [`LiveApi`].
pub struct ParamController<A: LiveApi> {
    api: Arc<A>,
    cache: ParameterCache,
    config: ControllerConfig,
}

impl<A: LiveApi> ParamController<A> {
    pub fn new(api: Arc<A>, config: ControllerConfig) -> Self {
        Self {
            api,
            cache: ParameterCache::new(),
            config,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Shared handle to the host seam, e.g. for wiring a recovery manager
    /// over the same connection.
    pub fn api_handle(&self) -> Arc<A> {
        Arc::clone(&self.api)
    }

    pub fn cache(&self) -> &ParameterCache {
        &self.cache
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // ---- discovery -----------------------------------------------------

    /// Device info from cache or a fresh fetch.
    pub fn device_info(
        &self,
        track: usize,
        device: usize,
        use_cache: bool,
    ) -> ControlResult<Arc<DeviceInfo>> {
        if use_cache {
            if let Some(info) = self.cache.get(track, device) {
                return Ok(info);
            }
        }
        self.fetch_device_info(track, device)
    }

    fn fetch_device_info(&self, track: usize, device: usize) -> ControlResult<Arc<DeviceInfo>> {
        let names = match self.api.parameter_names(track, device) {
            Ok(names) if !names.is_empty() => names,
            // Locked third-party devices and half-instantiated ones both
            // land here; cache them as inaccessible until invalidated.
            Ok(_) | Err(ControlError::NoReply(_)) => {
                log::warn!(
                    "[Control] parameters not accessible for track {} device {}",
                    track,
                    device
                );
                return Ok(self.cache.insert(DeviceInfo {
                    track,
                    device,
                    name: "Unknown".to_string(),
                    accessible: false,
                    params: Vec::new(),
                }));
            }
            Err(e) => return Err(e),
        };

        let (mins, maxs) = match self.api.parameter_ranges(track, device) {
            Ok(ranges) => ranges,
            Err(ControlError::NoReply(_)) => (Vec::new(), Vec::new()),
            Err(e) => return Err(e),
        };

        let name = self
            .api
            .device_names(track)
            .ok()
            .and_then(|names| names.get(device).cloned())
            .unwrap_or_else(|| "Unknown".to_string());

        let params = names
            .into_iter()
            .enumerate()
            .map(|(index, pname)| ParamDescriptor {
                index,
                name: pname,
                min: mins.get(index).copied().unwrap_or(0.0),
                max: maxs.get(index).copied().unwrap_or(1.0),
            })
            .collect();

        log::debug!(
            "[Control] discovered '{}' on track {} device {}",
            name,
            track,
            device
        );
        Ok(self.cache.insert(DeviceInfo {
            track,
            device,
            name,
            accessible: true,
            params,
        }))
    }

    /// Resolve a human parameter name to an index.
    pub fn find_parameter_index(
        &self,
        track: usize,
        device: usize,
        name: &str,
    ) -> ControlResult<Option<usize>> {
        let info = self.device_info(track, device, true)?;
        if !info.accessible {
            return Ok(None);
        }
        Ok(info.param_index(name))
    }

    // ---- readiness -----------------------------------------------------

    /// Poll uncached device info until its parameter list is populated, or
    /// the timeout elapses. Poll errors count as "not ready yet".
    pub fn wait_for_device_ready(&self, track: usize, device: usize, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut polls = 0u32;
        loop {
            polls += 1;
            match self.fetch_device_info(track, device) {
                Ok(info) if info.accessible && !info.params.is_empty() => {
                    log::debug!(
                        "[Control] device {}/{} ready after {} poll(s), {} params",
                        track,
                        device,
                        polls,
                        info.params.len()
                    );
                    return true;
                }
                Ok(_) => {}
                Err(e) => log::debug!("[Control] readiness poll failed: {}", e),
            }
            if start.elapsed() >= timeout {
                log::warn!(
                    "[Control] device {}/{} not ready after {} poll(s)",
                    track,
                    device,
                    polls
                );
                return false;
            }
            thread::sleep(self.config.poll_interval());
        }
    }

    // ---- device loading ------------------------------------------------

    /// Issue a load and resolve the new device's index by position.
    ///
    /// Name alone is ambiguous (the same device may appear twice in a
    /// chain), so the index comes from the observed count change: appended
    /// loads land at the end, positioned loads at their position.
    pub fn load_device_verified(
        &self,
        track: usize,
        name: &str,
        position: i32,
    ) -> ControlResult<LoadReport> {
        let count_before = self.api.device_count(track).unwrap_or(0);

        if let Err(e) = self.api.load_device(track, name, position) {
            match &e {
                // A lost loader reply does not mean the load failed; the
                // instantiation may still have landed. Keep polling.
                ControlError::Osc(OscError::LoaderTimeout(_)) | ControlError::NoReply(_) => {
                    log::warn!(
                        "[Control] load reply missing for '{}', polling device count anyway",
                        name
                    );
                }
                _ => {
                    return Ok(LoadReport {
                        success: false,
                        device_index: None,
                        device_name: name.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        thread::sleep(Duration::from_millis(self.config.load_min_delay_ms));

        let deadline = Instant::now() + self.config.ready_timeout();
        loop {
            let count_after = self.api.device_count(track).unwrap_or(0);
            if count_after > count_before {
                let device_index = if position < 0 {
                    count_after - 1
                } else {
                    position as usize
                };
                // The slot now holds a different device.
                self.cache.invalidate(track, device_index);
                log::info!(
                    "[Control] '{}' loaded on track {} at index {}",
                    name,
                    track,
                    device_index
                );
                return Ok(LoadReport {
                    success: true,
                    device_index: Some(device_index),
                    device_name: name.to_string(),
                    message: format!("loaded at index {}", device_index),
                });
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(self.config.poll_interval());
        }

        Ok(LoadReport {
            success: false,
            device_index: None,
            device_name: name.to_string(),
            message: "timed out waiting for device to appear".to_string(),
        })
    }

    /// Delete a device and drop every cached entry for the track, since
    /// deletion shifts the indices of everything behind it.
    pub fn delete_device(&self, track: usize, device: usize) -> ControlResult<()> {
        self.api.delete_device(track, device)?;
        self.cache.invalidate_track(track);
        Ok(())
    }

    // ---- parameter access ----------------------------------------------

    /// Current normalized value of a parameter.
    pub fn parameter_value(
        &self,
        track: usize,
        device: usize,
        param: usize,
    ) -> ControlResult<Option<f32>> {
        self.api.parameter_value(track, device, param)
    }

    /// What the given human value would normalize to for this parameter.
    pub fn target_normalized(
        &self,
        track: usize,
        device: usize,
        param: usize,
        value: f32,
    ) -> ControlResult<Option<f32>> {
        let info = self.device_info(track, device, true)?;
        if !info.accessible {
            return Ok(None);
        }
        let Some(desc) = info.descriptor(param) else {
            return Ok(None);
        };
        let (normalized, _) = curve::to_normalized(&desc.name, &info.name, desc.min, desc.max, value);
        Ok(Some(normalized))
    }

    /// Read a parameter by name and denormalize it to human units.
    pub fn read_parameter_human(
        &self,
        track: usize,
        device: usize,
        name: &str,
    ) -> ControlResult<Option<f32>> {
        let info = self.device_info(track, device, true)?;
        if !info.accessible {
            return Ok(None);
        }
        let Some(index) = info.param_index(name) else {
            return Ok(None);
        };
        let Some(normalized) = self.api.parameter_value(track, device, index)? else {
            return Ok(None);
        };
        let desc = &info.params[index];
        Ok(Some(curve::from_normalized(
            &desc.name, &info.name, desc.min, desc.max, normalized,
        )))
    }

    /// Resolve, normalize, write verified, and denormalize the readback.
    pub fn set_parameter_by_name(
        &self,
        track: usize,
        device: usize,
        name: &str,
        value: f32,
    ) -> ControlResult<ParamSet> {
        let info = self.device_info(track, device, true)?;
        let index = if info.accessible {
            info.param_index(name)
        } else {
            None
        };
        let Some(index) = index else {
            return Ok(ParamSet::not_found(name, value, &info.name));
        };

        let desc = &info.params[index];
        let (normalized, applied) =
            curve::to_normalized(&desc.name, &info.name, desc.min, desc.max, value);

        log::debug!(
            "[Control] set '{}' ({}#{}) {} -> {:.6} via {:?}",
            desc.name,
            info.name,
            index,
            value,
            normalized,
            applied
        );

        let outcome = self.api.set_parameter(track, device, index, normalized, true)?;
        let actual = outcome
            .actual
            .as_ref()
            .and_then(|v| last_numeric(std::slice::from_ref(v)))
            .map(|n| curve::from_normalized(&desc.name, &info.name, desc.min, desc.max, n));

        Ok(ParamSet {
            name: name.to_string(),
            index: Some(index),
            requested: value,
            normalized_sent: Some(normalized),
            actual,
            curve: Some(applied),
            success: outcome.success,
            verified: outcome.verified,
            attempts: outcome.attempts,
            error: None,
        })
    }

    /// Apply a map of human names to human values, with a small settle gap
    /// between writes. Unresolved names are tracked apart from failures.
    pub fn set_parameters_by_name(
        &self,
        track: usize,
        device: usize,
        entries: &[(String, f32)],
    ) -> ControlResult<BatchReport> {
        let mut report = BatchReport {
            total: entries.len(),
            ..BatchReport::default()
        };

        for (i, (name, value)) in entries.iter().enumerate() {
            let outcome = self.set_parameter_by_name(track, device, name, *value)?;
            if outcome.index.is_none() {
                report.not_found.push(name.clone());
            } else if outcome.success {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            report.details.push(outcome);

            if i + 1 < entries.len() {
                thread::sleep(self.config.inter_param_delay());
            }
        }

        log::info!(
            "[Control] batch on {}/{}: {}/{} ok, {} failed, {} not found",
            track,
            device,
            report.succeeded,
            report.total,
            report.failed,
            report.not_found.len()
        );
        Ok(report)
    }
}
