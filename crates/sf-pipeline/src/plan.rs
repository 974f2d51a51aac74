//! Declarative chain plans
//!
//! A plan is the entire input to one pipeline run: which devices to load on
//! which track, in signal-chain order, and which parameters to set on each.
//! Values are human units (Hz, dB, ms, %, on/off); the control layer owns
//! the conversion to the host's normalized space. Plans are immutable during
//! a run.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Upper bound on devices per plan; longer chains are a planner bug.
pub const MAX_DEVICES_PER_PLAN: usize = 16;

/// One parameter to set on a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Human parameter name, resolved against live discovery
    pub name: String,
    /// Target value in human units
    pub value: f32,
    /// Optional idempotency tolerance in normalized space
    #[serde(default)]
    pub tolerance: Option<f32>,
}

impl ParamSpec {
    pub fn new(name: &str, value: f32) -> Self {
        Self {
            name: name.to_string(),
            value,
            tolerance: None,
        }
    }
}

/// One device to load, with its parameter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    /// Human-readable role in the chain (e.g. "high_pass", "dynamics")
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// `false` loads the device bypassed
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Explicit alternative if the primary fails to load
    #[serde(default)]
    pub fallback: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl DeviceSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            purpose: None,
            params: Vec::new(),
            enabled: true,
            fallback: None,
        }
    }

    pub fn with_param(mut self, name: &str, value: f32) -> Self {
        self.params.push(ParamSpec::new(name, value));
        self
    }

    pub fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = Some(fallback.to_string());
        self
    }

    pub fn bypassed(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Complete execution plan for a device chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainPlan {
    /// 0-based track index
    pub track_index: usize,
    /// Devices in signal-chain order; load order is index order
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub description: Option<String>,
    /// Remove existing devices (last to first) before loading
    #[serde(default)]
    pub clear_existing: bool,
    /// Stop after PLAN and report what would happen
    #[serde(default)]
    pub dry_run: bool,
}

impl ChainPlan {
    pub fn new(track_index: usize) -> Self {
        Self {
            track_index,
            devices: Vec::new(),
            description: None,
            clear_existing: false,
            dry_run: false,
        }
    }

    pub fn with_device(mut self, device: DeviceSpec) -> Self {
        self.devices.push(device);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Structural validation; range checks against the live host happen in
    /// the executor's PLAN phase.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.devices.is_empty() {
            return Err(PipelineError::InvalidPlan(
                "plan must contain at least one device".to_string(),
            ));
        }
        if self.devices.len() > MAX_DEVICES_PER_PLAN {
            return Err(PipelineError::InvalidPlan(format!(
                "plan has {} devices, maximum is {}",
                self.devices.len(),
                MAX_DEVICES_PER_PLAN
            )));
        }
        for device in &self.devices {
            if device.name.trim().is_empty() {
                return Err(PipelineError::InvalidPlan(
                    "device name must not be empty".to_string(),
                ));
            }
            for param in &device.params {
                if param.name.trim().is_empty() {
                    return Err(PipelineError::InvalidPlan(format!(
                        "parameter name on '{}' must not be empty",
                        device.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_plan() {
        assert!(ChainPlan::new(0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_names() {
        let plan = ChainPlan::new(0).with_device(DeviceSpec::new("  "));
        assert!(plan.validate().is_err());

        let plan = ChainPlan::new(0).with_device(DeviceSpec::new("Reverb").with_param("", 1.0));
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_plan_deserializes_with_defaults() {
        let json = r#"{
            "track_index": 1,
            "devices": [
                {"name": "EQ Eight", "params": [{"name": "1 Frequency A", "value": 120.0}]},
                {"name": "Glue Compressor", "enabled": false}
            ]
        }"#;
        let plan: ChainPlan = serde_json::from_str(json).unwrap();
        assert!(plan.validate().is_ok());
        assert_eq!(plan.track_index, 1);
        assert!(!plan.clear_existing);
        assert!(!plan.dry_run);
        assert!(plan.devices[0].enabled);
        assert!(!plan.devices[1].enabled);
        assert_eq!(plan.devices[0].params[0].value, 120.0);
    }
}
