//! Deterministic four-phase chain executor
//!
//! Runs a [`ChainPlan`] through PLAN → EXECUTE → VERIFY → REPORT with zero
//! advisory calls after PLAN:
//!
//! - **PLAN** validates the target track and resolves every device name
//!   through the fallback table. `dry_run` stops here.
//! - **EXECUTE** (guarded) optionally clears the track, then loads each
//!   device in caller order and writes its parameters. A parameter whose
//!   current value already matches the target within tolerance is skipped
//!   without a single write.
//! - **VERIFY** (guarded) re-reads parameters that succeeded without a
//!   confirmed readback.
//! - **REPORT** aggregates. A fully-built chain with parameter misses still
//!   counts as success, with the misses demoted to warnings.
//!
//! Devices and parameters run strictly sequentially in caller order because
//! the host assigns device indices by load order.

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sf_control::{LiveApi, LoadReport, ParamController};

use crate::error::PipelineError;
use crate::fallback::{fallback_chain, resolve_device_name, DevicePreferences};
use crate::guardrail::CallGuardrail;
use crate::metrics::PipelineMetrics;
use crate::plan::{ChainPlan, DeviceSpec, ParamSpec};
use crate::report::{DeviceOutcome, ParamOutcome, Phase, RunReport};

/// Executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Idempotency tolerance in normalized space when a param spec has none
    pub default_tolerance: f32,
    /// Settle gap between deletions while clearing a track
    pub clear_delay_ms: u64,
    /// Device preferences for fallback resolution
    #[serde(default)]
    pub preferences: DevicePreferences,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_tolerance: 0.02,
            clear_delay_ms: 100,
            preferences: DevicePreferences::default(),
        }
    }
}

struct ResolvedDevice<'a> {
    spec: &'a DeviceSpec,
    resolved_name: String,
    is_fallback: bool,
}

/// Four-phase deterministic executor over a [`ParamController`].
pub struct PipelineExecutor<A: LiveApi> {
    controller: ParamController<A>,
    guardrail: CallGuardrail,
    metrics: PipelineMetrics,
    config: ExecutorConfig,
}

impl<A: LiveApi> PipelineExecutor<A> {
    pub fn new(controller: ParamController<A>) -> Self {
        Self {
            controller,
            guardrail: CallGuardrail::default(),
            metrics: PipelineMetrics::default(),
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_guardrail(mut self, guardrail: CallGuardrail) -> Self {
        self.guardrail = guardrail;
        self
    }

    pub fn controller(&self) -> &ParamController<A> {
        &self.controller
    }

    pub fn guardrail(&self) -> &CallGuardrail {
        &self.guardrail
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Execute a plan and aggregate the outcome.
    ///
    /// Per-device and per-parameter failures land in the report; only
    /// guardrail violations and structurally invalid plans are raised.
    pub fn execute(&self, plan: &ChainPlan) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        plan.validate()?;

        let mut report = RunReport::for_plan(plan);

        // The advisory call that produced this plan counts against the
        // budget, whether or not the planner remembered to record it.
        self.guardrail.record_call("plan")?;

        // ---- PLAN ----
        match self.controller.api().track_count() {
            Ok(count) if plan.track_index < count => {}
            Ok(count) => {
                report.errors.push(format!(
                    "track index {} out of range (have {} tracks)",
                    plan.track_index, count
                ));
                return Ok(self.finalize(report, start));
            }
            Err(e) => {
                report.errors.push(format!("failed to query track count: {}", e));
                return Ok(self.finalize(report, start));
            }
        }

        let resolved = self.resolve_devices(&plan.devices);
        log::info!(
            "[Pipeline] PLAN: {} device(s) on track {}{}",
            plan.devices.len(),
            plan.track_index,
            if plan.dry_run { " (dry run)" } else { "" }
        );

        if plan.dry_run {
            report.devices = resolved.iter().map(predicted_outcome).collect();
            report.success = true;
            return Ok(self.finalize(report, start));
        }

        // ---- EXECUTE ----
        report.phase_reached = Phase::Execute;
        {
            let _blocked = self.guardrail.block_phase("execute");

            if plan.clear_existing {
                self.clear_track(plan.track_index);
            }

            // Cursor over the existing chain so replays reuse devices
            // instead of appending duplicates.
            let mut chain_cursor = 0usize;
            for device in &resolved {
                let outcome = self.execute_device(plan.track_index, device, &mut chain_cursor);
                if outcome.loaded {
                    report.devices_loaded += 1;
                }
                report.devices.push(outcome);
            }
        }

        // ---- VERIFY ----
        report.phase_reached = Phase::Verify;
        {
            let _blocked = self.guardrail.block_phase("verify");
            for device in &mut report.devices {
                self.verify_device(plan.track_index, device);
            }
        }

        // ---- REPORT ----
        report.phase_reached = Phase::Report;
        for device in &report.devices {
            if let Some(error) = &device.error {
                report.errors.push(format!("{}: {}", device.name, error));
            }
            for param in &device.params {
                if param.success {
                    report.params_set += 1;
                }
                if param.verified {
                    report.params_verified += 1;
                }
                if param.skipped_idempotent {
                    report.params_skipped_idempotent += 1;
                }
                if let Some(error) = &param.error {
                    report
                        .errors
                        .push(format!("{}.{}: {}", device.name, param.name, error));
                }
            }
        }

        report.success =
            report.devices_loaded == report.devices_planned && report.errors.is_empty();

        // Chain built, some knobs missed: that is a warning, not a failure.
        if !report.success && report.devices_loaded == report.devices_planned {
            report.warnings.append(&mut report.errors);
            report.success = true;
        }

        Ok(self.finalize(report, start))
    }

    fn finalize(&self, mut report: RunReport, start: Instant) -> RunReport {
        report.advisory_calls_used = self.guardrail.calls_used();
        report.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record(&report);
        report
    }

    // ---- PLAN helpers --------------------------------------------------

    fn resolve_devices<'a>(&self, specs: &'a [DeviceSpec]) -> Vec<ResolvedDevice<'a>> {
        specs
            .iter()
            .map(|spec| {
                let (resolved_name, is_fallback) =
                    resolve_device_name(&spec.name, &self.config.preferences);
                if is_fallback {
                    log::info!(
                        "[Pipeline] device fallback: {} -> {}",
                        spec.name,
                        resolved_name
                    );
                }
                ResolvedDevice {
                    spec,
                    resolved_name,
                    is_fallback,
                }
            })
            .collect()
    }

    // ---- EXECUTE helpers -----------------------------------------------

    /// Delete devices last-to-first so indices do not shift underneath the
    /// remaining deletions.
    fn clear_track(&self, track: usize) {
        let count = self.controller.api().device_count(track).unwrap_or(0);
        for device in (0..count).rev() {
            if let Err(e) = self.controller.delete_device(track, device) {
                log::warn!(
                    "[Pipeline] failed to delete device {} on track {}: {}",
                    device,
                    track,
                    e
                );
            }
            thread::sleep(Duration::from_millis(self.config.clear_delay_ms));
        }
        if count > 0 {
            log::info!("[Pipeline] cleared {} device(s) from track {}", count, track);
        }
    }

    fn execute_device(
        &self,
        track: usize,
        device: &ResolvedDevice,
        chain_cursor: &mut usize,
    ) -> DeviceOutcome {
        let spec = device.spec;
        let load_start = Instant::now();

        let mut outcome = DeviceOutcome {
            name: device.resolved_name.clone(),
            requested_name: spec.name.clone(),
            device_index: None,
            loaded: false,
            is_fallback: device.is_fallback,
            params: Vec::new(),
            error: None,
            load_time_ms: 0.0,
            param_time_ms: 0.0,
        };

        // Reuse an instance already sitting in the chain at or past the
        // cursor: replaying an applied plan must not grow the chain.
        if let Some(existing) = self.find_existing(track, &device.resolved_name, *chain_cursor) {
            log::info!(
                "[Pipeline] reusing existing '{}' at index {}",
                device.resolved_name,
                existing
            );
            *chain_cursor = existing + 1;
            return self.configure_device(track, existing, spec, outcome, load_start);
        }

        let mut load = self.try_load(track, &device.resolved_name);

        // Explicit caller fallback first, then the keyword chain.
        if !load.success {
            if let Some(fallback) = &spec.fallback {
                if fallback != &device.resolved_name {
                    log::info!(
                        "[Pipeline] primary load failed, trying fallback: {}",
                        fallback
                    );
                    let retry = self.try_load(track, fallback);
                    if retry.success {
                        outcome.name = fallback.clone();
                        outcome.is_fallback = true;
                        load = retry;
                    }
                }
            }
        }
        if !load.success {
            for candidate in fallback_chain(&spec.name, &self.config.preferences) {
                if candidate == outcome.name || Some(&candidate) == spec.fallback.as_ref() {
                    continue;
                }
                log::info!("[Pipeline] trying fallback chain: {}", candidate);
                let retry = self.try_load(track, &candidate);
                if retry.success {
                    outcome.name = candidate;
                    outcome.is_fallback = true;
                    load = retry;
                    break;
                }
            }
        }

        if !load.success {
            outcome.load_time_ms = load_start.elapsed().as_secs_f64() * 1000.0;
            outcome.error = Some(if load.message.is_empty() {
                "load failed (all fallbacks exhausted)".to_string()
            } else {
                load.message
            });
            return outcome;
        }

        let Some(device_index) = load.device_index else {
            outcome.loaded = true;
            outcome.load_time_ms = load_start.elapsed().as_secs_f64() * 1000.0;
            outcome.error = Some("device loaded but index unknown".to_string());
            return outcome;
        };

        *chain_cursor = device_index + 1;
        self.configure_device(track, device_index, spec, outcome, load_start)
    }

    /// First device in the chain at or past `from` carrying this name.
    fn find_existing(&self, track: usize, name: &str, from: usize) -> Option<usize> {
        let names = self.controller.api().device_names(track).ok()?;
        names
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(index, _)| index)
    }

    /// Readiness barrier, parameter writes, and the bypass flag for a device
    /// that is known to sit at `device_index`.
    fn configure_device(
        &self,
        track: usize,
        device_index: usize,
        spec: &DeviceSpec,
        mut outcome: DeviceOutcome,
        load_start: Instant,
    ) -> DeviceOutcome {
        outcome.loaded = true;
        outcome.device_index = Some(device_index);
        outcome.load_time_ms = load_start.elapsed().as_secs_f64() * 1000.0;

        if !self.controller.wait_for_device_ready(
            track,
            device_index,
            self.controller.config().ready_timeout(),
        ) {
            outcome.error = Some("device loaded but never became ready".to_string());
            return outcome;
        }

        let param_start = Instant::now();
        for (i, param) in spec.params.iter().enumerate() {
            outcome
                .params
                .push(self.apply_param(track, device_index, &outcome.name, param));
            if i + 1 < spec.params.len() {
                thread::sleep(self.controller.config().inter_param_delay());
            }
        }
        outcome.param_time_ms = param_start.elapsed().as_secs_f64() * 1000.0;

        if !spec.enabled {
            if let Err(e) = self
                .controller
                .api()
                .set_device_enabled(track, device_index, false)
            {
                log::warn!("[Pipeline] failed to bypass {}: {}", outcome.name, e);
            }
        }

        outcome
    }

    fn try_load(&self, track: usize, name: &str) -> LoadReport {
        match self.controller.load_device_verified(track, name, -1) {
            Ok(report) => report,
            Err(e) => LoadReport {
                success: false,
                device_index: None,
                device_name: name.to_string(),
                message: e.to_string(),
            },
        }
    }

    fn apply_param(
        &self,
        track: usize,
        device: usize,
        device_name: &str,
        spec: &ParamSpec,
    ) -> ParamOutcome {
        let mut outcome = ParamOutcome {
            name: spec.name.clone(),
            requested: spec.value,
            actual: None,
            success: false,
            verified: false,
            skipped_idempotent: false,
            error: None,
        };

        let index = match self.controller.find_parameter_index(track, device, &spec.name) {
            Ok(Some(index)) => index,
            Ok(None) => {
                outcome.error = Some(format!(
                    "parameter '{}' not found on {}",
                    spec.name, device_name
                ));
                return outcome;
            }
            Err(e) => {
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        // Idempotency check: when the host already matches the target within
        // tolerance, report success with zero writes.
        let tolerance = spec.tolerance.unwrap_or(self.config.default_tolerance);
        let current = self.controller.parameter_value(track, device, index);
        let target = self.controller.target_normalized(track, device, index, spec.value);
        if let (Ok(Some(current)), Ok(Some(target))) = (current, target) {
            if (current - target).abs() <= tolerance {
                outcome.success = true;
                outcome.skipped_idempotent = true;
                outcome.verified = true;
                outcome.actual = Some(spec.value);
                log::debug!(
                    "[Pipeline] {}.{} already at target, skipping write",
                    device_name,
                    spec.name
                );
                return outcome;
            }
        }

        match self
            .controller
            .set_parameter_by_name(track, device, &spec.name, spec.value)
        {
            Ok(set) => {
                outcome.success = set.success;
                outcome.verified = set.verified;
                outcome.actual = set.actual;
                if set.verified && outcome.actual.is_none() {
                    outcome.actual = Some(spec.value);
                }
                if !set.success {
                    outcome.error = set.error.or_else(|| Some("set failed".to_string()));
                }
            }
            Err(e) => outcome.error = Some(e.to_string()),
        }
        outcome
    }

    // ---- VERIFY helpers ------------------------------------------------

    /// Re-read parameters that succeeded without a confirmed readback (e.g.
    /// fire-and-forget writes). Skipped parameters are already known good.
    fn verify_device(&self, track: usize, device: &mut DeviceOutcome) {
        if !device.loaded {
            return;
        }
        let Some(device_index) = device.device_index else {
            return;
        };

        for param in &mut device.params {
            if param.success && !param.verified && !param.skipped_idempotent {
                match self
                    .controller
                    .read_parameter_human(track, device_index, &param.name)
                {
                    Ok(Some(actual)) => {
                        param.actual = Some(actual);
                        param.verified = true;
                    }
                    Ok(None) => {}
                    Err(e) => log::debug!(
                        "[Pipeline] verify readback failed for {}.{}: {}",
                        device.name,
                        param.name,
                        e
                    ),
                }
            }
        }
    }
}

fn predicted_outcome(device: &ResolvedDevice) -> DeviceOutcome {
    DeviceOutcome {
        name: device.resolved_name.clone(),
        requested_name: device.spec.name.clone(),
        device_index: None,
        loaded: false,
        is_fallback: device.is_fallback,
        params: device
            .spec
            .params
            .iter()
            .map(|p| ParamOutcome {
                name: p.name.clone(),
                requested: p.value,
                actual: None,
                success: true,
                verified: false,
                skipped_idempotent: false,
                error: None,
            })
            .collect(),
        error: None,
        load_time_ms: 0.0,
        param_time_ms: 0.0,
    }
}
