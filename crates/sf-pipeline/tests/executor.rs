//! Executor integration tests over the in-memory fake host.

mod support;

use std::sync::Arc;

use approx::assert_relative_eq;
use sf_control::{ControllerConfig, ParamController};
use sf_pipeline::{
    ChainPlan, DeviceSpec, ExecutorConfig, Phase, PipelineError, PipelineExecutor,
};
use support::FakeLive;

fn fast_executor(fake: &Arc<FakeLive>) -> PipelineExecutor<FakeLive> {
    let _ = env_logger::builder().is_test(true).try_init();
    let controller_config = ControllerConfig {
        ready_timeout_ms: 100,
        poll_interval_ms: 2,
        load_min_delay_ms: 0,
        inter_param_delay_ms: 0,
    };
    let executor_config = ExecutorConfig {
        clear_delay_ms: 0,
        ..ExecutorConfig::default()
    };
    PipelineExecutor::new(ParamController::new(Arc::clone(fake), controller_config))
        .with_config(executor_config)
}

fn vocal_chain_plan() -> ChainPlan {
    ChainPlan::new(0)
        .with_description("vocal chain")
        .with_device(
            DeviceSpec::new("EQ Eight")
                .with_param("1 Frequency A", 2000.0)
                .with_param("1 Gain A", 3.0),
        )
        .with_device(
            DeviceSpec::new("Compressor")
                .with_param("Threshold", -14.0)
                .with_param("Dry/Wet", 50.0),
        )
}

#[test]
fn test_full_chain_builds_and_verifies() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);

    let report = executor.execute(&vocal_chain_plan()).unwrap();

    assert!(report.success);
    assert_eq!(report.phase_reached, Phase::Report);
    assert_eq!(report.devices_loaded, 2);
    assert_eq!(report.params_set, 4);
    assert_eq!(report.params_verified, 4);
    assert_eq!(report.advisory_calls_used, 1);
    assert!(report.errors.is_empty());

    // Frequency went out log-normalized, dry/wet as a fraction.
    assert_relative_eq!(fake.device_value(0, 0, 1), 2.0 / 3.0, epsilon = 1e-4);
    assert_relative_eq!(fake.device_value(0, 1, 5), 0.5, epsilon = 1e-6);
    assert_eq!(fake.device_names_on(0), vec!["EQ Eight", "Compressor"]);
}

#[test]
fn test_idempotent_replay_skips_every_write() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);
    let plan = vocal_chain_plan();

    let first = executor.execute(&plan).unwrap();
    assert!(first.success);
    assert_eq!(first.params_skipped_idempotent, 0);
    let sets_after_first = fake.sets();
    let loads_after_first = fake.loads();

    executor.guardrail().reset(None);
    let second = executor.execute(&plan).unwrap();

    assert!(second.success);
    assert_eq!(second.devices_loaded, 2);
    assert_eq!(second.params_skipped_idempotent, 4);
    for device in &second.devices {
        for param in &device.params {
            assert!(param.skipped_idempotent, "{} was rewritten", param.name);
            assert!(param.success);
        }
    }
    // Zero writes and zero loads on the replay: the chain did not grow.
    assert_eq!(fake.sets(), sets_after_first);
    assert_eq!(fake.loads(), loads_after_first);
    assert_eq!(fake.device_names_on(0), vec!["EQ Eight", "Compressor"]);
}

#[test]
fn test_keyword_fallback_resolves_at_plan_time() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);

    let plan = ChainPlan::new(0)
        .with_device(DeviceSpec::new("FabFilter Pro-C Compressor").with_param("Threshold", -20.0));
    let report = executor.execute(&plan).unwrap();

    assert!(report.success);
    let device = &report.devices[0];
    assert!(device.loaded);
    assert!(device.is_fallback);
    assert_eq!(device.name, "Compressor");
    assert_eq!(device.requested_name, "FabFilter Pro-C Compressor");
}

#[test]
fn test_explicit_fallback_used_when_primary_load_fails() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);

    // No resolution keyword matches; the loader rejects the primary and the
    // caller-supplied fallback takes over.
    let plan = ChainPlan::new(0)
        .with_device(DeviceSpec::new("Magic Space Machine").with_fallback("Reverb"));
    let report = executor.execute(&plan).unwrap();

    assert!(report.success);
    let device = &report.devices[0];
    assert!(device.loaded);
    assert!(device.is_fallback);
    assert_eq!(device.name, "Reverb");
}

#[test]
fn test_partial_success_reports_failure_with_counts() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);

    let plan = ChainPlan::new(0)
        .with_device(DeviceSpec::new("EQ Eight").with_param("1 Gain A", -2.0))
        .with_device(DeviceSpec::new("Mystery Box 3000"));
    let report = executor.execute(&plan).unwrap();

    assert!(!report.success);
    assert_eq!(report.devices_loaded, 1);
    assert_eq!(report.devices_planned, 2);
    assert!(report
        .errors
        .iter()
        .any(|e| e.contains("Mystery Box 3000")));
    // The healthy device was still fully configured.
    assert!(report.devices[0].loaded);
    assert!(report.devices[0].params[0].success);
}

#[test]
fn test_param_misses_on_built_chain_demote_to_warnings() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);

    let plan = ChainPlan::new(0)
        .with_device(DeviceSpec::new("EQ Eight").with_param("Sparkle Amount", 11.0));
    let report = executor.execute(&plan).unwrap();

    assert!(report.success);
    assert!(report.errors.is_empty());
    assert!(report.warnings.iter().any(|w| w.contains("Sparkle Amount")));
    assert!(!report.devices[0].params[0].success);
}

#[test]
fn test_dry_run_touches_nothing() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);

    let mut plan = vocal_chain_plan();
    plan.dry_run = true;
    let report = executor.execute(&plan).unwrap();

    assert!(report.success);
    assert!(report.dry_run);
    assert_eq!(report.phase_reached, Phase::Plan);
    assert_eq!(report.devices.len(), 2);
    assert_eq!(fake.loads(), 0);
    assert_eq!(fake.sets(), 0);
}

#[test]
fn test_clear_existing_deletes_last_to_first() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);
    executor.execute(&vocal_chain_plan()).unwrap();

    executor.guardrail().reset(None);
    let mut plan = ChainPlan::new(0).with_device(DeviceSpec::new("Reverb"));
    plan.clear_existing = true;
    let report = executor.execute(&plan).unwrap();

    assert!(report.success);
    assert_eq!(fake.state.lock().deleted_order, vec![1, 0]);
    assert_eq!(fake.device_names_on(0), vec!["Reverb"]);
}

#[test]
fn test_advisory_budget_spans_runs_until_reset() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);
    let plan = ChainPlan::new(0).with_device(DeviceSpec::new("Reverb"));

    executor.execute(&plan).unwrap();
    match executor.execute(&plan) {
        Err(PipelineError::BudgetExceeded { attempted, max }) => {
            assert_eq!(attempted, 2);
            assert_eq!(max, 1);
        }
        other => panic!("expected budget violation, got {:?}", other.map(|r| r.success)),
    }

    executor.guardrail().reset(None);
    assert!(executor.execute(&plan).is_ok());
}

#[test]
fn test_disabled_device_is_bypassed_after_configuration() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);

    let plan = ChainPlan::new(0)
        .with_device(DeviceSpec::new("Reverb").with_param("Dry/Wet", 30.0).bypassed());
    let report = executor.execute(&plan).unwrap();

    assert!(report.success);
    assert!(!fake.state.lock().tracks[0][0].enabled);
    // The parameter still went in before the bypass.
    assert_relative_eq!(fake.device_value(0, 0, 3), 0.3, epsilon = 1e-6);
}

#[test]
fn test_verify_phase_confirms_unverified_writes() {
    let fake = FakeLive::with_stock_catalog(2);
    fake.state.lock().verify_sets = false;
    let executor = fast_executor(&fake);

    let report = executor.execute(&vocal_chain_plan()).unwrap();

    assert!(report.success);
    assert_eq!(report.params_verified, 4);
    let freq = &report.devices[0].params[0];
    assert!(freq.verified);
    // Readback is reported in human units.
    assert_relative_eq!(freq.actual.unwrap(), 2000.0, epsilon = 1.0);
}

#[test]
fn test_track_out_of_range_fails_in_plan_phase() {
    let fake = FakeLive::with_stock_catalog(2);
    let executor = fast_executor(&fake);

    let mut plan = vocal_chain_plan();
    plan.track_index = 7;
    let report = executor.execute(&plan).unwrap();

    assert!(!report.success);
    assert_eq!(report.phase_reached, Phase::Plan);
    assert!(report.errors.iter().any(|e| e.contains("out of range")));
    assert_eq!(fake.loads(), 0);
}
