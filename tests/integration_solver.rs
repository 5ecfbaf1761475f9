//! Integration tests for the fixed-point timestep solver and the timeline driver.

mod common;

use approx::assert_abs_diff_eq;

use homesim::error::{DomainError, SimError};
use homesim::sim::connection::{System, SystemBuilder};
use homesim::sim::engine::{SimulationOutput, Simulator};
use homesim::sim::solver::{ConvergenceScope, SolverSettings};
use homesim::sim::types::RunParameters;

fn run(system: System, params: RunParameters, settings: SolverSettings) -> SimulationOutput {
    Simulator::new(params, system, settings).unwrap().run().unwrap()
}

/// A constant 10.0 feeding B = 0.5 * A.
fn acyclic_pair() -> System {
    let mut b = SystemBuilder::new();
    let a = b.add(common::Constant::new("A", 10.0)).unwrap();
    let g = b.add(common::Gain::new("B", 0.5, 0.0)).unwrap();
    b.connect(g, "In", a, "Out").unwrap();
    b.build().unwrap()
}

/// `A = r * B + c`, `B = A`, fixed point `c / (1 - r)`.
fn contraction(r: f64, c: f64) -> System {
    let mut b = SystemBuilder::new();
    let a = b.add(common::Gain::new("A", r, c)).unwrap();
    let m = b.add(common::Gain::new("B", 1.0, 0.0)).unwrap();
    b.connect(a, "In", m, "Out").unwrap();
    b.connect(m, "In", a, "Out").unwrap();
    b.build().unwrap()
}

fn oscillator() -> System {
    let mut b = SystemBuilder::new();
    let inv = b.add(common::Inverter::new()).unwrap();
    let relay = b.add(common::Relay::new("Relay")).unwrap();
    b.connect(inv, "In", relay, "Out").unwrap();
    b.connect(relay, "In", inv, "Out").unwrap();
    b.build().unwrap()
}

#[test]
fn acyclic_pair_converges_in_one_iteration() {
    let output = run(
        acyclic_pair(),
        RunParameters::one_day_only(2021, 86_400).unwrap(),
        SolverSettings::default(),
    );
    let slot = output.system.output_slot("B", "Out").unwrap();
    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results.value(0, slot), Some(5.0));
    assert_eq!(output.diagnostics.iterations_at(0), Some(1));
    assert_eq!(output.diagnostics.forced_count(), 0);
}

#[test]
fn acyclic_chain_needs_one_iteration_every_timestep() {
    let mut b = SystemBuilder::new();
    let a = b.add(common::Constant::new("A", 3.0)).unwrap();
    let g1 = b.add(common::Gain::new("B", 2.0, 1.0)).unwrap();
    let g2 = b.add(common::Gain::new("C", -1.0, 0.0)).unwrap();
    b.connect(g1, "In", a, "Out").unwrap();
    b.connect(g2, "In", g1, "Out").unwrap();

    let output = run(b.build().unwrap(), common::hourly_day(), SolverSettings::default());
    assert_eq!(output.diagnostics.timesteps(), 24);
    assert_eq!(output.diagnostics.total_iterations(), 24);
    assert_eq!(output.diagnostics.max_iterations_in_step(), 1);

    let c = output.results.slot_of("C # Out [-]").unwrap();
    assert_eq!(output.system.output_slot("C", "Out"), Some(c));
    let column = output.results.column(c).unwrap();
    assert!(column.iter().all(|v| *v == -7.0));
}

#[test]
fn contraction_converges_within_log_bound() {
    let (r, tolerance) = (0.5_f64, 1e-6_f64);
    let bound = (tolerance.ln() / r.ln()).ceil() as usize + 2;

    for cap in [100, 1_000] {
        let settings = SolverSettings {
            max_iterations: cap,
            tolerance,
            ..SolverSettings::default()
        };
        let output = run(
            contraction(r, 1.0),
            RunParameters::one_day_only(2021, 86_400).unwrap(),
            settings,
        );
        let iterations = output.diagnostics.iterations_at(0).unwrap();
        assert!(iterations <= bound, "{iterations} iterations exceed {bound} (cap {cap})");
        assert_eq!(output.diagnostics.forced_count(), 0);

        let slot = output.system.output_slot("A", "Out").unwrap();
        assert_abs_diff_eq!(output.results.value(0, slot).unwrap(), 2.0, epsilon = 1e-5);
    }
}

#[test]
fn iteration_count_does_not_depend_on_cap() {
    let counts: Vec<_> = [50, 500]
        .into_iter()
        .map(|cap| {
            let settings = SolverSettings {
                max_iterations: cap,
                tolerance: 1e-8,
                ..SolverSettings::default()
            };
            run(contraction(0.3, 5.0), RunParameters::one_day_only(2021, 86_400).unwrap(), settings)
                .diagnostics
                .iterations_at(0)
        })
        .collect();
    assert_eq!(counts[0], counts[1]);
}

#[test]
fn warm_start_converges_faster_on_later_timesteps() {
    let settings = SolverSettings {
        max_iterations: 100,
        tolerance: 1e-6,
        ..SolverSettings::default()
    };
    let output = run(contraction(0.5, 1.0), common::hourly_day(), settings);
    let first = output.diagnostics.iterations_at(0).unwrap();
    let second = output.diagnostics.iterations_at(1).unwrap();
    assert!(second < first, "warm start: {second} should be < {first}");
}

fn feedback_pair() -> System {
    let mut b = SystemBuilder::new();
    let ctrl = b.add(common::ProportionalController::new(1_000.0)).unwrap();
    let dev = b.add(common::FollowingDevice::new(100.0)).unwrap();
    b.connect(ctrl, "Feedback", dev, "Feedback").unwrap();
    b.connect(dev, "Target", ctrl, "Target").unwrap();
    b.build().unwrap()
}

#[test]
fn feedback_pair_converges_in_fewer_than_ten_iterations() {
    // Residual after pass k is 10 * 0.9^(k-1): a 5 W tolerance is met at
    // pass 8, within the default cap of 10.
    let settings = SolverSettings {
        tolerance: 5.0,
        ..SolverSettings::default()
    };
    let output = run(feedback_pair(), RunParameters::one_day_only(2021, 86_400).unwrap(), settings);

    let iterations = output.diagnostics.iterations_at(0).unwrap();
    assert_eq!(iterations, 8);
    assert_eq!(output.diagnostics.forced_count(), 0);

    let target = output.system.output_slot("Controller", "Target").unwrap();
    let feedback = output.system.output_slot("Device", "Feedback").unwrap();
    let t = output.results.value(0, target).unwrap();
    let f = output.results.value(0, feedback).unwrap();
    // fixed point of x -> 0.9 x within tolerance
    assert!((f * 0.9 - t).abs() <= 5.0);
    assert!(t < 100.0);
}

#[test]
fn feedback_pair_at_default_tolerance_needs_more_than_the_default_cap() {
    let tolerance = SolverSettings::default().tolerance;
    let bound = ((tolerance / 10.0).ln() / 0.9_f64.ln()).ceil() as usize + 2;

    let uncapped = SolverSettings {
        max_iterations: 1_000,
        ..SolverSettings::default()
    };
    let output = run(feedback_pair(), RunParameters::one_day_only(2021, 86_400).unwrap(), uncapped);
    let iterations = output.diagnostics.iterations_at(0).unwrap();
    assert!(iterations > 10 && iterations <= bound, "took {iterations} iterations");
    assert_eq!(output.diagnostics.forced_count(), 0);

    let capped = run(
        feedback_pair(),
        RunParameters::one_day_only(2021, 86_400).unwrap(),
        SolverSettings::default(),
    );
    assert_eq!(capped.diagnostics.forced_count(), 1);
    assert_eq!(capped.diagnostics.iterations_at(0), Some(10));
}

#[test]
fn own_previous_output_counts_towards_convergence() {
    let mut results = Vec::new();
    for scope in [ConvergenceScope::ObservedReads, ConvergenceScope::FullBuffer] {
        let mut b = SystemBuilder::new();
        b.add(common::Relaxing::new(100.0)).unwrap();
        let settings = SolverSettings {
            max_iterations: 100,
            scope,
            ..SolverSettings::default()
        };
        let output = run(b.build().unwrap(), RunParameters::one_day_only(2021, 86_400).unwrap(), settings);
        let slot = output.system.output_slot("Relaxing", "Out").unwrap();
        let iterations = output.diagnostics.iterations_at(0).unwrap();
        let value = output.results.value(0, slot).unwrap();

        assert!(iterations > 1, "{scope:?} stopped after one pass at {value}");
        assert_eq!(output.diagnostics.forced_count(), 0);
        assert_abs_diff_eq!(value, 100.0, epsilon = 1e-3);
        results.push((iterations, value.to_bits()));
    }
    assert_eq!(results[0], results[1]);
}

#[test]
fn oscillation_is_forced_and_run_completes() {
    let params = common::hourly_day();
    let output = run(oscillator(), params, SolverSettings::default());

    assert_eq!(output.results.len(), 24);
    assert_eq!(output.diagnostics.forced_count(), 24);
    assert_eq!(output.diagnostics.forced_timesteps().len(), 24);
    // normal passes only
    assert_eq!(output.diagnostics.iterations_at(0), Some(10));

    let inverter = output.system.output_slot("Inverter", "Out").unwrap();
    let relay = output.system.output_slot("Relay", "Out").unwrap();
    for row in output.results.rows() {
        assert!(row[inverter] == 0.0 || row[inverter] == 1.0);
        assert_eq!(row[inverter], row[relay]);
    }
}

#[test]
fn forced_pass_respects_iteration_cap() {
    let settings = SolverSettings {
        max_iterations: 3,
        ..SolverSettings::default()
    };
    let output = run(oscillator(), common::hourly_day(), settings);
    assert_eq!(output.diagnostics.max_iterations_in_step(), 3);
    assert_eq!(output.diagnostics.total_iterations(), 3 * 24);
}

#[test]
fn full_buffer_scope_also_converges() {
    let settings = SolverSettings {
        max_iterations: 100,
        tolerance: 1e-6,
        scope: ConvergenceScope::FullBuffer,
    };
    let output = run(contraction(0.5, 1.0), RunParameters::one_day_only(2021, 86_400).unwrap(), settings);
    assert_eq!(output.diagnostics.forced_count(), 0);
    let slot = output.system.output_slot("B", "Out").unwrap();
    assert_abs_diff_eq!(output.results.value(0, slot).unwrap(), 2.0, epsilon = 1e-5);
}

#[test]
fn state_is_rolled_back_between_passes() {
    let mut b = SystemBuilder::new();
    b.add(common::StepCounter::new()).unwrap();
    let inv = b.add(common::Inverter::new()).unwrap();
    let relay = b.add(common::Relay::new("Relay")).unwrap();
    b.connect(inv, "In", relay, "Out").unwrap();
    b.connect(relay, "In", inv, "Out").unwrap();

    // every timestep runs 10 normal passes plus a forced one
    let output = run(b.build().unwrap(), common::hourly_day(), SolverSettings::default());
    let slot = output.system.output_slot("StepCounter", "Count").unwrap();
    let counts = output.results.column(slot).unwrap();
    let expected: Vec<f64> = (1..=24).map(f64::from).collect();
    assert_eq!(counts, expected);
}

#[test]
fn identical_runs_are_bit_identical() {
    let settings = SolverSettings {
        max_iterations: 100,
        tolerance: 1e-9,
        ..SolverSettings::default()
    };
    let a = run(contraction(0.7, 0.3), common::hourly_day(), settings);
    let b = run(contraction(0.7, 0.3), common::hourly_day(), settings);
    assert_eq!(a.results.labels(), b.results.labels());
    for (ra, rb) in a.results.rows().zip(b.results.rows()) {
        let bits_a: Vec<u64> = ra.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u64> = rb.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }
}

#[test]
fn domain_error_aborts_with_partial_results() {
    let mut b = SystemBuilder::new();
    b.add(common::Constant::new("A", 1.0)).unwrap();
    b.add(common::FailingAt::new(5)).unwrap();
    let simulator = Simulator::new(common::hourly_day(), b.build().unwrap(), SolverSettings::default()).unwrap();

    let aborted = simulator.run().unwrap_err();
    assert_eq!(aborted.partial.len(), 5);
    match &aborted.error {
        SimError::Domain {
            component,
            timestep,
            source,
        } => {
            assert_eq!(component, "Faulty");
            assert_eq!(*timestep, 5);
            assert!(matches!(source, DomainError::OutOfRange { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = aborted.to_string();
    assert!(message.contains("after 5 committed timesteps"));
}

#[test]
fn invalid_settings_are_rejected_up_front() {
    let settings = SolverSettings {
        tolerance: f64::NAN,
        ..SolverSettings::default()
    };
    assert!(Simulator::new(common::hourly_day(), acyclic_pair(), settings).is_err());
}
