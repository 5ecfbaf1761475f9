//! Timeline driver: runs a wired system through every timestep of a run.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::error::{ConfigurationError, SimError};

use super::clock::Clock;
use super::connection::System;
use super::diagnostics::RunDiagnostics;
use super::solver::{FixedPointSolver, SolverSettings};
use super::types::RunParameters;
use super::values::ResultMatrix;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Everything a completed run hands to postprocessing.
#[derive(Debug)]
pub struct SimulationOutput {
    pub results: ResultMatrix,
    pub diagnostics: RunDiagnostics,
    pub parameters: RunParameters,
    /// The system as it was after the last timestep, for port metadata.
    pub system: System,
}

/// A run that stopped on an error.
///
/// `partial` holds the timesteps committed before the failure. They are
/// kept for diagnosis only.
#[derive(Error, Debug)]
#[error("run aborted after {} committed timesteps: {error}", .partial.len())]
pub struct RunAborted {
    #[source]
    pub error: SimError,
    pub partial: ResultMatrix,
}

/// Owns one run: its parameters, the wired system and the solver.
///
/// # Examples
///
/// ```no_run
/// # use homesim::sim::{connection::System, engine::Simulator, solver::SolverSettings, types::RunParameters};
/// # fn go(system: System) -> Result<(), Box<dyn std::error::Error>> {
/// let params = RunParameters::one_day_only(2021, 900)?;
/// let output = Simulator::new(params, system, SolverSettings::default())?.run()?;
/// println!("{}", output.diagnostics);
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Simulator {
    params: RunParameters,
    system: System,
    solver: FixedPointSolver,
}

impl Simulator {
    /// Creates a simulator for one run.
    ///
    /// # Arguments
    ///
    /// * `params` - Simulated period and step length
    /// * `system` - Fully wired component set, consumed by the run
    /// * `settings` - Iteration cap, tolerance and convergence scope
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSolverSettings`] for bad settings.
    pub fn new(
        params: RunParameters,
        system: System,
        settings: SolverSettings,
    ) -> Result<Self, ConfigurationError> {
        let solver = FixedPointSolver::new(settings, &system)?;
        Ok(Self {
            params,
            system,
            solver,
        })
    }

    pub fn parameters(&self) -> &RunParameters {
        &self.params
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// Runs every timestep in order and collects the committed buffers.
    ///
    /// # Errors
    ///
    /// [`RunAborted`] on the first domain or state error, carrying the rows
    /// committed so far.
    pub fn run(mut self) -> Result<SimulationOutput, RunAborted> {
        let total = self.params.timesteps();
        let mut results = ResultMatrix::with_capacity(self.system.labels(), total);
        let mut diagnostics = RunDiagnostics::with_capacity(total);

        log::info!(
            "starting run: {} timesteps of {} s from {}",
            total,
            self.params.seconds_per_timestep(),
            self.params.start()
        );
        let started = Instant::now();
        let mut last_report = started;

        if let Err(error) = self.solver.prepare(&mut self.system) {
            return Err(RunAborted {
                error,
                partial: results,
            });
        }

        let mut clock = Clock::new(&self.params);
        while let Some(tick) = clock.tick() {
            let outcome = match self
                .solver
                .solve_timestep(&mut self.system, tick.index, &mut results)
            {
                Ok(outcome) => outcome,
                Err(error) => {
                    log::error!("run aborted at timestep {} ({}): {error}", tick.index, tick.timestamp);
                    return Err(RunAborted {
                        error,
                        partial: results,
                    });
                }
            };
            diagnostics.record(tick.index, &outcome);

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                last_report = Instant::now();
                let seconds = started.elapsed().as_secs_f64();
                log::info!(
                    "simulating {}: {:.1}% done, {:.0} steps/s, {:.2} iterations per step",
                    tick.timestamp,
                    clock.progress() * 100.0,
                    (tick.index + 1) as f64 / seconds,
                    diagnostics.average_iterations()
                );
            }
        }

        diagnostics.set_elapsed(started.elapsed());
        if diagnostics.forced_count() > 0 {
            log::warn!(
                "{} of {} timesteps needed a forced pass",
                diagnostics.forced_count(),
                diagnostics.timesteps()
            );
        }
        log::info!(
            "finished run in {:.2?}, {:.2} iterations per step on average",
            diagnostics.elapsed(),
            diagnostics.average_iterations()
        );

        Ok(SimulationOutput {
            results,
            diagnostics,
            parameters: self.params,
            system: self.system,
        })
    }
}
