//! Fixed-point timestep solver.
//!
//! One timestep moves through `Init -> Iterating -> {Converged | Forced} ->
//! Committed`. Every pass evaluates all components once, in registration
//! order, against the shared value buffer. Passes repeat until the buffer is
//! self-consistent within the tolerance, or until `max_iterations` passes
//! have run, after which one final forced pass is made.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, SimError, SimResult};
use crate::sim::component::{BaselineValues, PassMode, StepContext, ValueView};
use crate::sim::connection::System;
use crate::sim::port::ComponentId;
use crate::sim::state::StateManager;
use crate::sim::values::{ResultMatrix, ValueBuffer, abs_diff};

/// Default per-slot absolute tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;
/// Default number of normal passes before the forced pass.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Which values the convergence test compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceScope {
    /// Each input read during a pass against the final value of the slot
    /// it read. A pass whose reads all saw final values is self-consistent.
    #[default]
    ObservedReads,
    /// The whole buffer after a pass against the buffer before it.
    FullBuffer,
}

/// Iteration limits for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    /// Normal passes allowed per timestep before the forced pass.
    pub max_iterations: usize,
    /// Largest per-slot absolute change that still counts as converged.
    pub tolerance: f64,
    pub scope: ConvergenceScope,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            scope: ConvergenceScope::default(),
        }
    }
}

impl SolverSettings {
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidSolverSettings`] for a zero iteration cap
    /// or a negative or non-finite tolerance.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_iterations == 0 {
            return Err(ConfigurationError::InvalidSolverSettings(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigurationError::InvalidSolverSettings(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Where the solver is within the current timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverPhase {
    Init,
    Iterating,
    Converged,
    Forced,
    Committed,
}

/// Summary of one solved timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestepOutcome {
    /// Normal passes run. The forced pass is not counted.
    pub iterations: usize,
    pub forced: bool,
    /// Residual of the last normal pass.
    pub residual: f64,
}

/// Drives the iteration of one system, one timestep at a time.
#[derive(Debug)]
pub struct FixedPointSolver {
    settings: SolverSettings,
    phase: SolverPhase,
    states: StateManager,
    /// Last committed buffer, the starting point of the next timestep.
    committed: ValueBuffer,
    working: ValueBuffer,
    /// Buffer as it was before the current pass.
    previous: ValueBuffer,
    reads: Vec<(usize, f64)>,
}

impl FixedPointSolver {
    /// Creates a solver sized for `system`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSolverSettings`] for bad settings.
    pub fn new(settings: SolverSettings, system: &System) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        let slots = system.slot_count();
        Ok(Self {
            settings,
            phase: SolverPhase::Init,
            states: StateManager::new(system.component_count()),
            committed: ValueBuffer::new(slots),
            working: ValueBuffer::new(slots),
            previous: ValueBuffer::new(slots),
            reads: Vec::new(),
        })
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    /// Buffer committed by the last timestep (the baseline before timestep 0).
    pub fn committed_values(&self) -> &ValueBuffer {
        &self.committed
    }

    /// Runs every component's `prepare_simulation` and saves the baseline state.
    ///
    /// # Errors
    ///
    /// A [`SimError::Domain`] at timestep 0 if a component rejects its setup.
    pub fn prepare(&mut self, system: &mut System) -> SimResult<()> {
        for (index, component) in system.components.iter_mut().enumerate() {
            let mut baseline = BaselineValues::new(ComponentId(index), &mut self.committed);
            component
                .prepare_simulation(&mut baseline)
                .map_err(|source| SimError::Domain {
                    component: component.name().to_string(),
                    timestep: 0,
                    source,
                })?;
        }
        for (index, component) in system.components.iter_mut().enumerate() {
            self.states.save(ComponentId(index), component.as_mut());
        }
        self.phase = SolverPhase::Init;
        Ok(())
    }

    /// Solves and commits one timestep, appending its buffer to `results`.
    ///
    /// # Errors
    ///
    /// Any [`SimError::Domain`] or [`SimError::State`] raised by a component.
    pub fn solve_timestep(
        &mut self,
        system: &mut System,
        timestep: usize,
        results: &mut ResultMatrix,
    ) -> SimResult<TimestepOutcome> {
        self.phase = SolverPhase::Init;
        self.working.copy_from(&self.committed);

        let mut iterations = 0;
        let residual = loop {
            self.phase = SolverPhase::Iterating;
            self.run_pass(system, timestep, PassMode::Normal)?;
            iterations += 1;

            let residual = self.residual();
            if residual <= self.settings.tolerance && self.all_settled(system) {
                self.phase = SolverPhase::Converged;
                break residual;
            }
            if iterations >= self.settings.max_iterations {
                self.phase = SolverPhase::Forced;
                break residual;
            }
        };

        let forced = self.phase == SolverPhase::Forced;
        if forced {
            self.warn_forced(system, timestep, iterations);
            self.run_pass(system, timestep, PassMode::Forced)?;
        }

        self.commit(system, timestep, results)?;
        Ok(TimestepOutcome {
            iterations,
            forced,
            residual,
        })
    }

    fn run_pass(&mut self, system: &mut System, timestep: usize, mode: PassMode) -> SimResult<()> {
        self.previous.copy_from(&self.working);
        self.reads.clear();

        for (index, component) in system.components.iter_mut().enumerate() {
            let id = ComponentId(index);
            self.states
                .restore(id, component.as_mut(), None)
                .map_err(|source| SimError::State {
                    component: component.name().to_string(),
                    timestep,
                    source,
                })?;

            let mut ctx = StepContext::new(
                timestep,
                mode,
                id,
                &system.registry,
                &mut self.working,
                &mut self.reads,
            );
            component
                .simulate_step(&mut ctx)
                .map_err(|source| SimError::Domain {
                    component: component.name().to_string(),
                    timestep,
                    source,
                })?;
        }
        Ok(())
    }

    /// Largest inconsistency of the last pass. NaN anywhere is infinite.
    fn residual(&self) -> f64 {
        if self.working.as_slice().iter().any(|v| v.is_nan()) {
            return f64::INFINITY;
        }
        match self.settings.scope {
            ConvergenceScope::ObservedReads => self
                .reads
                .iter()
                .map(|(slot, seen)| abs_diff(self.working.get(*slot), *seen))
                .fold(0.0, f64::max),
            ConvergenceScope::FullBuffer => self.working.max_abs_diff(&self.previous),
        }
    }

    fn all_settled(&self, system: &System) -> bool {
        let view = ValueView::new(&system.registry, &self.working);
        system.components.iter().all(|c| c.is_settled(&view))
    }

    /// Slots that kept the last pass from converging.
    fn unsettled_slots(&self) -> Vec<usize> {
        let tolerance = self.settings.tolerance;
        let mut slots = match self.settings.scope {
            ConvergenceScope::ObservedReads => self
                .reads
                .iter()
                .filter(|(slot, seen)| abs_diff(self.working.get(*slot), *seen) > tolerance)
                .map(|(slot, _)| *slot)
                .collect(),
            ConvergenceScope::FullBuffer => self.working.differing_slots(&self.previous, tolerance),
        };
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    fn warn_forced(&self, system: &System, timestep: usize, iterations: usize) {
        let mut details = String::new();
        for slot in self.unsettled_slots() {
            if let Some(port) = system.registry.output(slot) {
                let _ = write!(
                    details,
                    "\n  {}: {} -> {}",
                    port.label(),
                    self.previous.get(slot),
                    self.working.get(slot)
                );
            }
        }
        let view = ValueView::new(&system.registry, &self.working);
        for component in system.components.iter().filter(|c| !c.is_settled(&view)) {
            let _ = write!(details, "\n  {} reports it has not settled", component.name());
        }
        log::warn!(
            "timestep {timestep}: no convergence after {iterations} iterations, forcing a final pass{details}"
        );
    }

    fn commit(&mut self, system: &mut System, timestep: usize, results: &mut ResultMatrix) -> SimResult<()> {
        for (index, component) in system.components.iter_mut().enumerate() {
            self.states.save(ComponentId(index), component.as_mut());
        }
        results.push(&self.working);
        self.committed.copy_from(&self.working);
        self.phase = SolverPhase::Committed;

        let view = ValueView::new(&system.registry, &self.committed);
        for component in &system.components {
            component
                .double_check(timestep, &view)
                .map_err(|source| SimError::Domain {
                    component: component.name().to_string(),
                    timestep,
                    source,
                })?;
        }
        Ok(())
    }
}
