//! Run-level convergence diagnostics.

use std::fmt;
use std::time::Duration;

use super::solver::TimestepOutcome;

/// Iteration statistics accumulated over a run.
///
/// Forced timesteps are not errors, but many of them point at a wiring
/// whose feedback loops do not settle within the iteration cap.
#[derive(Debug, Clone, Default)]
pub struct RunDiagnostics {
    /// Normal passes per committed timestep.
    iterations: Vec<usize>,
    forced_timesteps: Vec<usize>,
    max_residual: f64,
    elapsed: Duration,
}

impl RunDiagnostics {
    pub fn with_capacity(timesteps: usize) -> Self {
        Self {
            iterations: Vec::with_capacity(timesteps),
            ..Self::default()
        }
    }

    /// Records the outcome of the next committed timestep.
    pub fn record(&mut self, timestep: usize, outcome: &TimestepOutcome) {
        self.iterations.push(outcome.iterations);
        if outcome.forced {
            self.forced_timesteps.push(timestep);
            if outcome.residual.is_finite() {
                self.max_residual = self.max_residual.max(outcome.residual);
            } else {
                self.max_residual = f64::INFINITY;
            }
        }
    }

    pub(crate) fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Number of committed timesteps.
    pub fn timesteps(&self) -> usize {
        self.iterations.len()
    }

    pub fn total_iterations(&self) -> usize {
        self.iterations.iter().sum()
    }

    pub fn average_iterations(&self) -> f64 {
        if self.iterations.is_empty() {
            return 0.0;
        }
        self.total_iterations() as f64 / self.iterations.len() as f64
    }

    pub fn max_iterations_in_step(&self) -> usize {
        self.iterations.iter().copied().max().unwrap_or(0)
    }

    /// Iterations used by one timestep.
    pub fn iterations_at(&self, timestep: usize) -> Option<usize> {
        self.iterations.get(timestep).copied()
    }

    pub fn forced_count(&self) -> usize {
        self.forced_timesteps.len()
    }

    /// Timesteps that ended in a forced pass, in order.
    pub fn forced_timesteps(&self) -> &[usize] {
        &self.forced_timesteps
    }

    /// Largest residual left behind by a forced timestep.
    pub fn max_forced_residual(&self) -> f64 {
        self.max_residual
    }

    /// Wall-clock time of the run.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl fmt::Display for RunDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Diagnostics ---")?;
        writeln!(f, "Timesteps:             {}", self.timesteps())?;
        writeln!(f, "Total iterations:      {}", self.total_iterations())?;
        writeln!(f, "Average iterations:    {:.2}", self.average_iterations())?;
        writeln!(f, "Max iterations (step): {}", self.max_iterations_in_step())?;
        writeln!(
            f,
            "Forced timesteps:      {} (max residual {:.3e})",
            self.forced_count(),
            self.max_residual
        )?;
        write!(f, "Elapsed:               {:.2?}", self.elapsed)
    }
}
