use chrono::NaiveDateTime;

use super::types::RunParameters;

/// One timestep of a run: its index and the instant it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub index: usize,
    pub timestamp: NaiveDateTime,
}

/// A simulation clock that walks the timesteps of a run in order.
///
/// # Examples
///
/// ```
/// use homesim::sim::clock::Clock;
/// use homesim::sim::types::RunParameters;
///
/// let params = RunParameters::one_day_only(2021, 8 * 3600).unwrap();
/// let mut clock = Clock::new(&params);
/// let mut steps = Vec::new();
///
/// clock.run(|tick| steps.push(tick.index));
/// assert_eq!(steps, vec![0, 1, 2]);
/// ```
pub struct Clock<'a> {
    params: &'a RunParameters,
    current: usize,
}

impl<'a> Clock<'a> {
    pub fn new(params: &'a RunParameters) -> Self {
        Self { params, current: 0 }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(tick)` - The step before advancing
    /// * `None` - If every timestep of the run was handed out
    pub fn tick(&mut self) -> Option<Tick> {
        if self.current < self.params.timesteps() {
            let index = self.current;
            self.current += 1;
            Some(Tick {
                index,
                timestamp: self.params.timestamp(index),
            })
        } else {
            None
        }
    }

    /// Fraction of the run handed out so far, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.current as f64 / self.params.timesteps() as f64
    }

    /// Runs a function for each remaining step.
    pub fn run(&mut self, mut f: impl FnMut(Tick)) {
        while let Some(tick) = self.tick() {
            f(tick);
        }
    }
}
