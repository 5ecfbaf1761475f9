//! Run parameters: simulated period, step length and postprocessing flags.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::error::ConfigurationError;

/// Immutable configuration of one run.
///
/// # Examples
///
/// ```
/// use homesim::sim::types::RunParameters;
///
/// let params = RunParameters::one_day_only(2021, 900).unwrap();
/// assert_eq!(params.timesteps(), 96);
/// assert_eq!(params.dt_hours(), 0.25);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
    start: NaiveDateTime,
    duration: TimeDelta,
    seconds_per_timestep: u32,
    timesteps: usize,
    flags: BTreeSet<String>,
}

impl RunParameters {
    /// Creates run parameters covering `duration` from `start`.
    ///
    /// The number of timesteps is `duration / seconds_per_timestep`, rounded
    /// down.
    ///
    /// # Arguments
    ///
    /// * `start` - Instant of timestep 0
    /// * `duration` - Simulated period
    /// * `seconds_per_timestep` - Step length in seconds (must be > 0)
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidParameters`] for a zero step length or a
    /// duration shorter than one step.
    pub fn new(
        start: NaiveDateTime,
        duration: TimeDelta,
        seconds_per_timestep: u32,
    ) -> Result<Self, ConfigurationError> {
        if seconds_per_timestep == 0 {
            return Err(ConfigurationError::InvalidParameters(
                "seconds_per_timestep must be > 0".to_string(),
            ));
        }
        let total_seconds = duration.num_seconds();
        if total_seconds < i64::from(seconds_per_timestep) {
            return Err(ConfigurationError::InvalidParameters(format!(
                "duration of {total_seconds} s is shorter than one timestep of {seconds_per_timestep} s"
            )));
        }
        let timesteps = (total_seconds / i64::from(seconds_per_timestep)) as usize;
        Ok(Self {
            start,
            duration,
            seconds_per_timestep,
            timesteps,
            flags: BTreeSet::new(),
        })
    }

    /// Period between two midnights of `year`, inclusive start, exclusive end.
    fn between(
        year: i32,
        from: (u32, u32),
        to: (i32, u32, u32),
        seconds_per_timestep: u32,
    ) -> Result<Self, ConfigurationError> {
        let start = midnight(year, from.0, from.1)?;
        let end = midnight(to.0, to.1, to.2)?;
        Self::new(start, end - start, seconds_per_timestep)
    }

    /// January 1st of `year` to January 1st of the next year.
    ///
    /// # Errors
    ///
    /// See [`RunParameters::new`].
    pub fn full_year(year: i32, seconds_per_timestep: u32) -> Result<Self, ConfigurationError> {
        Self::between(year, (1, 1), (year + 1, 1, 1), seconds_per_timestep)
    }

    /// January 1st to January 31st.
    ///
    /// # Errors
    ///
    /// See [`RunParameters::new`].
    pub fn january_only(year: i32, seconds_per_timestep: u32) -> Result<Self, ConfigurationError> {
        Self::between(year, (1, 1), (year, 1, 31), seconds_per_timestep)
    }

    /// The first seven days of `year`.
    ///
    /// # Errors
    ///
    /// See [`RunParameters::new`].
    pub fn one_week_only(year: i32, seconds_per_timestep: u32) -> Result<Self, ConfigurationError> {
        Self::between(year, (1, 1), (year, 1, 8), seconds_per_timestep)
    }

    /// January 1st of `year`.
    ///
    /// # Errors
    ///
    /// See [`RunParameters::new`].
    pub fn one_day_only(year: i32, seconds_per_timestep: u32) -> Result<Self, ConfigurationError> {
        Self::between(year, (1, 1), (year, 1, 2), seconds_per_timestep)
    }

    /// Adds a named postprocessing flag.
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    /// Postprocessing flags, in sorted order. Not interpreted by the engine.
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(String::as_str)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    /// Instant just after the last simulated timestep.
    pub fn end(&self) -> NaiveDateTime {
        self.start + self.duration
    }

    pub fn seconds_per_timestep(&self) -> u32 {
        self.seconds_per_timestep
    }

    /// Step length in hours.
    pub fn dt_hours(&self) -> f64 {
        f64::from(self.seconds_per_timestep) / 3600.0
    }

    /// Number of timesteps in the run.
    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    /// Timesteps per day, rounded down (at least 1).
    pub fn steps_per_day(&self) -> usize {
        (86_400 / self.seconds_per_timestep as usize).max(1)
    }

    /// Instant at which `step` starts.
    pub fn timestamp(&self, step: usize) -> NaiveDateTime {
        self.start + TimeDelta::seconds(step as i64 * i64::from(self.seconds_per_timestep))
    }
}

fn midnight(year: i32, month: u32, day: u32) -> Result<NaiveDateTime, ConfigurationError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ConfigurationError::InvalidParameters(format!("invalid date {year}-{month}-{day}")))
}
