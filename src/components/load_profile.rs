use rand::{SeedableRng, rngs::StdRng};

use crate::error::{ConfigurationError, DomainError};
use crate::sim::component::{
    BaselineValues, Component, PortDeclarations, StepContext, registered,
};
use crate::sim::connection::Capability;
use crate::sim::port::{LoadType, OutputHandle, Unit};
use crate::sim::types::RunParameters;

use super::ELECTRICITY_CONSUMER;
use super::types::{gaussian_noise, hour_of_day};

/// Where the consumption series comes from.
#[derive(Debug, Clone)]
enum Profile {
    /// Sinusoidal daily pattern plus Gaussian noise, generated before the run.
    Synthetic {
        base_w: f64,
        amp_w: f64,
        phase_rad: f64,
        noise_std_w: f64,
        seed: u64,
    },
    /// Explicit per-timestep values, repeated if the run is longer.
    Values(Vec<f64>),
}

/// A household electricity demand, preloaded for the whole run.
///
/// # Examples
///
/// ```
/// use homesim::components::LoadProfile;
/// use homesim::sim::types::RunParameters;
///
/// let params = RunParameters::one_day_only(2021, 3600).unwrap();
/// let load = LoadProfile::new("Occupancy", 400.0, 200.0, 0.0, 20.0, &params, 42);
/// assert_eq!(load.timesteps(), 24);
/// ```
#[derive(Debug, Clone)]
pub struct LoadProfile {
    name: String,
    profile: Profile,
    timesteps: usize,
    seconds_per_timestep: u32,
    series: Vec<f64>,
    out: Option<OutputHandle>,
}

impl LoadProfile {
    /// Creates a synthetic daily load profile.
    ///
    /// # Arguments
    ///
    /// * `name` - Component name
    /// * `base_w` - Average consumption in watts
    /// * `amp_w` - Amplitude of the daily variation in watts
    /// * `phase_rad` - Phase offset (0 = rising through the mean at midnight)
    /// * `noise_std_w` - Standard deviation of the noise in watts
    /// * `params` - Run the profile is generated for
    /// * `seed` - Random seed for reproducible noise
    pub fn new(
        name: impl Into<String>,
        base_w: f64,
        amp_w: f64,
        phase_rad: f64,
        noise_std_w: f64,
        params: &RunParameters,
        seed: u64,
    ) -> Self {
        Self::with_profile(
            name.into(),
            Profile::Synthetic {
                base_w,
                amp_w,
                phase_rad,
                noise_std_w: noise_std_w.max(0.0),
                seed,
            },
            params,
        )
    }

    /// Creates a profile from explicit values in watts, one per timestep.
    pub fn from_values(name: impl Into<String>, values: Vec<f64>, params: &RunParameters) -> Self {
        Self::with_profile(name.into(), Profile::Values(values), params)
    }

    fn with_profile(name: String, profile: Profile, params: &RunParameters) -> Self {
        Self {
            name,
            profile,
            timesteps: params.timesteps(),
            seconds_per_timestep: params.seconds_per_timestep(),
            series: Vec::new(),
            out: None,
        }
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    /// The preloaded series, empty before `prepare_simulation`.
    pub fn series(&self) -> &[f64] {
        &self.series
    }

    fn generate(&self) -> Result<Vec<f64>, DomainError> {
        match &self.profile {
            Profile::Synthetic {
                base_w,
                amp_w,
                phase_rad,
                noise_std_w,
                seed,
            } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                let series = (0..self.timesteps)
                    .map(|t| {
                        let day_pos = hour_of_day(t, self.seconds_per_timestep) / 24.0;
                        let angle = 2.0 * std::f64::consts::PI * day_pos + phase_rad;
                        let w = base_w + amp_w * angle.sin() + gaussian_noise(&mut rng, *noise_std_w);
                        w.max(0.0) // no negative demand
                    })
                    .collect();
                Ok(series)
            }
            Profile::Values(values) => {
                if values.is_empty() {
                    return Err(DomainError::Invalid(format!("{}: empty load profile", self.name)));
                }
                if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
                    return Err(DomainError::out_of_range(
                        format!("{} # ElectricityOutput", self.name),
                        *bad,
                        "demand must be finite and non-negative",
                    ));
                }
                Ok((0..self.timesteps).map(|t| values[t % values.len()]).collect())
            }
        }
    }
}

impl Component for LoadProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.out = Some(ports.add_output("ElectricityOutput", LoadType::Electricity, Unit::Watt)?);
        Ok(())
    }

    fn capabilities(&self) -> &[Capability] {
        &[ELECTRICITY_CONSUMER]
    }

    fn prepare_simulation(&mut self, _baseline: &mut BaselineValues<'_>) -> Result<(), DomainError> {
        self.series = self.generate()?;
        log::debug!("{}: preloaded {} demand values", self.name, self.series.len());
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let out = registered(self.out, &self.name)?;
        let w = self.series.get(ctx.timestep()).copied().unwrap_or(0.0);
        ctx.set_output(out, w);
        Ok(())
    }
}
