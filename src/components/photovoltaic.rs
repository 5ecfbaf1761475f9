use rand::{SeedableRng, rngs::StdRng};

use crate::error::{ConfigurationError, DomainError};
use crate::sim::component::{
    BaselineValues, Component, PortDeclarations, StepContext, registered,
};
use crate::sim::connection::Capability;
use crate::sim::port::{LoadType, OutputHandle, Unit};
use crate::sim::types::RunParameters;

use super::ELECTRICITY_PRODUCER;
use super::types::{daylight_fraction, gaussian_noise, hour_of_day};

/// A photovoltaic array with a half-sine generation profile between sunrise
/// and sunset.
///
/// Generation is reported as a non-negative power. The whole series is
/// generated in `prepare_simulation`, so stepping is a lookup.
#[derive(Debug, Clone)]
pub struct PhotovoltaicArray {
    name: String,

    /// Maximum output in watts under ideal conditions.
    pub peak_w: f64,

    /// Hour of day when generation starts (inclusive).
    pub sunrise_hour: f64,

    /// Hour of day when generation ends (exclusive).
    pub sunset_hour: f64,

    /// Standard deviation of the multiplicative noise (0.05 = +/-5%).
    pub noise_std: f64,

    seed: u64,
    timesteps: usize,
    seconds_per_timestep: u32,
    series: Vec<f64>,
    out: Option<OutputHandle>,
}

impl PhotovoltaicArray {
    /// Creates a new array.
    ///
    /// # Arguments
    ///
    /// * `name` - Component name
    /// * `peak_w` - Peak output in watts
    /// * `sunrise_hour` - Start of generation, hour of day
    /// * `sunset_hour` - End of generation, hour of day
    /// * `noise_std` - Relative noise standard deviation
    /// * `params` - Run the profile is generated for
    /// * `seed` - Random seed for reproducible noise
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidParameters`] unless
    /// `0 <= sunrise_hour < sunset_hour <= 24`.
    pub fn new(
        name: impl Into<String>,
        peak_w: f64,
        sunrise_hour: f64,
        sunset_hour: f64,
        noise_std: f64,
        params: &RunParameters,
        seed: u64,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if !(0.0..24.0).contains(&sunrise_hour) || sunset_hour <= sunrise_hour || sunset_hour > 24.0 {
            return Err(ConfigurationError::InvalidParameters(format!(
                "{name}: daylight window {sunrise_hour}..{sunset_hour} h is not within one day"
            )));
        }
        Ok(Self {
            name,
            peak_w: peak_w.max(0.0),
            sunrise_hour,
            sunset_hour,
            noise_std: noise_std.max(0.0),
            seed,
            timesteps: params.timesteps(),
            seconds_per_timestep: params.seconds_per_timestep(),
            series: Vec::new(),
            out: None,
        })
    }

    /// Preloaded generation series in watts.
    pub fn series(&self) -> &[f64] {
        &self.series
    }

    fn generate(&self) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.timesteps)
            .map(|t| {
                let hour = hour_of_day(t, self.seconds_per_timestep);
                let frac = daylight_fraction(hour, self.sunrise_hour, self.sunset_hour);
                if frac <= 0.0 {
                    return 0.0;
                }
                let noise_mult = 1.0 + gaussian_noise(&mut rng, self.noise_std);
                (self.peak_w * frac * noise_mult).clamp(0.0, self.peak_w)
            })
            .collect()
    }
}

impl Component for PhotovoltaicArray {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.out = Some(ports.add_output("ElectricityOutput", LoadType::Electricity, Unit::Watt)?);
        Ok(())
    }

    fn capabilities(&self) -> &[Capability] {
        &[ELECTRICITY_PRODUCER]
    }

    fn prepare_simulation(&mut self, _baseline: &mut BaselineValues<'_>) -> Result<(), DomainError> {
        self.series = self.generate();
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let out = registered(self.out, &self.name)?;
        let w = self.series.get(ctx.timestep()).copied().unwrap_or(0.0);
        ctx.set_output(out, w);
        Ok(())
    }
}
