//! Helpers shared by the device models.

use rand::{Rng, rngs::StdRng};

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Half-sine daylight shape for hour of day `hour`.
///
/// Zero outside `[sunrise, sunset)`, peaking at 1.0 halfway between.
pub fn daylight_fraction(hour: f64, sunrise: f64, sunset: f64) -> f64 {
    if sunset <= sunrise || hour < sunrise || hour >= sunset {
        return 0.0;
    }
    let x = (hour - sunrise) / (sunset - sunrise);
    (std::f64::consts::PI * x).sin().max(0.0)
}

/// Hour of day, in `[0, 24)`, at which timestep `t` starts.
pub fn hour_of_day(t: usize, seconds_per_timestep: u32) -> f64 {
    let seconds = (t as u64 * u64::from(seconds_per_timestep)) % 86_400;
    seconds as f64 / 3600.0
}
