//! TOML-based scenario configuration and preset definitions.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{NaiveDate, TimeDelta};
use serde::Deserialize;

use crate::components::battery::BatterySpec;
use crate::error::ConfigurationError;
use crate::sim::solver::{ConvergenceScope, SolverSettings};
use crate::sim::types::RunParameters;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulated period and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Fixed-point iteration limits.
    #[serde(default)]
    pub solver: SolverConfig,
    /// Household consumption profile.
    #[serde(default)]
    pub load: LoadConfig,
    /// Photovoltaic array parameters.
    #[serde(default)]
    pub photovoltaic: PhotovoltaicConfig,
    /// Battery storage parameters.
    #[serde(default)]
    pub battery: BatteryConfig,
    /// Battery controller limits.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Grid connection limits.
    #[serde(default)]
    pub grid: GridConfig,
}

/// Simulated period and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// First simulated day, `YYYY-MM-DD`.
    pub start_date: NaiveDate,
    /// Number of days to simulate (must be > 0).
    pub days: u32,
    /// Timestep length in seconds (must be > 0).
    pub seconds_per_timestep: u32,
    /// Master random seed.
    pub seed: u64,
    /// Postprocessing flags passed through to the results.
    pub postprocessing: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or_default(),
            days: 1,
            seconds_per_timestep: 900,
            seed: 42,
            postprocessing: Vec::new(),
        }
    }
}

/// Fixed-point iteration limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Normal passes per timestep before the forced pass.
    pub max_iterations: usize,
    /// Per-slot absolute tolerance.
    pub tolerance: f64,
    /// `"observed_reads"` or `"full_buffer"`.
    pub scope: ConvergenceScope,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let settings = SolverSettings::default();
        Self {
            max_iterations: settings.max_iterations,
            tolerance: settings.tolerance,
            scope: settings.scope,
        }
    }
}

/// Household consumption profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    /// Average consumption (W).
    pub base_w: f64,
    /// Sinusoidal amplitude (W).
    pub amp_w: f64,
    /// Phase offset (radians).
    pub phase_rad: f64,
    /// Gaussian noise standard deviation (W).
    pub noise_std_w: f64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            base_w: 800.0,
            amp_w: 500.0,
            phase_rad: 1.2,
            noise_std_w: 50.0,
        }
    }
}

/// Photovoltaic array parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhotovoltaicConfig {
    /// Peak generation (W).
    pub peak_w: f64,
    /// Start of generation, hour of day.
    pub sunrise_hour: f64,
    /// End of generation, hour of day.
    pub sunset_hour: f64,
    /// Relative noise standard deviation.
    pub noise_std: f64,
}

impl Default for PhotovoltaicConfig {
    fn default() -> Self {
        Self {
            peak_w: 5_000.0,
            sunrise_hour: 6.0,
            sunset_hour: 18.0,
            noise_std: 0.05,
        }
    }
}

/// Battery storage parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// Whether the household has a battery (and a controller for it).
    pub enabled: bool,
    /// Usable capacity (Wh).
    pub capacity_wh: f64,
    /// Initial state of charge (0.0–1.0).
    pub initial_soc: f64,
    /// Lowest allowed state of charge (0.0–1.0).
    pub soc_min: f64,
    /// Highest allowed state of charge (0.0–1.0).
    pub soc_max: f64,
    /// Maximum charging power (W).
    pub max_charge_w: f64,
    /// Maximum discharging power (W).
    pub max_discharge_w: f64,
    /// Charge efficiency (0.0–1.0).
    pub eta_charge: f64,
    /// Discharge efficiency (0.0–1.0).
    pub eta_discharge: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity_wh: 10_000.0,
            initial_soc: 0.5,
            soc_min: 0.1,
            soc_max: 0.95,
            max_charge_w: 5_000.0,
            max_discharge_w: 5_000.0,
            eta_charge: 0.95,
            eta_discharge: 0.95,
        }
    }
}

impl BatteryConfig {
    pub fn spec(&self) -> BatterySpec {
        BatterySpec {
            capacity_wh: self.capacity_wh,
            max_charge_w: self.max_charge_w,
            max_discharge_w: self.max_discharge_w,
            eta_charge: self.eta_charge,
            eta_discharge: self.eta_discharge,
            soc_min: self.soc_min,
            soc_max: self.soc_max,
            initial_soc: self.initial_soc,
        }
    }
}

/// Battery controller limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Largest charging setpoint (W).
    pub max_charge_w: f64,
    /// Largest discharging setpoint (W, positive magnitude).
    pub max_discharge_w: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_charge_w: 4_000.0,
            max_discharge_w: 4_000.0,
        }
    }
}

/// Grid connection limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Maximum import power (W).
    pub max_import_w: f64,
    /// Maximum export power (W, positive magnitude).
    pub max_export_w: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            max_import_w: 5_000.0,
            max_export_w: 4_000.0,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.days"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: one winter day at 15-minute resolution
    /// with PV and a battery.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the baseline household without battery and controller.
    pub fn no_battery() -> Self {
        Self {
            battery: BatteryConfig {
                enabled: false,
                ..BatteryConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns a one-week run at one-minute resolution.
    pub fn fine_resolution() -> Self {
        Self {
            simulation: SimulationConfig {
                days: 7,
                seconds_per_timestep: 60,
                ..SimulationConfig::default()
            },
            load: LoadConfig {
                noise_std_w: 120.0,
                ..LoadConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "no_battery", "fine_resolution"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "no_battery" => Ok(Self::no_battery()),
            "fine_resolution" => Ok(Self::fine_resolution()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;

        if s.days == 0 {
            errors.push(ConfigError::new("simulation.days", "must be > 0"));
        }
        if s.seconds_per_timestep == 0 {
            errors.push(ConfigError::new("simulation.seconds_per_timestep", "must be > 0"));
        } else if s.seconds_per_timestep > 86_400 {
            errors.push(ConfigError::new(
                "simulation.seconds_per_timestep",
                "must be at most one day (86400)",
            ));
        }

        let sol = &self.solver;
        if sol.max_iterations == 0 {
            errors.push(ConfigError::new("solver.max_iterations", "must be > 0"));
        }
        if !sol.tolerance.is_finite() || sol.tolerance < 0.0 {
            errors.push(ConfigError::new("solver.tolerance", "must be finite and >= 0"));
        }

        if self.load.noise_std_w < 0.0 {
            errors.push(ConfigError::new("load.noise_std_w", "must be >= 0"));
        }

        let pv = &self.photovoltaic;
        if pv.peak_w < 0.0 {
            errors.push(ConfigError::new("photovoltaic.peak_w", "must be >= 0"));
        }
        if !(0.0..24.0).contains(&pv.sunrise_hour) || pv.sunrise_hour >= pv.sunset_hour {
            errors.push(ConfigError::new(
                "photovoltaic.sunrise_hour",
                "must be in [0, 24) and < photovoltaic.sunset_hour",
            ));
        }
        if pv.sunset_hour > 24.0 {
            errors.push(ConfigError::new("photovoltaic.sunset_hour", "must be <= 24"));
        }

        let bat = &self.battery;
        if bat.enabled {
            if bat.capacity_wh <= 0.0 {
                errors.push(ConfigError::new("battery.capacity_wh", "must be > 0"));
            }
            if !(0.0..=1.0).contains(&bat.initial_soc) {
                errors.push(ConfigError::new("battery.initial_soc", "must be in [0.0, 1.0]"));
            } else if bat.initial_soc < bat.soc_min || bat.initial_soc > bat.soc_max {
                errors.push(ConfigError::new(
                    "battery.initial_soc",
                    "must be within [battery.soc_min, battery.soc_max]",
                ));
            }
            if !(0.0..=1.0).contains(&bat.soc_min) || !(0.0..=1.0).contains(&bat.soc_max) {
                errors.push(ConfigError::new("battery.soc_min", "SOC window must be within [0.0, 1.0]"));
            }
            for (field, eta) in [
                ("battery.eta_charge", bat.eta_charge),
                ("battery.eta_discharge", bat.eta_discharge),
            ] {
                if !(eta > 0.0 && eta <= 1.0) {
                    errors.push(ConfigError::new(field, "must be in (0.0, 1.0]"));
                }
            }
            if bat.max_charge_w < 0.0 || bat.max_discharge_w < 0.0 {
                errors.push(ConfigError::new("battery.max_charge_w", "power limits must be >= 0"));
            }
        }

        if self.grid.max_import_w < 0.0 || self.grid.max_export_w < 0.0 {
            errors.push(ConfigError::new("grid.max_import_w", "grid limits must be >= 0"));
        }

        errors
    }

    /// Run parameters for the configured period.
    ///
    /// # Errors
    ///
    /// Propagates [`RunParameters::new`] errors.
    pub fn to_run_parameters(&self) -> Result<RunParameters, ConfigurationError> {
        let s = &self.simulation;
        let start = s.start_date.and_hms_opt(0, 0, 0).ok_or_else(|| {
            ConfigurationError::InvalidParameters(format!("invalid start date {}", s.start_date))
        })?;
        let params = RunParameters::new(start, TimeDelta::days(i64::from(s.days)), s.seconds_per_timestep)?;
        Ok(s.postprocessing
            .iter()
            .fold(params, |p, flag| p.with_flag(flag.as_str())))
    }

    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            max_iterations: self.solver.max_iterations,
            tolerance: self.solver.tolerance,
            scope: self.solver.scope,
        }
    }
}
