//! Assembles the demonstration household from a scenario.

use crate::components::{Battery, BatteryController, GridMeter, LoadProfile, PhotovoltaicArray};
use crate::config::ScenarioConfig;
use crate::error::ConfigurationError;
use crate::sim::connection::{System, SystemBuilder};
use crate::sim::types::RunParameters;

/// Component names used by [`build_household`].
pub const LOAD: &str = "Occupancy";
pub const PHOTOVOLTAIC: &str = "PvSystem";
pub const CONTROLLER: &str = "BatteryController";
pub const BATTERY: &str = "Battery";
pub const METER: &str = "GridMeter";

/// Builds the household system for one run.
///
/// Components are added in the order load, PV, controller, battery, meter.
/// Mandatory inputs are wired through default connections. The meter's
/// optional battery input is connected explicitly when a battery exists.
///
/// # Errors
///
/// Any [`ConfigurationError`] from component construction or wiring.
pub fn build_household(
    config: &ScenarioConfig,
    params: &RunParameters,
) -> Result<System, ConfigurationError> {
    let seed = config.simulation.seed;
    let mut builder = SystemBuilder::new();

    let l = &config.load;
    builder.add(LoadProfile::new(
        LOAD,
        l.base_w,
        l.amp_w,
        l.phase_rad,
        l.noise_std_w,
        params,
        seed,
    ))?;

    let pv = &config.photovoltaic;
    builder.add(PhotovoltaicArray::new(
        PHOTOVOLTAIC,
        pv.peak_w,
        pv.sunrise_hour,
        pv.sunset_hour,
        pv.noise_std,
        params,
        seed.wrapping_add(1),
    )?)?;

    let battery = if config.battery.enabled {
        let c = &config.controller;
        builder.add(BatteryController::new(CONTROLLER, c.max_charge_w, c.max_discharge_w))?;
        Some(builder.add(Battery::new(BATTERY, config.battery.spec(), params)?)?)
    } else {
        None
    };

    let meter = builder.add(GridMeter::with_limits(
        METER,
        config.grid.max_import_w,
        config.grid.max_export_w,
        params,
    )?)?;
    if let Some(battery) = battery {
        builder.connect(meter, "BatteryPower", battery, "AcBatteryPower")?;
    }

    builder.build()
}
