//! Household device and controller models.

use crate::sim::connection::Capability;

pub mod battery;
pub mod battery_controller;
pub mod grid_meter;
/// Residential consumption profile.
pub mod load_profile;
/// Photovoltaic generation model.
pub mod photovoltaic;
pub mod types;

pub use battery::Battery;
pub use battery_controller::BatteryController;
pub use grid_meter::GridMeter;
pub use load_profile::LoadProfile;
pub use photovoltaic::PhotovoltaicArray;

/// Produces an electricity demand on `ElectricityOutput`.
pub const ELECTRICITY_CONSUMER: Capability = Capability::new("ElectricityConsumer");
/// Produces electricity on `ElectricityOutput`.
pub const ELECTRICITY_PRODUCER: Capability = Capability::new("ElectricityProducer");
/// Stationary storage reporting `AcBatteryPower` and `StateOfCharge`.
pub const BATTERY_STORAGE: Capability = Capability::new("BatteryStorage");
/// Issues a `BatterySetPoint`.
pub const BATTERY_DISPATCH: Capability = Capability::new("BatteryDispatch");
/// Reports the household `NetLoad` at the grid connection.
pub const GRID_METER: Capability = Capability::new("GridMeter");
