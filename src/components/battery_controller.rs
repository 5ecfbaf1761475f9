use crate::error::{ConfigurationError, DomainError, StateError};
use crate::sim::component::{Component, PortDeclarations, StepContext, ValueView, registered};
use crate::sim::connection::{Capability, DefaultConnection};
use crate::sim::port::{InputHandle, LoadType, OutputHandle, Unit};
use crate::sim::state::{SnapshotToken, StateCell};

use super::{BATTERY_DISPATCH, BATTERY_STORAGE, GRID_METER};

#[derive(Debug, Clone, Copy)]
struct Ports {
    net_load: InputHandle,
    battery_power: InputHandle,
    setpoint: OutputHandle,
}

/// Self-consumption controller: steers the battery so that the household
/// draws nothing from, and feeds nothing into, the grid.
///
/// It reads the metered net load and the battery's actual power, both of
/// which depend on the setpoint it issued. This feedback loop is resolved by
/// the solver's iteration. In a forced pass the controller holds the
/// setpoint committed at the end of the previous timestep.
#[derive(Debug, Clone)]
pub struct BatteryController {
    name: String,
    /// Largest charging setpoint in watts.
    pub max_charge_w: f64,
    /// Largest discharging setpoint in watts (positive magnitude).
    pub max_discharge_w: f64,
    setpoint: StateCell<f64>,
    ports: Option<Ports>,
}

impl BatteryController {
    pub fn new(name: impl Into<String>, max_charge_w: f64, max_discharge_w: f64) -> Self {
        Self {
            name: name.into(),
            max_charge_w: max_charge_w.max(0.0),
            max_discharge_w: max_discharge_w.max(0.0),
            setpoint: StateCell::new(0.0),
            ports: None,
        }
    }

    /// Setpoint that brings the net load to zero, within the limits.
    ///
    /// `net_load` already contains `battery_power`, so the battery's share is
    /// added back before computing the new target.
    pub fn target(&self, net_load: f64, battery_power: f64) -> f64 {
        let household = net_load - battery_power;
        (-household).clamp(-self.max_discharge_w, self.max_charge_w)
    }
}

impl Component for BatteryController {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.ports = Some(Ports {
            net_load: ports.add_input("NetLoad", LoadType::Electricity, Unit::Watt, true)?,
            battery_power: ports.add_input("AcBatteryPower", LoadType::Electricity, Unit::Watt, true)?,
            setpoint: ports.add_output("BatterySetPoint", LoadType::Electricity, Unit::Watt)?,
        });
        Ok(())
    }

    fn capabilities(&self) -> &[Capability] {
        &[BATTERY_DISPATCH]
    }

    fn default_connections(&self) -> Vec<DefaultConnection> {
        vec![
            DefaultConnection::new("NetLoad", GRID_METER, "NetLoad"),
            DefaultConnection::new("AcBatteryPower", BATTERY_STORAGE, "AcBatteryPower"),
        ]
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let ports = registered(self.ports, &self.name)?;

        let setpoint = if ctx.is_forced() {
            // Keep the setpoint committed at the end of the previous timestep
            // rather than re-running the dispatch rule on unsettled inputs.
            self.setpoint
                .committed()
                .copied()
                .unwrap_or(0.0)
                .clamp(-self.max_discharge_w, self.max_charge_w)
        } else {
            let net_load = ctx.input(ports.net_load);
            let battery_power = ctx.input(ports.battery_power);
            self.target(net_load, battery_power)
        };

        self.setpoint.set(setpoint);
        ctx.set_output(ports.setpoint, setpoint);
        Ok(())
    }

    fn save_state(&mut self) -> SnapshotToken {
        self.setpoint.commit()
    }

    fn restore_state(&mut self, token: Option<SnapshotToken>) -> Result<(), StateError> {
        self.setpoint.rollback(token)
    }

    fn double_check(&self, _timestep: usize, values: &ValueView<'_>) -> Result<(), DomainError> {
        let Some(ports) = self.ports else {
            return Ok(());
        };
        let setpoint = values.output(ports.setpoint);
        if !setpoint.is_finite() {
            return Err(DomainError::out_of_range(
                format!("{} # BatterySetPoint", self.name),
                setpoint,
                "setpoint must be finite",
            ));
        }
        Ok(())
    }
}
