use crate::error::{ConfigurationError, DomainError, StateError};
use crate::sim::component::{
    BaselineValues, Component, PortDeclarations, StepContext, ValueView, registered,
};
use crate::sim::connection::{Capability, DefaultConnection};
use crate::sim::port::{InputHandle, LoadType, OutputHandle, Unit};
use crate::sim::state::{SnapshotToken, StateCell};
use crate::sim::types::RunParameters;

use super::{BATTERY_DISPATCH, BATTERY_STORAGE};

/// Slack for floating-point rounding in the bounds checks.
const EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct Ports {
    setpoint: InputHandle,
    power: OutputHandle,
    soc: OutputHandle,
}

/// Battery parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySpec {
    /// Usable capacity in watt-hours (must be > 0).
    pub capacity_wh: f64,
    /// Maximum charging power in watts.
    pub max_charge_w: f64,
    /// Maximum discharging power in watts.
    pub max_discharge_w: f64,
    /// Charging efficiency (0..1.0].
    pub eta_charge: f64,
    /// Discharging efficiency (0..1.0].
    pub eta_discharge: f64,
    /// Lowest state of charge the battery discharges to, as a fraction.
    pub soc_min: f64,
    /// Highest state of charge the battery charges to, as a fraction.
    pub soc_max: f64,
    /// State of charge at the start of the run, as a fraction.
    pub initial_soc: f64,
}

/// A stationary battery that follows a power setpoint.
///
/// # Power Flow Convention
/// - Positive power: charging (consumes from the household bus)
/// - Negative power: discharging (supplies the household bus)
///
/// The setpoint is clamped to the power limits and to the energy left in the
/// `[soc_min, soc_max]` window this step. The state of charge lives in a
/// [`StateCell`], so trial passes never leak into the committed state.
#[derive(Debug, Clone)]
pub struct Battery {
    name: String,
    spec: BatterySpec,
    dt_hours: f64,
    soc: StateCell<f64>,
    ports: Option<Ports>,
}

impl Battery {
    /// Creates a new battery.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidParameters`] for a non-positive capacity,
    /// negative power limits, efficiencies outside `(0, 1]`, or an SOC window
    /// that does not contain the initial SOC.
    pub fn new(
        name: impl Into<String>,
        spec: BatterySpec,
        params: &RunParameters,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let invalid = |what: &str| ConfigurationError::InvalidParameters(format!("{name}: {what}"));

        if spec.capacity_wh <= 0.0 {
            return Err(invalid("capacity must be > 0"));
        }
        if spec.max_charge_w < 0.0 || spec.max_discharge_w < 0.0 {
            return Err(invalid("power limits must be >= 0"));
        }
        if !(spec.eta_charge > 0.0 && spec.eta_charge <= 1.0)
            || !(spec.eta_discharge > 0.0 && spec.eta_discharge <= 1.0)
        {
            return Err(invalid("efficiencies must be in (0, 1]"));
        }
        if !(0.0 <= spec.soc_min
            && spec.soc_min <= spec.initial_soc
            && spec.initial_soc <= spec.soc_max
            && spec.soc_max <= 1.0)
        {
            return Err(invalid("expected 0 <= soc_min <= initial_soc <= soc_max <= 1"));
        }

        Ok(Self {
            name,
            spec,
            dt_hours: params.dt_hours(),
            soc: StateCell::new(spec.initial_soc),
            ports: None,
        })
    }

    pub fn spec(&self) -> &BatterySpec {
        &self.spec
    }

    /// Working state of charge as a fraction.
    pub fn soc(&self) -> f64 {
        *self.soc.get()
    }

    /// Applies a setpoint to the working state and returns the actual power.
    fn apply(&mut self, setpoint_w: f64) -> f64 {
        let s = self.spec;
        let soc = *self.soc.get();

        if setpoint_w > 0.0 {
            let headroom_wh = ((s.soc_max - soc) * s.capacity_wh / s.eta_charge).max(0.0);
            let actual = setpoint_w
                .min(s.max_charge_w)
                .min(headroom_wh / self.dt_hours);
            let next = soc + actual * self.dt_hours * s.eta_charge / s.capacity_wh;
            self.soc.set(next.clamp(s.soc_min, s.soc_max));
            actual
        } else if setpoint_w < 0.0 {
            let available_wh = ((soc - s.soc_min) * s.capacity_wh * s.eta_discharge).max(0.0);
            let actual = (-setpoint_w)
                .min(s.max_discharge_w)
                .min(available_wh / self.dt_hours);
            let next = soc - actual * self.dt_hours / (s.capacity_wh * s.eta_discharge);
            self.soc.set(next.clamp(s.soc_min, s.soc_max));
            -actual
        } else {
            0.0
        }
    }
}

impl Component for Battery {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.ports = Some(Ports {
            setpoint: ports.add_input("SetPoint", LoadType::Electricity, Unit::Watt, true)?,
            power: ports.add_output("AcBatteryPower", LoadType::Electricity, Unit::Watt)?,
            soc: ports.add_output("StateOfCharge", LoadType::Any, Unit::Percent)?,
        });
        Ok(())
    }

    fn capabilities(&self) -> &[Capability] {
        &[BATTERY_STORAGE]
    }

    fn default_connections(&self) -> Vec<DefaultConnection> {
        vec![DefaultConnection::new("SetPoint", BATTERY_DISPATCH, "BatterySetPoint")]
    }

    fn prepare_simulation(&mut self, baseline: &mut BaselineValues<'_>) -> Result<(), DomainError> {
        let ports = registered(self.ports, &self.name)?;
        baseline.set_output(ports.soc, self.soc() * 100.0);
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let ports = registered(self.ports, &self.name)?;
        let setpoint = ctx.input(ports.setpoint);
        if !setpoint.is_finite() {
            return Err(DomainError::out_of_range(
                format!("{} # SetPoint", self.name),
                setpoint,
                "setpoint must be finite",
            ));
        }

        let actual = self.apply(setpoint);
        ctx.set_output(ports.power, actual);
        ctx.set_output(ports.soc, self.soc() * 100.0);
        Ok(())
    }

    fn save_state(&mut self) -> SnapshotToken {
        self.soc.commit()
    }

    fn restore_state(&mut self, token: Option<SnapshotToken>) -> Result<(), StateError> {
        self.soc.rollback(token)
    }

    fn double_check(&self, _timestep: usize, values: &ValueView<'_>) -> Result<(), DomainError> {
        let Some(ports) = self.ports else {
            return Ok(());
        };
        let soc_pct = values.output(ports.soc);
        if !(self.spec.soc_min * 100.0 - EPS..=self.spec.soc_max * 100.0 + EPS).contains(&soc_pct) {
            return Err(DomainError::out_of_range(
                format!("{} # StateOfCharge", self.name),
                soc_pct,
                "outside the configured SOC window",
            ));
        }
        let power = values.output(ports.power);
        if power > self.spec.max_charge_w + EPS || power < -self.spec.max_discharge_w - EPS {
            return Err(DomainError::out_of_range(
                format!("{} # AcBatteryPower", self.name),
                power,
                "beyond the power limits",
            ));
        }
        Ok(())
    }
}
