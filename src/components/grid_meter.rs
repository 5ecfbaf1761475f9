use crate::error::{ConfigurationError, DomainError, StateError};
use crate::sim::component::{Component, PortDeclarations, StepContext, ValueView, registered};
use crate::sim::connection::{Capability, DefaultConnection};
use crate::sim::port::{InputHandle, LoadType, OutputHandle, Unit};
use crate::sim::state::{SnapshotToken, StateCell};
use crate::sim::types::RunParameters;

use super::{ELECTRICITY_CONSUMER, ELECTRICITY_PRODUCER, GRID_METER};

#[derive(Debug, Clone, Copy)]
struct Ports {
    consumption: InputHandle,
    production: InputHandle,
    battery: InputHandle,
    import: OutputHandle,
    export: OutputHandle,
    net_load: OutputHandle,
    cumulative_import: OutputHandle,
}

/// Meter at the grid connection of the household.
///
/// Net load convention:
/// - Positive values are drawn from the grid (import)
/// - Negative values are fed into the grid (export)
///
/// The battery input is optional. An unconnected battery counts as idle.
#[derive(Debug, Clone)]
pub struct GridMeter {
    name: String,
    max_import_w: f64,
    max_export_w: f64,
    dt_hours: f64,
    /// Energy imported since the start of the run, in Wh.
    imported_wh: StateCell<f64>,
    ports: Option<Ports>,
}

impl GridMeter {
    /// Creates a meter without connection limits.
    pub fn new(name: impl Into<String>, params: &RunParameters) -> Self {
        Self {
            name: name.into(),
            max_import_w: f64::INFINITY,
            max_export_w: f64::INFINITY,
            dt_hours: params.dt_hours(),
            imported_wh: StateCell::new(0.0),
            ports: None,
        }
    }

    /// Creates a meter that warns when the connection limits are exceeded.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidParameters`] if either limit is negative.
    pub fn with_limits(
        name: impl Into<String>,
        max_import_w: f64,
        max_export_w: f64,
        params: &RunParameters,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if max_import_w < 0.0 || max_export_w < 0.0 {
            return Err(ConfigurationError::InvalidParameters(format!(
                "{name}: grid limits must be >= 0"
            )));
        }
        Ok(Self {
            max_import_w,
            max_export_w,
            ..Self::new(name, params)
        })
    }

    pub fn max_import_w(&self) -> f64 {
        self.max_import_w
    }

    pub fn max_export_w(&self) -> f64 {
        self.max_export_w
    }

    /// Returns `true` when `net_w` is within the import/export limits.
    pub fn within_limits(&self, net_w: f64) -> bool {
        net_w >= -self.max_export_w && net_w <= self.max_import_w
    }
}

impl Component for GridMeter {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        let e = LoadType::Electricity;
        self.ports = Some(Ports {
            consumption: ports.add_input("ElectricityConsumption", e, Unit::Watt, true)?,
            production: ports.add_input("ElectricityProduction", e, Unit::Watt, true)?,
            battery: ports.add_input("BatteryPower", e, Unit::Watt, false)?,
            import: ports.add_output("GridImport", e, Unit::Watt)?,
            export: ports.add_output("GridExport", e, Unit::Watt)?,
            net_load: ports.add_output("NetLoad", e, Unit::Watt)?,
            cumulative_import: ports.add_output("CumulativeImport", e, Unit::WattHour)?,
        });
        Ok(())
    }

    fn capabilities(&self) -> &[Capability] {
        &[GRID_METER]
    }

    fn default_connections(&self) -> Vec<DefaultConnection> {
        vec![
            DefaultConnection::new("ElectricityConsumption", ELECTRICITY_CONSUMER, "ElectricityOutput"),
            DefaultConnection::new("ElectricityProduction", ELECTRICITY_PRODUCER, "ElectricityOutput"),
        ]
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let ports = registered(self.ports, &self.name)?;
        let consumption = ctx.input(ports.consumption);
        let production = ctx.input(ports.production);
        let battery = ctx.input(ports.battery);

        let net = consumption - production + battery;
        let import = net.max(0.0);
        let export = (-net).max(0.0);
        *self.imported_wh.get_mut() += import * self.dt_hours;

        ctx.set_output(ports.import, import);
        ctx.set_output(ports.export, export);
        ctx.set_output(ports.net_load, net);
        ctx.set_output(ports.cumulative_import, *self.imported_wh.get());
        Ok(())
    }

    fn save_state(&mut self) -> SnapshotToken {
        self.imported_wh.commit()
    }

    fn restore_state(&mut self, token: Option<SnapshotToken>) -> Result<(), StateError> {
        self.imported_wh.rollback(token)
    }

    fn double_check(&self, timestep: usize, values: &ValueView<'_>) -> Result<(), DomainError> {
        let Some(ports) = self.ports else {
            return Ok(());
        };
        for (port, handle) in [("GridImport", ports.import), ("GridExport", ports.export)] {
            let w = values.output(handle);
            if !(w >= 0.0) {
                return Err(DomainError::out_of_range(
                    format!("{} # {port}", self.name),
                    w,
                    "metered power must be non-negative",
                ));
            }
        }

        let net = values.output(ports.net_load);
        if !self.within_limits(net) {
            log::warn!(
                "{}: net load {net:.1} W at timestep {timestep} is outside the grid limits (import {} W, export {} W)",
                self.name,
                self.max_import_w,
                self.max_export_w
            );
        }
        Ok(())
    }
}
