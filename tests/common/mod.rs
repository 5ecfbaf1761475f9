//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use homesim::error::{ConfigurationError, DomainError, StateError};
use homesim::sim::component::{
    BaselineValues, Component, PortDeclarations, StepContext, ValueView, registered,
};
use homesim::sim::connection::{Capability, DefaultConnection};
use homesim::sim::port::{InputHandle, LoadType, OutputHandle, Unit};
use homesim::sim::state::{SnapshotToken, StateCell};
use homesim::sim::types::RunParameters;

/// Capability advertised by test signal sources.
pub const SIGNAL: Capability = Capability::new("Signal");

/// One day at hourly resolution (24 steps).
pub fn hourly_day() -> RunParameters {
    RunParameters::one_day_only(2021, 3600).unwrap()
}

/// Emits a constant on `Out`.
pub struct Constant {
    name: String,
    value: f64,
    capabilities: Vec<Capability>,
    out: Option<OutputHandle>,
}

impl Constant {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            capabilities: Vec::new(),
            out: None,
        }
    }

    /// Advertises `capability` for default connections.
    pub fn providing(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }
}

impl Component for Constant {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.out = Some(ports.add_output("Out", LoadType::Any, Unit::Any)?);
        Ok(())
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let out = registered(self.out, &self.name)?;
        ctx.set_output(out, self.value);
        Ok(())
    }
}

/// `Out = gain * In + offset`. `In` is mandatory and may carry a default rule.
pub struct Gain {
    name: String,
    gain: f64,
    offset: f64,
    rule: Option<DefaultConnection>,
    steps: Rc<Cell<usize>>,
    input: Option<InputHandle>,
    out: Option<OutputHandle>,
}

impl Gain {
    pub fn new(name: &str, gain: f64, offset: f64) -> Self {
        Self {
            name: name.to_string(),
            gain,
            offset,
            rule: None,
            steps: Rc::new(Cell::new(0)),
            input: None,
            out: None,
        }
    }

    /// Connects `In` by default to the `Out` of whoever provides `capability`.
    pub fn defaulting_to(mut self, capability: Capability) -> Self {
        self.rule = Some(DefaultConnection::new("In", capability, "Out"));
        self
    }

    /// Shared counter of `simulate_step` calls.
    pub fn step_calls(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.steps)
    }
}

impl Component for Gain {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.input = Some(ports.add_input("In", LoadType::Any, Unit::Any, true)?);
        self.out = Some(ports.add_output("Out", LoadType::Any, Unit::Any)?);
        Ok(())
    }

    fn default_connections(&self) -> Vec<DefaultConnection> {
        self.rule.into_iter().collect()
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        self.steps.set(self.steps.get() + 1);
        let input = registered(self.input, &self.name)?;
        let out = registered(self.out, &self.name)?;
        let x = ctx.input(input);
        ctx.set_output(out, self.gain * x + self.offset);
        Ok(())
    }
}

/// Controller half of the feedback pair: `Target = clamp(Feedback * 0.9, 0, max)`.
pub struct ProportionalController {
    max: f64,
    feedback: Option<InputHandle>,
    target: Option<OutputHandle>,
}

impl ProportionalController {
    pub fn new(max: f64) -> Self {
        Self {
            max,
            feedback: None,
            target: None,
        }
    }
}

impl Component for ProportionalController {
    fn name(&self) -> &str {
        "Controller"
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.feedback = Some(ports.add_input("Feedback", LoadType::Any, Unit::Watt, true)?);
        self.target = Some(ports.add_output("Target", LoadType::Any, Unit::Watt)?);
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let feedback = registered(self.feedback, "Controller")?;
        let target = registered(self.target, "Controller")?;
        let value = (ctx.input(feedback) * 0.9).clamp(0.0, self.max);
        ctx.set_output(target, value);
        Ok(())
    }
}

/// Device half of the feedback pair: `Feedback = Target`, starting at `initial`.
pub struct FollowingDevice {
    initial: f64,
    target: Option<InputHandle>,
    feedback: Option<OutputHandle>,
}

impl FollowingDevice {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            target: None,
            feedback: None,
        }
    }
}

impl Component for FollowingDevice {
    fn name(&self) -> &str {
        "Device"
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.target = Some(ports.add_input("Target", LoadType::Any, Unit::Watt, true)?);
        self.feedback = Some(ports.add_output("Feedback", LoadType::Any, Unit::Watt)?);
        Ok(())
    }

    fn prepare_simulation(&mut self, baseline: &mut BaselineValues<'_>) -> Result<(), DomainError> {
        baseline.set_output(registered(self.feedback, "Device")?, self.initial);
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let target = registered(self.target, "Device")?;
        let feedback = registered(self.feedback, "Device")?;
        let value = ctx.input(target);
        ctx.set_output(feedback, value);
        Ok(())
    }
}

/// `Out = 1 - In`, never settling when fed its own output back.
///
/// In a forced pass it holds the last committed output.
pub struct Inverter {
    held: StateCell<f64>,
    input: Option<InputHandle>,
    out: Option<OutputHandle>,
}

impl Inverter {
    pub fn new() -> Self {
        Self {
            held: StateCell::new(0.0),
            input: None,
            out: None,
        }
    }
}

impl Component for Inverter {
    fn name(&self) -> &str {
        "Inverter"
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.input = Some(ports.add_input("In", LoadType::Activation, Unit::Binary, true)?);
        self.out = Some(ports.add_output("Out", LoadType::Activation, Unit::Binary)?);
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let input = registered(self.input, "Inverter")?;
        let out = registered(self.out, "Inverter")?;
        let value = if ctx.is_forced() {
            self.held.committed().copied().unwrap_or(0.0)
        } else {
            1.0 - ctx.input(input)
        };
        self.held.set(value);
        ctx.set_output(out, value);
        Ok(())
    }

    fn save_state(&mut self) -> SnapshotToken {
        self.held.commit()
    }

    fn restore_state(&mut self, token: Option<SnapshotToken>) -> Result<(), StateError> {
        self.held.rollback(token)
    }

    fn double_check(&self, _timestep: usize, values: &ValueView<'_>) -> Result<(), DomainError> {
        let Some(out) = self.out else {
            return Ok(());
        };
        let v = values.output(out);
        if v != 0.0 && v != 1.0 {
            return Err(DomainError::out_of_range("Inverter # Out", v, "not a binary signal"));
        }
        Ok(())
    }
}

/// Copies `In` to `Out`, with `In` bound explicitly.
pub struct Relay {
    name: String,
    input: Option<InputHandle>,
    out: Option<OutputHandle>,
}

impl Relay {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            input: None,
            out: None,
        }
    }
}

impl Component for Relay {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.input = Some(ports.add_input("In", LoadType::Activation, Unit::Binary, true)?);
        self.out = Some(ports.add_output("Out", LoadType::Activation, Unit::Binary)?);
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let input = registered(self.input, &self.name)?;
        let out = registered(self.out, &self.name)?;
        let v = ctx.input(input);
        ctx.set_output(out, v);
        Ok(())
    }
}

/// Accumulates one unit per committed timestep, however many passes it runs.
pub struct StepCounter {
    count: StateCell<u64>,
    out: Option<OutputHandle>,
}

impl StepCounter {
    pub fn new() -> Self {
        Self {
            count: StateCell::new(0),
            out: None,
        }
    }
}

impl Component for StepCounter {
    fn name(&self) -> &str {
        "StepCounter"
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.out = Some(ports.add_output("Count", LoadType::Any, Unit::Any)?);
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let out = registered(self.out, "StepCounter")?;
        *self.count.get_mut() += 1;
        ctx.set_output(out, *self.count.get() as f64);
        Ok(())
    }

    fn save_state(&mut self) -> SnapshotToken {
        self.count.commit()
    }

    fn restore_state(&mut self, token: Option<SnapshotToken>) -> Result<(), StateError> {
        self.count.rollback(token)
    }
}

/// Rejects its step at `fail_at`.
pub struct FailingAt {
    fail_at: usize,
    out: Option<OutputHandle>,
}

impl FailingAt {
    pub fn new(fail_at: usize) -> Self {
        Self { fail_at, out: None }
    }
}

impl Component for FailingAt {
    fn name(&self) -> &str {
        "Faulty"
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.out = Some(ports.add_output("Out", LoadType::Any, Unit::Watt)?);
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let out = registered(self.out, "Faulty")?;
        if ctx.timestep() == self.fail_at {
            return Err(DomainError::out_of_range("Faulty # Out", -1.0, "negative mass flow"));
        }
        ctx.set_output(out, 1.0);
        Ok(())
    }
}

/// Relaxes its own output halfway towards `target` on every pass.
///
/// Reads nothing but its previous value, so only the record of its own
/// output read tells the solver it is still moving.
pub struct Relaxing {
    target: f64,
    out: Option<OutputHandle>,
}

impl Relaxing {
    pub fn new(target: f64) -> Self {
        Self { target, out: None }
    }
}

impl Component for Relaxing {
    fn name(&self) -> &str {
        "Relaxing"
    }

    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
        self.out = Some(ports.add_output("Out", LoadType::Any, Unit::Any)?);
        Ok(())
    }

    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
        let out = registered(self.out, "Relaxing")?;
        let previous = ctx.output(out);
        ctx.set_output(out, 0.5 * (previous + self.target));
        Ok(())
    }
}
