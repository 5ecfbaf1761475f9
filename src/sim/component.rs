//! The contract every device and controller model implements.

use crate::error::{ConfigurationError, DomainError, StateError};
use crate::sim::connection::{Capability, DefaultConnection};
use crate::sim::port::{ComponentId, InputHandle, LoadType, OutputHandle, PortRegistry, Unit};
use crate::sim::state::SnapshotToken;
use crate::sim::values::ValueBuffer;

/// Kind of iteration pass a component is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Regular evaluation of the component's control logic.
    Normal,
    /// Final pass after the iteration cap. Components must produce a safe
    /// deterministic fallback (hold, clamp or shut down) instead of
    /// re-evaluating their control logic.
    Forced,
}

/// Port declaration interface handed to [`Component::register_ports`].
pub struct PortDeclarations<'a> {
    registry: &'a mut PortRegistry,
    owner: ComponentId,
    component_name: &'a str,
    outputs: usize,
}

impl<'a> PortDeclarations<'a> {
    pub(crate) fn new(
        registry: &'a mut PortRegistry,
        owner: ComponentId,
        component_name: &'a str,
    ) -> Self {
        Self {
            registry,
            owner,
            component_name,
            outputs: 0,
        }
    }

    /// Declares an input. Mandatory inputs must end up connected, either
    /// explicitly or through a default connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateInput`] for a repeated name.
    pub fn add_input(
        &mut self,
        name: &str,
        load_type: LoadType,
        unit: Unit,
        mandatory: bool,
    ) -> Result<InputHandle, ConfigurationError> {
        self.registry
            .register_input(self.owner, self.component_name, name, load_type, unit, mandatory)
    }

    /// Declares an output and reserves its slot in the value buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateOutput`] for a repeated name.
    pub fn add_output(
        &mut self,
        name: &str,
        load_type: LoadType,
        unit: Unit,
    ) -> Result<OutputHandle, ConfigurationError> {
        let handle =
            self.registry
                .register_output(self.owner, self.component_name, name, load_type, unit)?;
        self.outputs += 1;
        Ok(handle)
    }

    pub(crate) fn output_count(&self) -> usize {
        self.outputs
    }
}

/// Per-call view of the value buffer during [`Component::simulate_step`].
///
/// Every read of a connected input is recorded so the solver can tell
/// whether the pass was self-consistent.
pub struct StepContext<'a> {
    timestep: usize,
    mode: PassMode,
    owner: ComponentId,
    registry: &'a PortRegistry,
    buffer: &'a mut ValueBuffer,
    reads: &'a mut Vec<(usize, f64)>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        timestep: usize,
        mode: PassMode,
        owner: ComponentId,
        registry: &'a PortRegistry,
        buffer: &'a mut ValueBuffer,
        reads: &'a mut Vec<(usize, f64)>,
    ) -> Self {
        Self {
            timestep,
            mode,
            owner,
            registry,
            buffer,
            reads,
        }
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn mode(&self) -> PassMode {
        self.mode
    }

    /// True in the final pass after the iteration cap was reached.
    pub fn is_forced(&self) -> bool {
        self.mode == PassMode::Forced
    }

    /// Current value of an input. Unconnected inputs read as `0.0`.
    pub fn input(&mut self, handle: InputHandle) -> f64 {
        self.input_or(handle, 0.0)
    }

    /// Current value of an input, or `default` if it is unconnected.
    pub fn input_or(&mut self, handle: InputHandle, default: f64) -> f64 {
        match self.registry.source_of(handle) {
            Some(slot) => {
                let value = self.buffer.get(slot);
                self.reads.push((slot, value));
                value
            }
            None => default,
        }
    }

    pub fn is_connected(&self, handle: InputHandle) -> bool {
        self.registry.source_of(handle).is_some()
    }

    /// Value of one of the component's own outputs as left by the
    /// previous pass (or the previous timestep).
    ///
    /// Recorded like an input read: a component that feeds on its own
    /// previous value has not converged until that value stops changing.
    pub fn output(&mut self, handle: OutputHandle) -> f64 {
        let value = self.buffer.get(handle.slot);
        self.reads.push((handle.slot, value));
        value
    }

    /// Writes one of the component's own outputs.
    pub fn set_output(&mut self, handle: OutputHandle, value: f64) {
        debug_assert_eq!(handle.owner, self.owner, "write to a foreign output slot");
        self.buffer.set(handle.slot, value);
    }
}

/// Read-only view of a buffer, used by diagnostics hooks.
pub struct ValueView<'a> {
    registry: &'a PortRegistry,
    buffer: &'a ValueBuffer,
}

impl<'a> ValueView<'a> {
    pub(crate) fn new(registry: &'a PortRegistry, buffer: &'a ValueBuffer) -> Self {
        Self { registry, buffer }
    }

    /// Unconnected inputs read as `0.0`.
    pub fn input(&self, handle: InputHandle) -> f64 {
        self.registry
            .source_of(handle)
            .map_or(0.0, |slot| self.buffer.get(slot))
    }

    pub fn output(&self, handle: OutputHandle) -> f64 {
        self.buffer.get(handle.slot)
    }
}

/// Write access to a component's own slots in the baseline buffer.
///
/// The baseline buffer is what the first pass of timestep 0 reads.
pub struct BaselineValues<'a> {
    owner: ComponentId,
    buffer: &'a mut ValueBuffer,
}

impl<'a> BaselineValues<'a> {
    pub(crate) fn new(owner: ComponentId, buffer: &'a mut ValueBuffer) -> Self {
        Self { owner, buffer }
    }

    pub fn set_output(&mut self, handle: OutputHandle, value: f64) {
        debug_assert_eq!(handle.owner, self.owner, "write to a foreign output slot");
        self.buffer.set(handle.slot, value);
    }
}

/// A stateful computational unit advanced by the engine.
///
/// Components are evaluated one at a time, in registration order, possibly
/// several times per timestep. Before every pass the engine restores the
/// state saved at the end of the previous timestep, so `simulate_step` may
/// mutate state freely: only the state present after the final pass is
/// committed.
pub trait Component {
    /// Unique name within a system, used in port names and error messages.
    fn name(&self) -> &str;

    /// Declares inputs and outputs. Called once, when the component is
    /// added to a [`SystemBuilder`](crate::sim::connection::SystemBuilder).
    ///
    /// # Errors
    ///
    /// Propagates duplicate port names.
    fn register_ports(&mut self, ports: &mut PortDeclarations<'_>)
    -> Result<(), ConfigurationError>;

    /// Capability tags other components' default connections can match.
    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    /// Rules for wiring unbound mandatory inputs automatically.
    fn default_connections(&self) -> Vec<DefaultConnection> {
        Vec::new()
    }

    /// Called once before timestep 0. Preloads data and may seed the
    /// component's own outputs in the baseline buffer.
    ///
    /// # Errors
    ///
    /// A [`DomainError`] aborts the run.
    fn prepare_simulation(&mut self, _baseline: &mut BaselineValues<'_>) -> Result<(), DomainError> {
        Ok(())
    }

    /// Evaluates one pass: reads inputs, writes own outputs.
    ///
    /// # Errors
    ///
    /// A [`DomainError`] aborts the run unless the component clamps instead.
    fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError>;

    /// Commits the working state. Stateless components keep the default.
    fn save_state(&mut self) -> SnapshotToken {
        SnapshotToken::stateless()
    }

    /// Reverts the working state to the last commit.
    ///
    /// # Errors
    ///
    /// [`StateError`] when no state was saved or the token is stale.
    fn restore_state(&mut self, _token: Option<SnapshotToken>) -> Result<(), StateError> {
        Ok(())
    }

    /// Post-commit sanity check on the committed values. Never triggers
    /// another iteration.
    ///
    /// # Errors
    ///
    /// A [`DomainError`] aborts the run.
    fn double_check(&self, _timestep: usize, _values: &ValueView<'_>) -> Result<(), DomainError> {
        Ok(())
    }

    /// Component-declared consistency check that must hold, in addition to
    /// the numeric tolerance, for a pass to count as converged.
    fn is_settled(&self, _values: &ValueView<'_>) -> bool {
        true
    }
}

/// Returns the handles stored by `register_ports`, or a [`DomainError`]
/// if the component is simulated without having been added to a system.
///
/// # Errors
///
/// [`DomainError::Invalid`] if `ports` is `None`.
pub fn registered<T: Copy>(ports: Option<T>, component: &str) -> Result<T, DomainError> {
    ports.ok_or_else(|| {
        DomainError::Invalid(format!("{component} was simulated before its ports were registered"))
    })
}
