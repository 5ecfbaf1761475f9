//! Port registry: global output slots and input bindings for one run.
//!
//! Every output port gets exactly one slot in the run-wide value buffer,
//! assigned in registration order, so the slots of one component are
//! contiguous. Inputs carry at most one binding to such a slot.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Physical quantity carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadType {
    Any,
    Electricity,
    Irradiance,
    Heating,
    Cooling,
    Temperature,
    Gas,
    Hydrogen,
    Water,
    WarmWater,
    Price,
    /// 0 means off, 1 means on.
    OnOff,
    Activation,
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Any => "Any",
            Self::Electricity => "Electricity",
            Self::Irradiance => "Irradiance",
            Self::Heating => "Heating",
            Self::Cooling => "Cooling",
            Self::Temperature => "Temperature",
            Self::Gas => "Gas",
            Self::Hydrogen => "Hydrogen",
            Self::Water => "Water",
            Self::WarmWater => "WarmWater",
            Self::Price => "Price",
            Self::OnOff => "OnOff",
            Self::Activation => "Activation",
        };
        f.write_str(s)
    }
}

/// Unit of the value stored in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Unphysical or unspecified; binds to anything with a warning.
    Any,
    Percent,
    Watt,
    Kilowatt,
    WattHour,
    KilowattHour,
    Celsius,
    Kelvin,
    KilogramPerSecond,
    Kilogram,
    Liter,
    Seconds,
    Binary,
}

impl Unit {
    /// Short symbol used in slot labels.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Any => "-",
            Self::Percent => "%",
            Self::Watt => "W",
            Self::Kilowatt => "kW",
            Self::WattHour => "Wh",
            Self::KilowattHour => "kWh",
            Self::Celsius => "°C",
            Self::Kelvin => "K",
            Self::KilogramPerSecond => "kg/s",
            Self::Kilogram => "kg",
            Self::Liter => "L",
            Self::Seconds => "s",
            Self::Binary => "binary",
        }
    }

    /// How an input of unit `self` relates to an output of unit `other`.
    pub fn compatibility(self, other: Unit) -> UnitCompatibility {
        if self == other {
            UnitCompatibility::Exact
        } else if self == Unit::Any || other == Unit::Any {
            UnitCompatibility::Loose
        } else {
            UnitCompatibility::Incompatible
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Result of [`Unit::compatibility`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitCompatibility {
    Exact,
    /// One side is [`Unit::Any`].
    Loose,
    Incompatible,
}

/// Position of a component in registration (and execution) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) usize);

impl ComponentId {
    /// Registration index of the component.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle to an output slot, owned by exactly one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputHandle {
    pub(crate) slot: usize,
    pub(crate) owner: ComponentId,
}

impl OutputHandle {
    /// Global index of this output in the value buffer.
    pub fn slot(self) -> usize {
        self.slot
    }

    pub fn owner(self) -> ComponentId {
        self.owner
    }
}

/// Handle to a declared input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputHandle {
    pub(crate) index: usize,
    pub(crate) owner: ComponentId,
}

impl InputHandle {
    pub fn owner(self) -> ComponentId {
        self.owner
    }
}

/// A registered output port.
#[derive(Debug, Clone)]
pub struct OutputPort {
    pub owner: ComponentId,
    pub component_name: String,
    pub name: String,
    pub load_type: LoadType,
    pub unit: Unit,
    pub slot: usize,
}

impl OutputPort {
    /// `<component> # <port>`, unique within a run.
    pub fn full_name(&self) -> String {
        format!("{} # {}", self.component_name, self.name)
    }

    /// `<component> # <port> [<unit>]`, the column key used by exports.
    pub fn label(&self) -> String {
        format!("{} # {} [{}]", self.component_name, self.name, self.unit)
    }
}

/// A registered input port and its binding.
#[derive(Debug, Clone)]
pub struct InputPort {
    pub owner: ComponentId,
    pub component_name: String,
    pub name: String,
    pub load_type: LoadType,
    pub unit: Unit,
    pub mandatory: bool,
    pub source: Option<usize>,
}

impl InputPort {
    pub fn full_name(&self) -> String {
        format!("{} # {}", self.component_name, self.name)
    }
}

/// Run-wide table of output slots and input bindings.
#[derive(Debug, Clone, Default)]
pub struct PortRegistry {
    outputs: Vec<OutputPort>,
    inputs: Vec<InputPort>,
    output_names: HashMap<String, usize>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next free slot to a new output.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateOutput`] if the full name is taken.
    pub fn register_output(
        &mut self,
        owner: ComponentId,
        component_name: &str,
        name: &str,
        load_type: LoadType,
        unit: Unit,
    ) -> Result<OutputHandle, ConfigurationError> {
        let port = OutputPort {
            owner,
            component_name: component_name.to_string(),
            name: name.to_string(),
            load_type,
            unit,
            slot: self.outputs.len(),
        };
        let full_name = port.full_name();
        if self.output_names.contains_key(&full_name) {
            return Err(ConfigurationError::DuplicateOutput(full_name));
        }
        log::debug!("registered output {full_name} at slot {}", port.slot);
        let handle = OutputHandle {
            slot: port.slot,
            owner,
        };
        self.output_names.insert(full_name, port.slot);
        self.outputs.push(port);
        Ok(handle)
    }

    /// Declares a new, initially unbound input.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateInput`] if the component already
    /// declared an input with this name.
    pub fn register_input(
        &mut self,
        owner: ComponentId,
        component_name: &str,
        name: &str,
        load_type: LoadType,
        unit: Unit,
        mandatory: bool,
    ) -> Result<InputHandle, ConfigurationError> {
        if self.find_input(owner, name).is_some() {
            return Err(ConfigurationError::DuplicateInput(format!(
                "{component_name} # {name}"
            )));
        }
        let port = InputPort {
            owner,
            component_name: component_name.to_string(),
            name: name.to_string(),
            load_type,
            unit,
            mandatory,
            source: None,
        };
        log::debug!(
            "registered {} input {}",
            if mandatory { "mandatory" } else { "optional" },
            port.full_name()
        );
        let handle = InputHandle {
            index: self.inputs.len(),
            owner,
        };
        self.inputs.push(port);
        Ok(handle)
    }

    /// Binds an input to an output slot.
    ///
    /// # Errors
    ///
    /// Fails if the input is already bound, the slot does not exist, or the
    /// units are incompatible. Loosely compatible units bind with a warning.
    pub fn bind(&mut self, input: InputHandle, slot: usize) -> Result<(), ConfigurationError> {
        let output = self
            .outputs
            .get(slot)
            .ok_or_else(|| ConfigurationError::UnknownOutput {
                component: "<any>".to_string(),
                output: format!("slot {slot}"),
            })?;
        let port = &self.inputs[input.index];

        if let Some(existing) = port.source {
            return Err(ConfigurationError::InputAlreadyBound {
                input: port.full_name(),
                existing: self.outputs[existing].full_name(),
            });
        }

        match port.unit.compatibility(output.unit) {
            UnitCompatibility::Exact => {}
            UnitCompatibility::Loose => log::warn!(
                "input {} [{}] and output {} [{}] might not have compatible units",
                port.full_name(),
                port.unit,
                output.full_name(),
                output.unit
            ),
            UnitCompatibility::Incompatible => {
                return Err(ConfigurationError::UnitMismatch {
                    input: port.full_name(),
                    input_unit: port.unit,
                    output: output.full_name(),
                    output_unit: output.unit,
                });
            }
        }

        log::debug!("connected {} to {}", port.full_name(), output.full_name());
        self.inputs[input.index].source = Some(slot);
        Ok(())
    }

    /// Slot bound to `input`, or `None` if it has no source.
    #[inline]
    pub fn source_of(&self, input: InputHandle) -> Option<usize> {
        self.inputs[input.index].source
    }

    /// Slot of the output `<component> # <name>`.
    pub fn find_output(&self, component_name: &str, name: &str) -> Option<usize> {
        self.output_names
            .get(&format!("{component_name} # {name}"))
            .copied()
    }

    /// Handle of the input `name` declared by `owner`.
    pub fn find_input(&self, owner: ComponentId, name: &str) -> Option<InputHandle> {
        self.inputs
            .iter()
            .position(|p| p.owner == owner && p.name == name)
            .map(|index| InputHandle { index, owner })
    }

    pub fn output(&self, slot: usize) -> Option<&OutputPort> {
        self.outputs.get(slot)
    }

    pub fn input(&self, handle: InputHandle) -> &InputPort {
        &self.inputs[handle.index]
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    /// Handles of all inputs, in declaration order.
    pub fn input_handles(&self) -> impl Iterator<Item = InputHandle> + '_ {
        self.inputs
            .iter()
            .enumerate()
            .map(|(index, p)| InputHandle {
                index,
                owner: p.owner,
            })
    }

    /// Drops everything registered after the given counts.
    pub(crate) fn truncate(&mut self, outputs: usize, inputs: usize) {
        self.outputs.truncate(outputs);
        self.inputs.truncate(inputs);
        self.output_names.retain(|_, slot| *slot < outputs);
    }

    /// Number of output slots, i.e. the value buffer length.
    pub fn slot_count(&self) -> usize {
        self.outputs.len()
    }

    /// Labels of all slots, in slot order.
    pub fn labels(&self) -> Vec<String> {
        self.outputs.iter().map(OutputPort::label).collect()
    }
}
