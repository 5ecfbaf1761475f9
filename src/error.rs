//! Error taxonomy for wiring, stepping, and component state handling.

use thiserror::Error;

use crate::sim::port::Unit;

/// Wiring and setup problems detected before the first timestep runs.
///
/// Every port is named by its full name `<component> # <port>`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("no components were added to the system")]
    NoComponents,

    #[error("component name \"{0}\" is used more than once")]
    DuplicateComponent(String),

    #[error("component \"{0}\" declares no outputs")]
    NoOutputs(String),

    #[error("output \"{0}\" is registered twice")]
    DuplicateOutput(String),

    #[error("input \"{0}\" is declared twice")]
    DuplicateInput(String),

    #[error("no component with id {0} was added")]
    UnknownComponent(usize),

    #[error("component \"{component}\" has no input named \"{input}\"")]
    UnknownInput { component: String, input: String },

    #[error("component \"{component}\" has no output named \"{output}\"")]
    UnknownOutput { component: String, output: String },

    #[error("input \"{input}\" is already connected to \"{existing}\"")]
    InputAlreadyBound { input: String, existing: String },

    #[error(
        "input \"{input}\" [{input_unit}] and output \"{output}\" [{output_unit}] do not have the same unit"
    )]
    UnitMismatch {
        input: String,
        input_unit: Unit,
        output: String,
        output_unit: Unit,
    },

    #[error("mandatory input \"{input}\" [{unit}] is not connected and declares no default connection")]
    UnresolvedInput { input: String, unit: Unit },

    #[error("mandatory input \"{input}\" needs a producer of \"{capability}\" but none was added")]
    NoDefaultCandidate { input: String, capability: String },

    #[error(
        "mandatory input \"{input}\" needs a producer of \"{capability}\" but several were added: {}",
        .candidates.join(", ")
    )]
    AmbiguousDefault {
        input: String,
        capability: String,
        candidates: Vec<String>,
    },

    #[error("component \"{target}\" has no default connection that \"{source_component}\" can satisfy")]
    NoMatchingDefaults {
        target: String,
        source_component: String,
    },

    #[error("invalid run parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid solver settings: {0}")]
    InvalidSolverSettings(String),
}

/// A component saw a value it cannot work with.
///
/// Returned from `simulate_step`, `prepare_simulation` and `double_check`;
/// the engine attaches the component name and timestep.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("{port} out of range: {value} ({reason})")]
    OutOfRange {
        port: String,
        value: f64,
        reason: String,
    },

    #[error("{0}")]
    Invalid(String),
}

impl DomainError {
    /// Shorthand for [`DomainError::OutOfRange`].
    pub fn out_of_range(port: impl Into<String>, value: f64, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            port: port.into(),
            value,
            reason: reason.into(),
        }
    }
}

/// Misuse of the save/restore protocol. Always an engine or component bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("restore requested before any state was saved")]
    NeverSaved,

    #[error("snapshot generation {requested} is stale, last saved generation is {current}")]
    StaleSnapshot { requested: u64, current: u64 },
}

/// Any failure that aborts a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("domain error in \"{component}\" at timestep {timestep}: {source}")]
    Domain {
        component: String,
        timestep: usize,
        #[source]
        source: DomainError,
    },

    #[error("state error in \"{component}\" at timestep {timestep}: {source}")]
    State {
        component: String,
        timestep: usize,
        #[source]
        source: StateError,
    },
}

/// Convenience alias for results carrying a [`SimError`].
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_default_names_all_candidates() {
        let err = ConfigurationError::AmbiguousDefault {
            input: "Controller # StateOfCharge".into(),
            capability: "BatteryStorage".into(),
            candidates: vec!["Battery1".into(), "Battery2".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Battery1"));
        assert!(msg.contains("Battery2"));
        assert!(msg.contains("Controller # StateOfCharge"));
    }

    #[test]
    fn domain_error_is_attributed() {
        let err = SimError::Domain {
            component: "Battery".into(),
            timestep: 17,
            source: DomainError::out_of_range("Battery # SetPoint", f64::NAN, "not finite"),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"Battery\""));
        assert!(msg.contains("timestep 17"));
        assert!(msg.contains("Battery # SetPoint"));
    }

    #[test]
    fn configuration_error_converts_into_sim_error() {
        let err: SimError = ConfigurationError::NoComponents.into();
        assert!(matches!(
            err,
            SimError::Configuration(ConfigurationError::NoComponents)
        ));
    }
}
