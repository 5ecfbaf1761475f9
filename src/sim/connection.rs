//! Connection resolver: explicit wiring, capability-based default
//! connections, and the built [`System`].

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::ConfigurationError;
use crate::sim::component::{Component, PortDeclarations};
use crate::sim::port::{ComponentId, PortRegistry};

/// Tag a component advertises so that default connections can find it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability(&'static str);

impl Capability {
    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// "Input `input` needs output `source_output` of a producer of `capability`."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultConnection {
    pub input: &'static str,
    pub capability: Capability,
    pub source_output: &'static str,
}

impl DefaultConnection {
    pub const fn new(
        input: &'static str,
        capability: Capability,
        source_output: &'static str,
    ) -> Self {
        Self {
            input,
            capability,
            source_output,
        }
    }
}

/// How a connection came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionOrigin {
    Explicit,
    Default,
}

/// A resolved edge `target input <- source output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub source_component: String,
    pub source_output: String,
    pub target_component: String,
    pub target_input: String,
    pub slot: usize,
    pub origin: ConnectionOrigin,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} # {} <- {} # {}",
            self.target_component, self.target_input, self.source_component, self.source_output
        )
    }
}

/// Providers of each capability, in registration order.
#[derive(Debug, Default)]
pub struct CapabilityIndex {
    providers: HashMap<Capability, Vec<ComponentId>>,
}

impl CapabilityIndex {
    /// Scans the fixed component set once.
    pub fn build(components: &[Box<dyn Component>]) -> Self {
        let mut providers: HashMap<Capability, Vec<ComponentId>> = HashMap::new();
        for (index, component) in components.iter().enumerate() {
            for capability in component.capabilities() {
                providers
                    .entry(*capability)
                    .or_default()
                    .push(ComponentId(index));
            }
        }
        Self { providers }
    }

    pub fn providers(&self, capability: Capability) -> &[ComponentId] {
        self.providers
            .get(&capability)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Assembles components and their wiring into a [`System`].
///
/// Components execute in the order they are added.
///
/// # Examples
///
/// ```no_run
/// # use homesim::sim::connection::SystemBuilder;
/// # fn wire(pv: impl homesim::sim::component::Component + 'static,
/// #         meter: impl homesim::sim::component::Component + 'static)
/// #         -> Result<(), homesim::error::ConfigurationError> {
/// let mut builder = SystemBuilder::new();
/// let pv = builder.add(pv)?;
/// let meter = builder.add(meter)?;
/// builder.connect(meter, "Production", pv, "ElectricityOutput")?;
/// let system = builder.build()?;
/// # Ok(()) }
/// ```
#[derive(Default)]
pub struct SystemBuilder {
    components: Vec<Box<dyn Component>>,
    registry: PortRegistry,
    connections: Vec<Connection>,
}

impl SystemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component and registers its ports.
    ///
    /// # Errors
    ///
    /// Fails on a duplicate component name, duplicate port names, or a
    /// component without outputs. The builder is unchanged on error.
    pub fn add<C: Component + 'static>(&mut self, component: C) -> Result<ComponentId, ConfigurationError> {
        self.add_boxed(Box::new(component))
    }

    /// Adds an already boxed component. See [`SystemBuilder::add`].
    ///
    /// # Errors
    ///
    /// Same as [`SystemBuilder::add`].
    pub fn add_boxed(&mut self, mut component: Box<dyn Component>) -> Result<ComponentId, ConfigurationError> {
        let name = component.name().to_string();
        if self.components.iter().any(|c| c.name() == name) {
            return Err(ConfigurationError::DuplicateComponent(name));
        }

        let id = ComponentId(self.components.len());
        let outputs_before = self.registry.outputs().len();
        let inputs_before = self.registry.inputs().len();

        let mut ports = PortDeclarations::new(&mut self.registry, id, &name);
        let declared = component
            .register_ports(&mut ports)
            .and_then(|()| match ports.output_count() {
                0 => Err(ConfigurationError::NoOutputs(name.clone())),
                _ => Ok(()),
            });
        if let Err(err) = declared {
            self.registry.truncate(outputs_before, inputs_before);
            return Err(err);
        }

        log::debug!("added component {name} as #{}", id.index());
        self.components.push(component);
        Ok(id)
    }

    /// Connects `target`'s input `input` to `source`'s output `output`.
    ///
    /// # Errors
    ///
    /// Fails on unknown ids or port names, an input that is already
    /// connected, or incompatible units.
    pub fn connect(
        &mut self,
        target: ComponentId,
        input: &str,
        source: ComponentId,
        output: &str,
    ) -> Result<(), ConfigurationError> {
        self.bind(target, input, source, output, ConnectionOrigin::Explicit)
    }

    /// Applies every default connection of `target` that `source` can
    /// satisfy, regardless of how many other providers exist.
    ///
    /// Use this to settle what would otherwise be an ambiguous default.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::NoMatchingDefaults`] if nothing applies, plus
    /// the errors of [`SystemBuilder::connect`].
    pub fn connect_defaults_from(
        &mut self,
        target: ComponentId,
        source: ComponentId,
    ) -> Result<(), ConfigurationError> {
        let target_component = self.component(target)?;
        let source_component = self.component(source)?;
        let offered = source_component.capabilities().to_vec();
        let rules: Vec<_> = target_component
            .default_connections()
            .into_iter()
            .filter(|rule| offered.contains(&rule.capability))
            .collect();

        let mut applied = 0;
        for rule in rules {
            let handle = self.registry.find_input(target, rule.input).ok_or_else(|| {
                ConfigurationError::UnknownInput {
                    component: self.components[target.index()].name().to_string(),
                    input: rule.input.to_string(),
                }
            })?;
            if self.registry.source_of(handle).is_some() {
                continue;
            }
            self.bind(target, rule.input, source, rule.source_output, ConnectionOrigin::Default)?;
            applied += 1;
        }

        if applied == 0 {
            return Err(ConfigurationError::NoMatchingDefaults {
                target: self.components[target.index()].name().to_string(),
                source_component: self.components[source.index()].name().to_string(),
            });
        }
        Ok(())
    }

    /// Resolves default connections and freezes the wiring.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::NoComponents`] for an empty builder, or the
    /// first unresolvable mandatory input.
    pub fn build(mut self) -> Result<System, ConfigurationError> {
        if self.components.is_empty() {
            return Err(ConfigurationError::NoComponents);
        }
        self.resolve_defaults()?;

        log::info!(
            "built system with {} components, {} outputs and {} connections",
            self.components.len(),
            self.registry.slot_count(),
            self.connections.len()
        );
        Ok(System {
            components: self.components,
            registry: self.registry,
            connections: self.connections,
        })
    }

    /// Binds every still-unbound mandatory input through its component's
    /// default connection rule.
    fn resolve_defaults(&mut self) -> Result<(), ConfigurationError> {
        let index = CapabilityIndex::build(&self.components);
        let rules: Vec<Vec<DefaultConnection>> = self
            .components
            .iter()
            .map(|c| c.default_connections())
            .collect();

        let pending: Vec<_> = self
            .registry
            .input_handles()
            .filter(|h| {
                let port = self.registry.input(*h);
                port.mandatory && port.source.is_none()
            })
            .collect();

        for handle in pending {
            let port = self.registry.input(handle);
            let owner = handle.owner();
            let Some(rule) = rules[owner.index()].iter().find(|r| r.input == port.name) else {
                return Err(ConfigurationError::UnresolvedInput {
                    input: port.full_name(),
                    unit: port.unit,
                });
            };

            let candidates: Vec<ComponentId> = index
                .providers(rule.capability)
                .iter()
                .copied()
                .filter(|id| *id != owner)
                .collect();

            match candidates.as_slice() {
                [] => {
                    return Err(ConfigurationError::NoDefaultCandidate {
                        input: port.full_name(),
                        capability: rule.capability.to_string(),
                    });
                }
                [source] => {
                    let input = port.name.clone();
                    self.bind(owner, &input, *source, rule.source_output, ConnectionOrigin::Default)?;
                }
                many => {
                    return Err(ConfigurationError::AmbiguousDefault {
                        input: port.full_name(),
                        capability: rule.capability.to_string(),
                        candidates: many
                            .iter()
                            .map(|id| self.components[id.index()].name().to_string())
                            .collect(),
                    });
                }
            }
        }
        Ok(())
    }

    fn component(&self, id: ComponentId) -> Result<&dyn Component, ConfigurationError> {
        self.components
            .get(id.index())
            .map(Box::as_ref)
            .ok_or(ConfigurationError::UnknownComponent(id.index()))
    }

    fn bind(
        &mut self,
        target: ComponentId,
        input: &str,
        source: ComponentId,
        output: &str,
        origin: ConnectionOrigin,
    ) -> Result<(), ConfigurationError> {
        let target_name = self.component(target)?.name().to_string();
        let source_name = self.component(source)?.name().to_string();

        let handle = self
            .registry
            .find_input(target, input)
            .ok_or_else(|| ConfigurationError::UnknownInput {
                component: target_name.clone(),
                input: input.to_string(),
            })?;
        let slot = self
            .registry
            .find_output(&source_name, output)
            .ok_or_else(|| ConfigurationError::UnknownOutput {
                component: source_name.clone(),
                output: output.to_string(),
            })?;
        self.registry.bind(handle, slot)?;

        self.connections.push(Connection {
            source_component: source_name,
            source_output: output.to_string(),
            target_component: target_name,
            target_input: input.to_string(),
            slot,
            origin,
        });
        Ok(())
    }
}

/// A fully wired, immutable component graph ready to be simulated.
pub struct System {
    pub(crate) components: Vec<Box<dyn Component>>,
    pub(crate) registry: PortRegistry,
    pub(crate) connections: Vec<Connection>,
}

impl System {
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Component names in execution order.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.components
            .iter()
            .position(|c| c.name() == name)
            .map(ComponentId)
    }

    pub fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Slot of the output `<component> # <port>`.
    pub fn output_slot(&self, component: &str, port: &str) -> Option<usize> {
        self.registry.find_output(component, port)
    }

    /// Slot labels `<component> # <port> [<unit>]`, in slot order.
    pub fn labels(&self) -> Vec<String> {
        self.registry.labels()
    }

    pub fn slot_count(&self) -> usize {
        self.registry.slot_count()
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("components", &self.component_names())
            .field("slots", &self.registry.slot_count())
            .field("connections", &self.connections)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::sim::component::StepContext;
    use crate::sim::port::{InputHandle, LoadType, OutputHandle, Unit};

    const HEAT: Capability = Capability::new("HeatSource");

    struct Source {
        name: &'static str,
        capabilities: Vec<Capability>,
        out: Option<OutputHandle>,
    }

    impl Source {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                capabilities: vec![HEAT],
                out: None,
            }
        }
    }

    impl Component for Source {
        fn name(&self) -> &str {
            self.name
        }
        fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
            self.out = Some(ports.add_output("Heat", LoadType::Heating, Unit::Watt)?);
            Ok(())
        }
        fn capabilities(&self) -> &[Capability] {
            &self.capabilities
        }
        fn simulate_step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
            if let Some(out) = self.out {
                ctx.set_output(out, 1.0);
            }
            Ok(())
        }
    }

    struct Sink {
        mandatory: bool,
        rules: Vec<DefaultConnection>,
        inp: Option<InputHandle>,
    }

    impl Sink {
        fn new(mandatory: bool) -> Self {
            Self {
                mandatory,
                rules: vec![DefaultConnection::new("HeatIn", HEAT, "Heat")],
                inp: None,
            }
        }
    }

    impl Component for Sink {
        fn name(&self) -> &str {
            "Sink"
        }
        fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
            self.inp = Some(ports.add_input("HeatIn", LoadType::Heating, Unit::Watt, self.mandatory)?);
            ports.add_output("Echo", LoadType::Heating, Unit::Watt)?;
            Ok(())
        }
        fn default_connections(&self) -> Vec<DefaultConnection> {
            self.rules.clone()
        }
        fn simulate_step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct Mute;

    impl Component for Mute {
        fn name(&self) -> &str {
            "Mute"
        }
        fn register_ports(&mut self, ports: &mut PortDeclarations<'_>) -> Result<(), ConfigurationError> {
            ports.add_input("Ignored", LoadType::Any, Unit::Any, false)?;
            Ok(())
        }
        fn simulate_step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), DomainError> {
            Ok(())
        }
    }

    #[test]
    fn single_candidate_is_bound_by_default() {
        let mut b = SystemBuilder::new();
        b.add(Source::new("Boiler")).unwrap();
        b.add(Sink::new(true)).unwrap();
        let system = b.build().unwrap();
        assert_eq!(system.connections().len(), 1);
        let c = &system.connections()[0];
        assert_eq!(c.origin, ConnectionOrigin::Default);
        assert_eq!(c.to_string(), "Sink # HeatIn <- Boiler # Heat");
    }

    #[test]
    fn producer_added_after_consumer_is_still_found() {
        let mut b = SystemBuilder::new();
        b.add(Sink::new(true)).unwrap();
        b.add(Source::new("Boiler")).unwrap();
        assert!(b.build().is_ok());
    }

    #[test]
    fn ambiguous_default_names_every_candidate() {
        let mut b = SystemBuilder::new();
        b.add(Source::new("Boiler1")).unwrap();
        b.add(Source::new("Boiler2")).unwrap();
        b.add(Sink::new(true)).unwrap();
        match b.build() {
            Err(ConfigurationError::AmbiguousDefault { candidates, .. }) => {
                assert_eq!(candidates, vec!["Boiler1".to_string(), "Boiler2".to_string()]);
            }
            other => panic!("expected ambiguous default, got {other:?}"),
        }
    }

    #[test]
    fn connect_defaults_from_settles_ambiguity() {
        let mut b = SystemBuilder::new();
        b.add(Source::new("Boiler1")).unwrap();
        let second = b.add(Source::new("Boiler2")).unwrap();
        let sink = b.add(Sink::new(true)).unwrap();
        b.connect_defaults_from(sink, second).unwrap();
        let system = b.build().unwrap();
        assert_eq!(system.connections()[0].source_component, "Boiler2");
    }

    #[test]
    fn connect_defaults_from_without_match_fails() {
        let mut b = SystemBuilder::new();
        let mute = b.add(Mute).unwrap_err();
        assert_eq!(mute, ConfigurationError::NoOutputs("Mute".into()));
        let boiler = b.add(Source::new("Boiler")).unwrap();
        let other = b.add(Source::new("Other")).unwrap();
        let err = b.connect_defaults_from(boiler, other).unwrap_err();
        assert!(matches!(err, ConfigurationError::NoMatchingDefaults { .. }));
    }

    #[test]
    fn optional_input_without_source_stays_unbound() {
        let mut b = SystemBuilder::new();
        b.add(Sink::new(false)).unwrap();
        let system = b.build().unwrap();
        assert!(system.connections().is_empty());
        assert_eq!(system.registry().inputs()[0].source, None);
    }

    #[test]
    fn rejected_component_leaves_no_ports_behind() {
        let mut b = SystemBuilder::new();
        b.add(Mute).unwrap_err();
        assert!(b.registry.inputs().is_empty());
        b.add(Source::new("Boiler")).unwrap();
        assert_eq!(b.registry.inputs().len(), 0);
        assert_eq!(b.registry.slot_count(), 1);
    }

    #[test]
    fn duplicate_names_and_unknown_ports_are_rejected() {
        let mut b = SystemBuilder::new();
        let boiler = b.add(Source::new("Boiler")).unwrap();
        assert_eq!(
            b.add(Source::new("Boiler")).unwrap_err(),
            ConfigurationError::DuplicateComponent("Boiler".into())
        );
        let sink = b.add(Sink::new(true)).unwrap();
        assert!(matches!(
            b.connect(sink, "Nope", boiler, "Heat"),
            Err(ConfigurationError::UnknownInput { .. })
        ));
        assert!(matches!(
            b.connect(sink, "HeatIn", boiler, "Nope"),
            Err(ConfigurationError::UnknownOutput { .. })
        ));
        assert_eq!(
            b.connect(sink, "HeatIn", ComponentId(9), "Heat"),
            Err(ConfigurationError::UnknownComponent(9))
        );
        b.connect(sink, "HeatIn", boiler, "Heat").unwrap();
        assert_eq!(b.build().unwrap().connections()[0].origin, ConnectionOrigin::Explicit);
    }

    #[test]
    fn empty_builder_fails() {
        assert_eq!(
            SystemBuilder::new().build().unwrap_err(),
            ConfigurationError::NoComponents
        );
    }
}
