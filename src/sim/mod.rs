/// Simulation clock for timestep management.
pub mod clock;
pub mod component;
/// Connection resolver and built systems.
pub mod connection;
pub mod diagnostics;
pub mod engine;
pub mod port;
pub mod solver;
/// Component state snapshots.
pub mod state;
pub mod types;
pub mod values;
