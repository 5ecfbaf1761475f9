//! Household energy simulation engine.
//!
//! Components declare typed ports, get wired explicitly or through
//! capability-based default connections, and are advanced together through
//! every timestep by a bounded fixed-point iteration.

pub mod cli;
pub mod components;
pub mod config;
pub mod error;
pub mod household;
pub mod io;
/// Ports, wiring, state handling, solver and timeline driver.
pub mod sim;
