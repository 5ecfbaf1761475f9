//! File output for committed results and the resolved wiring.

pub mod export;
