//! Dual-investment scheduling: product sync, strategy execution, and
//! settlement simulation, each on its own periodic loop.

pub mod executor;
pub mod products;
pub mod settlement;
