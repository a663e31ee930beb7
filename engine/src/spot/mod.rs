//! Spot strategy execution: trigger evaluation, batched limit order
//! placement with rollback, and order reconciliation.

pub mod placement;
pub mod reconcile;
pub mod trigger;
