//! Leveraged strategy lifecycle: trigger, layered entry, fill monitoring,
//! exit placement, and completion. Status transitions all go through the
//! transition table on `shared::FuturesStatus`.

pub mod entry;
pub mod math;
pub mod monitor;
pub mod reconcile;
pub mod trigger;
