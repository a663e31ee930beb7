//! Automated execution core: live price ingestion, strategy trigger
//! evaluation, layered order placement, futures lifecycle management,
//! dual-investment scheduling, and exchange reconciliation.

pub mod dual;
pub mod exchange;
pub mod feed;
pub mod futures;
pub mod handler;
pub mod registry;
pub mod runtime;
pub mod services;
pub mod spot;
pub mod state;

pub use state::AppState;
