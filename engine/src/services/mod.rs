//! Strategy CRUD entry points consumed by the surrounding application.

pub mod dual_service;
pub mod futures_service;
pub mod spot_service;
