pub mod config;
pub mod database;
pub mod entity;
pub mod enums;
pub mod num;

pub use config::Config;
pub use database::get_db_connection;
pub use enums::*;
