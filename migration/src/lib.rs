pub use sea_orm_migration::prelude::*;

mod m20260110_000001_create_spot_tables;
mod m20260110_000002_create_futures_tables;
mod m20260110_000003_create_dual_tables;
mod m20260110_000004_create_symbol_prices;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260110_000001_create_spot_tables::Migration),
            Box::new(m20260110_000002_create_futures_tables::Migration),
            Box::new(m20260110_000003_create_dual_tables::Migration),
            Box::new(m20260110_000004_create_symbol_prices::Migration),
        ]
    }
}
