pub mod dual_orders;
pub mod dual_products;
pub mod dual_strategies;
pub mod futures_orders;
pub mod futures_positions;
pub mod futures_strategies;
pub mod orders;
pub mod strategies;
pub mod symbol_prices;
