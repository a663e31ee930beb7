//! Spot strategy CRUD, consumed by the surrounding application.
//!
//! Creation and enable/disable keep the feed subscription registry in step
//! with the strategy rows; connections with no remaining subscribers are
//! closed by the feed sweep.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};

use crate::exchange::StreamKind;
use crate::spot::placement::validate_fractions;
use crate::state::AppState;
use shared::entity::{orders, strategies};
use shared::num::to_decimal;
use shared::{Decomposition, OrderSide};

pub struct NewSpotStrategy {
    pub user_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub total_quantity: f64,
    pub decomposition: Decomposition,
    pub layer_fractions: Option<Vec<f64>>,
    pub layer_gaps_bps: Option<Vec<f64>>,
    pub depth_anchors: Option<Vec<usize>>,
}

pub async fn create_strategy(
    app: &Arc<AppState>,
    new: NewSpotStrategy,
) -> Result<strategies::Model> {
    if new.price <= 0.0 || new.total_quantity <= 0.0 {
        return Err(anyhow!("price and quantity must be positive"));
    }
    if let Some(fractions) = &new.layer_fractions {
        validate_fractions(fractions)?;
    }
    if new.decomposition == Decomposition::Custom && new.depth_anchors.is_none() {
        return Err(anyhow!("custom decomposition needs depth anchors"));
    }

    let symbol = new.symbol.to_uppercase();
    let row = strategies::ActiveModel {
        user_id: Set(new.user_id),
        symbol: Set(symbol.clone()),
        side: Set(new.side),
        price: Set(to_decimal(new.price)),
        total_quantity: Set(to_decimal(new.total_quantity)),
        decomposition: Set(new.decomposition),
        layer_fractions: Set(encode_json(new.layer_fractions)?),
        layer_gaps_bps: Set(encode_json(new.layer_gaps_bps)?),
        depth_anchors: Set(encode_json(new.depth_anchors)?),
        enabled: Set(true),
        pending_batch: Set(false),
        created_at: Set(Some(Utc::now())),
        updated_at: Set(Some(Utc::now())),
        ..Default::default()
    };
    let created = row.insert(&app.db).await.context("create spot strategy")?;

    app.feed.subscribe(StreamKind::Trade, &symbol, created.id);
    Ok(created)
}

pub async fn set_enabled(app: &Arc<AppState>, strategy_id: u64, enabled: bool) -> Result<()> {
    let strategy = strategies::Entity::find_by_id(strategy_id)
        .one(&app.db)
        .await?
        .ok_or_else(|| anyhow!("spot strategy {strategy_id} not found"))?;
    if strategy.deleted_at.is_some() {
        return Err(anyhow!("spot strategy {strategy_id} is deleted"));
    }

    let symbol = strategy.symbol.clone();
    let mut active: strategies::ActiveModel = strategy.into();
    active.enabled = Set(enabled);
    active.updated_at = Set(Some(Utc::now()));
    active.update(&app.db).await?;

    if enabled {
        app.feed.subscribe(StreamKind::Trade, &symbol, strategy_id);
    } else {
        app.feed.unsubscribe(StreamKind::Trade, &symbol, strategy_id);
    }
    Ok(())
}

/// Soft delete: the row stays for history, the subscription goes away.
pub async fn delete_strategy(app: &Arc<AppState>, strategy_id: u64) -> Result<()> {
    let strategy = strategies::Entity::find_by_id(strategy_id)
        .one(&app.db)
        .await?
        .ok_or_else(|| anyhow!("spot strategy {strategy_id} not found"))?;

    let symbol = strategy.symbol.clone();
    let mut active: strategies::ActiveModel = strategy.into();
    active.enabled = Set(false);
    active.deleted_at = Set(Some(Utc::now()));
    active.updated_at = Set(Some(Utc::now()));
    active.update(&app.db).await?;

    app.feed.unsubscribe(StreamKind::Trade, &symbol, strategy_id);
    Ok(())
}

pub async fn list_strategies(app: &Arc<AppState>, user_id: i64) -> Result<Vec<strategies::Model>> {
    Ok(strategies::Entity::find()
        .filter(strategies::Column::UserId.eq(user_id))
        .filter(strategies::Column::DeletedAt.is_null())
        .order_by_desc(strategies::Column::Id)
        .all(&app.db)
        .await?)
}

pub async fn list_orders(app: &Arc<AppState>, user_id: i64) -> Result<Vec<orders::Model>> {
    Ok(orders::Entity::find()
        .filter(orders::Column::UserId.eq(user_id))
        .order_by_desc(orders::Column::Id)
        .all(&app.db)
        .await?)
}

fn encode_json<T: serde::Serialize>(value: Option<T>) -> Result<Option<String>> {
    value
        .map(|v| serde_json::to_string(&v).context("encode layer configuration"))
        .transpose()
}
