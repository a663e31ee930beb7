use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FuturesStrategies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FuturesStrategies::Id).big_unsigned().auto_increment().primary_key())
                    .col(ColumnDef::new(FuturesStrategies::UserId).big_integer().not_null())
                    .col(ColumnDef::new(FuturesStrategies::Symbol).string().not_null())
                    .col(ColumnDef::new(FuturesStrategies::Side).string_len(8).not_null()) // "long" or "short"
                    .col(ColumnDef::new(FuturesStrategies::BasePrice).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(FuturesStrategies::EntryOffsetBps).decimal_len(10, 4).not_null().default(0))
                    .col(ColumnDef::new(FuturesStrategies::Leverage).integer().not_null().default(1))
                    .col(ColumnDef::new(FuturesStrategies::Quantity).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(FuturesStrategies::TakeProfitRate).decimal_len(10, 4).not_null())
                    .col(ColumnDef::new(FuturesStrategies::StopLossRate).decimal_len(10, 4).not_null().default(0))
                    .col(ColumnDef::new(FuturesStrategies::TakeProfitPrice).decimal_len(20, 8).null())
                    .col(ColumnDef::new(FuturesStrategies::StopLossPrice).decimal_len(20, 8).null())
                    .col(ColumnDef::new(FuturesStrategies::MarginMode).string_len(12).not_null().default("crossed"))
                    .col(ColumnDef::new(FuturesStrategies::Decomposition).string_len(8).not_null().default("simple"))
                    .col(ColumnDef::new(FuturesStrategies::LayerFractions).text().null())
                    .col(ColumnDef::new(FuturesStrategies::LayerGapsBps).text().null())
                    .col(ColumnDef::new(FuturesStrategies::AutoRestart).boolean().not_null().default(false))
                    .col(ColumnDef::new(FuturesStrategies::Status).string_len(16).not_null().default("waiting"))
                    .col(ColumnDef::new(FuturesStrategies::FailReason).text().null())
                    .col(ColumnDef::new(FuturesStrategies::Enabled).boolean().not_null().default(true))
                    .col(ColumnDef::new(FuturesStrategies::DeletedAt).timestamp().null())
                    .col(ColumnDef::new(FuturesStrategies::TriggeredAt).timestamp().null())
                    .col(ColumnDef::new(FuturesStrategies::CompletedAt).timestamp().null())
                    .col(ColumnDef::new(FuturesStrategies::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(FuturesStrategies::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_futures_strategies_status_symbol")
                            .table(FuturesStrategies::Table)
                            .col(FuturesStrategies::Status)
                            .col(FuturesStrategies::Symbol)
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FuturesOrders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FuturesOrders::Id).big_unsigned().auto_increment().primary_key())
                    .col(ColumnDef::new(FuturesOrders::StrategyId).big_unsigned().not_null())
                    .col(ColumnDef::new(FuturesOrders::Purpose).string_len(16).not_null()) // "entry", "take_profit", "stop_loss"
                    .col(ColumnDef::new(FuturesOrders::Symbol).string().not_null())
                    .col(ColumnDef::new(FuturesOrders::Side).string_len(8).not_null())
                    .col(ColumnDef::new(FuturesOrders::Price).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(FuturesOrders::Quantity).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(FuturesOrders::ExecutedQty).decimal_len(20, 8).not_null().default(0))
                    .col(ColumnDef::new(FuturesOrders::AvgPrice).decimal_len(20, 8).not_null().default(0))
                    .col(ColumnDef::new(FuturesOrders::Commission).decimal_len(20, 8).not_null().default(0))
                    .col(ColumnDef::new(FuturesOrders::ExchangeOrderId).string().not_null())
                    .col(ColumnDef::new(FuturesOrders::Status).string_len(20).not_null().default("new"))
                    .col(ColumnDef::new(FuturesOrders::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(FuturesOrders::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_futures_orders_strategy_status")
                            .table(FuturesOrders::Table)
                            .col(FuturesOrders::StrategyId)
                            .col(FuturesOrders::Status)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_futures_orders_strategy")
                            .from(FuturesOrders::Table, FuturesOrders::StrategyId)
                            .to(FuturesStrategies::Table, FuturesStrategies::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FuturesPositions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FuturesPositions::Id).big_unsigned().auto_increment().primary_key())
                    .col(ColumnDef::new(FuturesPositions::StrategyId).big_unsigned().not_null())
                    .col(ColumnDef::new(FuturesPositions::Symbol).string().not_null())
                    .col(ColumnDef::new(FuturesPositions::Side).string_len(8).not_null())
                    .col(ColumnDef::new(FuturesPositions::EntryPrice).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(FuturesPositions::Quantity).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(FuturesPositions::RealizedPnl).decimal_len(20, 8).not_null().default(0))
                    .col(ColumnDef::new(FuturesPositions::UnrealizedPnl).decimal_len(20, 8).not_null().default(0))
                    .col(ColumnDef::new(FuturesPositions::Status).string_len(8).not_null().default("open"))
                    .col(ColumnDef::new(FuturesPositions::OpenedAt).timestamp().null())
                    .col(ColumnDef::new(FuturesPositions::ClosedAt).timestamp().null())
                    .col(ColumnDef::new(FuturesPositions::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(FuturesPositions::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_futures_positions_strategy")
                            .from(FuturesPositions::Table, FuturesPositions::StrategyId)
                            .to(FuturesStrategies::Table, FuturesStrategies::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FuturesPositions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FuturesOrders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FuturesStrategies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FuturesStrategies {
    Table,
    Id,
    UserId,
    Symbol,
    Side,
    BasePrice,
    EntryOffsetBps,
    Leverage,
    Quantity,
    TakeProfitRate,
    StopLossRate,
    TakeProfitPrice,
    StopLossPrice,
    MarginMode,
    Decomposition,
    LayerFractions,
    LayerGapsBps,
    AutoRestart,
    Status,
    FailReason,
    Enabled,
    DeletedAt,
    TriggeredAt,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FuturesOrders {
    Table,
    Id,
    StrategyId,
    Purpose,
    Symbol,
    Side,
    Price,
    Quantity,
    ExecutedQty,
    AvgPrice,
    Commission,
    ExchangeOrderId,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FuturesPositions {
    Table,
    Id,
    StrategyId,
    Symbol,
    Side,
    EntryPrice,
    Quantity,
    RealizedPnl,
    UnrealizedPnl,
    Status,
    OpenedAt,
    ClosedAt,
    CreatedAt,
    UpdatedAt,
}
