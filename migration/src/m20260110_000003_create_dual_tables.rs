use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DualProducts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DualProducts::Id).big_unsigned().auto_increment().primary_key())
                    .col(ColumnDef::new(DualProducts::Symbol).string().not_null())
                    .col(ColumnDef::new(DualProducts::Direction).string_len(8).not_null()) // "up" or "down"
                    .col(ColumnDef::new(DualProducts::StrikePrice).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(DualProducts::Apy).decimal_len(10, 4).not_null())
                    .col(ColumnDef::new(DualProducts::DurationDays).integer().not_null())
                    .col(ColumnDef::new(DualProducts::MinAmount).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(DualProducts::MaxAmount).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(DualProducts::SettlementTime).timestamp().not_null())
                    .col(ColumnDef::new(DualProducts::Status).string_len(12).not_null().default("active"))
                    .col(ColumnDef::new(DualProducts::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(DualProducts::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_dual_products_symbol_status")
                            .table(DualProducts::Table)
                            .col(DualProducts::Symbol)
                            .col(DualProducts::Status)
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DualStrategies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DualStrategies::Id).big_unsigned().auto_increment().primary_key())
                    .col(ColumnDef::new(DualStrategies::UserId).big_integer().not_null())
                    .col(ColumnDef::new(DualStrategies::Symbol).string().not_null())
                    .col(ColumnDef::new(DualStrategies::Kind).string_len(16).not_null()) // "single", "auto_reinvest", "ladder", "price_trigger"
                    .col(ColumnDef::new(DualStrategies::Direction).string_len(8).not_null().default("both"))
                    .col(ColumnDef::new(DualStrategies::MinApy).decimal_len(10, 4).not_null().default(0))
                    .col(ColumnDef::new(DualStrategies::MaxApy).decimal_len(10, 4).not_null().default(1000))
                    .col(ColumnDef::new(DualStrategies::MinDurationDays).integer().not_null().default(1))
                    .col(ColumnDef::new(DualStrategies::MaxDurationDays).integer().not_null().default(30))
                    .col(ColumnDef::new(DualStrategies::MaxStrikeOffsetPct).decimal_len(10, 4).not_null().default(10))
                    .col(ColumnDef::new(DualStrategies::PerOrderAmount).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(DualStrategies::TotalInvestmentLimit).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(DualStrategies::CurrentInvested).decimal_len(20, 8).not_null().default(0))
                    .col(ColumnDef::new(DualStrategies::LadderSteps).integer().null())
                    .col(ColumnDef::new(DualStrategies::LadderBasePrice).decimal_len(20, 8).null())
                    .col(ColumnDef::new(DualStrategies::LadderStepPct).decimal_len(10, 4).null())
                    .col(ColumnDef::new(DualStrategies::TriggerPrice).decimal_len(20, 8).null())
                    .col(ColumnDef::new(DualStrategies::TriggerKind).string_len(8).null()) // "above" or "below"
                    .col(ColumnDef::new(DualStrategies::Status).string_len(12).not_null().default("active"))
                    .col(ColumnDef::new(DualStrategies::Enabled).boolean().not_null().default(true))
                    .col(ColumnDef::new(DualStrategies::DeletedAt).timestamp().null())
                    .col(ColumnDef::new(DualStrategies::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(DualStrategies::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_dual_strategies_user")
                            .table(DualStrategies::Table)
                            .col(DualStrategies::UserId)
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DualOrders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DualOrders::Id).big_unsigned().auto_increment().primary_key())
                    .col(ColumnDef::new(DualOrders::StrategyId).big_unsigned().not_null())
                    .col(ColumnDef::new(DualOrders::ProductId).big_unsigned().not_null())
                    .col(ColumnDef::new(DualOrders::UserId).big_integer().not_null())
                    .col(ColumnDef::new(DualOrders::Symbol).string().not_null())
                    .col(ColumnDef::new(DualOrders::Amount).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(DualOrders::StrikePrice).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(DualOrders::Apy).decimal_len(10, 4).not_null())
                    .col(ColumnDef::new(DualOrders::Direction).string_len(8).not_null())
                    .col(ColumnDef::new(DualOrders::DurationDays).integer().not_null())
                    .col(ColumnDef::new(DualOrders::SettlementTime).timestamp().not_null())
                    .col(ColumnDef::new(DualOrders::Status).string_len(12).not_null().default("active"))
                    .col(ColumnDef::new(DualOrders::SettleAsset).text().null())
                    .col(ColumnDef::new(DualOrders::SettleAmount).decimal_len(20, 8).null())
                    .col(ColumnDef::new(DualOrders::Pnl).decimal_len(20, 8).null())
                    .col(ColumnDef::new(DualOrders::PnlPct).decimal_len(10, 4).null())
                    .col(ColumnDef::new(DualOrders::Reinvested).boolean().not_null().default(false))
                    .col(ColumnDef::new(DualOrders::SettledAt).timestamp().null())
                    .col(ColumnDef::new(DualOrders::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(DualOrders::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_dual_orders_strategy_status")
                            .table(DualOrders::Table)
                            .col(DualOrders::StrategyId)
                            .col(DualOrders::Status)
                    )
                    .index(
                        Index::create()
                            .name("idx_dual_orders_settlement")
                            .table(DualOrders::Table)
                            .col(DualOrders::Status)
                            .col(DualOrders::SettlementTime)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dual_orders_strategy")
                            .from(DualOrders::Table, DualOrders::StrategyId)
                            .to(DualStrategies::Table, DualStrategies::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_dual_orders_product")
                            .from(DualOrders::Table, DualOrders::ProductId)
                            .to(DualProducts::Table, DualProducts::Id)
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DualOrders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DualStrategies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DualProducts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DualProducts {
    Table,
    Id,
    Symbol,
    Direction,
    StrikePrice,
    Apy,
    DurationDays,
    MinAmount,
    MaxAmount,
    SettlementTime,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DualStrategies {
    Table,
    Id,
    UserId,
    Symbol,
    Kind,
    Direction,
    MinApy,
    MaxApy,
    MinDurationDays,
    MaxDurationDays,
    MaxStrikeOffsetPct,
    PerOrderAmount,
    TotalInvestmentLimit,
    CurrentInvested,
    LadderSteps,
    LadderBasePrice,
    LadderStepPct,
    TriggerPrice,
    TriggerKind,
    Status,
    Enabled,
    DeletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DualOrders {
    Table,
    Id,
    StrategyId,
    ProductId,
    UserId,
    Symbol,
    Amount,
    StrikePrice,
    Apy,
    Direction,
    DurationDays,
    SettlementTime,
    Status,
    SettleAsset,
    SettleAmount,
    Pnl,
    PnlPct,
    Reinvested,
    SettledAt,
    CreatedAt,
    UpdatedAt,
}
