use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Strategies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Strategies::Id).big_unsigned().auto_increment().primary_key())
                    .col(ColumnDef::new(Strategies::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Strategies::Symbol).string().not_null())
                    .col(ColumnDef::new(Strategies::Side).string_len(8).not_null()) // "buy" or "sell"
                    .col(ColumnDef::new(Strategies::Price).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(Strategies::TotalQuantity).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(Strategies::Decomposition).string_len(8).not_null()) // "simple", "iceberg", "custom"
                    .col(ColumnDef::new(Strategies::LayerFractions).text().null())
                    .col(ColumnDef::new(Strategies::LayerGapsBps).text().null())
                    .col(ColumnDef::new(Strategies::DepthAnchors).text().null())
                    .col(ColumnDef::new(Strategies::Enabled).boolean().not_null().default(true))
                    .col(ColumnDef::new(Strategies::PendingBatch).boolean().not_null().default(false))
                    .col(ColumnDef::new(Strategies::DeletedAt).timestamp().null())
                    .col(ColumnDef::new(Strategies::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Strategies::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_strategies_user_symbol")
                            .table(Strategies::Table)
                            .col(Strategies::UserId)
                            .col(Strategies::Symbol)
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orders::Id).big_unsigned().auto_increment().primary_key())
                    .col(ColumnDef::new(Orders::StrategyId).big_unsigned().not_null())
                    .col(ColumnDef::new(Orders::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Orders::Symbol).string().not_null())
                    .col(ColumnDef::new(Orders::Side).string_len(8).not_null())
                    .col(ColumnDef::new(Orders::Price).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(Orders::Quantity).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(Orders::ExchangeOrderId).string().not_null())
                    .col(ColumnDef::new(Orders::Status).string_len(16).not_null().default("pending"))
                    .col(ColumnDef::new(Orders::CancelAfter).timestamp().null())
                    .col(ColumnDef::new(Orders::CreatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Orders::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .index(
                        Index::create()
                            .name("idx_orders_strategy_status")
                            .table(Orders::Table)
                            .col(Orders::StrategyId)
                            .col(Orders::Status)
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_strategy")
                            .from(Orders::Table, Orders::StrategyId)
                            .to(Strategies::Table, Strategies::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Strategies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Strategies {
    Table,
    Id,
    UserId,
    Symbol,
    Side,
    Price,
    TotalQuantity,
    Decomposition,
    LayerFractions,
    LayerGapsBps,
    DepthAnchors,
    Enabled,
    PendingBatch,
    DeletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    StrategyId,
    UserId,
    Symbol,
    Side,
    Price,
    Quantity,
    ExchangeOrderId,
    Status,
    CancelAfter,
    CreatedAt,
    UpdatedAt,
}
