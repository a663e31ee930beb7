use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SymbolPrices::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SymbolPrices::Id).big_unsigned().auto_increment().primary_key())
                    .col(ColumnDef::new(SymbolPrices::Symbol).string().not_null().unique_key())
                    .col(ColumnDef::new(SymbolPrices::Price).decimal_len(20, 8).not_null())
                    .col(ColumnDef::new(SymbolPrices::UpdatedAt).timestamp().default(Expr::cust("CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP")))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SymbolPrices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SymbolPrices {
    Table,
    Id,
    Symbol,
    Price,
    UpdatedAt,
}
