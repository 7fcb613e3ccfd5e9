use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MacMovements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MacMovements::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MacMovements::Mac).string().not_null())
                    .col(ColumnDef::new(MacMovements::FromDevice).string().not_null())
                    .col(ColumnDef::new(MacMovements::FromIf).string().not_null())
                    .col(ColumnDef::new(MacMovements::ToDevice).string().not_null())
                    .col(ColumnDef::new(MacMovements::ToIf).string().not_null())
                    .col(
                        ColumnDef::new(MacMovements::MovedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-mac_movements-mac-moved_at")
                    .table(MacMovements::Table)
                    .col(MacMovements::Mac)
                    .col(MacMovements::MovedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MacMovements::Table).to_owned())
            .await
    }
}

/// Learn more at https://docs.rs/sea-query#iden
#[derive(Iden)]
enum MacMovements {
    Table,
    Id,
    Mac,
    FromDevice,
    FromIf,
    ToDevice,
    ToIf,
    MovedAt,
}
