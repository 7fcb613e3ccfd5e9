use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MacAddresses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MacAddresses::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MacAddresses::Mac).string().not_null())
                    .col(ColumnDef::new(MacAddresses::Device).string().not_null())
                    .col(ColumnDef::new(MacAddresses::Interface).string().not_null())
                    .col(
                        ColumnDef::new(MacAddresses::FirstSeen)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MacAddresses::LastSeen)
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
                    .name("idx-mac_addresses-mac")
                    .unique()
                    .table(MacAddresses::Table)
                    .col(MacAddresses::Mac)
                    .to_owned(),
            )
            .await?;

        // Fragment lookups are returned most recently seen first.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-mac_addresses-last_seen")
                    .table(MacAddresses::Table)
                    .col(MacAddresses::LastSeen)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MacAddresses::Table).to_owned())
            .await
    }
}

/// Learn more at https://docs.rs/sea-query#iden
#[derive(Iden)]
pub(crate) enum MacAddresses {
    Table,
    Id,
    Mac,
    Device,
    Interface,
    FirstSeen,
    LastSeen,
}
