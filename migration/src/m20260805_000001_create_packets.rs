use sea_orm_migration::prelude::*;

/// Packets (红包表)
#[derive(DeriveIden)]
enum Packets {
    Table,
    Id,
    UserId,
    Message,
    Mode,
    TotalCount,
    RemainCount,
    TotalAmountCents,
    RemainAmountCents,
    CreatedAt,
    UpdatedAt,
}

/// Records (领取记录表)
#[derive(DeriveIden)]
enum Records {
    Table,
    Id,
    UserId,
    PacketId,
    AmountCents,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// mode: 1 = 普通红包(平均), 2 = 手气红包(随机)
/// 金额一律以分存储
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 红包表
        manager
            .create_table(
                Table::create()
                    .table(Packets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Packets::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Packets::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Packets::Message)
                            .string_len(256)
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Packets::Mode).integer().not_null())
                    .col(ColumnDef::new(Packets::TotalCount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Packets::RemainCount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Packets::TotalAmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Packets::RemainAmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Packets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .col(
                        ColumnDef::new(Packets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        // 领取记录表
        manager
            .create_table(
                Table::create()
                    .table(Records::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Records::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Records::UserId).big_integer().not_null())
                    .col(ColumnDef::new(Records::PacketId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Records::AmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Records::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::cust("NOW()")),
                    )
                    .to_owned(),
            )
            .await?;

        // user_id + packet_id 唯一组合索引（幂等与防双花的存储层兜底）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_records_user_packet_unique")
                    .table(Records::Table)
                    .col(Records::UserId)
                    .col(Records::PacketId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 按红包查询记录
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_records_packet")
                    .table(Records::Table)
                    .col(Records::PacketId)
                    .to_owned(),
            )
            .await?;

        // 红包记录外键（不加 CASCADE，保证领取历史不随误删丢失）
        manager
            .alter_table(
                Table::alter()
                    .table(Records::Table)
                    .add_foreign_key(
                        TableForeignKey::new()
                            .name("fk_record_packet")
                            .from_tbl(Records::Table)
                            .from_col(Records::PacketId)
                            .to_tbl(Packets::Table)
                            .to_col(Packets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 删除顺序：记录 -> 红包
        manager
            .drop_table(Table::drop().if_exists().table(Records::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().if_exists().table(Packets::Table).to_owned())
            .await?;

        Ok(())
    }
}
