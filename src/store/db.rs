use super::{ClaimOutcome, ClaimUpdate, PacketStore};
use crate::entities::{packet_entity as packets, record_entity as records};
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait, UpdateResult,
};

/// sea-orm 版存储网关
#[derive(Clone)]
pub struct DbPacketStore {
    pool: DatabaseConnection,
}

impl DbPacketStore {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PacketStore for DbPacketStore {
    async fn find_packet(&self, id: i64) -> AppResult<Option<packets::Model>> {
        Ok(packets::Entity::find_by_id(id).one(&self.pool).await?)
    }

    async fn find_record(
        &self,
        user_id: i64,
        packet_id: i64,
    ) -> AppResult<Option<records::Model>> {
        Ok(records::Entity::find()
            .filter(records::Column::UserId.eq(user_id))
            .filter(records::Column::PacketId.eq(packet_id))
            .one(&self.pool)
            .await?)
    }

    async fn atomic_claim(&self, claim: &ClaimUpdate) -> AppResult<ClaimOutcome> {
        let txn = self.pool.begin().await?;

        // 更新 packet 时在 Where 里带上剩余个数
        // 这个个数的红包已经被别人抢走时这里会更新 0 行
        let update_result: UpdateResult = packets::Entity::update_many()
            .col_expr(
                packets::Column::RemainCount,
                Expr::value(claim.new_remain_count),
            )
            .col_expr(
                packets::Column::RemainAmountCents,
                Expr::value(claim.new_remain_amount_cents),
            )
            .col_expr(packets::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(packets::Column::Id.eq(claim.packet_id))
            .filter(packets::Column::RemainCount.eq(claim.expected_remain_count))
            .exec(&txn)
            .await?;

        if update_result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(ClaimOutcome::ConditionFailed);
        }

        // packet 更新成功，记录在同一事务内入库
        let record = records::ActiveModel {
            user_id: Set(claim.user_id),
            packet_id: Set(claim.packet_id),
            amount_cents: Set(claim.amount_cents),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        Ok(ClaimOutcome::Applied(record))
    }
}
