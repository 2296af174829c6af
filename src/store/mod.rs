pub mod db;
pub mod memory;

pub use db::DbPacketStore;
pub use memory::MemoryPacketStore;

use crate::entities::{packet_entity as packets, record_entity as records};
use crate::error::AppResult;
use async_trait::async_trait;
use std::sync::Arc;

/// 一次领取要原子落库的全部内容
#[derive(Debug, Clone)]
pub struct ClaimUpdate {
    pub packet_id: i64,
    /// 快照里的剩余个数，作为条件更新的版本号
    pub expected_remain_count: i64,
    pub new_remain_count: i64,
    pub new_remain_amount_cents: i64,
    /// 领取用户
    pub user_id: i64,
    /// 本次分得的金额（分）
    pub amount_cents: i64,
}

#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// 条件成立，扣减与插入均已生效
    Applied(records::Model),
    /// 剩余个数已被别人改掉，本次未产生任何写入
    ConditionFailed,
}

/// 存储网关
///
/// atomic_claim 必须把红包扣减和记录插入放进同一个原子单元执行，
/// 并保证同一 (packet_id, expected_remain_count) 的并发调用至多一个返回 Applied。
#[async_trait]
pub trait PacketStore: Send + Sync {
    async fn find_packet(&self, id: i64) -> AppResult<Option<packets::Model>>;

    async fn find_record(
        &self,
        user_id: i64,
        packet_id: i64,
    ) -> AppResult<Option<records::Model>>;

    async fn atomic_claim(&self, claim: &ClaimUpdate) -> AppResult<ClaimOutcome>;
}

#[async_trait]
impl<T: PacketStore + ?Sized> PacketStore for Arc<T> {
    async fn find_packet(&self, id: i64) -> AppResult<Option<packets::Model>> {
        (**self).find_packet(id).await
    }

    async fn find_record(
        &self,
        user_id: i64,
        packet_id: i64,
    ) -> AppResult<Option<records::Model>> {
        (**self).find_record(user_id, packet_id).await
    }

    async fn atomic_claim(&self, claim: &ClaimUpdate) -> AppResult<ClaimOutcome> {
        (**self).atomic_claim(claim).await
    }
}
