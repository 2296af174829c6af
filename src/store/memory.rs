use super::{ClaimOutcome, ClaimUpdate, PacketStore};
use crate::entities::{packet_entity as packets, record_entity as records};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// 内存版存储网关，测试与本地联调用
///
/// 单把互斥锁让 atomic_claim 的条件检查、扣减、插入构成一个原子单元，
/// 与数据库实现遵守同一契约。
pub struct MemoryPacketStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    packets: HashMap<i64, packets::Model>,
    records: Vec<records::Model>,
    next_record_id: i64,
}

impl MemoryPacketStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_record_id: 1,
                ..Default::default()
            }),
        }
    }

    /// 预置红包。红包的创建与充值属于外部协作方，这里仅供初始化数据
    pub async fn insert_packet(&self, packet: packets::Model) {
        self.inner.lock().await.packets.insert(packet.id, packet);
    }

    pub async fn records_for_packet(&self, packet_id: i64) -> Vec<records::Model> {
        self.inner
            .lock()
            .await
            .records
            .iter()
            .filter(|r| r.packet_id == packet_id)
            .cloned()
            .collect()
    }
}

impl Default for MemoryPacketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PacketStore for MemoryPacketStore {
    async fn find_packet(&self, id: i64) -> AppResult<Option<packets::Model>> {
        Ok(self.inner.lock().await.packets.get(&id).cloned())
    }

    async fn find_record(
        &self,
        user_id: i64,
        packet_id: i64,
    ) -> AppResult<Option<records::Model>> {
        Ok(self
            .inner
            .lock()
            .await
            .records
            .iter()
            .find(|r| r.user_id == user_id && r.packet_id == packet_id)
            .cloned())
    }

    async fn atomic_claim(&self, claim: &ClaimUpdate) -> AppResult<ClaimOutcome> {
        let mut inner = self.inner.lock().await;

        // 红包不存在或版本号不匹配等价于条件更新命中 0 行
        let matches = inner
            .packets
            .get(&claim.packet_id)
            .is_some_and(|p| p.remain_count == claim.expected_remain_count);
        if !matches {
            return Ok(ClaimOutcome::ConditionFailed);
        }

        // unique(user_id, packet_id) 约束
        if inner
            .records
            .iter()
            .any(|r| r.user_id == claim.user_id && r.packet_id == claim.packet_id)
        {
            return Err(AppError::InternalError(format!(
                "duplicate record for user {} packet {}",
                claim.user_id, claim.packet_id
            )));
        }

        let record = records::Model {
            id: inner.next_record_id,
            user_id: claim.user_id,
            packet_id: claim.packet_id,
            amount_cents: claim.amount_cents,
            created_at: Some(Utc::now()),
        };
        inner.next_record_id += 1;

        if let Some(packet) = inner.packets.get_mut(&claim.packet_id) {
            packet.remain_count = claim.new_remain_count;
            packet.remain_amount_cents = claim.new_remain_amount_cents;
            packet.updated_at = Some(Utc::now());
        }
        inner.records.push(record.clone());

        Ok(ClaimOutcome::Applied(record))
    }
}
