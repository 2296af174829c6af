use crate::config::ClaimConfig;
use crate::entities::{packet_entity as packets, record_entity as records};
use crate::error::{AppError, AppResult};
use crate::services::allocation;
use crate::store::{ClaimOutcome, ClaimUpdate, PacketStore};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 领取红包的并发控制器
///
/// 不持有进程内锁；正确性完全由存储网关的条件更新保证。
/// 快照读取（查重、冲突后重载）发生在原子单元之外，读到旧数据
/// 靠重试纠正而不是靠加锁。
#[derive(Clone)]
pub struct PacketService<S> {
    store: S,
    config: ClaimConfig,
}

impl<S: PacketStore> PacketService<S> {
    pub fn new(store: S, config: ClaimConfig) -> Self {
        Self { store, config }
    }

    /// 领取红包
    ///
    /// 传入的 packet 只是只读快照，用来计算分配金额和条件更新的比较值；
    /// 乐观锁冲突后会从存储重新加载，绝不原地修改。
    /// 同一用户重复调用是幂等的，返回第一次的领取记录。
    pub async fn claim(
        &self,
        packet: packets::Model,
        user_id: i64,
        cancel: &CancellationToken,
    ) -> AppResult<records::Model> {
        if user_id <= 0 {
            return Err(AppError::ValidationError("user id must be positive".into()));
        }

        let packet_id = packet.id;
        let mut packet = packet;
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            // 检查是否已经抢过了
            if let Some(record) = self.store.find_record(user_id, packet_id).await? {
                return Ok(record);
            }

            // 检查剩余个数
            if packet.remain_count == 0 {
                return Err(AppError::Exhausted);
            }

            let amount = allocation::share_amount(
                packet.mode,
                packet.remain_count,
                packet.remain_amount_cents,
                self.config.minimum_unit_cents,
                &mut rand::rng(),
            );

            let update = ClaimUpdate {
                packet_id,
                expected_remain_count: packet.remain_count,
                new_remain_count: packet.remain_count - 1,
                new_remain_amount_cents: packet.remain_amount_cents - amount,
                user_id,
                amount_cents: amount,
            };

            match self.store.atomic_claim(&update).await? {
                ClaimOutcome::Applied(record) => {
                    log::info!("user {user_id} claimed {amount} cents from packet {packet_id}");
                    return Ok(record);
                }
                ClaimOutcome::ConditionFailed => {
                    attempts += 1;
                    log::debug!("packet {packet_id} claim lost race, attempt {attempts}");

                    if let Some(max) = self.config.max_attempts
                        && attempts >= max
                    {
                        log::warn!("packet {packet_id} claim gave up after {attempts} attempts");
                        return Err(AppError::Conflict);
                    }

                    // 被别人抢了，退避后继续抢；等待期间允许取消
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AppError::Cancelled),
                        _ = tokio::time::sleep(self.backoff_delay()) => {}
                    }

                    // 获取最新的 packet
                    packet = self
                        .store
                        .find_packet(packet_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("packet {packet_id}")))?;
                }
            }
        }
    }

    /// 固定退避加随机抖动，避免热点红包上的重试同步成波
    fn backoff_delay(&self) -> Duration {
        let jitter = rand::rng().random_range(0..=self.config.jitter_ms);
        Duration::from_millis(self.config.backoff_ms + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PacketMode;
    use crate::store::MemoryPacketStore;
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn packet(id: i64, mode: PacketMode, count: i64, amount_cents: i64) -> packets::Model {
        packets::Model {
            id,
            user_id: 1,
            message: "恭喜发财".to_string(),
            mode,
            total_count: count,
            remain_count: count,
            total_amount_cents: amount_cents,
            remain_amount_cents: amount_cents,
            created_at: None,
            updated_at: None,
        }
    }

    fn fast_config() -> ClaimConfig {
        ClaimConfig {
            backoff_ms: 1,
            jitter_ms: 1,
            ..ClaimConfig::default()
        }
    }

    async fn snapshot(store: &MemoryPacketStore, id: i64) -> packets::Model {
        store.find_packet(id).await.unwrap().unwrap()
    }

    /// 一直返回乐观锁失败的存根，统计提交次数
    struct ConflictStore {
        packet: packets::Model,
        commits: AtomicU32,
    }

    #[async_trait]
    impl PacketStore for ConflictStore {
        async fn find_packet(&self, _id: i64) -> AppResult<Option<packets::Model>> {
            Ok(Some(self.packet.clone()))
        }

        async fn find_record(
            &self,
            _user_id: i64,
            _packet_id: i64,
        ) -> AppResult<Option<records::Model>> {
            Ok(None)
        }

        async fn atomic_claim(&self, _claim: &ClaimUpdate) -> AppResult<ClaimOutcome> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(ClaimOutcome::ConditionFailed)
        }
    }

    /// 提交即报错的存根，验证存储错误不重试
    struct FailingStore {
        commits: AtomicU32,
    }

    #[async_trait]
    impl PacketStore for FailingStore {
        async fn find_packet(&self, id: i64) -> AppResult<Option<packets::Model>> {
            Ok(Some(packet(id, PacketMode::Even, 3, 300)))
        }

        async fn find_record(
            &self,
            _user_id: i64,
            _packet_id: i64,
        ) -> AppResult<Option<records::Model>> {
            Ok(None)
        }

        async fn atomic_claim(&self, _claim: &ClaimUpdate) -> AppResult<ClaimOutcome> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Err(AppError::InternalError("storage offline".into()))
        }
    }

    /// 冲突一次之后红包消失的存根
    struct VanishingStore;

    #[async_trait]
    impl PacketStore for VanishingStore {
        async fn find_packet(&self, _id: i64) -> AppResult<Option<packets::Model>> {
            Ok(None)
        }

        async fn find_record(
            &self,
            _user_id: i64,
            _packet_id: i64,
        ) -> AppResult<Option<records::Model>> {
            Ok(None)
        }

        async fn atomic_claim(&self, _claim: &ClaimUpdate) -> AppResult<ClaimOutcome> {
            Ok(ClaimOutcome::ConditionFailed)
        }
    }

    #[tokio::test]
    async fn even_packet_splits_exactly() {
        init_logs();
        let store = Arc::new(MemoryPacketStore::new());
        store.insert_packet(packet(1, PacketMode::Even, 3, 300)).await;
        let service = PacketService::new(store.clone(), fast_config());
        let cancel = CancellationToken::new();

        for user_id in [11, 12, 13] {
            let snap = snapshot(&store, 1).await;
            let record = service.claim(snap, user_id, &cancel).await.unwrap();
            assert_eq!(record.amount_cents, 100);
        }

        let final_packet = snapshot(&store, 1).await;
        assert_eq!(final_packet.remain_count, 0);
        assert_eq!(final_packet.remain_amount_cents, 0);

        let records = store.records_for_packet(1).await;
        assert_eq!(records.len(), 3);
        let paid: i64 = records.iter().map(|r| r.amount_cents).sum();
        assert_eq!(
            final_packet.total_amount_cents - final_packet.remain_amount_cents,
            paid
        );
    }

    #[tokio::test]
    async fn lucky_packet_bounds_first_share_and_drains_last() {
        let store = Arc::new(MemoryPacketStore::new());
        store.insert_packet(packet(1, PacketMode::Lucky, 2, 100)).await;
        let service = PacketService::new(store.clone(), fast_config());
        let cancel = CancellationToken::new();

        let first = service
            .claim(snapshot(&store, 1).await, 21, &cancel)
            .await
            .unwrap();
        assert!((1..=99).contains(&first.amount_cents));

        // 最后一个包拿到精确的剩余金额
        let second = service
            .claim(snapshot(&store, 1).await, 22, &cancel)
            .await
            .unwrap();
        assert_eq!(second.amount_cents, 100 - first.amount_cents);

        let final_packet = snapshot(&store, 1).await;
        assert_eq!(final_packet.remain_count, 0);
        assert_eq!(final_packet.remain_amount_cents, 0);
    }

    #[tokio::test]
    async fn claim_is_idempotent() {
        let store = Arc::new(MemoryPacketStore::new());
        store.insert_packet(packet(1, PacketMode::Lucky, 3, 300)).await;
        let service = PacketService::new(store.clone(), fast_config());
        let cancel = CancellationToken::new();

        let first = service
            .claim(snapshot(&store, 1).await, 7, &cancel)
            .await
            .unwrap();
        let second = service
            .claim(snapshot(&store, 1).await, 7, &cancel)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.records_for_packet(1).await.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_packet_rejects_new_claimant() {
        let store = Arc::new(MemoryPacketStore::new());
        store.insert_packet(packet(1, PacketMode::Even, 1, 100)).await;
        let service = PacketService::new(store.clone(), fast_config());
        let cancel = CancellationToken::new();

        let record = service
            .claim(snapshot(&store, 1).await, 31, &cancel)
            .await
            .unwrap();
        assert_eq!(record.amount_cents, 100);

        let err = service
            .claim(snapshot(&store, 1).await, 32, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Exhausted));
        assert_eq!(store.records_for_packet(1).await.len(), 1);

        // 抢光之后，已领取用户重复调用仍返回原记录
        let again = service
            .claim(snapshot(&store, 1).await, 31, &cancel)
            .await
            .unwrap();
        assert_eq!(again, record);
    }

    #[tokio::test]
    async fn concurrent_claimants_drain_packet() {
        init_logs();
        let user_count: i64 = 8;
        let store = Arc::new(MemoryPacketStore::new());
        store
            .insert_packet(packet(1, PacketMode::Lucky, user_count, 100 * user_count))
            .await;
        let service = Arc::new(PacketService::new(store.clone(), fast_config()));

        let handles: Vec<_> = (1..=user_count)
            .map(|user_id| {
                let service = service.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    let cancel = CancellationToken::new();
                    let snap = snapshot(&store, 1).await;
                    service.claim(snap, user_id, &cancel).await
                })
            })
            .collect();

        let results = join_all(handles).await;
        for result in results {
            result.unwrap().unwrap();
        }

        let records = store.records_for_packet(1).await;
        assert_eq!(records.len() as i64, user_count);

        let users: HashSet<i64> = records.iter().map(|r| r.user_id).collect();
        assert_eq!(users.len() as i64, user_count);

        for record in &records {
            assert!(record.amount_cents >= 1);
        }
        let paid: i64 = records.iter().map(|r| r.amount_cents).sum();
        assert_eq!(paid, 100 * user_count);

        let final_packet = snapshot(&store, 1).await;
        assert_eq!(final_packet.remain_count, 0);
        assert_eq!(final_packet.remain_amount_cents, 0);
    }

    #[tokio::test]
    async fn stale_snapshot_retries_against_reloaded_state() {
        let store = Arc::new(MemoryPacketStore::new());
        store.insert_packet(packet(1, PacketMode::Even, 2, 200)).await;
        let service = PacketService::new(store.clone(), fast_config());
        let cancel = CancellationToken::new();

        let stale = snapshot(&store, 1).await;
        service
            .claim(stale.clone(), 41, &cancel)
            .await
            .unwrap();

        // 拿着领取前的过期快照再来：先冲突，重载后按最新剩余分配
        let record = service.claim(stale, 42, &cancel).await.unwrap();
        assert_eq!(record.amount_cents, 100);

        let final_packet = snapshot(&store, 1).await;
        assert_eq!(final_packet.remain_count, 0);
        assert_eq!(final_packet.remain_amount_cents, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_returns_cancelled() {
        let store = Arc::new(ConflictStore {
            packet: packet(1, PacketMode::Even, 3, 300),
            commits: AtomicU32::new(0),
        });
        let service = PacketService::new(store.clone(), ClaimConfig::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let service = service.clone();
            let cancel = cancel.clone();
            let snap = store.packet.clone();
            async move { service.claim(snap, 9, &cancel).await }
        });

        // 退避等待期间触发取消
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let store = Arc::new(MemoryPacketStore::new());
        store.insert_packet(packet(1, PacketMode::Even, 3, 300)).await;
        let service = PacketService::new(store.clone(), fast_config());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = service
            .claim(snapshot(&store, 1).await, 9, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert!(store.records_for_packet(1).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_cap_surfaces_conflict() {
        init_logs();
        let store = Arc::new(ConflictStore {
            packet: packet(1, PacketMode::Even, 3, 300),
            commits: AtomicU32::new(0),
        });
        let config = ClaimConfig {
            max_attempts: Some(3),
            ..ClaimConfig::default()
        };
        let service = PacketService::new(store.clone(), config);
        let cancel = CancellationToken::new();

        let err = service
            .claim(store.packet.clone(), 9, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict));
        assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn storage_error_propagates_without_retry() {
        let store = Arc::new(FailingStore {
            commits: AtomicU32::new(0),
        });
        let service = PacketService::new(store.clone(), fast_config());
        let cancel = CancellationToken::new();

        let err = service
            .claim(packet(1, PacketMode::Even, 3, 300), 9, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InternalError(_)));
        assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_packet_reported_not_found() {
        let service = PacketService::new(VanishingStore, ClaimConfig::default());
        let cancel = CancellationToken::new();

        let err = service
            .claim(packet(1, PacketMode::Even, 2, 200), 9, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_non_positive_user_id() {
        let store = Arc::new(MemoryPacketStore::new());
        store.insert_packet(packet(1, PacketMode::Even, 3, 300)).await;
        let service = PacketService::new(store.clone(), fast_config());
        let cancel = CancellationToken::new();

        let err = service
            .claim(snapshot(&store, 1).await, 0, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
