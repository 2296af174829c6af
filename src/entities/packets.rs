use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 红包发放模式
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum PacketMode {
    /// 普通红包，平均分配
    #[sea_orm(num_value = 1)]
    Even,
    /// 手气红包，随机分配
    #[sea_orm(num_value = 2)]
    Lucky,
}

/// 红包实体
/// 说明:
/// - remain_count / remain_amount_cents 只减不增，仅由成功领取修改
/// - remain_count 同时充当条件更新的版本号
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "packets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 创建者用户ID
    pub user_id: i64,
    /// 祝福语
    pub message: String,
    pub mode: PacketMode,
    /// 红包个数
    pub total_count: i64,
    /// 剩余个数
    pub remain_count: i64,
    /// 红包金额（分）
    pub total_amount_cents: i64,
    /// 剩余金额（分）
    pub remain_amount_cents: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
