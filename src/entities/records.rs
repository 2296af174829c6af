use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 领取记录实体
/// 说明:
/// - 每次成功领取产生一条记录，入库后不再修改
/// - user_id + packet_id 上有 unique 组合索引
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 领取用户ID
    pub user_id: i64,
    /// 红包ID
    pub packet_id: i64,
    /// 抢到的金额（分）
    pub amount_cents: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
