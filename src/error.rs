use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 红包已抢光
    #[error("packet exhausted")]
    Exhausted,

    /// 调用方取消信号触发（含退避等待期间）
    #[error("claim cancelled")]
    Cancelled,

    /// 配置了尝试上限且已用完
    #[error("claim conflict: retry attempts exceeded")]
    Conflict,

    #[error("Internal error: {0}")]
    InternalError(String),
}
