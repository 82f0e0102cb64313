use thiserror::Error;

/// 存储边界错误
/// 版本冲突不在此列: 条件更新以 Ok(false) 表达冲突
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("line item not found: {0}")]
    LineItemNotFound(i64),
    #[error("product not found: {0}")]
    ProductNotFound(i64),
    #[error("no suggestions for line item: {0}")]
    SuggestionsNotFound(i64),
    #[error("storage timeout")]
    Timeout,
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Database(format!("json: {}", error))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
