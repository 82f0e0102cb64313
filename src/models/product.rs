use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 商品目录记录 - 本引擎只读
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub barcode: String,
    pub name: String,
    pub category: String,
    pub brand: String,
}
