pub mod memory;
pub mod pg;

pub use memory::MemLinkStore;
pub use pg::{create_pool, PgLinkStore};

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{
    LinkFields, MatchCandidate, OrderLineItem, PlatformLinkRate, Product, ReconFilter,
    ReconciliationRunStats, SuggestionRecord,
};

/// 持久化边界 - 引擎与数据库之间的唯一接口
/// 实现者: PgLinkStore (生产), MemLinkStore (测试/本地演练)
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// 分页读取未链接行项目, 按 id 升序 (稳定游标, 支持断点续跑)
    async fn get_unlinked_page(
        &self,
        filter: &ReconFilter,
        after_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<OrderLineItem>>;

    /// 候选商品检索: SKU/条码精确命中 或 名称命中任一标题词
    async fn find_candidate_products(
        &self,
        norm_sku: &str,
        norm_barcode: &str,
        title_tokens: &[String],
    ) -> StoreResult<Vec<Product>>;

    async fn get_line_item(&self, id: i64) -> StoreResult<Option<OrderLineItem>>;

    async fn get_product(&self, id: i64) -> StoreResult<Option<Product>>;

    /// 乐观并发条件更新: 版本一致才写入, 返回 false 表示冲突
    async fn update_link_if_version(
        &self,
        id: i64,
        expected_version: i64,
        fields: &LinkFields,
    ) -> StoreResult<bool>;

    /// 手工链接: 无条件写入并递增版本 (手工操作永远胜出)
    async fn apply_manual_link(&self, id: i64, fields: &LinkFields) -> StoreResult<()>;

    /// 解除链接: 清空链接字段并递增版本
    async fn clear_link(&self, id: i64) -> StoreResult<()>;

    /// 保存建议 (同一行项目整体覆盖)
    async fn save_suggestions(&self, id: i64, candidates: &[MatchCandidate]) -> StoreResult<()>;

    async fn get_suggestions(&self, id: i64) -> StoreResult<Option<SuggestionRecord>>;

    async fn delete_suggestions(&self, id: i64) -> StoreResult<()>;

    async fn record_run_stats(&self, stats: &ReconciliationRunStats) -> StoreResult<()>;

    /// 按平台聚合链接率
    async fn link_rate_stats(&self, filter: &ReconFilter) -> StoreResult<Vec<PlatformLinkRate>>;
}
