//! 手工链接路径 - 由管理端调用, 不属于自动任务
//! 无条件写入并递增版本号, 使并发批处理的乐观写入必然失败让位

use std::sync::Arc;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::models::{LinkFields, OrderLineItem, SuggestionRecord};
use crate::store::LinkStore;

pub struct LinkService {
    store: Arc<dyn LinkStore>,
}

impl LinkService {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self { store }
    }

    /// 手工链接: 商品与行项目必须存在, 快速失败且绝不部分生效
    /// 策略固定 manual, 置信度 1.0
    pub async fn manual_link(
        &self,
        line_item_id: i64,
        product_id: i64,
    ) -> StoreResult<OrderLineItem> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or(StoreError::ProductNotFound(product_id))?;
        self.store
            .get_line_item(line_item_id)
            .await?
            .ok_or(StoreError::LineItemNotFound(line_item_id))?;

        let fields = LinkFields::manual(product_id);
        self.store.apply_manual_link(line_item_id, &fields).await?;
        info!("[Link] 行项目 {} 手工链接至商品 {}", line_item_id, product_id);

        self.store
            .get_line_item(line_item_id)
            .await?
            .ok_or(StoreError::LineItemNotFound(line_item_id))
    }

    /// 解除链接: 清空链接字段, 递增版本, 并作废缓存的建议记录
    pub async fn unlink(&self, line_item_id: i64) -> StoreResult<OrderLineItem> {
        self.store
            .get_line_item(line_item_id)
            .await?
            .ok_or(StoreError::LineItemNotFound(line_item_id))?;

        self.store.clear_link(line_item_id).await?;
        self.store.delete_suggestions(line_item_id).await?;
        info!("[Link] 行项目 {} 已解除链接", line_item_id);

        self.store
            .get_line_item(line_item_id)
            .await?
            .ok_or(StoreError::LineItemNotFound(line_item_id))
    }

    /// 查询建议记录
    pub async fn suggestions(&self, line_item_id: i64) -> StoreResult<SuggestionRecord> {
        self.store
            .get_suggestions(line_item_id)
            .await?
            .ok_or(StoreError::SuggestionsNotFound(line_item_id))
    }
}
