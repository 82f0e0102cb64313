use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    LinkFields, MatchCandidate, OrderLineItem, PlatformLinkRate, Product, ReconFilter,
    ReconciliationRunStats, SuggestionRecord,
};
use crate::normalize;
use crate::store::LinkStore;

/// 内存实现的链接存储 - 测试与本地演练用, 与 PgLinkStore 同一契约
#[derive(Default)]
pub struct MemLinkStore {
    line_items: DashMap<i64, OrderLineItem>,
    products: DashMap<i64, Product>,
    suggestions: DashMap<i64, SuggestionRecord>,
    runs: Mutex<Vec<ReconciliationRunStats>>,
}

impl MemLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_line_item(&self, item: OrderLineItem) {
        self.line_items.insert(item.id, item);
    }

    pub fn insert_product(&self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn line_item(&self, id: i64) -> Option<OrderLineItem> {
        self.line_items.get(&id).map(|i| i.clone())
    }

    pub fn recorded_runs(&self) -> Vec<ReconciliationRunStats> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LinkStore for MemLinkStore {
    async fn get_unlinked_page(
        &self,
        filter: &ReconFilter,
        after_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<OrderLineItem>> {
        let mut page: Vec<OrderLineItem> = self
            .line_items
            .iter()
            .filter(|entry| {
                let item = entry.value();
                !item.is_linked()
                    && filter.matches(item)
                    && after_id.map_or(true, |after| item.id > after)
            })
            .map(|entry| entry.value().clone())
            .collect();
        page.sort_by_key(|item| item.id);
        page.truncate(limit.max(0) as usize);
        Ok(page)
    }

    async fn find_candidate_products(
        &self,
        norm_sku: &str,
        norm_barcode: &str,
        title_tokens: &[String],
    ) -> StoreResult<Vec<Product>> {
        let mut hits: Vec<Product> = self
            .products
            .iter()
            .filter(|entry| {
                let p = entry.value();
                let sku_hit = !norm_sku.is_empty() && normalize::normalize_code(&p.sku) == norm_sku;
                let barcode_hit = !norm_barcode.is_empty()
                    && normalize::normalize_code(&p.barcode) == norm_barcode;
                let name = normalize::normalize_title(&p.name);
                let title_hit = title_tokens.iter().any(|t| name.contains(t.as_str()));
                sku_hit || barcode_hit || title_hit
            })
            .map(|entry| entry.value().clone())
            .collect();
        hits.sort_by_key(|p| p.id);
        Ok(hits)
    }

    async fn get_line_item(&self, id: i64) -> StoreResult<Option<OrderLineItem>> {
        Ok(self.line_items.get(&id).map(|i| i.clone()))
    }

    async fn get_product(&self, id: i64) -> StoreResult<Option<Product>> {
        Ok(self.products.get(&id).map(|p| p.clone()))
    }

    async fn update_link_if_version(
        &self,
        id: i64,
        expected_version: i64,
        fields: &LinkFields,
    ) -> StoreResult<bool> {
        // 与 Postgres 实现一致: 行不存在等同于 rows_affected = 0
        let Some(mut item) = self.line_items.get_mut(&id) else {
            return Ok(false);
        };
        if item.link_version != expected_version {
            return Ok(false);
        }
        item.apply_link(fields);
        Ok(true)
    }

    async fn apply_manual_link(&self, id: i64, fields: &LinkFields) -> StoreResult<()> {
        let mut item = self
            .line_items
            .get_mut(&id)
            .ok_or(StoreError::LineItemNotFound(id))?;
        item.apply_link(fields);
        Ok(())
    }

    async fn clear_link(&self, id: i64) -> StoreResult<()> {
        let mut item = self
            .line_items
            .get_mut(&id)
            .ok_or(StoreError::LineItemNotFound(id))?;
        item.clear_link();
        Ok(())
    }

    async fn save_suggestions(&self, id: i64, candidates: &[MatchCandidate]) -> StoreResult<()> {
        // 整体覆盖旧记录
        self.suggestions.insert(
            id,
            SuggestionRecord {
                line_item_id: id,
                candidates: candidates.to_vec(),
                generated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_suggestions(&self, id: i64) -> StoreResult<Option<SuggestionRecord>> {
        Ok(self.suggestions.get(&id).map(|s| s.clone()))
    }

    async fn delete_suggestions(&self, id: i64) -> StoreResult<()> {
        self.suggestions.remove(&id);
        Ok(())
    }

    async fn record_run_stats(&self, stats: &ReconciliationRunStats) -> StoreResult<()> {
        self.runs
            .lock()
            .map_err(|_| StoreError::Database("runs lock poisoned".to_string()))?
            .push(stats.clone());
        Ok(())
    }

    async fn link_rate_stats(&self, filter: &ReconFilter) -> StoreResult<Vec<PlatformLinkRate>> {
        let mut by_platform: BTreeMap<String, (i64, i64)> = BTreeMap::new();
        for entry in self.line_items.iter() {
            let item = entry.value();
            if !filter.matches(item) {
                continue;
            }
            let slot = by_platform.entry(item.platform.clone()).or_insert((0, 0));
            slot.0 += 1;
            if item.is_linked() {
                slot.1 += 1;
            }
        }
        Ok(by_platform
            .into_iter()
            .map(|(platform, (total, linked))| PlatformLinkRate::new(platform, total, linked))
            .collect())
    }
}
