//! 对账运行 - 分页扫描未链接行项目, 评估并持久化判定结果
//!
//! 页内评估并发, 写入顺序执行; 跨运行并发只靠每条的乐观版本检查,
//! 不对行项目表加全局锁

use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::MatchingConfig;
use crate::error::StoreError;
use crate::models::{LinkFields, OrderLineItem, ReconFilter, ReconciliationRunStats};
use crate::service::decision::{decide, LinkDecision};
use crate::service::scorer::score_and_rank;
use crate::service::strategy::{propose_candidates, NormalizedItem, ProductEntry};
use crate::store::LinkStore;

/// 取消信号 - 只在页边界检查, 半处理的页总是完整收尾
pub type CancelFlag = Arc<AtomicBool>;

pub fn cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

/// 单条评估结果, 写入阶段消费
struct ItemOutcome {
    id: i64,
    link_version: i64,
    result: ItemResult,
}

enum ItemResult {
    Decision(LinkDecision),
    StoreFailed(String),
}

/// 对账任务
pub struct ReconciliationJob {
    store: Arc<dyn LinkStore>,
    config: MatchingConfig,
}

impl ReconciliationJob {
    pub fn new(store: Arc<dyn LinkStore>, config: MatchingConfig) -> Self {
        Self { store, config }
    }

    /// 运行入口
    /// 游标按 id 升序推进, 崩溃后重跑可从未链接集合自然续传;
    /// dry_run 下所有写入 (含运行统计落库) 变为空操作
    pub async fn run(
        &self,
        filter: ReconFilter,
        batch_size: i64,
        dry_run: bool,
        cancel: CancelFlag,
    ) -> ReconciliationRunStats {
        let mut stats = ReconciliationRunStats::start(filter.platform.clone(), dry_run);
        let batch_size = batch_size.max(1);
        let mut after_id: Option<i64> = None;
        let mut page_no = 0u64;

        info!(
            "[Recon] Run {}: 开始, platform={:?}, batch_size={}, dry_run={}",
            stats.run_id, filter.platform, batch_size, dry_run
        );

        loop {
            if cancel.load(Ordering::Relaxed) {
                info!("[Recon] Run {}: 收到取消信号, 页边界停止", stats.run_id);
                break;
            }

            // 游标取页: 有限重试, 耗尽视为整轮致命失败
            let page = match self.fetch_page(&filter, after_id, batch_size).await {
                Ok(page) => page,
                Err(e) => {
                    error!("[Recon] Run {}: 取页失败, 运行中止: {}", stats.run_id, e);
                    stats.fatal_error = Some(format!("cursor failure: {}", e));
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            page_no += 1;
            after_id = page.last().map(|item| item.id);

            // 评估阶段: 页内并发, 全部收集后才进入写入阶段
            let concurrency = self.config.worker_concurrency.max(1);
            let outcomes: Vec<ItemOutcome> = stream::iter(
                page.into_iter().map(|item| self.evaluate_item(item)),
            )
            .buffer_unordered(concurrency)
            .collect()
            .await;

            // 写入阶段: 顺序执行 (页内写入顺序与正确性无关)
            for outcome in outcomes {
                self.apply_outcome(outcome, dry_run, &mut stats).await;
            }

            info!(
                "[Recon] Run {}: 第 {} 页完成, processed={}, auto={}, suggested={}, skipped={}",
                stats.run_id,
                page_no,
                stats.processed,
                stats.auto_linked,
                stats.suggested_only,
                stats.skipped_errors
            );
        }

        stats.finish();

        if !dry_run {
            if let Err(e) = self.store.record_run_stats(&stats).await {
                warn!("[Recon] Run {}: 统计落库失败: {}", stats.run_id, e);
            }
        }

        info!(
            "[Recon] Run {}: 结束 - processed={}, auto={}, suggested={}, skipped={}, fatal={:?}",
            stats.run_id,
            stats.processed,
            stats.auto_linked,
            stats.suggested_only,
            stats.skipped_errors,
            stats.fatal_error
        );

        stats
    }

    async fn fetch_page(
        &self,
        filter: &ReconFilter,
        after_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<OrderLineItem>, StoreError> {
        let mut last_err = None;
        for attempt in 1..=self.config.store_attempts.max(1) {
            match self.store.get_unlinked_page(filter, after_id, limit).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!("[Recon] 取页第 {} 次尝试失败: {}", attempt, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Database("page fetch failed".to_string())))
    }

    /// 单条评估: 规范化 → 候选检索 → 策略提案 → 评分 → 判定
    async fn evaluate_item(&self, item: OrderLineItem) -> ItemOutcome {
        let normalized = NormalizedItem::from_line_item(&item);

        // 标题与编码全空: 数据缺陷, 按 NoMatch 处理并计入 processed
        if !normalized.has_signal() {
            warn!("[Recon] 行项目 {} 无可用信号, 跳过匹配", item.id);
            return ItemOutcome {
                id: item.id,
                link_version: item.link_version,
                result: ItemResult::Decision(LinkDecision::NoMatch),
            };
        }

        let tokens = normalized.sorted_tokens();
        let products = match self
            .find_candidates(&normalized.sku, &normalized.barcode, &tokens)
            .await
        {
            Ok(products) => products,
            Err(e) => {
                return ItemOutcome {
                    id: item.id,
                    link_version: item.link_version,
                    result: ItemResult::StoreFailed(e.to_string()),
                }
            }
        };

        let entries: Vec<ProductEntry> = products.into_iter().map(ProductEntry::from_product).collect();
        let proposed = propose_candidates(&normalized, &entries, &self.config);
        let ranked = score_and_rank(proposed);
        ItemOutcome {
            id: item.id,
            link_version: item.link_version,
            result: ItemResult::Decision(decide(ranked, &self.config)),
        }
    }

    async fn find_candidates(
        &self,
        norm_sku: &str,
        norm_barcode: &str,
        tokens: &[String],
    ) -> Result<Vec<crate::models::Product>, StoreError> {
        let mut last_err = None;
        for _ in 0..self.config.store_attempts.max(1) {
            match self
                .store
                .find_candidate_products(norm_sku, norm_barcode, tokens)
                .await
            {
                Ok(products) => return Ok(products),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Database("candidate lookup failed".to_string())))
    }

    /// 写入阶段: 自动链接走条件更新, 版本冲突计入 skipped_errors 不在本轮重试
    /// (下一轮该条仍未链接会被重新考虑, 或已被他人链接而自然排除)
    async fn apply_outcome(
        &self,
        outcome: ItemOutcome,
        dry_run: bool,
        stats: &mut ReconciliationRunStats,
    ) {
        stats.processed += 1;
        match outcome.result {
            ItemResult::StoreFailed(reason) => {
                warn!("[Recon] 行项目 {} 评估失败: {}", outcome.id, reason);
                stats.skipped_errors += 1;
            }
            ItemResult::Decision(LinkDecision::NoMatch) => {}
            ItemResult::Decision(LinkDecision::AutoLink(candidate)) => {
                if dry_run {
                    stats.auto_linked += 1;
                    return;
                }
                let fields = LinkFields::auto(&candidate);
                match self
                    .write_link(outcome.id, outcome.link_version, &fields)
                    .await
                {
                    Ok(true) => stats.auto_linked += 1,
                    Ok(false) => {
                        warn!(
                            "[Recon] 行项目 {} 版本冲突 (期望 {}), 本轮跳过",
                            outcome.id, outcome.link_version
                        );
                        stats.skipped_errors += 1;
                    }
                    Err(e) => {
                        warn!("[Recon] 行项目 {} 链接写入失败: {}", outcome.id, e);
                        stats.skipped_errors += 1;
                    }
                }
            }
            ItemResult::Decision(LinkDecision::SuggestOnly(candidates)) => {
                if dry_run {
                    stats.suggested_only += 1;
                    return;
                }
                match self.write_suggestions(outcome.id, &candidates).await {
                    Ok(()) => stats.suggested_only += 1,
                    Err(e) => {
                        warn!("[Recon] 行项目 {} 建议写入失败: {}", outcome.id, e);
                        stats.skipped_errors += 1;
                    }
                }
            }
        }
    }

    async fn write_link(
        &self,
        id: i64,
        expected_version: i64,
        fields: &LinkFields,
    ) -> Result<bool, StoreError> {
        let mut last_err = None;
        for _ in 0..self.config.store_attempts.max(1) {
            match self
                .store
                .update_link_if_version(id, expected_version, fields)
                .await
            {
                Ok(applied) => return Ok(applied),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Database("link write failed".to_string())))
    }

    async fn write_suggestions(
        &self,
        id: i64,
        candidates: &[crate::models::MatchCandidate],
    ) -> Result<(), StoreError> {
        let mut last_err = None;
        for _ in 0..self.config.store_attempts.max(1) {
            match self.store.save_suggestions(id, candidates).await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Database("suggestion write failed".to_string())))
    }
}
