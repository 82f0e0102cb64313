//! 引擎级集成测试 - 基于内存存储, 不依赖数据库

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use product_link_rust::config::MatchingConfig;
use product_link_rust::error::{StoreError, StoreResult};
use product_link_rust::models::{
    LinkFields, LinkStrategy, MatchCandidate, OrderLineItem, PlatformLinkRate, Product,
    ReconFilter, ReconciliationRunStats, SuggestionRecord,
};
use product_link_rust::service::{cancel_flag, LinkService, ReconciliationJob};
use product_link_rust::store::{LinkStore, MemLinkStore};

fn line_item(id: i64, platform: &str, title: &str, sku: &str, barcode: &str) -> OrderLineItem {
    OrderLineItem {
        id,
        platform: platform.to_string(),
        order_id: id * 100,
        raw_title: title.to_string(),
        raw_sku: sku.to_string(),
        raw_barcode: barcode.to_string(),
        created_at: Utc::now(),
        product_id: None,
        link_strategy: None,
        confidence: None,
        linked_at: None,
        link_version: 0,
    }
}

fn product(id: i64, sku: &str, barcode: &str, name: &str) -> Product {
    Product {
        id,
        sku: sku.to_string(),
        barcode: barcode.to_string(),
        name: name.to_string(),
        category: String::new(),
        brand: String::new(),
    }
}

fn job(store: &Arc<MemLinkStore>) -> ReconciliationJob {
    ReconciliationJob::new(
        Arc::clone(store) as Arc<dyn LinkStore>,
        MatchingConfig::default(),
    )
}

/// 故障注入存储 - 包装内存存储, 按开关让指定操作失败,
/// 用于验证错误路径的统计口径
struct FaultyLinkStore {
    inner: Arc<MemLinkStore>,
    /// Some(n): 第 n+1 次取页起全部失败 (模拟游标级基础设施故障)
    pages_before_cursor_failure: Option<u64>,
    fail_candidate_lookups: bool,
    fail_link_writes: bool,
    fail_suggestion_writes: bool,
    /// Some(pid): 条件写入前先插入一次手工链接, 制造版本冲突
    concurrent_manual_product: Option<i64>,
    page_fetches: AtomicU64,
}

impl FaultyLinkStore {
    fn wrap(inner: Arc<MemLinkStore>) -> Self {
        Self {
            inner,
            pages_before_cursor_failure: None,
            fail_candidate_lookups: false,
            fail_link_writes: false,
            fail_suggestion_writes: false,
            concurrent_manual_product: None,
            page_fetches: AtomicU64::new(0),
        }
    }

    fn broken() -> StoreError {
        StoreError::Database("connection reset by peer".to_string())
    }
}

#[async_trait]
impl LinkStore for FaultyLinkStore {
    async fn get_unlinked_page(
        &self,
        filter: &ReconFilter,
        after_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<OrderLineItem>> {
        if let Some(ok_pages) = self.pages_before_cursor_failure {
            let fetched = self.page_fetches.fetch_add(1, Ordering::SeqCst);
            if fetched >= ok_pages {
                return Err(Self::broken());
            }
        }
        self.inner.get_unlinked_page(filter, after_id, limit).await
    }

    async fn find_candidate_products(
        &self,
        norm_sku: &str,
        norm_barcode: &str,
        title_tokens: &[String],
    ) -> StoreResult<Vec<Product>> {
        if self.fail_candidate_lookups {
            return Err(Self::broken());
        }
        self.inner
            .find_candidate_products(norm_sku, norm_barcode, title_tokens)
            .await
    }

    async fn get_line_item(&self, id: i64) -> StoreResult<Option<OrderLineItem>> {
        self.inner.get_line_item(id).await
    }

    async fn get_product(&self, id: i64) -> StoreResult<Option<Product>> {
        self.inner.get_product(id).await
    }

    async fn update_link_if_version(
        &self,
        id: i64,
        expected_version: i64,
        fields: &LinkFields,
    ) -> StoreResult<bool> {
        if self.fail_link_writes {
            return Err(Self::broken());
        }
        if let Some(product_id) = self.concurrent_manual_product {
            // 读写之间插入一次手工链接, 条件写入将看到过期版本
            self.inner
                .apply_manual_link(id, &LinkFields::manual(product_id))
                .await?;
        }
        self.inner
            .update_link_if_version(id, expected_version, fields)
            .await
    }

    async fn apply_manual_link(&self, id: i64, fields: &LinkFields) -> StoreResult<()> {
        self.inner.apply_manual_link(id, fields).await
    }

    async fn clear_link(&self, id: i64) -> StoreResult<()> {
        self.inner.clear_link(id).await
    }

    async fn save_suggestions(&self, id: i64, candidates: &[MatchCandidate]) -> StoreResult<()> {
        if self.fail_suggestion_writes {
            return Err(Self::broken());
        }
        self.inner.save_suggestions(id, candidates).await
    }

    async fn get_suggestions(&self, id: i64) -> StoreResult<Option<SuggestionRecord>> {
        self.inner.get_suggestions(id).await
    }

    async fn delete_suggestions(&self, id: i64) -> StoreResult<()> {
        self.inner.delete_suggestions(id).await
    }

    async fn record_run_stats(&self, stats: &ReconciliationRunStats) -> StoreResult<()> {
        self.inner.record_run_stats(stats).await
    }

    async fn link_rate_stats(&self, filter: &ReconFilter) -> StoreResult<Vec<PlatformLinkRate>> {
        self.inner.link_rate_stats(filter).await
    }
}

fn faulty_job(store: FaultyLinkStore) -> ReconciliationJob {
    ReconciliationJob::new(Arc::new(store) as Arc<dyn LinkStore>, MatchingConfig::default())
}

#[tokio::test]
async fn barcode_match_auto_links_despite_similar_title() {
    let store = Arc::new(MemLinkStore::new());
    store.insert_product(product(7, "KZK-M-RED", "8691234567890", "Kırmızı Kazak Medium"));
    store.insert_product(product(9, "", "", "Kırmızı Kazak Large"));
    store.insert_line_item(line_item(1, "trendyol", "Kırmızı Kazak M", "", "8691234567890"));

    let stats = job(&store)
        .run(ReconFilter::default(), 10, false, cancel_flag())
        .await;

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.auto_linked, 1);
    assert_eq!(stats.skipped_errors, 0);
    assert!(stats.fatal_error.is_none());

    let item = store.line_item(1).expect("line item");
    assert_eq!(item.product_id, Some(7));
    assert_eq!(item.link_strategy, Some(LinkStrategy::ExactBarcode));
    assert_eq!(item.confidence, Some(1.0));
    assert!(item.linked_at.is_some());
    assert_eq!(item.link_version, 1);
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let store = Arc::new(MemLinkStore::new());
    for i in 1..=5 {
        store.insert_product(product(i, "", &format!("869000{:07}", i), &format!("Ürün {}", i)));
        store.insert_line_item(line_item(i, "n11", &format!("Ürün {}", i), "", &format!("869000{:07}", i)));
    }

    let first = job(&store)
        .run(ReconFilter::default(), 2, false, cancel_flag())
        .await;
    assert_eq!(first.auto_linked, 5);

    let snapshot = store.line_item(3).expect("item 3");

    let second = job(&store)
        .run(ReconFilter::default(), 2, false, cancel_flag())
        .await;
    // 第二轮不再有未链接项, 总 auto_linked 数与单轮一致
    assert_eq!(second.processed, 0);
    assert_eq!(second.auto_linked, 0);

    let after = store.line_item(3).expect("item 3");
    assert_eq!(after.product_id, snapshot.product_id);
    assert_eq!(after.linked_at, snapshot.linked_at);
    assert_eq!(after.link_version, snapshot.link_version);
}

#[tokio::test]
async fn dry_run_returns_live_counts_without_writing() {
    let dry_store = Arc::new(MemLinkStore::new());
    let live_store = Arc::new(MemLinkStore::new());
    for store in [&dry_store, &live_store] {
        for i in 1..=50 {
            store.insert_product(product(i, "", &format!("869111{:07}", i), &format!("Ürün {}", i)));
            store.insert_line_item(line_item(
                i,
                "hepsiburada",
                &format!("Ürün {}", i),
                "",
                &format!("869111{:07}", i),
            ));
        }
    }

    let dry = job(&dry_store)
        .run(ReconFilter::default(), 10, true, cancel_flag())
        .await;
    let live = job(&live_store)
        .run(ReconFilter::default(), 10, false, cancel_flag())
        .await;

    assert_eq!(dry.processed, live.processed);
    assert_eq!(dry.auto_linked, live.auto_linked);
    assert_eq!(dry.suggested_only, live.suggested_only);
    assert_eq!(dry.skipped_errors, live.skipped_errors);
    assert_eq!(dry.processed, 50);

    // 演练模式下所有 50 条仍未链接, 且不落运行统计
    for i in 1..=50 {
        assert_eq!(dry_store.line_item(i).expect("item").product_id, None);
    }
    assert!(dry_store.recorded_runs().is_empty());
    assert_eq!(live_store.recorded_runs().len(), 1);
}

#[tokio::test]
async fn ambiguous_titles_produce_suggestions_not_links() {
    let store = Arc::new(MemLinkStore::new());
    store.insert_product(product(7, "", "", "Kırmızı Kazak Medium"));
    store.insert_product(product(9, "", "", "Kırmızı Kazak Large"));
    store.insert_line_item(line_item(1, "trendyol", "Kırmızı Kazak", "", ""));

    let stats = job(&store)
        .run(ReconFilter::default(), 10, false, cancel_flag())
        .await;

    assert_eq!(stats.suggested_only, 1);
    assert_eq!(stats.auto_linked, 0);
    assert_eq!(store.line_item(1).expect("item").product_id, None);

    let record = store.get_suggestions(1).await.expect("store ok").expect("record");
    assert_eq!(record.candidates.len(), 2);
    assert!(record.candidates[0].confidence >= record.candidates[1].confidence);
    for candidate in &record.candidates {
        assert_eq!(candidate.strategy, LinkStrategy::FuzzyTitle);
        assert!(candidate.confidence <= 0.75);
    }
}

#[tokio::test]
async fn stale_version_write_never_overwrites_manual_link() {
    let store = Arc::new(MemLinkStore::new());
    store.insert_product(product(7, "A-1", "1111111111111", "Ürün A"));
    store.insert_product(product(8, "B-1", "2222222222222", "Ürün B"));
    store.insert_line_item(line_item(1, "n11", "Ürün", "", "1111111111111"));

    // 批处理读到版本 0 之后, 人工先一步链接
    let read_version = store.line_item(1).expect("item").link_version;
    let service = LinkService::new(Arc::clone(&store) as Arc<dyn LinkStore>);
    service.manual_link(1, 8).await.expect("manual link");

    let candidate = MatchCandidate {
        product_id: 7,
        strategy: LinkStrategy::ExactBarcode,
        raw_score: 1.0,
        confidence: 1.0,
    };
    let applied = store
        .update_link_if_version(1, read_version, &LinkFields::auto(&candidate))
        .await
        .expect("store ok");

    assert!(!applied);
    let item = store.line_item(1).expect("item");
    assert_eq!(item.product_id, Some(8));
    assert_eq!(item.link_strategy, Some(LinkStrategy::Manual));
    assert_eq!(item.confidence, Some(1.0));
}

#[tokio::test]
async fn cancellation_returns_partial_finished_stats() {
    let store = Arc::new(MemLinkStore::new());
    store.insert_line_item(line_item(1, "n11", "Ürün", "", "1234567890123"));

    let cancel = cancel_flag();
    cancel.store(true, std::sync::atomic::Ordering::Relaxed);
    let stats = job(&store).run(ReconFilter::default(), 10, false, cancel).await;

    assert_eq!(stats.processed, 0);
    assert!(stats.finished_at.is_some());
    assert!(stats.fatal_error.is_none());
}

#[tokio::test]
async fn regenerated_suggestions_supersede_previous() {
    let store = Arc::new(MemLinkStore::new());
    store.insert_line_item(line_item(1, "n11", "Ürün", "", ""));

    let first = vec![
        MatchCandidate {
            product_id: 7,
            strategy: LinkStrategy::FuzzyTitle,
            raw_score: 0.8,
            confidence: 0.6,
        },
        MatchCandidate {
            product_id: 9,
            strategy: LinkStrategy::FuzzyTitle,
            raw_score: 0.7,
            confidence: 0.52,
        },
    ];
    store.save_suggestions(1, &first).await.expect("save");

    let second = vec![MatchCandidate {
        product_id: 12,
        strategy: LinkStrategy::FuzzyTitle,
        raw_score: 0.9,
        confidence: 0.67,
    }];
    store.save_suggestions(1, &second).await.expect("save");

    let record = store.get_suggestions(1).await.expect("ok").expect("record");
    assert_eq!(record.candidates.len(), 1);
    assert_eq!(record.candidates[0].product_id, 12);
}

#[tokio::test]
async fn unlink_clears_fields_and_invalidates_suggestions() {
    let store = Arc::new(MemLinkStore::new());
    store.insert_product(product(7, "A-1", "1111111111111", "Ürün A"));
    store.insert_line_item(line_item(1, "n11", "Ürün A", "", ""));

    let service = LinkService::new(Arc::clone(&store) as Arc<dyn LinkStore>);
    let linked = service.manual_link(1, 7).await.expect("link");
    assert_eq!(linked.product_id, Some(7));
    assert_eq!(linked.link_version, 1);

    let stale = vec![MatchCandidate {
        product_id: 7,
        strategy: LinkStrategy::FuzzyTitle,
        raw_score: 0.8,
        confidence: 0.6,
    }];
    store.save_suggestions(1, &stale).await.expect("save");

    let unlinked = service.unlink(1).await.expect("unlink");
    assert_eq!(unlinked.product_id, None);
    assert_eq!(unlinked.link_strategy, None);
    assert_eq!(unlinked.confidence, None);
    assert_eq!(unlinked.linked_at, None);
    assert_eq!(unlinked.link_version, 2);
    assert!(store.get_suggestions(1).await.expect("ok").is_none());
}

#[tokio::test]
async fn missing_signal_counts_as_processed_not_error() {
    let store = Arc::new(MemLinkStore::new());
    store.insert_product(product(7, "A-1", "1111111111111", "Ürün A"));
    store.insert_line_item(line_item(1, "n11", "   ", "", ""));

    let stats = job(&store)
        .run(ReconFilter::default(), 10, false, cancel_flag())
        .await;

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.auto_linked, 0);
    assert_eq!(stats.suggested_only, 0);
    assert_eq!(stats.skipped_errors, 0);
    assert!(store.get_suggestions(1).await.expect("ok").is_none());
}

#[tokio::test]
async fn platform_filter_scopes_the_run() {
    let store = Arc::new(MemLinkStore::new());
    store.insert_product(product(1, "", "1111111111111", "Ürün A"));
    store.insert_product(product(2, "", "2222222222222", "Ürün B"));
    store.insert_line_item(line_item(1, "trendyol", "Ürün A", "", "1111111111111"));
    store.insert_line_item(line_item(2, "n11", "Ürün B", "", "2222222222222"));

    let filter = ReconFilter {
        platform: Some("trendyol".to_string()),
        ..Default::default()
    };
    let stats = job(&store).run(filter, 10, false, cancel_flag()).await;

    assert_eq!(stats.processed, 1);
    assert_eq!(store.line_item(1).expect("item").product_id, Some(1));
    assert_eq!(store.line_item(2).expect("item").product_id, None);

    let rates = store.link_rate_stats(&ReconFilter::default()).await.expect("ok");
    assert_eq!(rates.len(), 2);
    let n11 = rates.iter().find(|r| r.platform == "n11").expect("n11");
    assert_eq!(n11.total, 1);
    assert_eq!(n11.linked, 0);
    let trendyol = rates.iter().find(|r| r.platform == "trendyol").expect("trendyol");
    assert_eq!(trendyol.linked, 1);
    assert!((trendyol.link_rate - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn candidate_lookup_failure_counts_skipped_errors() {
    let inner = Arc::new(MemLinkStore::new());
    inner.insert_product(product(7, "", "1111111111111", "Ürün A"));
    inner.insert_line_item(line_item(1, "n11", "Ürün A", "", "1111111111111"));

    let store = FaultyLinkStore {
        fail_candidate_lookups: true,
        ..FaultyLinkStore::wrap(Arc::clone(&inner))
    };
    let stats = faulty_job(store)
        .run(ReconFilter::default(), 10, false, cancel_flag())
        .await;

    // 重试耗尽后计入 skipped_errors, 运行不中止
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped_errors, 1);
    assert_eq!(stats.auto_linked, 0);
    assert!(stats.fatal_error.is_none());
    assert_eq!(inner.line_item(1).expect("item").product_id, None);
}

#[tokio::test]
async fn link_write_failure_counts_skipped_errors() {
    let inner = Arc::new(MemLinkStore::new());
    inner.insert_product(product(7, "", "1111111111111", "Ürün A"));
    inner.insert_line_item(line_item(1, "n11", "Ürün A", "", "1111111111111"));

    let store = FaultyLinkStore {
        fail_link_writes: true,
        ..FaultyLinkStore::wrap(Arc::clone(&inner))
    };
    let stats = faulty_job(store)
        .run(ReconFilter::default(), 10, false, cancel_flag())
        .await;

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.auto_linked, 0);
    assert_eq!(stats.skipped_errors, 1);
    assert_eq!(inner.line_item(1).expect("item").product_id, None);
}

#[tokio::test]
async fn suggestion_write_failure_counts_skipped_errors() {
    let inner = Arc::new(MemLinkStore::new());
    inner.insert_product(product(7, "", "", "Kırmızı Kazak Medium"));
    inner.insert_product(product(9, "", "", "Kırmızı Kazak Large"));
    inner.insert_line_item(line_item(1, "trendyol", "Kırmızı Kazak", "", ""));

    let store = FaultyLinkStore {
        fail_suggestion_writes: true,
        ..FaultyLinkStore::wrap(Arc::clone(&inner))
    };
    let stats = faulty_job(store)
        .run(ReconFilter::default(), 10, false, cancel_flag())
        .await;

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.suggested_only, 0);
    assert_eq!(stats.skipped_errors, 1);
    assert!(inner.get_suggestions(1).await.expect("ok").is_none());
}

#[tokio::test]
async fn version_conflict_in_run_counts_skipped_and_keeps_manual_link() {
    let inner = Arc::new(MemLinkStore::new());
    inner.insert_product(product(7, "", "1111111111111", "Ürün A"));
    inner.insert_product(product(8, "", "2222222222222", "Ürün B"));
    inner.insert_line_item(line_item(1, "n11", "Ürün A", "", "1111111111111"));

    // 评估与写入之间插入一次手工链接: 任务的条件写入必须失败让位
    let store = FaultyLinkStore {
        concurrent_manual_product: Some(8),
        ..FaultyLinkStore::wrap(Arc::clone(&inner))
    };
    let stats = faulty_job(store)
        .run(ReconFilter::default(), 10, false, cancel_flag())
        .await;

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.auto_linked, 0);
    assert_eq!(stats.skipped_errors, 1);
    assert!(stats.fatal_error.is_none());

    let item = inner.line_item(1).expect("item");
    assert_eq!(item.product_id, Some(8));
    assert_eq!(item.link_strategy, Some(LinkStrategy::Manual));
}

#[tokio::test]
async fn cursor_failure_is_fatal_with_accumulated_counts() {
    let inner = Arc::new(MemLinkStore::new());
    for i in 1..=2 {
        inner.insert_product(product(i, "", &format!("869222{:07}", i), &format!("Ürün {}", i)));
        inner.insert_line_item(line_item(i, "n11", &format!("Ürün {}", i), "", &format!("869222{:07}", i)));
    }

    // 第一页成功, 之后取页持续失败 (含重试)
    let store = FaultyLinkStore {
        pages_before_cursor_failure: Some(1),
        ..FaultyLinkStore::wrap(Arc::clone(&inner))
    };
    let stats = faulty_job(store).run(ReconFilter::default(), 1, false, cancel_flag()).await;

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.auto_linked, 1);
    let fatal = stats.fatal_error.expect("fatal error");
    assert!(fatal.contains("cursor failure"));
    assert!(stats.finished_at.is_some());
    assert_eq!(inner.line_item(1).expect("item").product_id, Some(1));
    assert_eq!(inner.line_item(2).expect("item").product_id, None);
}

#[tokio::test]
async fn conditional_write_on_missing_item_reports_no_application() {
    let store = Arc::new(MemLinkStore::new());
    let candidate = MatchCandidate {
        product_id: 7,
        strategy: LinkStrategy::ExactBarcode,
        raw_score: 1.0,
        confidence: 1.0,
    };
    // 与 Postgres 实现一致: 行不存在时返回 false 而非错误
    let applied = store
        .update_link_if_version(42, 0, &LinkFields::auto(&candidate))
        .await
        .expect("store ok");
    assert!(!applied);
}
