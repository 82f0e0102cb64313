//! 匹配策略集 - 固定优先级 [精确条码, 精确SKU, 模糊标题] + 品牌/品类加权后处理
//! 策略只读不写, 在预规范化的行项目与商品索引上运行

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::config::MatchingConfig;
use crate::models::{LinkStrategy, MatchCandidate, OrderLineItem, Product};
use crate::normalize;

/// 行项目的规范化视图 - 每次评估前构建一次
#[derive(Debug, Clone)]
pub struct NormalizedItem {
    pub sku: String,
    pub barcode: String,
    pub title: String,
    pub title_tokens: HashSet<String>,
}

impl NormalizedItem {
    pub fn from_line_item(item: &OrderLineItem) -> Self {
        let title = normalize::normalize_title(&item.raw_title);
        let title_tokens = normalize::title_tokens(&title);
        Self {
            sku: normalize::normalize_code(&item.raw_sku),
            barcode: normalize::normalize_code(&item.raw_barcode),
            title,
            title_tokens,
        }
    }

    /// 标题与编码全空 = 无信号 (DataError, 按 NoMatch 处理)
    pub fn has_signal(&self) -> bool {
        !self.title.is_empty() || !self.sku.is_empty() || !self.barcode.is_empty()
    }

    /// 存储层候选检索用的词列表 (排序保证可重现)
    pub fn sorted_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.title_tokens.iter().cloned().collect();
        tokens.sort();
        tokens
    }
}

/// 商品索引条目 - 规范化字段预计算
#[derive(Debug, Clone)]
pub struct ProductEntry {
    pub product: Product,
    pub sku: String,
    pub barcode: String,
    pub name: String,
    pub name_tokens: HashSet<String>,
    pub brand_tokens: HashSet<String>,
    pub category_tokens: HashSet<String>,
}

impl ProductEntry {
    pub fn from_product(product: Product) -> Self {
        let name = normalize::normalize_title(&product.name);
        let name_tokens = normalize::title_tokens(&name);
        let brand_tokens = normalize::title_tokens(&normalize::normalize_title(&product.brand));
        let category_tokens =
            normalize::title_tokens(&normalize::normalize_title(&product.category));
        Self {
            sku: normalize::normalize_code(&product.sku),
            barcode: normalize::normalize_code(&product.barcode),
            name,
            name_tokens,
            brand_tokens,
            category_tokens,
            product,
        }
    }
}

/// 按固定顺序运行所有策略并合并候选
/// 精确策略短路: 条码或SKU命中任一候选时跳过模糊标题匹配
pub fn propose_candidates(
    item: &NormalizedItem,
    products: &[ProductEntry],
    config: &MatchingConfig,
) -> Vec<MatchCandidate> {
    // 保序去重合并: 同一商品保留最先 (最高优先级) 的候选
    let mut merged: IndexMap<i64, MatchCandidate> = IndexMap::new();

    let exact = [
        exact_barcode(item, products),
        exact_sku(item, products),
    ];
    for batch in exact {
        for candidate in batch {
            merged.entry(candidate.product_id).or_insert(candidate);
        }
    }

    if merged.is_empty() {
        for candidate in fuzzy_title(item, products, config) {
            merged.entry(candidate.product_id).or_insert(candidate);
        }
    }

    let mut candidates: Vec<MatchCandidate> = merged.into_values().collect();
    apply_brand_category_boost(&mut candidates, item, products);
    candidates
}

/// 精确条码: 规范化条码非空且相等, rawScore = 1.0
fn exact_barcode(item: &NormalizedItem, products: &[ProductEntry]) -> Vec<MatchCandidate> {
    if item.barcode.is_empty() {
        return Vec::new();
    }
    products
        .iter()
        .filter(|entry| entry.barcode == item.barcode)
        .map(|entry| MatchCandidate::new(entry.product.id, LinkStrategy::ExactBarcode, 1.0))
        .collect()
}

/// 精确SKU: 规范化SKU非空且相等, rawScore = 1.0
fn exact_sku(item: &NormalizedItem, products: &[ProductEntry]) -> Vec<MatchCandidate> {
    if item.sku.is_empty() {
        return Vec::new();
    }
    products
        .iter()
        .filter(|entry| entry.sku == item.sku)
        .map(|entry| MatchCandidate::new(entry.product.id, LinkStrategy::ExactSku, 1.0))
        .collect()
}

/// 模糊标题: 0.5·词集Jaccard + 0.5·(1 − 归一化编辑距离)
/// 低于 fuzzy_floor 不产出, 按分数取前 max_suggestions 个控制成本
fn fuzzy_title(
    item: &NormalizedItem,
    products: &[ProductEntry],
    config: &MatchingConfig,
) -> Vec<MatchCandidate> {
    if item.title.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<MatchCandidate> = products
        .iter()
        .filter(|entry| !entry.name.is_empty())
        .filter_map(|entry| {
            let jaccard = token_jaccard(&item.title_tokens, &entry.name_tokens);
            let similarity = strsim::normalized_levenshtein(&item.title, &entry.name);
            let blended = 0.5 * jaccard + 0.5 * similarity;
            if blended >= config.fuzzy_floor {
                Some(MatchCandidate::new(
                    entry.product.id,
                    LinkStrategy::FuzzyTitle,
                    blended,
                ))
            } else {
                None
            }
        })
        .collect();
    scored.sort_by(|a, b| {
        b.raw_score
            .total_cmp(&a.raw_score)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    scored.truncate(config.max_suggestions);
    scored
}

/// 品牌/品类加权后处理: 不独立产出候选, 只给既有候选 +0.05
/// rawScore 封顶 1.0
fn apply_brand_category_boost(
    candidates: &mut [MatchCandidate],
    item: &NormalizedItem,
    products: &[ProductEntry],
) {
    for candidate in candidates.iter_mut() {
        let Some(entry) = products.iter().find(|e| e.product.id == candidate.product_id) else {
            continue;
        };
        if tokens_present(&item.title_tokens, &entry.brand_tokens)
            || tokens_present(&item.title_tokens, &entry.category_tokens)
        {
            candidate.raw_score = (candidate.raw_score + 0.05).min(1.0);
        }
    }
}

fn tokens_present(title_tokens: &HashSet<String>, tokens: &HashSet<String>) -> bool {
    !tokens.is_empty() && tokens.iter().all(|t| title_tokens.contains(t))
}

fn token_jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
