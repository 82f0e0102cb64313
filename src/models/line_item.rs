use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 链接策略枚举 (落库为 snake_case 字符串)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStrategy {
    ExactBarcode,
    ExactSku,
    FuzzyTitle,
    Manual,
}

impl LinkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStrategy::ExactBarcode => "exact_barcode",
            LinkStrategy::ExactSku => "exact_sku",
            LinkStrategy::FuzzyTitle => "fuzzy_title",
            LinkStrategy::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact_barcode" => Some(LinkStrategy::ExactBarcode),
            "exact_sku" => Some(LinkStrategy::ExactSku),
            "fuzzy_title" => Some(LinkStrategy::FuzzyTitle),
            "manual" => Some(LinkStrategy::Manual),
            _ => None,
        }
    }
}

/// 订单行项目 - 待链接的基本单元
/// 不变量: product_id 有值 ⇔ link_strategy / confidence / linked_at 均有值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: i64,
    pub platform: String,
    pub order_id: i64,
    pub raw_title: String,
    pub raw_sku: String,
    pub raw_barcode: String,
    pub created_at: DateTime<Utc>,
    pub product_id: Option<i64>,
    pub link_strategy: Option<LinkStrategy>,
    pub confidence: Option<f64>,
    pub linked_at: Option<DateTime<Utc>>,
    pub link_version: i64,
}

impl OrderLineItem {
    pub fn is_linked(&self) -> bool {
        self.product_id.is_some()
    }

    /// 写入链接字段并递增版本号
    pub fn apply_link(&mut self, fields: &LinkFields) {
        self.product_id = Some(fields.product_id);
        self.link_strategy = Some(fields.strategy);
        self.confidence = Some(fields.confidence);
        self.linked_at = Some(fields.linked_at);
        self.link_version += 1;
    }

    /// 清除链接字段并递增版本号
    pub fn clear_link(&mut self) {
        self.product_id = None;
        self.link_strategy = None;
        self.confidence = None;
        self.linked_at = None;
        self.link_version += 1;
    }
}

/// 链接写入载荷 (条件更新与手工更新共用)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkFields {
    pub product_id: i64,
    pub strategy: LinkStrategy,
    pub confidence: f64,
    pub linked_at: DateTime<Utc>,
}

impl LinkFields {
    /// 由自动匹配候选构建
    pub fn auto(candidate: &crate::models::MatchCandidate) -> Self {
        Self {
            product_id: candidate.product_id,
            strategy: candidate.strategy,
            confidence: candidate.confidence,
            linked_at: Utc::now(),
        }
    }

    /// 手工链接: 策略固定为 manual, 置信度 1.0
    pub fn manual(product_id: i64) -> Self {
        Self {
            product_id,
            strategy: LinkStrategy::Manual,
            confidence: 1.0,
            linked_at: Utc::now(),
        }
    }
}
