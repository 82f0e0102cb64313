use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::LinkStrategy;

/// 匹配候选 - 单次评估的临时产物
/// raw_score 由策略给出, confidence 由评分器计算 (raw_score * 策略权重)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub product_id: i64,
    pub strategy: LinkStrategy,
    pub raw_score: f64,
    pub confidence: f64,
}

impl MatchCandidate {
    pub fn new(product_id: i64, strategy: LinkStrategy, raw_score: f64) -> Self {
        Self {
            product_id,
            strategy,
            raw_score,
            confidence: 0.0,
        }
    }
}

/// 建议记录 - 供人工审核的候选排名快照
/// 同一行项目重新生成时整体覆盖, 不追加
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub line_item_id: i64,
    pub candidates: Vec<MatchCandidate>,
    pub generated_at: DateTime<Utc>,
}
