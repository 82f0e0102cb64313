//! 评分器 - 策略权重、置信度计算与确定性排名

use crate::models::{LinkStrategy, MatchCandidate};

/// 策略权重: 模糊标题上限 0.75 反映其固有噪声
pub fn strategy_weight(strategy: LinkStrategy) -> f64 {
    match strategy {
        LinkStrategy::ExactBarcode => 1.0,
        LinkStrategy::ExactSku => 0.98,
        LinkStrategy::FuzzyTitle => 0.75,
        LinkStrategy::Manual => 1.0,
    }
}

/// 策略优先级 (小者优先), 用于同置信度的并列裁决
pub fn strategy_priority(strategy: LinkStrategy) -> u8 {
    match strategy {
        LinkStrategy::Manual => 0,
        LinkStrategy::ExactBarcode => 1,
        LinkStrategy::ExactSku => 2,
        LinkStrategy::FuzzyTitle => 3,
    }
}

/// 计算置信度并降序排名
/// 排序键: 置信度降序 → 策略优先级 → 商品ID升序 (测试可重现)
pub fn score_and_rank(mut candidates: Vec<MatchCandidate>) -> Vec<MatchCandidate> {
    for candidate in candidates.iter_mut() {
        candidate.confidence =
            (candidate.raw_score * strategy_weight(candidate.strategy)).clamp(0.0, 1.0);
    }
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| strategy_priority(a.strategy).cmp(&strategy_priority(b.strategy)))
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    candidates
}
