//! 链接判定 - 每个行项目每轮运行评估一次
//! Unlinked → {AutoLinked, SuggestedOnly, NoMatch}; Linked 对自动路径是终态

use crate::config::MatchingConfig;
use crate::models::MatchCandidate;

/// 单个行项目的判定结果
#[derive(Debug, Clone)]
pub enum LinkDecision {
    /// 高置信且无歧义, 自动链接
    AutoLink(MatchCandidate),
    /// 置信不足或存在歧义, 保留排名候选供人工裁决
    SuggestOnly(Vec<MatchCandidate>),
    /// 无候选, 不写建议记录 (避免存空噪声)
    NoMatch,
}

/// 判定规则:
/// - 无候选 → NoMatch
/// - top ≥ auto_link_threshold 且领先第二名 ≥ ambiguity_gap → AutoLink
/// - 其余 → SuggestOnly (截断至 max_suggestions)
///
/// 歧义保护针对颜色/尺码变体: 两个近不可分的候选宁可交给人工,
/// 错误的自动链接比空结果更糟
pub fn decide(ranked: Vec<MatchCandidate>, config: &MatchingConfig) -> LinkDecision {
    let Some(top) = ranked.first() else {
        return LinkDecision::NoMatch;
    };

    if top.confidence >= config.auto_link_threshold {
        let unambiguous = match ranked.get(1) {
            None => true,
            Some(second) => top.confidence - second.confidence >= config.ambiguity_gap,
        };
        if unambiguous {
            return LinkDecision::AutoLink(top.clone());
        }
    }

    let mut suggestions = ranked;
    suggestions.truncate(config.max_suggestions);
    LinkDecision::SuggestOnly(suggestions)
}
