//! 文本规范化 - 标题/SKU/条码统一为可比较形式
//! 所有函数全量、确定、幂等; 空白输入规范化为空串 (策略层视为无信号)

use deunicode::deunicode;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// 非字母数字字符 (已小写化之后) → 空格
static RE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").expect("Invalid regex"));

/// 标题规范化
///
/// 流程:
/// 1. 去音调/转拉丁 (Ürün → Urun) via deunicode
/// 2. 小写化
/// 3. 标点替换为空格
/// 4. 压缩连续空白并去首尾
pub fn normalize_title(text: &str) -> String {
    let latin = deunicode(text).to_lowercase();
    let clean = RE_PUNCT.replace_all(&latin, " ");
    clean.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SKU/条码规范化: 去音调 + 小写 + 仅保留字母数字
pub fn normalize_code(text: &str) -> String {
    deunicode(text)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// 规范化标题切分为词集合
pub fn title_tokens(normalized_title: &str) -> HashSet<String> {
    normalized_title
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}
