use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::OrderLineItem;

/// 运行过滤条件 - 不可变值, 每次运行显式传入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconFilter {
    pub platform: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl ReconFilter {
    /// 内存存储用的过滤判断 (Postgres 端由 SQL 实现同样语义)
    pub fn matches(&self, item: &OrderLineItem) -> bool {
        if let Some(platform) = &self.platform {
            if &item.platform != platform {
                return false;
            }
        }
        if let Some(from) = &self.date_from {
            if item.created_at < *from {
                return false;
            }
        }
        if let Some(to) = &self.date_to {
            if item.created_at > *to {
                return false;
            }
        }
        true
    }
}

/// 对账运行统计
/// finished_at 置位后即视为不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationRunStats {
    pub run_id: Uuid,
    pub platform: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processed: u64,
    pub auto_linked: u64,
    pub suggested_only: u64,
    pub skipped_errors: u64,
    pub dry_run: bool,
    pub fatal_error: Option<String>,
}

impl ReconciliationRunStats {
    pub fn start(platform: Option<String>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            platform,
            started_at: Utc::now(),
            finished_at: None,
            processed: 0,
            auto_linked: 0,
            suggested_only: 0,
            skipped_errors: 0,
            dry_run,
            fatal_error: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

/// 按平台聚合的链接率
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformLinkRate {
    pub platform: String,
    pub total: i64,
    pub linked: i64,
    pub link_rate: f64,
}

impl PlatformLinkRate {
    pub fn new(platform: String, total: i64, linked: i64) -> Self {
        let link_rate = if total > 0 {
            linked as f64 / total as f64
        } else {
            0.0
        };
        Self {
            platform,
            total,
            linked,
            link_rate,
        }
    }
}
