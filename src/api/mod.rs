pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::config::MatchingConfig;
use crate::store::LinkStore;

/// 共享状态: 存储边界 + 匹配阈值配置
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LinkStore>,
    pub matching: MatchingConfig,
}

/// 构建路由 (测试可直接 oneshot 调用)
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/reconcile/run", post(handlers::run_reconciliation))
        .route(
            "/reconcile/suggestions/:line_item_id",
            get(handlers::get_suggestions),
        )
        .route(
            "/reconcile/link/:line_item_id",
            post(handlers::manual_link).delete(handlers::unlink),
        )
        .route("/reconcile/stats", get(handlers::link_stats))
        .with_state(state)
}
