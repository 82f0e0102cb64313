use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::AppState;
use crate::error::StoreError;
use crate::models::{PlatformLinkRate, ReconFilter};
use crate::service::{cancel_flag, LinkService, ReconciliationJob};

/// 请求体: 触发一轮对账
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub platform: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub batch_size: Option<i64>,
    #[serde(default)]
    pub dry_run: bool,
}

/// 请求体: 手工链接
#[derive(Debug, Deserialize)]
pub struct ManualLinkRequest {
    pub product_id: i64,
}

/// 统计查询参数
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub platform: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub format: Option<String>,
}

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

fn error_response(e: &StoreError) -> Response {
    let status = match e {
        StoreError::LineItemNotFound(_)
        | StoreError::ProductNotFound(_)
        | StoreError::SuggestionsNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Timeout | StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorResponse {
        success: false,
        message: e.to_string(),
    };
    (status, Json(body)).into_response()
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 触发一轮对账
/// 响应总是携带计数与 fatal_error 字段 (成功时为 null)
pub async fn run_reconciliation(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Response {
    let filter = ReconFilter {
        platform: req.platform,
        date_from: req.date_from,
        date_to: req.date_to,
    };
    let batch_size = req.batch_size.unwrap_or(200);
    let job = ReconciliationJob::new(Arc::clone(&state.store), state.matching.clone());
    let stats = job.run(filter, batch_size, req.dry_run, cancel_flag()).await;
    (StatusCode::OK, Json(stats)).into_response()
}

/// 查询某行项目的建议记录
pub async fn get_suggestions(
    State(state): State<AppState>,
    Path(line_item_id): Path<i64>,
) -> Response {
    let service = LinkService::new(Arc::clone(&state.store));
    match service.suggestions(line_item_id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// 手工链接
pub async fn manual_link(
    State(state): State<AppState>,
    Path(line_item_id): Path<i64>,
    Json(req): Json<ManualLinkRequest>,
) -> Response {
    let service = LinkService::new(Arc::clone(&state.store));
    match service.manual_link(line_item_id, req.product_id).await {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// 解除链接
pub async fn unlink(State(state): State<AppState>, Path(line_item_id): Path<i64>) -> Response {
    let service = LinkService::new(Arc::clone(&state.store));
    match service.unlink(line_item_id).await {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// 按平台聚合链接率, format=csv 时导出 CSV
pub async fn link_stats(State(state): State<AppState>, Query(query): Query<StatsQuery>) -> Response {
    let filter = ReconFilter {
        platform: query.platform,
        date_from: query.date_from,
        date_to: query.date_to,
    };
    let rows = match state.store.link_rate_stats(&filter).await {
        Ok(rows) => rows,
        Err(e) => return error_response(&e),
    };

    if query.format.as_deref() == Some("csv") {
        return match stats_to_csv(&rows) {
            Ok(csv_body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
                csv_body,
            )
                .into_response(),
            Err(message) => {
                let body = ErrorResponse {
                    success: false,
                    message,
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        };
    }

    (StatusCode::OK, Json(rows)).into_response()
}

/// 链接率导出为 CSV 文本
fn stats_to_csv(rows: &[PlatformLinkRate]) -> Result<String, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["platform", "total", "linked", "link_rate"])
        .map_err(|e| e.to_string())?;
    for row in rows {
        writer
            .write_record(&[
                row.platform.clone(),
                row.total.to_string(),
                row.linked.to_string(),
                format!("{:.4}", row.link_rate),
            ])
            .map_err(|e| e.to_string())?;
    }
    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}
