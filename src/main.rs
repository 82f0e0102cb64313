use std::sync::Arc;

use product_link_rust::api::{self, AppState};
use product_link_rust::{create_pool, AppConfig, PgLinkStore};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env();
    info!("Starting server with config: {:?}", config);

    // 创建数据库连接池
    let pool = create_pool(&config.database.url).await?;
    info!("Database pool created");

    // 构建共享状态与路由
    let state = AppState {
        store: Arc::new(PgLinkStore::new(pool)),
        matching: config.matching.clone(),
    };
    let app = api::router(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST   /reconcile/run                        - 触发一轮对账 (支持 dry_run)");
    info!("  GET    /reconcile/suggestions/:line_item_id  - 查询建议记录");
    info!("  POST   /reconcile/link/:line_item_id         - 手工链接");
    info!("  DELETE /reconcile/link/:line_item_id         - 解除链接");
    info!("  GET    /reconcile/stats                      - 平台链接率 (format=csv 可导出)");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
