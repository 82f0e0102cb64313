use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    LinkFields, LinkStrategy, MatchCandidate, OrderLineItem, PlatformLinkRate, Product,
    ReconFilter, ReconciliationRunStats, SuggestionRecord,
};
use crate::store::LinkStore;

/// 创建数据库连接池
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let mut connect_options = PgConnectOptions::from_str(database_url)?;

    // 设置慢查询日志阈值为 5秒
    connect_options = connect_options.log_slow_statements(
        tracing::log::LevelFilter::Warn,
        Duration::from_secs(5),
    );

    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options)
        .await
}

/// Postgres 实现的链接存储
pub struct PgLinkStore {
    pool: PgPool,
}

impl PgLinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// 行项目查询行 - 策略列以字符串落库, 读出时解析
#[derive(Debug, FromRow)]
struct LineItemRow {
    id: i64,
    platform: String,
    order_id: i64,
    raw_title: String,
    raw_sku: String,
    raw_barcode: String,
    created_at: DateTime<Utc>,
    product_id: Option<i64>,
    link_strategy: Option<String>,
    confidence: Option<f64>,
    linked_at: Option<DateTime<Utc>>,
    link_version: i64,
}

impl From<LineItemRow> for OrderLineItem {
    fn from(row: LineItemRow) -> Self {
        OrderLineItem {
            id: row.id,
            platform: row.platform,
            order_id: row.order_id,
            raw_title: row.raw_title,
            raw_sku: row.raw_sku,
            raw_barcode: row.raw_barcode,
            created_at: row.created_at,
            product_id: row.product_id,
            link_strategy: row.link_strategy.as_deref().and_then(LinkStrategy::parse),
            confidence: row.confidence,
            linked_at: row.linked_at,
            link_version: row.link_version,
        }
    }
}

const LINE_ITEM_COLUMNS: &str = r#"
    fid AS id, fplatform AS platform, forderid AS order_id,
    frawtitle AS raw_title, frawsku AS raw_sku, frawbarcode AS raw_barcode,
    fcreatedat AS created_at, fproductid AS product_id,
    flinkstrategy AS link_strategy, fconfidence AS confidence,
    flinkedat AS linked_at, flinkversion AS link_version
"#;

/// 建议表查询行
#[derive(Debug, FromRow)]
struct SuggestionRow {
    line_item_id: i64,
    candidates: serde_json::Value,
    generated_at: DateTime<Utc>,
}

/// 链接率聚合行
#[derive(Debug, FromRow)]
struct LinkRateRow {
    platform: String,
    total: i64,
    linked: i64,
}

#[async_trait]
impl LinkStore for PgLinkStore {
    async fn get_unlinked_page(
        &self,
        filter: &ReconFilter,
        after_id: Option<i64>,
        limit: i64,
    ) -> StoreResult<Vec<OrderLineItem>> {
        let sql = format!(
            r#"
            SELECT {LINE_ITEM_COLUMNS}
            FROM t_order_line_item
            WHERE fproductid IS NULL
              AND ($1::text IS NULL OR fplatform = $1)
              AND ($2::timestamptz IS NULL OR fcreatedat >= $2)
              AND ($3::timestamptz IS NULL OR fcreatedat <= $3)
              AND ($4::bigint IS NULL OR fid > $4)
            ORDER BY fid ASC
            LIMIT $5
            "#
        );
        let rows = sqlx::query_as::<_, LineItemRow>(&sql)
            .bind(&filter.platform)
            .bind(filter.date_from)
            .bind(filter.date_to)
            .bind(after_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(OrderLineItem::from).collect())
    }

    async fn find_candidate_products(
        &self,
        norm_sku: &str,
        norm_barcode: &str,
        title_tokens: &[String],
    ) -> StoreResult<Vec<Product>> {
        // fskunorm/fbarcodenorm 为目录侧维护的规范化列 (见 sql/schema.sql)
        let patterns: Vec<String> = title_tokens.iter().map(|t| format!("%{}%", t)).collect();
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT fid AS id, fsku AS sku, fbarcode AS barcode,
                   fname AS name, fcategory AS category, fbrand AS brand
            FROM t_product
            WHERE ($1 <> '' AND fskunorm = $1)
               OR ($2 <> '' AND fbarcodenorm = $2)
               OR fname ILIKE ANY($3)
            ORDER BY fid ASC
            "#,
        )
        .bind(norm_sku)
        .bind(norm_barcode)
        .bind(&patterns)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    async fn get_line_item(&self, id: i64) -> StoreResult<Option<OrderLineItem>> {
        let sql = format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM t_order_line_item WHERE fid = $1"
        );
        let row = sqlx::query_as::<_, LineItemRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(OrderLineItem::from))
    }

    async fn get_product(&self, id: i64) -> StoreResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT fid AS id, fsku AS sku, fbarcode AS barcode,
                   fname AS name, fcategory AS category, fbrand AS brand
            FROM t_product
            WHERE fid = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    async fn update_link_if_version(
        &self,
        id: i64,
        expected_version: i64,
        fields: &LinkFields,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE t_order_line_item
            SET fproductid = $1, flinkstrategy = $2, fconfidence = $3,
                flinkedat = $4, flinkversion = flinkversion + 1
            WHERE fid = $5 AND flinkversion = $6
            "#,
        )
        .bind(fields.product_id)
        .bind(fields.strategy.as_str())
        .bind(fields.confidence)
        .bind(fields.linked_at)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_manual_link(&self, id: i64, fields: &LinkFields) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE t_order_line_item
            SET fproductid = $1, flinkstrategy = $2, fconfidence = $3,
                flinkedat = $4, flinkversion = flinkversion + 1
            WHERE fid = $5
            "#,
        )
        .bind(fields.product_id)
        .bind(fields.strategy.as_str())
        .bind(fields.confidence)
        .bind(fields.linked_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::LineItemNotFound(id));
        }
        Ok(())
    }

    async fn clear_link(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE t_order_line_item
            SET fproductid = NULL, flinkstrategy = NULL, fconfidence = NULL,
                flinkedat = NULL, flinkversion = flinkversion + 1
            WHERE fid = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::LineItemNotFound(id));
        }
        Ok(())
    }

    async fn save_suggestions(&self, id: i64, candidates: &[MatchCandidate]) -> StoreResult<()> {
        let payload = serde_json::to_value(candidates)?;
        sqlx::query(
            r#"
            INSERT INTO t_link_suggestion (flineitemid, fcandidates, fgeneratedat)
            VALUES ($1, $2, $3)
            ON CONFLICT (flineitemid)
            DO UPDATE SET fcandidates = EXCLUDED.fcandidates,
                          fgeneratedat = EXCLUDED.fgeneratedat
            "#,
        )
        .bind(id)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_suggestions(&self, id: i64) -> StoreResult<Option<SuggestionRecord>> {
        let row = sqlx::query_as::<_, SuggestionRow>(
            r#"
            SELECT flineitemid AS line_item_id, fcandidates AS candidates,
                   fgeneratedat AS generated_at
            FROM t_link_suggestion
            WHERE flineitemid = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let candidates: Vec<MatchCandidate> = serde_json::from_value(row.candidates)?;
                Ok(Some(SuggestionRecord {
                    line_item_id: row.line_item_id,
                    candidates,
                    generated_at: row.generated_at,
                }))
            }
        }
    }

    async fn delete_suggestions(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM t_link_suggestion WHERE flineitemid = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_run_stats(&self, stats: &ReconciliationRunStats) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO t_recon_run (
                frunid, fplatform, fstartedat, ffinishedat,
                fprocessed, fautolinked, fsuggestedonly, fskippederrors,
                fdryrun, ffatalerror
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(stats.run_id)
        .bind(&stats.platform)
        .bind(stats.started_at)
        .bind(stats.finished_at)
        .bind(stats.processed as i64)
        .bind(stats.auto_linked as i64)
        .bind(stats.suggested_only as i64)
        .bind(stats.skipped_errors as i64)
        .bind(stats.dry_run)
        .bind(&stats.fatal_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn link_rate_stats(&self, filter: &ReconFilter) -> StoreResult<Vec<PlatformLinkRate>> {
        let rows = sqlx::query_as::<_, LinkRateRow>(
            r#"
            SELECT fplatform AS platform,
                   count(*) AS total,
                   count(fproductid) AS linked
            FROM t_order_line_item
            WHERE ($1::text IS NULL OR fplatform = $1)
              AND ($2::timestamptz IS NULL OR fcreatedat >= $2)
              AND ($3::timestamptz IS NULL OR fcreatedat <= $3)
            GROUP BY fplatform
            ORDER BY fplatform ASC
            "#,
        )
        .bind(&filter.platform)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| PlatformLinkRate::new(r.platform, r.total, r.linked))
            .collect())
    }
}
