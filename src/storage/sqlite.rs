use crate::models::{NewVisit, VisitEvent, VisitId, UNKNOWN_MARKET, UNKNOWN_PLATFORM};
use crate::storage::trait_def::{now_millis, MILLIS_PER_DAY};
use crate::storage::{DimensionCount, Storage, StorageError, StorageResult, VisitRollup};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visit_records (
                id TEXT PRIMARY KEY,
                user_email TEXT,
                path TEXT NOT NULL,
                market TEXT,
                device_info TEXT,
                visit_start_time INTEGER NOT NULL,
                visit_end_time INTEGER,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_visit_start_time ON visit_records(visit_start_time)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert(&self, visit: &NewVisit) -> StorageResult<VisitId> {
        let created_at = now_millis()?;

        sqlx::query(
            r#"
            INSERT INTO visit_records
                (id, user_email, path, market, device_info, visit_start_time, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(visit.id.as_str())
        .bind(visit.user_email.as_deref())
        .bind(&visit.path)
        .bind(visit.market.as_deref())
        .bind(visit.device_info.as_deref())
        .bind(visit.visit_start_time)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => StorageError::Conflict,
            _ => StorageError::from(e),
        })?;

        Ok(visit.id.clone())
    }

    async fn update_end_time(&self, id: &VisitId, end_time: i64) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE visit_records
            SET visit_end_time = ?
            WHERE id = ? AND visit_start_time <= ?
            "#,
        )
        .bind(end_time)
        .bind(id.as_str())
        .bind(end_time)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query_all(&self) -> StorageResult<Vec<VisitEvent>> {
        let visits = sqlx::query_as::<_, VisitEvent>(
            r#"
            SELECT id, user_email, path, market, device_info,
                   visit_start_time, visit_end_time, created_at
            FROM visit_records
            ORDER BY visit_start_time DESC, id ASC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(visits)
    }

    async fn query_page(&self, offset: i64, limit: i64) -> StorageResult<(Vec<VisitEvent>, i64)> {
        let total = self.count().await?;

        let visits = sqlx::query_as::<_, VisitEvent>(
            r#"
            SELECT id, user_email, path, market, device_info,
                   visit_start_time, visit_end_time, created_at
            FROM visit_records
            ORDER BY visit_start_time DESC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok((visits, total))
    }

    async fn count(&self) -> StorageResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM visit_records")
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }

    async fn rollup_visit_metrics(&self) -> StorageResult<VisitRollup> {
        let (total_visits, unique_visitors, avg_duration_seconds, distinct_paths) =
            sqlx::query_as::<_, (i64, i64, Option<f64>, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(DISTINCT user_email)
                        + COUNT(DISTINCT CASE WHEN user_email IS NULL THEN device_info END),
                    AVG(CASE
                            WHEN visit_end_time IS NOT NULL AND visit_end_time >= visit_start_time
                            THEN (visit_end_time - visit_start_time) / 1000.0
                        END),
                    COUNT(DISTINCT path)
                FROM visit_records
                "#,
            )
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(VisitRollup {
            total_visits,
            unique_visitors,
            avg_duration_seconds,
            distinct_paths,
        })
    }

    async fn rollup_device_distribution(&self) -> StorageResult<Vec<DimensionCount>> {
        let rows = sqlx::query_as::<_, DimensionCount>(
            r#"
            SELECT
                COALESCE(
                    NULLIF(TRIM(CASE WHEN json_valid(device_info) THEN
                        CASE WHEN json_type(device_info, '$.platform') = 'text'
                            THEN json_extract(device_info, '$.platform')
                        END
                    END), ''),
                    ?
                ) AS dimension,
                COUNT(*) AS visit_count
            FROM visit_records
            GROUP BY dimension
            ORDER BY visit_count DESC, dimension ASC
            "#,
        )
        .bind(UNKNOWN_PLATFORM)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn rollup_market_distribution_dedup_daily(
        &self,
        utc_offset_ms: i64,
    ) -> StorageResult<Vec<DimensionCount>> {
        let rows = sqlx::query_as::<_, DimensionCount>(
            r#"
            SELECT dimension, COUNT(*) AS visit_count
            FROM (
                SELECT DISTINCT
                    COALESCE(NULLIF(market, ''), ?) AS dimension,
                    COALESCE(user_email, device_info, id) AS visitor_key,
                    (visit_start_time + ?) / ? AS visit_day
                FROM visit_records
            ) AS daily_visitors
            GROUP BY dimension
            ORDER BY visit_count DESC, dimension ASC
            "#,
        )
        .bind(UNKNOWN_MARKET)
        .bind(utc_offset_ms)
        .bind(MILLIS_PER_DAY)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }
}
