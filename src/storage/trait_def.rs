use crate::models::{NewVisit, VisitEvent, VisitId};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("visit id already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Whole-table rollup computed by the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisitRollup {
    pub total_visits: i64,
    pub unique_visitors: i64,
    pub avg_duration_seconds: Option<f64>,
    pub distinct_paths: i64,
}

/// One `(label, count)` row of a grouped rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DimensionCount {
    pub dimension: String,
    pub visit_count: i64,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Insert a new visit and return its id
    async fn insert(&self, visit: &NewVisit) -> StorageResult<VisitId>;

    /// Set the end time of a visit.
    ///
    /// Returns `false` when no row was updated: the id does not exist (yet),
    /// or `end_time` is earlier than the visit start.
    async fn update_end_time(&self, id: &VisitId, end_time: i64) -> StorageResult<bool>;

    /// All visits, most recent start first
    async fn query_all(&self) -> StorageResult<Vec<VisitEvent>>;

    /// One page of visits, most recent start first, plus the unfiltered total
    async fn query_page(&self, offset: i64, limit: i64) -> StorageResult<(Vec<VisitEvent>, i64)>;

    /// Number of stored visits
    async fn count(&self) -> StorageResult<i64>;

    /// Totals, unique visitors, average duration and distinct paths
    async fn rollup_visit_metrics(&self) -> StorageResult<VisitRollup>;

    /// Visit counts per device platform
    async fn rollup_device_distribution(&self) -> StorageResult<Vec<DimensionCount>>;

    /// Visitor-days per market.
    ///
    /// `utc_offset_ms` shifts visit start times into the reporting timezone
    /// before they are truncated to calendar days.
    async fn rollup_market_distribution_dedup_daily(
        &self,
        utc_offset_ms: i64,
    ) -> StorageResult<Vec<DimensionCount>>;
}

pub(crate) fn now_millis() -> StorageResult<i64> {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| StorageError::Other(e.into()))?;
    Ok(elapsed.as_millis() as i64)
}

pub(crate) const MILLIS_PER_DAY: i64 = 86_400_000;
