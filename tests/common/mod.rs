//! Shared helpers for integration tests

#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Arc;
use visitlytics::models::{NewVisit, VisitEvent, VisitId};
use visitlytics::storage::{
    DimensionCount, SqliteStorage, Storage, StorageError, StorageResult, VisitRollup,
};

/// 2024-01-01T10:00:00Z
pub const BASE: i64 = 1_704_103_200_000;
pub const SECOND: i64 = 1_000;
pub const HOUR: i64 = 3_600_000;
pub const DAY: i64 = 24 * HOUR;

/// Helper to create test storage
///
/// A single connection keeps the shared in-memory database free of
/// table-lock contention.
pub async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

pub fn device_json(platform: &str) -> String {
    format!(r#"{{"platform":"{}"}}"#, platform)
}

pub async fn insert_all(storage: &Arc<dyn Storage>, visits: &[NewVisit]) {
    for visit in visits {
        storage.insert(visit).await.unwrap();
    }
}

/// Store whose every call fails, for error-path tests
pub struct FailingStorage;

fn unavailable() -> StorageError {
    StorageError::Other(anyhow!("database unavailable"))
}

#[async_trait]
impl Storage for FailingStorage {
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn insert(&self, _visit: &NewVisit) -> StorageResult<VisitId> {
        Err(unavailable())
    }

    async fn update_end_time(&self, _id: &VisitId, _end_time: i64) -> StorageResult<bool> {
        Err(unavailable())
    }

    async fn query_all(&self) -> StorageResult<Vec<VisitEvent>> {
        Err(unavailable())
    }

    async fn query_page(&self, _offset: i64, _limit: i64) -> StorageResult<(Vec<VisitEvent>, i64)> {
        Err(unavailable())
    }

    async fn count(&self) -> StorageResult<i64> {
        Err(unavailable())
    }

    async fn rollup_visit_metrics(&self) -> StorageResult<VisitRollup> {
        Err(unavailable())
    }

    async fn rollup_device_distribution(&self) -> StorageResult<Vec<DimensionCount>> {
        Err(unavailable())
    }

    async fn rollup_market_distribution_dedup_daily(
        &self,
        _utc_offset_ms: i64,
    ) -> StorageResult<Vec<DimensionCount>> {
        Err(unavailable())
    }
}
