//! Metrics aggregation
//!
//! Two interchangeable realizations of the dashboard numbers:
//! - `BackendRollupSource` asks the store for pre-aggregated rollups
//! - `ClientComputedSource` pulls every event and reduces in process
//!
//! Both apply the same unique-visitor formula and the same daily market
//! dedup, so they agree on the same data.

use async_trait::async_trait;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::analytics::metrics::{self, DistributionEntry};
use crate::storage::{Storage, StorageError};

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to load visit metrics: {0}")]
    Storage(#[from] StorageError),
}

/// Which realization produced a set of metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsSourceKind {
    #[default]
    Rollup,
    Client,
}

impl fmt::Display for MetricsSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsSourceKind::Rollup => f.write_str("rollup"),
            MetricsSourceKind::Client => f.write_str("client"),
        }
    }
}

impl FromStr for MetricsSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rollup" | "backend" => Ok(MetricsSourceKind::Rollup),
            "client" => Ok(MetricsSourceKind::Client),
            other => Err(format!("unknown metrics source: {other}")),
        }
    }
}

/// Summary shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub total_visits: u64,
    pub unique_visitors: u64,
    pub average_duration_seconds: Option<f64>,
    pub distinct_paths: u64,
    pub device_distribution: Vec<DistributionEntry>,
    pub market_distribution: Vec<DistributionEntry>,
    pub source: MetricsSourceKind,
}

impl DerivedMetrics {
    /// Keep only the `n` largest entries of each distribution
    pub fn truncate_distributions(&mut self, n: usize) {
        self.device_distribution.truncate(n);
        self.market_distribution.truncate(n);
    }
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    fn kind(&self) -> MetricsSourceKind;

    async fn compute(&self) -> Result<DerivedMetrics, MetricsError>;
}

/// Metrics from the store's grouped queries
pub struct BackendRollupSource {
    storage: Arc<dyn Storage>,
    offset: FixedOffset,
}

impl BackendRollupSource {
    pub fn new(storage: Arc<dyn Storage>, offset: FixedOffset) -> Self {
        Self { storage, offset }
    }
}

#[async_trait]
impl MetricsSource for BackendRollupSource {
    fn kind(&self) -> MetricsSourceKind {
        MetricsSourceKind::Rollup
    }

    async fn compute(&self) -> Result<DerivedMetrics, MetricsError> {
        let utc_offset_ms = i64::from(self.offset.local_minus_utc()) * 1000;

        let (rollup, devices, markets) = tokio::try_join!(
            self.storage.rollup_visit_metrics(),
            self.storage.rollup_device_distribution(),
            self.storage
                .rollup_market_distribution_dedup_daily(utc_offset_ms),
        )?;

        Ok(DerivedMetrics {
            total_visits: rollup.total_visits.max(0) as u64,
            unique_visitors: rollup.unique_visitors.max(0) as u64,
            average_duration_seconds: rollup.avg_duration_seconds,
            distinct_paths: rollup.distinct_paths.max(0) as u64,
            device_distribution: devices.into_iter().map(Into::into).collect(),
            market_distribution: markets.into_iter().map(Into::into).collect(),
            source: MetricsSourceKind::Rollup,
        })
    }
}

/// Metrics reduced in process from the full event list
pub struct ClientComputedSource {
    storage: Arc<dyn Storage>,
    offset: FixedOffset,
}

impl ClientComputedSource {
    pub fn new(storage: Arc<dyn Storage>, offset: FixedOffset) -> Self {
        Self { storage, offset }
    }
}

#[async_trait]
impl MetricsSource for ClientComputedSource {
    fn kind(&self) -> MetricsSourceKind {
        MetricsSourceKind::Client
    }

    async fn compute(&self) -> Result<DerivedMetrics, MetricsError> {
        let events = self.storage.query_all().await?;
        debug!("Computing metrics over {} visits", events.len());

        Ok(DerivedMetrics {
            total_visits: events.len() as u64,
            unique_visitors: metrics::unique_visitors(&events),
            average_duration_seconds: metrics::average_duration_secs(&events),
            distinct_paths: metrics::distinct_paths(&events),
            device_distribution: metrics::device_distribution(&events),
            market_distribution: metrics::market_distribution(&events, &self.offset),
            source: MetricsSourceKind::Client,
        })
    }
}

/// Front door for metrics: holds the authoritative source
pub struct MetricsAggregator {
    source: Arc<dyn MetricsSource>,
}

impl MetricsAggregator {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self { source }
    }

    /// Build the aggregator for `kind` over `storage`
    pub fn from_kind(kind: MetricsSourceKind, storage: Arc<dyn Storage>, offset: FixedOffset) -> Self {
        let source: Arc<dyn MetricsSource> = match kind {
            MetricsSourceKind::Rollup => Arc::new(BackendRollupSource::new(storage, offset)),
            MetricsSourceKind::Client => Arc::new(ClientComputedSource::new(storage, offset)),
        };
        Self::new(source)
    }

    pub fn source_kind(&self) -> MetricsSourceKind {
        self.source.kind()
    }

    /// Compute the dashboard metrics, truncating distributions to `top` entries
    pub async fn get_metrics(&self, top: Option<usize>) -> Result<DerivedMetrics, MetricsError> {
        let mut derived = self.source.compute().await.map_err(|e| {
            error!(source = %self.source.kind(), error = %e, "metrics computation failed");
            e
        })?;

        if let Some(n) = top {
            derived.truncate_distributions(n);
        }

        Ok(derived)
    }
}
