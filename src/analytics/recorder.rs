//! Visit recorder
//!
//! Creates one visit per recordable navigation and patches its end time when
//! the visitor leaves. Every operation here is best-effort: failures are
//! logged and swallowed so that recording can never break a navigation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analytics::resolver::GeoResolver;
use crate::analytics::timer::DelayedTask;
use crate::models::{DeviceInfo, NewVisit, VisitId};
use crate::storage::Storage;

/// Everything the recorder needs to know about one navigation.
///
/// Auth and location state are passed in explicitly rather than read from
/// ambient globals.
#[derive(Debug, Clone, Default)]
pub struct NavigationContext {
    pub path: String,
    /// Authenticated user's email, if any
    pub user_email: Option<String>,
    pub device: DeviceInfo,
    /// Network origin used for market resolution
    pub origin_ip: Option<IpAddr>,
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Upper bound on the geolocation lookup before writing without a market
    pub geo_timeout: Duration,
    /// Delay between a page-leave signal and the end-time write
    pub end_time_delay: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            geo_timeout: Duration::from_secs(3),
            end_time_delay: Duration::from_secs(2),
        }
    }
}

struct PendingEndTime {
    generation: u64,
    task: DelayedTask,
}

pub struct VisitRecorder {
    storage: Arc<dyn Storage>,
    geo: Option<Arc<dyn GeoResolver>>,
    config: RecorderConfig,
    /// Scheduled end-time updates keyed by visit
    pending: Arc<DashMap<VisitId, PendingEndTime>>,
    generation: AtomicU64,
}

impl VisitRecorder {
    pub fn new(
        storage: Arc<dyn Storage>,
        geo: Option<Arc<dyn GeoResolver>>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            storage,
            geo,
            config,
            pending: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Record a navigation and wait for the write.
    ///
    /// Returns the visit id, or `None` if the write failed.
    pub async fn record(&self, nav: NavigationContext) -> Option<VisitId> {
        let visit_start_time = chrono::Utc::now().timestamp_millis();
        self.record_with_id(VisitId::new(), visit_start_time, nav)
            .await
    }

    /// Record a navigation in the background.
    ///
    /// The id and start time are fixed up front so the caller can address
    /// the end-time update right away; an update that arrives before the
    /// write lands matches no row and is dropped.
    pub fn record_navigation(self: &Arc<Self>, nav: NavigationContext) -> VisitId {
        let id = VisitId::new();
        let visit_start_time = chrono::Utc::now().timestamp_millis();
        let recorder = Arc::clone(self);
        let task_id = id.clone();

        tokio::spawn(async move {
            recorder
                .record_with_id(task_id, visit_start_time, nav)
                .await;
        });

        id
    }

    async fn record_with_id(
        &self,
        id: VisitId,
        visit_start_time: i64,
        nav: NavigationContext,
    ) -> Option<VisitId> {
        let market = self.resolve_market(nav.origin_ip).await;

        let mut visit = NewVisit::new(nav.path, visit_start_time)
            .with_email(nav.user_email)
            .with_market(market)
            .with_device(&nav.device);
        visit.id = id;

        match self.storage.insert(&visit).await {
            Ok(id) => {
                debug!(visit_id = %id, path = %visit.path, "recorded visit");
                Some(id)
            }
            Err(err) => {
                warn!(visit_id = %visit.id, path = %visit.path, error = %err, "failed to record visit");
                None
            }
        }
    }

    /// Resolve the market label, giving up after the configured timeout
    async fn resolve_market(&self, origin_ip: Option<IpAddr>) -> Option<String> {
        let (geo, ip) = match (&self.geo, origin_ip) {
            (Some(geo), Some(ip)) => (geo, ip),
            _ => return None,
        };

        match tokio::time::timeout(self.config.geo_timeout, geo.resolve(ip)).await {
            Ok(Ok(location)) => location.market_label(),
            Ok(Err(err)) => {
                debug!(ip = %ip, error = %err, "geolocation lookup failed");
                None
            }
            Err(_) => {
                warn!(ip = %ip, timeout_ms = self.config.geo_timeout.as_millis() as u64, "geolocation lookup timed out");
                None
            }
        }
    }

    /// Page-leave signal: write the end time after the configured delay.
    ///
    /// The end time is the moment of the signal. A repeated signal for the
    /// same visit replaces the earlier schedule.
    pub async fn page_leave(&self, id: VisitId) {
        let end_time = chrono::Utc::now().timestamp_millis();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let storage = Arc::clone(&self.storage);
        let pending = Arc::clone(&self.pending);
        let task_id = id.clone();
        let work = async move {
            apply_end_time(storage.as_ref(), &task_id, end_time).await;
            pending.remove_if(&task_id, |_, p| p.generation == generation);
        };

        // The entry lock is held while scheduling so the task cannot try to
        // remove itself before it is registered.
        let replaced = match self.pending.entry(id) {
            Entry::Occupied(mut entry) => Some(entry.insert(PendingEndTime {
                generation,
                task: DelayedTask::schedule(self.config.end_time_delay, work),
            })),
            Entry::Vacant(entry) => {
                entry.insert(PendingEndTime {
                    generation,
                    task: DelayedTask::schedule(self.config.end_time_delay, work),
                });
                None
            }
        };

        if let Some(previous) = replaced {
            previous.task.cancel().await;
        }
    }

    /// Owner went away before the page did: cancel any pending update and
    /// write the end time now.
    ///
    /// Returns whether the write matched a stored visit.
    pub async fn unmount(&self, id: &VisitId) -> bool {
        if let Some((_, pending)) = self.pending.remove(id) {
            if !pending.task.cancel().await {
                debug!(visit_id = %id, "delayed end time already written, overwriting");
            }
        }

        let end_time = chrono::Utc::now().timestamp_millis();
        apply_end_time(self.storage.as_ref(), id, end_time).await
    }

    /// Write every pending end time immediately (service shutdown)
    pub async fn shutdown(&self) {
        let ids: Vec<VisitId> = self.pending.iter().map(|e| e.key().clone()).collect();
        if ids.is_empty() {
            return;
        }

        info!("Flushing {} pending visit end times", ids.len());
        for id in ids {
            self.unmount(&id).await;
        }
    }

    /// Number of scheduled, not yet written end-time updates
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Patch the end time; never fails, only logs.
async fn apply_end_time(storage: &dyn Storage, id: &VisitId, end_time: i64) -> bool {
    match storage.update_end_time(id, end_time).await {
        Ok(true) => {
            debug!(visit_id = %id, "recorded visit end time");
            true
        }
        Ok(false) => {
            warn!(visit_id = %id, "end time update matched no visit");
            false
        }
        Err(err) => {
            warn!(visit_id = %id, error = %err, "failed to record visit end time");
            false
        }
    }
}
