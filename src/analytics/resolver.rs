//! Geolocation resolver abstraction and a TTL cache in front of it

use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::analytics::models::GeoLocation;

/// Maps a request origin to a coarse location.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, ip: IpAddr) -> Result<GeoLocation>;
}

/// Caches successful lookups per IP; failures are never cached.
pub struct CachedGeoResolver {
    inner: Arc<dyn GeoResolver>,
    cache: Cache<IpAddr, GeoLocation>,
}

impl CachedGeoResolver {
    pub fn new(inner: Arc<dyn GeoResolver>, max_entries: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, cache }
    }
}

#[async_trait]
impl GeoResolver for CachedGeoResolver {
    async fn resolve(&self, ip: IpAddr) -> Result<GeoLocation> {
        if let Some(cached) = self.cache.get(&ip).await {
            return Ok(cached);
        }

        let location = self.inner.resolve(ip).await?;
        self.cache.insert(ip, location.clone()).await;

        Ok(location)
    }
}
