//! Visit analytics
//!
//! Recording (`recorder`, `timer`), market resolution (`resolver`,
//! `geo_http`, `geoip`, `ip_extractor`) and metrics derivation
//! (`metrics`, `aggregator`).
//!
//! The MaxMind-backed resolver is only compiled with the `mmdb` feature.

pub mod aggregator;
pub mod geo_http;
#[cfg(feature = "mmdb")]
pub mod geoip;
pub mod ip_extractor;
pub mod metrics;
pub mod models;
pub mod recorder;
pub mod resolver;
pub mod timer;

pub use aggregator::{
    BackendRollupSource, ClientComputedSource, DerivedMetrics, MetricsAggregator, MetricsError,
    MetricsSource, MetricsSourceKind,
};
pub use geo_http::HttpGeoResolver;
#[cfg(feature = "mmdb")]
pub use geoip::MmdbGeoResolver;
pub use ip_extractor::extract_client_ip;
pub use metrics::DistributionEntry;
pub use models::GeoLocation;
pub use recorder::{NavigationContext, RecorderConfig, VisitRecorder};
pub use resolver::{CachedGeoResolver, GeoResolver};
pub use timer::{DelayedTask, TimerOutcome};
