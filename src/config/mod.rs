use anyhow::{bail, Context};
use chrono::{FixedOffset, Local, Offset};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::analytics::MetricsSourceKind;
use crate::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub analytics: AnalyticsConfig,
    pub proxy: ProxyConfig,
    pub geo: GeoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Authoritative metrics realization
    pub metrics_source: MetricsSourceKind,
    /// Reporting timezone for daily market dedup, minutes east of UTC
    pub utc_offset_minutes: i32,
    pub end_time_delay_ms: u64,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl AnalyticsConfig {
    pub fn reporting_offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes).unwrap_or_else(|| Local::now().offset().fix())
    }

    pub fn end_time_delay(&self) -> Duration {
        Duration::from_millis(self.end_time_delay_ms)
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            metrics_source: MetricsSourceKind::Rollup,
            utc_offset_minutes: local_offset_minutes(),
            end_time_delay_ms: 2000,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    None,
    Cloudflare,
    Standard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub trusted_proxy_mode: TrustedProxyMode,
    /// CIDR ranges whose hops are skipped when walking forwarded chains
    #[serde(default)]
    pub trusted_proxies: Vec<IpNet>,
    /// Fixed number of trusted hops; takes precedence over `trusted_proxies`
    #[serde(default)]
    pub num_trusted_proxies: Option<usize>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeoProvider {
    None,
    Http,
    Mmdb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    pub provider: GeoProvider,
    /// Lookup URL template, `{ip}` is replaced by the client address
    pub http_url: String,
    #[serde(default)]
    pub mmdb_path: Option<String>,
    pub timeout_ms: u64,
    pub cache_max_entries: u64,
    pub cache_ttl_secs: u64,
}

impl GeoConfig {
    const DEFAULT_HTTP_URL: &'static str = "https://ipapi.co/{ip}/json/";

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            provider: GeoProvider::None,
            http_url: Self::DEFAULT_HTTP_URL.to_string(),
            mmdb_path: None,
            timeout_ms: 3000,
            cache_max_entries: 10_000,
            cache_ttl_secs: 3600,
        }
    }
}

pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

fn local_offset_minutes() -> i32 {
    Local::now().offset().fix().local_minus_utc() / 60
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {key}: {v}")),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./visitlytics.db?mode=rwc".to_string());
        let max_connections = env_parse("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let metrics_source = match std::env::var("METRICS_SOURCE") {
            Ok(v) => v.parse::<MetricsSourceKind>().unwrap_or_else(|e| {
                tracing::warn!("{e}, falling back to 'rollup'. Supported values: rollup, client");
                MetricsSourceKind::Rollup
            }),
            Err(_) => MetricsSourceKind::Rollup,
        };

        let utc_offset_minutes = env_parse("ANALYTICS_UTC_OFFSET_MINUTES", local_offset_minutes())?;
        if offset_from_minutes(utc_offset_minutes).is_none() {
            bail!("ANALYTICS_UTC_OFFSET_MINUTES out of range: {utc_offset_minutes}");
        }

        let max_page_size = env_parse("MAX_PAGE_SIZE", MAX_PAGE_SIZE)?.max(1);
        let default_page_size =
            env_parse("DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?.clamp(1, max_page_size);

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            "standard" => TrustedProxyMode::Standard,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, cloudflare, standard"
                );
                TrustedProxyMode::None
            }
        };

        let trusted_proxies = std::env::var("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<IpNet>()
                    .with_context(|| format!("Invalid CIDR in TRUSTED_PROXIES: {s}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok());

        let geo_defaults = GeoConfig::default();
        let mmdb_path = std::env::var("GEOIP_CITY_DB_PATH").ok();

        let provider = match std::env::var("GEO_PROVIDER") {
            Ok(v) => match v.to_lowercase().as_str() {
                "none" | "" => GeoProvider::None,
                "http" => GeoProvider::Http,
                "mmdb" => GeoProvider::Mmdb,
                other => {
                    tracing::warn!(
                        "Unknown GEO_PROVIDER '{other}', falling back to 'none'. Supported values: none, http, mmdb"
                    );
                    GeoProvider::None
                }
            },
            // A configured database implies local lookups
            Err(_) if mmdb_path.is_some() => GeoProvider::Mmdb,
            Err(_) => GeoProvider::None,
        };

        if provider == GeoProvider::Mmdb && mmdb_path.is_none() {
            bail!("GEOIP_CITY_DB_PATH must be set when GEO_PROVIDER=mmdb");
        }

        let geo = GeoConfig {
            provider,
            http_url: std::env::var("GEO_HTTP_URL").unwrap_or(geo_defaults.http_url),
            mmdb_path,
            timeout_ms: env_parse("GEO_TIMEOUT_MS", geo_defaults.timeout_ms)?,
            cache_max_entries: env_parse("GEO_CACHE_MAX_ENTRIES", geo_defaults.cache_max_entries)?,
            cache_ttl_secs: env_parse("GEO_CACHE_TTL_SECS", geo_defaults.cache_ttl_secs)?,
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            analytics: AnalyticsConfig {
                metrics_source,
                utc_offset_minutes,
                end_time_delay_ms: env_parse("END_TIME_DELAY_MS", 2000u64)?,
                default_page_size,
                max_page_size,
            },
            proxy: ProxyConfig {
                trusted_proxy_mode,
                trusted_proxies,
                num_trusted_proxies,
            },
            geo,
        })
    }
}
