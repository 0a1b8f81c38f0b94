use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use visitlytics::analytics::{
    CachedGeoResolver, GeoResolver, HttpGeoResolver, MetricsAggregator, RecorderConfig,
    VisitRecorder,
};
use visitlytics::api::{self, AppState};
use visitlytics::config::{Config, GeoConfig, GeoProvider};
use visitlytics::pagination::Paginator;
use visitlytics::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage = storage::connect(&config.database).await?;

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let geo = build_geo_resolver(&config.geo)?;

    let recorder = Arc::new(VisitRecorder::new(
        Arc::clone(&storage),
        geo,
        RecorderConfig {
            geo_timeout: config.geo.timeout(),
            end_time_delay: config.analytics.end_time_delay(),
        },
    ));

    let offset = config.analytics.reporting_offset();
    let aggregator = Arc::new(MetricsAggregator::from_kind(
        config.analytics.metrics_source,
        Arc::clone(&storage),
        offset,
    ));
    info!(
        "📊 Metrics source: {} (reporting offset {})",
        aggregator.source_kind(),
        offset
    );

    let paginator = Arc::new(Paginator::with_limits(
        Arc::clone(&storage),
        config.analytics.default_page_size,
        config.analytics.max_page_size,
    ));

    let state = Arc::new(AppState {
        recorder: Arc::clone(&recorder),
        aggregator,
        paginator,
        proxy: config.proxy.clone(),
    });
    let app = api::create_api_router(state);

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", api_addr))?;
    info!("🚀 API server listening on http://{}", api_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    // Pending end times would otherwise be lost with the process
    recorder.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

fn build_geo_resolver(config: &GeoConfig) -> Result<Option<Arc<dyn GeoResolver>>> {
    let inner: Arc<dyn GeoResolver> = match config.provider {
        GeoProvider::None => {
            info!("🌍 Market resolution disabled");
            return Ok(None);
        }
        GeoProvider::Http => {
            info!("🌍 Resolving markets via {}", config.http_url);
            Arc::new(HttpGeoResolver::new(config.http_url.clone(), config.timeout())?)
        }
        GeoProvider::Mmdb => mmdb_resolver(config)?,
    };

    Ok(Some(Arc::new(CachedGeoResolver::new(
        inner,
        config.cache_max_entries,
        config.cache_ttl_secs,
    ))))
}

#[cfg(feature = "mmdb")]
fn mmdb_resolver(config: &GeoConfig) -> Result<Arc<dyn GeoResolver>> {
    let path = config
        .mmdb_path
        .as_deref()
        .context("GEOIP_CITY_DB_PATH must be set when GEO_PROVIDER=mmdb")?;
    info!("🌍 Resolving markets from {}", path);
    Ok(Arc::new(visitlytics::analytics::MmdbGeoResolver::new(path)?))
}

#[cfg(not(feature = "mmdb"))]
fn mmdb_resolver(_config: &GeoConfig) -> Result<Arc<dyn GeoResolver>> {
    anyhow::bail!("GEO_PROVIDER=mmdb requires building with the `mmdb` feature")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
