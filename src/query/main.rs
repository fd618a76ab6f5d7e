//! Query server for the spatial services.
//!
//! Loads a gazetteer extract into memory and exposes geocoding, proximity,
//! boundary, statistical-area, batch and health endpoints over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use banksia::clock::SystemClock;
use banksia::store::{GazetteerDataset, MemoryGazetteer};
use banksia::{Config, SpatialServices};

mod routes;

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Australian address spatial query server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides [server].listen
    #[arg(short, long)]
    listen: Option<String>,

    /// Gazetteer extract, overrides [datastore].dataset
    #[arg(short, long)]
    dataset: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Config::load_from_file(path)?
        }
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(dataset) = args.dataset {
        config.datastore.dataset = Some(dataset);
    }

    let native = config.datastore.native_system()?;
    let store = match &config.datastore.dataset {
        Some(path) => {
            info!("Loading gazetteer from {:?}", path);
            MemoryGazetteer::load_from_file(path, native)?
        }
        None => {
            warn!("No dataset configured, serving an empty gazetteer");
            MemoryGazetteer::new(GazetteerDataset::default(), native)
        }
    }
    .with_pool(
        config.datastore.max_connections,
        config.datastore.slow_query(),
    );

    let services = Arc::new(SpatialServices::new(
        &config,
        Arc::new(store),
        Arc::new(SystemClock),
    ));
    let _evaluation = services.start_monitoring();

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/v1/health/metrics", get(routes::metrics))
        .route("/v1/geocode", get(routes::geocode))
        .route("/v1/reverse", get(routes::reverse))
        .route("/v1/proximity", post(routes::proximity))
        .route("/v1/boundary", post(routes::boundary))
        .route("/v1/statistical", post(routes::statistical))
        .route("/v1/batch", post(routes::batch))
        .route("/v1/alerts/{id}/resolve", post(routes::resolve_alert))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(services);

    info!("Starting server on {}", config.server.listen);
    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
