//! Tile API service.
//!
//! Serves colorized XYZ PNG tiles rendered from Cloud-Optimized GeoTIFFs.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::{env, net::SocketAddr, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tile_api::{handlers, AppState, ServiceConfig};

#[derive(Parser, Debug)]
#[command(name = "tile-api")]
#[command(about = "XYZ tile server for Cloud-Optimized GeoTIFF layers")]
struct Args {
    /// Listen address (overrides LISTEN_ADDR)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,

    /// Source configuration file (overrides SOURCES_CONFIG)
    #[arg(long)]
    sources: Option<String>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    let worker_threads = args.worker_threads.or_else(|| {
        env::var("TOKIO_WORKER_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
    });
    if let Some(threads) = worker_threads {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))?;
    Ok(())
}

async fn async_main(args: Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("failed to install Prometheus recorder: {}", e))?;
    info!("Prometheus metrics exporter initialized");

    let mut config = ServiceConfig::from_env().map_err(|e| anyhow!(e))?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(sources) = args.sources {
        config.sources_config = sources;
    }
    config.validate().map_err(|e| anyhow!("invalid configuration: {}", e))?;

    info!(
        max_concurrent_tiles = config.max_concurrent_tiles,
        soft_pixel_budget = config.soft_pixel_budget,
        hard_pixel_ceiling = config.hard_pixel_ceiling,
        enforced_extent = %config.enforced_extent,
        "Starting tile API server"
    );

    let addr: SocketAddr = config.listen_addr.parse()?;
    let state = Arc::new(AppState::new(config).await?);
    info!(
        sources = ?state.pipeline.registry().names(),
        max_concurrent = state.pipeline.gate().max_concurrent(),
        "Sources configured"
    );

    let app = handlers::router(state, prometheus_handle);

    info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
