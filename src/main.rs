//! Argus camera service entry point

use std::net::SocketAddr;
use std::sync::Arc;

use argus::camera::driver::ControlsMap;
use argus::camera::SimulatedCamera;
use argus::service::CameraService;
use argus::Config;
use color_eyre::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("argus=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Argus launching...");

    // Load configuration: optional argus.toml plus ARGUS_* overrides
    let config: Config = config::Config::builder()
        .add_source(config::File::with_name("argus").required(false))
        .add_source(
            config::Environment::with_prefix("ARGUS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    argus::CONFIG.store(Arc::new(config.clone()));

    // The simulated driver stands in for the hardware sensor stack
    let driver = Box::new(SimulatedCamera::new());

    let stream_addr = SocketAddr::from(([0, 0, 0, 0], config.stream.port));
    let service = CameraService::new(driver, ControlsMap::new(), stream_addr)?;

    service.start_preview(ControlsMap::new()).await?;
    if let Some(addr) = service.stream_addr().await {
        info!("MJPEG preview at http://{}/stream.mjpg", addr);
    }

    tokio::signal::ctrl_c().await?;
    info!("Argus shutting down");
    service.shutdown().await;

    Ok(())
}
