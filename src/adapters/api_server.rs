use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::{create_router, AppState};
use crate::config::ServerConfig;
use crate::coordination::{spawn_liveness_task, ConnectionRegistry, ShutdownListener};
use crate::domain::{Order, Raster, CANVAS_HEIGHT, CANVAS_WIDTH, SEED_ORDER_FILE};
use crate::error::{PlaceError, Result};
use crate::persistence::HistoryStore;

/// A bound command server
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub state: AppState,
    pub handle: JoinHandle<Result<()>>,
}

/// Start the command server and wait for it to stop
pub async fn start_api_server(config: &ServerConfig, shutdown: ShutdownListener) -> Result<()> {
    let server = bind_api_server(config, shutdown).await?;
    server
        .handle
        .await
        .map_err(|e| PlaceError::Internal(format!("server task failed: {}", e)))?
}

/// Load state, bind the listener and serve in the background
pub async fn bind_api_server(
    config: &ServerConfig,
    shutdown: ShutdownListener,
) -> Result<RunningServer> {
    let history = Arc::new(HistoryStore::open(&config.data_file).await?);
    ensure_seed_image(&config.maps_dir).await?;

    ensure_current_image(&config.maps_dir, &history.current().await).await?;

    let registry = Arc::new(ConnectionRegistry::new(config.liveness_window()));
    spawn_liveness_task(Arc::clone(&registry), config.liveness_tick(), shutdown.clone());

    let app_state = AppState::new(history, registry, config);
    let app = create_router(app_state.clone(), &config.static_dir);

    let listener = TcpListener::bind(&config.bind).await?;
    let local_addr = listener.local_addr()?;
    info!("🚀 Command server listening on http://{}", local_addr);

    let mut shutdown = shutdown;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;
        info!("Command server stopped");
        Ok::<(), PlaceError>(())
    });

    Ok(RunningServer {
        local_addr,
        state: app_state,
        handle,
    })
}

/// Write a fully transparent seed order if a fresh install has none.
async fn ensure_seed_image(maps_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(maps_dir).await?;

    let path = maps_dir.join(SEED_ORDER_FILE);
    if tokio::fs::try_exists(&path).await? {
        return Ok(());
    }

    let png = tokio::task::spawn_blocking(|| {
        Raster::transparent(CANVAS_WIDTH, CANVAS_HEIGHT).encode_png()
    })
    .await
    .map_err(|e| PlaceError::Internal(format!("seed image task failed: {}", e)))??;

    tokio::fs::write(&path, png).await?;
    info!(path = %path.display(), "Generated blank seed order");
    Ok(())
}

/// Agents download the current order by name, so it has to exist on disk.
async fn ensure_current_image(maps_dir: &Path, current: &Order) -> Result<()> {
    let path = maps_dir.join(&current.file_ref);
    if tokio::fs::try_exists(&path).await? {
        return Ok(());
    }
    error!(file = %current.file_ref, "Current order image is missing from the maps directory");
    Err(PlaceError::Persistence(format!(
        "current order image {} does not exist",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::Shutdown;

    fn server_config(dir: &Path) -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            data_file: dir.join("data.json"),
            maps_dir: dir.join("maps"),
            static_dir: dir.join("static"),
            order_password: None,
            liveness_window_secs: 660,
            liveness_tick_ms: 1000,
            broadcast_capacity: 8,
            max_upload_bytes: 1 << 20,
        }
    }

    #[tokio::test]
    async fn test_missing_current_image_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let config = server_config(dir.path());
        let history = HistoryStore::open(&config.data_file).await.unwrap();
        history
            .commit(Order::new("1700000000000.png", "lost", chrono::Utc::now()))
            .await
            .unwrap();

        let shutdown = Shutdown::new();
        let Err(err) = bind_api_server(&config, shutdown.listener()).await else {
            panic!("server started without its current order image");
        };
        assert!(matches!(err, PlaceError::Persistence(_)));

        // Once the image is back the server starts
        std::fs::write(config.maps_dir.join("1700000000000.png"), b"png").unwrap();
        assert!(bind_api_server(&config, shutdown.listener()).await.is_ok());
    }

    #[tokio::test]
    async fn test_seed_image_is_generated_once() {
        let dir = tempfile::tempdir().unwrap();
        let maps = dir.path().join("maps");

        ensure_seed_image(&maps).await.unwrap();
        let seed = maps.join(SEED_ORDER_FILE);
        let raster = Raster::decode(&std::fs::read(&seed).unwrap()).unwrap();
        assert!(raster.is_canvas_sized());
        assert!(raster.as_bytes().iter().all(|b| *b == 0));

        std::fs::write(&seed, b"keep").unwrap();
        ensure_seed_image(&maps).await.unwrap();
        assert_eq!(std::fs::read(&seed).unwrap(), b"keep");
    }
}
