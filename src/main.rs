use site_budget::{
    router, service, AppState, BudgetStore, Config, HostBridge, JsonFileStore, Tracker,
    TrackerEvent,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{fs, signal};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    if let Some(parent) = config.data_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    // No store file yet means this is a fresh install.
    let installed = !fs::try_exists(&config.data_path).await.unwrap_or(false);

    let store: Arc<dyn BudgetStore> = Arc::new(JsonFileStore::new(&config.data_path));
    let host = Arc::new(HostBridge::new());
    let tracker = Tracker::new(store.clone(), host.clone(), config.tick_policy);
    let (handle, _task) = service::spawn(tracker);
    handle.send(TrackerEvent::Startup { installed }).await?;

    let app = router(AppState::new(handle, host, store));
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));

    info!(
        policy = ?config.tick_policy,
        data = %config.data_path.display(),
        "listening on http://{addr}"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
