use browser_gateway::browser_pool::BrowserPool;
use browser_gateway::gateway::{self, AppState};
use browser_gateway::{metrics, Config};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let config = Config::from_env();
    if let Err(err) = config.validate() {
        error!(%err, "invalid configuration");
        std::process::exit(1);
    }

    info!(
        bind_addr = %config.bind_addr,
        max_instances = config.max_instances,
        num_warm = config.num_warm,
        "starting browser-gateway"
    );

    let metrics_handle = metrics::install_recorder().ok();
    if metrics_handle.is_none() {
        tracing::warn!("failed to install prometheus recorder; /metrics will 404");
    }

    let pool = BrowserPool::new(config.clone());
    let (warm_task, health_task, replacement_task, metrics_task) = pool.spawn_background_tasks();

    let mut state = AppState::new(pool, config.bind_addr.clone());
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }
    let app = gateway::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        error!(%err, "server exited with an error");
    }

    warm_task.abort();
    health_task.abort();
    replacement_task.abort();
    metrics_task.abort();
    info!("browser-gateway stopped");
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
