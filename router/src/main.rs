use anyhow::Result;
use clap::Parser;
use router::{transport, RouterConfig, SharedState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("ROUTER_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("router=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = RouterConfig::parse();
    let listen_addr = config.listen_addr();
    tracing::info!("Starting router on {listen_addr}");

    let state = SharedState::new(config);
    let sweep_handle = tokio::spawn(router::sweep::run(state.clone()));

    let app = transport::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(state))
        .await?;

    sweep_handle.abort();
    tracing::info!("Router shut down cleanly");
    Ok(())
}

/// Waits for SIGINT/SIGTERM, then tells every live `/ws/*` socket task to
/// send its own close-1001 frame. `axum::serve`'s own graceful shutdown
/// only stops accepting new connections; closing the ones already open is
/// this broadcast's job.
async fn shutdown(state: std::sync::Arc<SharedState>) {
    shutdown_signal().await;
    let _ = state.shutdown.send(());
}

async fn shutdown_signal() {
    let ctrl_c = async { tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler") };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
