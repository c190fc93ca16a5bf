use anyhow::Context;
use deployment::Deployment;
use server::{DeploymentImpl, app};
use services::services::config::Config;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _sentry = utils::sentry::init_once();
    utils::logging::init_tracing();

    let config = Config::from_env()?;
    let host = config.host.clone();
    let port = config.port;

    let deployment = DeploymentImpl::new(config).await?;
    deployment.spawn_background_services().await;

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {}:{}", host, port))?;
    info!("Trackplan server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app(deployment.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    deployment.shutdown();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
