pub mod api;
pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod services;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cli::{Cli, Commands};
pub use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use services::BootstrapOutcome;
use state::SharedState;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    match cli.command() {
        Commands::Serve => {
            config.validate()?;
            let prometheus_handle = init_metrics(&config)?;
            run_server(config, prometheus_handle).await
        }

        Commands::Init => {
            if Config::create_default_if_missing()? {
                println!("✓ Config file created. Set [database] url and [security] jwt_secret, then run again.");
            } else {
                println!("config.toml already exists; left unchanged.");
            }
            Ok(())
        }

        Commands::ResetPassword { username } => {
            config.validate()?;
            cmd_reset_password(config, &username).await
        }
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_metrics(config: &Config) -> anyhow::Result<Option<PrometheusHandle>> {
    if !config.observability.metrics_enabled {
        return Ok(None);
    }

    use metrics_exporter_prometheus::PrometheusBuilder;
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    info!("Prometheus metrics recorder initialized");
    Ok(Some(handle))
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("Jellystream v{} starting...", env!("CARGO_PKG_VERSION"));

    let port = config.server.port;
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);

    let shared = Arc::new(SharedState::new(config).await?);
    if let BootstrapOutcome::Created { username } = shared.bootstrap().await? {
        info!(username = %username, "Bootstrap complete");
    }

    for (name, upstream) in shared.config.upstreams.iter() {
        if upstream.enabled {
            info!(upstream = name, base_url = %upstream.base_url, "Upstream relay enabled");
        }
    }

    let api_state = api::create_app_state(shared.clone(), prometheus_handle);
    let app = api::router(api_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Web server running at http://{addr}");

    let stopping = Arc::new(Notify::new());
    let server = axum::serve(listener, app).with_graceful_shutdown({
        let stopping = stopping.clone();
        async move {
            shutdown_signal().await;
            stopping.notify_one();
        }
    });

    tokio::select! {
        result = server.into_future() => {
            if let Err(e) = result {
                error!("Web server error: {}", e);
            }
        }
        () = async {
            stopping.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_seconds = grace.as_secs(), "Grace period elapsed; abandoning in-flight requests");
        }
    }

    shared.store.clone().close().await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error listening for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Error listening for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}

async fn cmd_reset_password(config: Config, username: &str) -> anyhow::Result<()> {
    let shared = SharedState::new(config).await?;

    let result = shared.user_service.reset_password(username).await;
    shared.store.close().await?;
    let password = result.with_context(|| format!("Could not reset password for '{username}'"))?;

    println!("✓ Password for '{username}' has been reset.");
    println!("  New password: {password}");
    println!("  The user must change it after logging in.");
    Ok(())
}
