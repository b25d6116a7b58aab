use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capstudio_core::config::VisionConfig;
use capstudio_db::store::PgStore;
use capstudio_engine::controller::JobController;
use capstudio_vision::backend::DefaultBackendRegistry;
use capstudio_vision::catalog;
use capstudio_vision::client::VisionClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capstudio_worker=debug,capstudio_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = VisionConfig::from_env();
    tracing::info!(
        backend = %config.backend,
        model = %config.default_model,
        url = %config.lmstudio_url,
        "Loaded vision configuration",
    );

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let store = Arc::new(
        PgStore::connect(&database_url)
            .await
            .context("Failed to connect to database")?,
    );
    tracing::info!("Database connected, migrations applied");

    // Startup probe: which vision models does the backend offer right now.
    let models = catalog::list_models(&VisionClient::from_config(&config)).await;
    for model in &models {
        tracing::info!(
            model_id = %model.model_id,
            available = model.is_available,
            "Vision model",
        );
    }

    let registry = Arc::new(DefaultBackendRegistry::from_config(&config));
    let controller = Arc::new(JobController::new(store, registry, config));

    let recovered = controller
        .recover()
        .await
        .context("Failed to recover interrupted jobs")?;
    tracing::info!(recovered, "Caption engine ready");

    shutdown_signal().await;

    controller.shutdown().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM so the process stops cleanly whether
/// interrupted interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
