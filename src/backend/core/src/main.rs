//! Carehub Server - Main entry point

use std::sync::Arc;

use carehub_core::{
    api::{self, AppState},
    config::Config,
    identity::JwtIdentityResolver,
    ownership::{InMemoryOwnershipLookup, PgOwnershipLookup, ResourceOwnershipChecker},
    policy::{InMemoryPolicyStore, PgPolicyStore, PolicyStore},
    rbac::{Enforcer, PredefinedRole},
    telemetry,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::var("CAREHUB_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load()?,
    };

    telemetry::init(&config.observability)?;
    let metrics = telemetry::install_metrics_recorder()?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Carehub server");

    let (store, ownership) = open_stores(&config).await?;
    info!(backend = store.backend_name(), kinds = ?ownership.kinds(), "Policy store ready");

    let enforcer = Enforcer::new(store, PredefinedRole::default_capabilities())
        .with_max_depth(config.authz.max_role_depth);
    let resolver = Arc::new(JwtIdentityResolver::new(&config.auth)?);

    let state = AppState::new(enforcer, resolver, ownership, &config.server).with_metrics(metrics);
    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(address = %listener.local_addr()?, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    telemetry::shutdown();
    info!("Server shutdown complete");

    Ok(())
}

/// Postgres when a database is configured, otherwise in-memory stores.
async fn open_stores(config: &Config) -> anyhow::Result<(Arc<dyn PolicyStore>, ResourceOwnershipChecker)> {
    let mut ownership = ResourceOwnershipChecker::new();

    let Some(database) = &config.database else {
        warn!("No database configured; policy and ownership data are in-memory and start empty");
        for resource in &config.ownership.resources {
            ownership = ownership.register(resource.kind.clone(), Arc::new(InMemoryOwnershipLookup::new()));
        }
        return Ok((Arc::new(InMemoryPolicyStore::new()), ownership));
    };

    let store = PgPolicyStore::connect(database).await?;
    store.health_check().await?;
    if database.run_migrations {
        store.migrate().await?;
        info!("Policy migrations applied");
    }

    for resource in &config.ownership.resources {
        let lookup = PgOwnershipLookup::new(store.pool().clone(), resource)?;
        ownership = ownership.register(resource.kind.clone(), Arc::new(lookup));
    }

    Ok((Arc::new(store), ownership))
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
