use std::sync::Arc;

use mixlab::{
    api::{create_router, AppState},
    config::Config,
    context::ExecutionContext,
    db::{self, Cache, PgEdgeStore},
    services::pipeline,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mixlab=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let context = ExecutionContext::new(env!("CARGO_PKG_NAME"));

    tracing::info!(run_id = %context.run_id(), "Starting recommendation service");

    let pool = db::create_pool(&config.database_url).await?;
    let store = Arc::new(PgEdgeStore::new(pool));

    let mut cache_handle = None;
    let mut state = AppState::new(store, context, config.clone());
    if let Some(redis_url) = &config.redis_url {
        let client = db::create_redis_client(redis_url)?;
        let (cache, handle) = Cache::new(client).await;
        state = state.with_cache(cache);
        cache_handle = Some(handle);
    }

    if config.train_on_startup {
        let snapshot = pipeline::train_from_store(
            state.store.clone(),
            state.context.clone(),
            config.als_params(),
        )
        .await?;
        state.install(snapshot).await;
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
