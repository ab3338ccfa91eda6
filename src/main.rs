use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use axum::Router;

use item_cache_server::cfenv::redact_url;
use item_cache_server::config::{Config, ItemStoreSelector};
use item_cache_server::http::{AppState, build_router};
use item_cache_server::obs;
use item_cache_server::repo::{
    ItemRepository, memory::MemoryItemRepository, redis::RedisItemRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    obs::init_tracing();
    let cfg = Config::from_env()?;

    // Item store
    let repo: Arc<dyn ItemRepository> = match cfg.item_store {
        ItemStoreSelector::Redis => {
            let redis_cfg = cfg
                .redis
                .as_ref()
                .context("missing Redis configuration for selected store")?;
            tracing::info!(
                url = %redact_url(&redis_cfg.url),
                source = %redis_cfg.source,
                keyspace = %redis_cfg.keyspace,
                "using Redis item store"
            );
            Arc::new(RedisItemRepository::connect(redis_cfg).await?)
        }
        ItemStoreSelector::Memory => {
            tracing::warn!("using in-memory item store; data is lost on restart");
            Arc::new(MemoryItemRepository::new())
        }
    };

    // Router
    let state = AppState::new(repo, cfg.app.clone())?;
    let app: Router = build_router(state, &cfg.http);

    let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), cfg.port);
    tracing::info!(%addr, app = %cfg.app.name, "listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(?err, "failed to listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
