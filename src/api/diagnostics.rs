use axum::{Json, extract::State};
use serde::Serialize;

use crate::http::AppState;
use crate::repo::ItemRepository;

const UNKNOWN: &str = "unknown";

/// Body of `GET /api/items/info`. Field order is part of the contract.
#[derive(Debug, Serialize)]
pub struct ConnectionInfo {
    pub status: &'static str,
    #[serde(rename = "connectionFactory")]
    pub connection_factory: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_in_seconds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionInfo {
    fn new(backend: &'static str) -> Self {
        Self {
            status: "CONNECTED",
            connection_factory: backend,
            redis_version: None,
            redis_mode: None,
            os: None,
            tcp_port: None,
            uptime_in_seconds: None,
            server_name: None,
            item_count: None,
            error: None,
        }
    }

    async fn fill(&mut self, repo: &dyn ItemRepository) -> anyhow::Result<()> {
        let server = repo.server_info().await?;
        let prop = |key: &str| Some(server.get_or(key, UNKNOWN).to_string());

        self.redis_version = prop("redis_version");
        self.redis_mode = prop("redis_mode");
        self.os = prop("os");
        self.tcp_port = prop("tcp_port");
        self.uptime_in_seconds = prop("uptime_in_seconds");
        self.server_name = Some(server.get_or("server_name", "redis").to_string());

        self.item_count = Some(repo.count().await?);
        Ok(())
    }
}

/// Probes the store. Failures are reported in the body rather than as an
/// error status so the endpoint stays usable while the store is down.
pub async fn describe(repo: &dyn ItemRepository) -> ConnectionInfo {
    let mut info = ConnectionInfo::new(repo.backend());
    if let Err(err) = info.fill(repo).await {
        tracing::warn!(?err, "store diagnostics failed");
        // Partially gathered server fields are dropped.
        info = ConnectionInfo::new(repo.backend());
        info.status = "ERROR";
        info.error = Some(format!("{err:#}"));
    }
    info
}

// GET /api/items/info
pub async fn connection_info(State(st): State<AppState>) -> Json<ConnectionInfo> {
    Json(describe(st.repo.as_ref()).await)
}
