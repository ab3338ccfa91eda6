use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::{Value, json};

use crate::error::{ApiError, Result};
use crate::http::AppState;

const UP: &str = "UP";
const DOWN: &str = "DOWN";

async fn store_component(st: &AppState) -> (bool, Value) {
    let backend = st.repo.backend();
    match st.repo.ping().await {
        Ok(()) => (
            true,
            json!({ "status": UP, "details": { "backend": backend } }),
        ),
        Err(err) => {
            tracing::warn!(?err, "store health check failed");
            (
                false,
                json!({
                    "status": DOWN,
                    "details": { "backend": backend, "error": format!("{err:#}") },
                }),
            )
        }
    }
}

fn status_code(up: bool) -> StatusCode {
    if up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

// GET /actuator/health
pub async fn health(State(st): State<AppState>) -> (StatusCode, Json<Value>) {
    let (up, store) = store_component(&st).await;
    let body = json!({
        "status": if up { UP } else { DOWN },
        "components": { "store": store },
    });
    (status_code(up), Json(body))
}

// GET /actuator/health/liveness, GET /healthz
pub async fn liveness() -> Json<Value> {
    Json(json!({ "status": UP }))
}

// GET /actuator/health/readiness
pub async fn readiness(State(st): State<AppState>) -> (StatusCode, Json<Value>) {
    let (up, _) = store_component(&st).await;
    (
        status_code(up),
        Json(json!({ "status": if up { UP } else { DOWN } })),
    )
}

// GET /actuator/info
pub async fn info(State(st): State<AppState>) -> Json<Value> {
    let mut body = json!({
        "app": { "name": st.app.name, "version": st.app.version },
    });
    if let Some(cf) = &st.app.cf {
        body["cloudfoundry"] = json!(cf);
    }
    Json(body)
}

// GET /actuator/prometheus
pub async fn prometheus(State(st): State<AppState>) -> Result<impl IntoResponse> {
    let text = st
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(format!("{e:#}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}
