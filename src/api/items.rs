use axum::http::StatusCode;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use uuid::Uuid;

use super::types::{CreateParams, ItemRequest, JsonBody, SearchParams};
use crate::error::{ApiError, Result};
use crate::http::AppState;
use crate::model::Item;

const MAX_ITEM_ID_LENGTH: usize = 512;

/// Ids become part of store keys, so they may not contain the key separator.
/// `name` is taken by the name index prefix.
fn validate_id(id: &str) -> Result<&str> {
    if id.is_empty() {
        return Err(ApiError::BadRequest("id may not be empty".into()));
    }
    if id.len() > MAX_ITEM_ID_LENGTH {
        return Err(ApiError::BadRequest("id exceeds maximum length".into()));
    }
    if id.trim() != id {
        return Err(ApiError::BadRequest(
            "id may not start or end with whitespace".into(),
        ));
    }
    if id.contains(':') || id.chars().any(|c| c.is_control()) {
        return Err(ApiError::BadRequest("id contains invalid characters".into()));
    }
    if id == "name" {
        return Err(ApiError::BadRequest("id 'name' is reserved".into()));
    }
    Ok(id)
}

fn required(value: Option<String>, param: &str) -> Result<String> {
    value.ok_or_else(|| ApiError::BadRequest(format!("query parameter '{param}' is required")))
}

// ====== POST /api/items { id?, name, description } ======
pub async fn create(
    State(st): State<AppState>,
    JsonBody(req): JsonBody<ItemRequest>,
) -> Result<(StatusCode, Json<Item>)> {
    let id = match req.id {
        Some(raw) => {
            let id = raw.into_string();
            validate_id(&id)?;
            id
        }
        None => Uuid::new_v4().to_string(),
    };
    let saved = st
        .repo
        .save(Item::new(id, req.name, req.description))
        .await
        .map_err(ApiError::store)?;
    tracing::debug!(id = %saved.id, "created item");
    Ok((StatusCode::CREATED, Json(saved)))
}

// ====== GET /api/items/create?id=1&name=n&desc=d ======
pub async fn create_with_get(
    State(st): State<AppState>,
    Query(params): Query<CreateParams>,
) -> Result<(StatusCode, Json<Item>)> {
    let raw_id = required(params.id, "id")?;
    let id: i32 = raw_id
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("id must be an integer, got '{raw_id}'")))?;
    let name = required(params.name, "name")?;
    let desc = required(params.desc, "desc")?;

    let saved = st
        .repo
        .save(Item::new(id.to_string(), Some(name), Some(desc)))
        .await
        .map_err(ApiError::store)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

// ====== GET /api/items/:id ======
pub async fn get_by_id(State(st): State<AppState>, Path(id): Path<String>) -> Result<Json<Item>> {
    let id = validate_id(&id)?;
    st.repo
        .find_by_id(id)
        .await
        .map_err(ApiError::store)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

// ====== GET /api/items/search?name=test-key ======
pub async fn search_by_name(
    State(st): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Item>>> {
    let name = required(params.name, "name")?;
    let items = st
        .repo
        .find_by_name(&name)
        .await
        .map_err(ApiError::store)?;
    Ok(Json(items))
}

// ====== PUT /api/items/:id { name, description } ======
pub async fn update(
    State(st): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ItemRequest>,
) -> Result<Json<Item>> {
    let id = validate_id(&id)?;
    let mut existing = st
        .repo
        .find_by_id(id)
        .await
        .map_err(ApiError::store)?
        .ok_or(ApiError::NotFound)?;

    existing.name = req.name;
    existing.description = req.description;
    existing.updated_at = Some(Utc::now());

    let saved = st.repo.save(existing).await.map_err(ApiError::store)?;
    Ok(Json(saved))
}

// ====== DELETE /api/items/:id ======
pub async fn delete(State(st): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    let id = validate_id(&id)?;
    if !st.repo.exists_by_id(id).await.map_err(ApiError::store)? {
        return Err(ApiError::NotFound);
    }
    st.repo.delete_by_id(id).await.map_err(ApiError::store)?;
    tracing::debug!(%id, "deleted item");
    Ok(StatusCode::NO_CONTENT)
}

// ====== GET /api/items ======
pub async fn get_all(State(st): State<AppState>) -> Result<Json<Vec<Item>>> {
    let items = st.repo.find_all().await.map_err(ApiError::store)?;
    Ok(Json(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_id_rejects_unusable_ids() {
        assert!(validate_id("42").is_ok());
        assert!(validate_id("0b6c7a34-8a57-4df3-9a63-0f6a3a3c2a11").is_ok());

        for bad in ["", "a:b", "bad\u{0007}", "name", " a ", "a\t"] {
            let err = validate_id(bad).expect_err("id should be rejected");
            assert!(matches!(err, ApiError::BadRequest(_)), "{bad:?}");
        }

        let long = "a".repeat(MAX_ITEM_ID_LENGTH + 1);
        assert!(matches!(validate_id(&long), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn required_reports_parameter_name() {
        let err = required(None, "desc").unwrap_err();
        assert_eq!(
            err.to_string(),
            "bad request: query parameter 'desc' is required"
        );
        assert_eq!(required(Some(String::new()), "name").unwrap(), "");
    }
}
