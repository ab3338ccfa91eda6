use axum::extract::FromRequest;
use serde::Deserialize;

use crate::error::ApiError;

/// `axum::Json` whose rejections are reported as [`ApiError::BadRequest`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Item ids arrive as strings, but numeric ids (as produced by
/// `/api/items/create`) are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    pub fn into_string(self) -> String {
        match self {
            RawId::Text(id) => id,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Body of `POST /api/items` and `PUT /api/items/{id}`. Timestamps sent by the
/// client are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ItemRequest {
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

// GET /api/items/create?id=&name=&desc=
#[derive(Debug, Deserialize)]
pub struct CreateParams {
    pub id: Option<String>,
    pub name: Option<String>,
    pub desc: Option<String>,
}

// GET /api/items/search?name=
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub name: Option<String>,
}
