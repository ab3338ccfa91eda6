//! Persistence for [`Item`]s.
//!
//! The HTTP layer only talks to [`ItemRepository`]; the Redis implementation
//! is what runs in production, the in-memory one backs local runs and tests.
use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::Item;

pub mod memory;
pub mod redis;

/// Server properties reported by the backing store (`INFO server`).
#[derive(Clone, Debug, Default)]
pub struct ServerInfo {
    properties: HashMap<String, String>,
}

impl ServerInfo {
    pub fn new(properties: HashMap<String, String>) -> Self {
        Self { properties }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }
}

#[async_trait]
pub trait ItemRepository: Send + Sync + 'static {
    /// Short name of the implementation, surfaced by the diagnostics endpoint.
    fn backend(&self) -> &'static str;

    /// Insert or replace the item stored under `item.id`.
    async fn save(&self, item: Item) -> anyhow::Result<Item>;

    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Item>>;

    /// Exact match on the indexed `name` field.
    async fn find_by_name(&self, name: &str) -> anyhow::Result<Vec<Item>>;

    async fn find_all(&self) -> anyhow::Result<Vec<Item>>;

    async fn exists_by_id(&self, id: &str) -> anyhow::Result<bool>;

    async fn delete_by_id(&self, id: &str) -> anyhow::Result<()>;

    async fn count(&self) -> anyhow::Result<u64>;

    async fn ping(&self) -> anyhow::Result<()>;

    async fn server_info(&self) -> anyhow::Result<ServerInfo>;
}
