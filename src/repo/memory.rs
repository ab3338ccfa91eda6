use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Item, sort_items};
use crate::repo::{ItemRepository, ServerInfo};

/// Process-local repository with the same semantics as the Redis one.
#[derive(Default)]
pub struct MemoryItemRepository {
    items: RwLock<HashMap<String, Item>>,
}

impl MemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ItemRepository for MemoryItemRepository {
    fn backend(&self) -> &'static str {
        "MemoryItemRepository"
    }

    async fn save(&self, item: Item) -> anyhow::Result<Item> {
        self.items
            .write()
            .await
            .insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Item>> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> anyhow::Result<Vec<Item>> {
        let mut found: Vec<Item> = self
            .items
            .read()
            .await
            .values()
            .filter(|item| item.name.as_deref() == Some(name))
            .cloned()
            .collect();
        sort_items(&mut found);
        Ok(found)
    }

    async fn find_all(&self) -> anyhow::Result<Vec<Item>> {
        let mut all: Vec<Item> = self.items.read().await.values().cloned().collect();
        sort_items(&mut all);
        Ok(all)
    }

    async fn exists_by_id(&self, id: &str) -> anyhow::Result<bool> {
        Ok(self.items.read().await.contains_key(id))
    }

    async fn delete_by_id(&self, id: &str) -> anyhow::Result<()> {
        self.items.write().await.remove(id);
        Ok(())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        Ok(self.items.read().await.len() as u64)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn server_info(&self) -> anyhow::Result<ServerInfo> {
        Ok(ServerInfo::new(HashMap::from([(
            "server_name".to_string(),
            "memory".to_string(),
        )])))
    }
}
