use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Type tag stored in the `_class` field of every item hash.
pub const ITEM_CLASS: &str = "Item";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: Option<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name,
            description,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Field/value pairs of the stored hash. Missing optionals are left out.
    pub fn to_hash_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("_class", ITEM_CLASS.to_string()), ("id", self.id.clone())];
        if let Some(name) = &self.name {
            fields.push(("name", name.clone()));
        }
        if let Some(description) = &self.description {
            fields.push(("description", description.clone()));
        }
        if let Some(ts) = self.created_at {
            fields.push(("createdAt", format_timestamp(ts)));
        }
        if let Some(ts) = self.updated_at {
            fields.push(("updatedAt", format_timestamp(ts)));
        }
        fields
    }

    /// Rebuilds an item from `HGETALL` output. An empty hash means the key does
    /// not exist.
    pub fn from_hash_fields(id: &str, mut fields: HashMap<String, String>) -> Result<Option<Self>> {
        if fields.is_empty() {
            return Ok(None);
        }

        let created_at = fields
            .remove("createdAt")
            .map(|raw| parse_timestamp(&raw))
            .transpose()
            .with_context(|| format!("item {id} has an invalid createdAt"))?;
        let updated_at = fields
            .remove("updatedAt")
            .map(|raw| parse_timestamp(&raw))
            .transpose()
            .with_context(|| format!("item {id} has an invalid updatedAt"))?;

        Ok(Some(Self {
            id: fields.remove("id").unwrap_or_else(|| id.to_string()),
            name: fields.remove("name"),
            description: fields.remove("description"),
            created_at,
            updated_at,
        }))
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("'{raw}' is not an RFC 3339 timestamp"))
}

/// Sort order used for listings: oldest first, ties broken by id.
pub fn sort_items(items: &mut [Item]) {
    items.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
