use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection};
use bb8_redis::redis::{self, AsyncCommands, aio::MultiplexedConnection};
use tracing::{debug, warn};

use crate::config::RedisConfig;
use crate::model::{Item, sort_items};
use crate::repo::{ItemRepository, ServerInfo};

/// Key naming for one keyspace.
///
/// * `<prefix>` holds every id
/// * `<prefix>:<id>` is the item hash
/// * `<prefix>:name:<name>` indexes ids by name
/// * `<prefix>:<id>:idx` lists the index keys an id is a member of
#[derive(Clone, Debug)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn all(&self) -> &str {
        &self.prefix
    }

    pub fn item(&self, id: &str) -> String {
        format!("{}:{id}", self.prefix)
    }

    pub fn item_indexes(&self, id: &str) -> String {
        format!("{}:{id}:idx", self.prefix)
    }

    pub fn name_index(&self, name: &str) -> String {
        format!("{}:name:{name}", self.prefix)
    }
}

pub struct RedisItemRepository {
    pool: Pool<RedisConnectionManager>,
    keys: Keyspace,
}

/// Attempts per write before a contended index set is reported as an error.
const MAX_TX_ATTEMPTS: u32 = 8;

impl RedisItemRepository {
    pub async fn connect(cfg: &RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(cfg.url.as_str())
            .context("invalid Redis connection URL")?;
        let pool = Pool::builder()
            .max_size(cfg.pool_size)
            .connection_timeout(cfg.connect_timeout)
            .build(manager)
            .await
            .context("failed to build Redis connection pool")?;

        let repo = Self::from_pool(pool, Keyspace::new(cfg.keyspace.clone()));
        // The store may come up after us; readiness reports it until then.
        if let Err(err) = repo.ping().await {
            warn!(?err, "Redis is not reachable yet");
        }
        Ok(repo)
    }

    pub fn from_pool(pool: Pool<RedisConnectionManager>, keys: Keyspace) -> Self {
        Self { pool, keys }
    }

    async fn connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .context("failed to get a Redis connection")
    }

    async fn load_many(
        &self,
        conn: &mut MultiplexedConnection,
        ids: Vec<String>,
    ) -> Result<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(self.keys.item(id));
        }
        let hashes: Vec<HashMap<String, String>> = pipe
            .query_async(conn)
            .await
            .context("failed to fetch item hashes")?;

        collect_items(&ids, hashes)
    }

    /// Runs the transaction built from the current members of `idx_key` under
    /// `WATCH`, retrying when another writer touches the set before `EXEC`.
    async fn commit_watched<F>(
        &self,
        conn: &mut MultiplexedConnection,
        idx_key: &str,
        build: F,
    ) -> Result<()>
    where
        F: Fn(&[String]) -> redis::Pipeline + Send + Sync,
    {
        for attempt in 1..=MAX_TX_ATTEMPTS {
            let () = redis::cmd("WATCH")
                .arg(idx_key)
                .query_async(conn)
                .await
                .context("WATCH failed")?;

            let indexes = match conn.smembers::<_, Vec<String>>(idx_key).await {
                Ok(indexes) => indexes,
                Err(err) => {
                    let _: redis::RedisResult<()> =
                        redis::cmd("UNWATCH").query_async(conn).await;
                    return Err(anyhow::Error::new(err).context("failed to read item indexes"));
                }
            };

            // EXEC replies nil when a watched key changed.
            let committed: Option<()> = build(&indexes)
                .query_async(conn)
                .await
                .context("transaction failed")?;
            if committed.is_some() {
                return Ok(());
            }
            debug!(attempt, key = idx_key, "index set changed concurrently, retrying");
        }
        bail!("{idx_key} kept changing, gave up after {MAX_TX_ATTEMPTS} attempts")
    }
}

/// `MULTI` block replacing the hash of `item` and moving it from the index
/// sets it was in (`previous`) to the ones matching its current fields.
fn save_pipeline(keys: &Keyspace, item: &Item, previous: &[String]) -> redis::Pipeline {
    let hash_key = keys.item(&item.id);
    let idx_key = keys.item_indexes(&item.id);
    let fields = item.to_hash_fields();

    let mut pipe = redis::pipe();
    pipe.atomic();
    for index in previous {
        pipe.srem(index, &item.id).ignore();
    }
    pipe.del(&hash_key).ignore().del(&idx_key).ignore();
    pipe.hset_multiple(&hash_key, fields.as_slice()).ignore();
    pipe.sadd(keys.all(), &item.id).ignore();
    if let Some(name) = &item.name {
        let name_key = keys.name_index(name);
        pipe.sadd(&name_key, &item.id)
            .ignore()
            .sadd(&idx_key, &name_key)
            .ignore();
    }
    pipe
}

fn delete_pipeline(keys: &Keyspace, id: &str, indexes: &[String]) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for index in indexes {
        pipe.srem(index, id).ignore();
    }
    pipe.del(keys.item(id))
        .ignore()
        .del(keys.item_indexes(id))
        .ignore()
        .srem(keys.all(), id)
        .ignore();
    pipe
}

/// Decodes pipelined `HGETALL` replies, one per id, in listing order.
fn collect_items(ids: &[String], hashes: Vec<HashMap<String, String>>) -> Result<Vec<Item>> {
    let mut items = Vec::with_capacity(ids.len());
    for (id, hash) in ids.iter().zip(hashes) {
        match Item::from_hash_fields(id, hash)? {
            Some(item) => items.push(item),
            // Index entry outlived its hash.
            None => debug!(%id, "skipping dangling item id"),
        }
    }
    sort_items(&mut items);
    Ok(items)
}

/// Drops items whose stored name no longer matches the index they were found
/// through.
fn retain_named(items: &mut Vec<Item>, name: &str) {
    items.retain(|item| {
        let matches = item.name.as_deref() == Some(name);
        if !matches {
            debug!(id = %item.id, index_name = name, "skipping stale name index entry");
        }
        matches
    });
}

#[async_trait]
impl ItemRepository for RedisItemRepository {
    fn backend(&self) -> &'static str {
        "RedisItemRepository"
    }

    async fn save(&self, item: Item) -> Result<Item> {
        let mut conn = self.connection().await?;
        let idx_key = self.keys.item_indexes(&item.id);
        self.commit_watched(&mut conn, &idx_key, |previous| {
            save_pipeline(&self.keys, &item, previous)
        })
        .await
        .with_context(|| format!("failed to save item {}", item.id))?;
        Ok(item)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Item>> {
        let mut conn = self.connection().await?;
        let hash = conn
            .hgetall::<_, HashMap<String, String>>(self.keys.item(id))
            .await
            .with_context(|| format!("failed to fetch item {id}"))?;
        Item::from_hash_fields(id, hash)
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<Item>> {
        let mut conn = self.connection().await?;
        let ids = conn
            .smembers::<_, Vec<String>>(self.keys.name_index(name))
            .await
            .context("failed to read name index")?;
        let mut items = self.load_many(&mut conn, ids).await?;
        retain_named(&mut items, name);
        Ok(items)
    }

    async fn find_all(&self) -> Result<Vec<Item>> {
        let mut conn = self.connection().await?;
        let ids = conn
            .smembers::<_, Vec<String>>(self.keys.all())
            .await
            .context("failed to read item ids")?;
        self.load_many(&mut conn, ids).await
    }

    async fn exists_by_id(&self, id: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        conn.exists::<_, bool>(self.keys.item(id))
            .await
            .with_context(|| format!("failed to check item {id}"))
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let idx_key = self.keys.item_indexes(id);
        self.commit_watched(&mut conn, &idx_key, |indexes| {
            delete_pipeline(&self.keys, id, indexes)
        })
        .await
        .with_context(|| format!("failed to delete item {id}"))
    }

    async fn count(&self) -> Result<u64> {
        let mut conn = self.connection().await?;
        conn.scard::<_, u64>(self.keys.all())
            .await
            .context("failed to count items")
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _pong: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .context("PING failed")?;
        Ok(())
    }

    async fn server_info(&self) -> Result<ServerInfo> {
        let mut conn = self.connection().await?;
        let raw: String = redis::cmd("INFO")
            .arg("server")
            .query_async(&mut *conn)
            .await
            .context("INFO server failed")?;
        Ok(ServerInfo::new(parse_info(&raw)))
    }
}

/// Parses the `key:value` lines of an `INFO` reply. Section headers start with
/// `#`.
pub fn parse_info(raw: &str) -> HashMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
