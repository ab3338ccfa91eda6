//! Runs against a live server when `REDIS_TEST_URL` is set, e.g.
//! `REDIS_TEST_URL=redis://127.0.0.1:6379 cargo test --test redis_repository`.
//! Each test uses its own keyspace and removes it afterwards.
use std::time::Duration;

use bb8_redis::redis::{self, AsyncCommands};
use item_cache_server::config::{RedisConfig, RedisSource};
use item_cache_server::model::Item;
use item_cache_server::repo::ItemRepository;
use item_cache_server::repo::redis::RedisItemRepository;
use uuid::Uuid;

struct Fixture {
    repo: RedisItemRepository,
    url: String,
    keyspace: String,
}

impl Fixture {
    async fn cleanup(self) {
        let client = redis::Client::open(self.url.as_str()).expect("client");
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .expect("connection");
        let keys = conn
            .keys::<_, Vec<String>>(format!("{}*", self.keyspace))
            .await
            .expect("list keys");
        if !keys.is_empty() {
            let _: () = conn.del(keys).await.expect("delete keys");
        }
    }
}

async fn fixture() -> Option<Fixture> {
    let Ok(url) = std::env::var("REDIS_TEST_URL") else {
        eprintln!("REDIS_TEST_URL not set; skipping");
        return None;
    };
    let keyspace = format!("items-test-{}", Uuid::new_v4().simple());
    let cfg = RedisConfig {
        url: url.clone(),
        source: RedisSource::Explicit,
        pool_size: 2,
        connect_timeout: Duration::from_secs(2),
        keyspace: keyspace.clone(),
    };
    let repo = RedisItemRepository::connect(&cfg).await.expect("connect");
    Some(Fixture {
        repo,
        url,
        keyspace,
    })
}

#[tokio::test]
async fn save_find_and_count() {
    let Some(fx) = fixture().await else { return };

    let item = Item::new("1", Some("test-key".into()), Some("some value".into()));
    let saved = fx.repo.save(item.clone()).await.expect("save");
    assert_eq!(saved, item);

    let found = fx.repo.find_by_id("1").await.expect("find").expect("item");
    assert_eq!(found, item);
    assert!(fx.repo.exists_by_id("1").await.expect("exists"));
    assert!(fx.repo.find_by_id("2").await.expect("find").is_none());
    assert_eq!(fx.repo.count().await.expect("count"), 1);

    fx.cleanup().await;
}

#[tokio::test]
async fn resaving_moves_name_index() {
    let Some(fx) = fixture().await else { return };

    fx.repo
        .save(Item::new("1", Some("old".into()), None))
        .await
        .expect("save");
    fx.repo
        .save(Item::new("1", Some("new".into()), None))
        .await
        .expect("resave");

    assert!(fx.repo.find_by_name("old").await.expect("search").is_empty());
    let found = fx.repo.find_by_name("new").await.expect("search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "1");
    assert_eq!(fx.repo.count().await.expect("count"), 1);

    fx.cleanup().await;
}

#[tokio::test]
async fn delete_clears_hash_and_indexes() {
    let Some(fx) = fixture().await else { return };

    fx.repo
        .save(Item::new("1", Some("gone".into()), None))
        .await
        .expect("save");
    fx.repo
        .save(Item::new("2", Some("kept".into()), None))
        .await
        .expect("save");
    fx.repo.delete_by_id("1").await.expect("delete");

    assert!(!fx.repo.exists_by_id("1").await.expect("exists"));
    assert!(fx.repo.find_by_name("gone").await.expect("search").is_empty());
    let all = fx.repo.find_all().await.expect("all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "2");

    fx.cleanup().await;
}

#[tokio::test]
async fn reports_server_info() {
    let Some(fx) = fixture().await else { return };

    fx.repo.ping().await.expect("ping");
    let info = fx.repo.server_info().await.expect("info");
    assert!(info.get("redis_version").is_some());
    assert!(info.get("tcp_port").is_some());

    fx.cleanup().await;
}

#[tokio::test]
async fn concurrent_renames_leave_one_consistent_index() {
    let Some(fx) = fixture().await else { return };

    for _ in 0..20 {
        let (a, b) = tokio::join!(
            fx.repo.save(Item::new("1", Some("a".into()), None)),
            fx.repo.save(Item::new("1", Some("b".into()), None)),
        );
        a.expect("save a");
        b.expect("save b");

        let stored = fx.repo.find_by_id("1").await.expect("find").expect("item");
        let name = stored.name.expect("name");
        let other = if name == "a" { "b" } else { "a" };
        assert_eq!(fx.repo.find_by_name(&name).await.expect("search").len(), 1);
        assert!(fx.repo.find_by_name(other).await.expect("search").is_empty());
    }

    fx.cleanup().await;
}
