use std::sync::Arc;
use std::time::Duration;

use rendercache::RendererImageProvider;
use rendercache::config::RenderCacheConfig;
use rendercache::provider::DefaultStore;
use rendercache::store::MemoryStore;
use tokio::time::{Instant, sleep, sleep_until};

use crate::{TestRenderer, deliveries, setup_provider};

#[tokio::test(start_paused = true)]
async fn test_invalidate_in_flight() {
    let provider = setup_provider(|_| {});
    let start = Instant::now();

    let first = tokio::spawn(deliveries(provider.request("a".into())));

    sleep_until(start + Duration::from_millis(10)).await;
    provider.invalidate(&"a".into());
    assert_eq!(provider.entry_count(), 0);

    // the next request misses and starts a second render
    sleep_until(start + Duration::from_millis(20)).await;
    let second = tokio::spawn(deliveries(provider.request("a".into())));

    // the first render still completes for everyone attached to it
    insta::assert_debug_snapshot!(first.await.unwrap(), @r###"
    [
        Image {
            render: 1,
            cache_hit: false,
        },
        Image {
            render: 1,
            cache_hit: true,
        },
    ]
    "###);
    insta::assert_debug_snapshot!(second.await.unwrap(), @r###"
    [
        Image {
            render: 2,
            cache_hit: false,
        },
        Image {
            render: 2,
            cache_hit: true,
        },
    ]
    "###);

    let cached = provider.get_image("a".into()).await.unwrap();
    assert!(cached.cache_hit);
    assert_eq!(cached.image.render, 2);
    assert_eq!(provider.renderer().computations_for("a"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_spares_replacement() {
    let provider = setup_provider(|_| {});
    let start = Instant::now();
    provider.renderer().fail_on("a");

    let first = provider.get_image("a".into());

    sleep_until(start + Duration::from_millis(10)).await;
    provider.invalidate(&"a".into());
    provider.renderer().succeed_on("a");

    sleep_until(start + Duration::from_millis(20)).await;
    let second = provider.get_image("a".into());

    // the first render fails after the second one took its place
    assert!(first.await.is_err());
    assert_eq!(provider.entry_count(), 1);

    let second = second.await.unwrap();
    assert!(!second.cache_hit);
    assert_eq!(second.image.render, 2);

    let cached = provider.get_image("a".into()).await.unwrap();
    assert!(cached.cache_hit);
    assert_eq!(provider.renderer().computations_for("a"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_full_store_keeps_new_renders() {
    let provider = setup_provider(|config| config.in_memory_capacity = 4);

    for i in 0..4 {
        let image = provider.get_image(format!("hot-{i}")).await.unwrap();
        assert!(!image.cache_hit);
    }
    assert_eq!(provider.entry_count(), 4);

    for i in 0..20 {
        let key = format!("cold-{i}");
        let first = provider.get_image(key.clone());
        // let the store catch up on its housekeeping while the render is in flight
        assert_eq!(provider.entry_count(), 4);
        sleep(Duration::from_millis(10)).await;

        let second = provider.get_image(key.clone());
        let (first, second) = tokio::join!(first, second);

        assert!(!first.unwrap().cache_hit);
        assert!(second.unwrap().cache_hit);
        assert_eq!(provider.renderer().computations_for(&key), 1);
    }
}

#[tokio::test]
async fn test_time_to_live() {
    let provider = setup_provider(|config| {
        config.time_to_live = Some(Duration::from_millis(200));
    });

    let first = provider.get_image("a".into()).await.unwrap();
    assert!(!first.cache_hit);
    assert!(provider.get_image("a".into()).await.unwrap().cache_hit);

    sleep(Duration::from_millis(300)).await;

    let expired = provider.get_image("a".into()).await.unwrap();
    assert!(!expired.cache_hit);
    assert_eq!(expired.image.render, 2);
}

#[tokio::test(start_paused = true)]
async fn test_shared_store() {
    rendercache_test::setup();

    let config = RenderCacheConfig::default();
    let store: Arc<DefaultStore<TestRenderer>> = Arc::new(MemoryStore::new("shared", &config));
    let handle = tokio::runtime::Handle::current();

    let first = RendererImageProvider::with_store(
        "first",
        config,
        TestRenderer::default(),
        Arc::clone(&store),
        handle.clone(),
    );
    let second = RendererImageProvider::with_store(
        "second",
        config,
        TestRenderer::default(),
        Arc::clone(&store),
        handle,
    );

    assert!(!first.get_image("a".into()).await.unwrap().cache_hit);
    // renders are shared through the store, not through the provider
    assert!(second.get_image("a".into()).await.unwrap().cache_hit);

    assert_eq!(first.renderer().computations(), 1);
    assert_eq!(second.renderer().computations(), 0);
    assert_eq!(second.entry_count(), 1);
}
