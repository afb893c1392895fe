use std::error::Error;
use std::time::Duration;

use rendercache::RenderError;
use tokio::time::sleep;

use crate::{Delivery, TestRenderError, deliveries, setup_provider};

#[tokio::test(start_paused = true)]
async fn test_failed_render() {
    let provider = setup_provider(|_| {});
    provider.renderer().fail_on("K3");

    let callers: Vec<_> = [0, 10, 20]
        .into_iter()
        .map(|delay| {
            let provider = provider.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(delay)).await;
                deliveries(provider.request("K3".into())).await
            })
        })
        .collect();

    for caller in callers {
        // every observer gets the failure exactly once
        assert_eq!(caller.await.unwrap(), [Delivery::Failed]);
    }
    assert_eq!(provider.renderer().computations_for("K3"), 1);

    // the failure was evicted, so the next request renders again
    assert_eq!(provider.entry_count(), 0);
    provider.renderer().succeed_on("K3");

    let retry = deliveries(provider.request("K3".into())).await;
    insta::assert_debug_snapshot!(retry, @r###"
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
    assert_eq!(provider.renderer().computations_for("K3"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_retried_immediately() {
    let provider = setup_provider(|_| {});
    provider.renderer().fail_on("a");

    assert!(provider.get_image("a".into()).await.is_err());

    // the entry is gone by the time the failure is observed
    assert!(provider.get_image("a".into()).await.is_err());
    assert_eq!(provider.renderer().computations_for("a"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cached_failure() {
    let provider = setup_provider(|config| config.evict_failures = false);
    provider.renderer().fail_on("a");

    let first = provider.get_image("a".into()).await.unwrap_err();
    provider.renderer().succeed_on("a");

    // the failure is served from the cache like any other result
    let second = provider.get_image("a".into()).await.unwrap_err();
    assert_eq!(second.to_string(), first.to_string());
    assert_eq!(provider.renderer().computations_for("a"), 1);
    assert_eq!(provider.entry_count(), 1);

    provider.invalidate(&"a".into());

    let image = provider.get_image("a".into()).await.unwrap();
    assert!(!image.cache_hit);
    assert_eq!(image.image.render, 2);
}

#[tokio::test(start_paused = true)]
async fn test_render_error() {
    let provider = setup_provider(|_| {});
    provider.renderer().fail_on("a");

    let error = provider.get_image("a".into()).await.unwrap_err();

    assert_eq!(error.key(), "\"a\"");
    assert_eq!(error.to_string(), "rendering \"a\" failed");

    assert_eq!(error.source().unwrap().to_string(), "failed to render a");

    let RenderError::ComputationFailed { cause, .. } = &error else {
        panic!("unexpected error: {error:?}");
    };
    assert_eq!(
        cause.downcast_ref::<TestRenderError>(),
        Some(&TestRenderError { name: "a".into() })
    );
}

#[tokio::test(start_paused = true)]
async fn test_panicking_render() {
    let provider = setup_provider(|_| {});
    provider.renderer().panic_on("a");

    let (first, second) = tokio::join!(
        provider.get_image("a".into()),
        provider.get_image("a".into()),
    );

    for result in [first, second] {
        let error = result.unwrap_err();
        assert!(matches!(error, RenderError::Abandoned { .. }));
        assert_eq!(error.key(), "\"a\"");
    }

    // abandoned renders never stay cached
    assert_eq!(provider.entry_count(), 0);
    provider.renderer().succeed_on("a");

    let image = provider.get_image("a".into()).await.unwrap();
    assert!(!image.cache_hit);
    assert_eq!(provider.renderer().computations_for("a"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_per_key() {
    let provider = setup_provider(|_| {});
    provider.renderer().fail_on("broken");

    let (broken, working) = tokio::join!(
        provider.get_image("broken".into()),
        provider.get_image("working".into()),
    );

    assert!(broken.is_err());
    assert!(!working.unwrap().cache_hit);
    assert!(provider.get_image("working".into()).await.unwrap().cache_hit);
}
