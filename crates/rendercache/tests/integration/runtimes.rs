use rendercache::RenderError;
use tokio::runtime::Builder;

use crate::setup_provider;

#[tokio::test]
async fn test_explicit_runtime() {
    let provider = setup_provider(|_| {});
    let render_runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("render")
        .enable_time()
        .build()
        .unwrap();

    let image = provider
        .get_image_on("a".into(), render_runtime.handle())
        .await
        .unwrap();
    assert!(!image.cache_hit);

    // whoever attaches later does not care where the render ran
    assert!(provider.get_image("a".into()).await.unwrap().cache_hit);

    render_runtime.shutdown_background();
}

#[tokio::test]
async fn test_runtime_shutdown() {
    let provider = setup_provider(|_| {});
    // a runtime that is never driven, so the render never gets to run
    let render_runtime = Builder::new_current_thread().enable_time().build().unwrap();

    let abandoned = provider.get_image_on("a".into(), render_runtime.handle());
    assert_eq!(provider.entry_count(), 1);

    render_runtime.shutdown_background();

    let error = abandoned.await.unwrap_err();
    assert!(matches!(error, RenderError::Abandoned { .. }));
    assert_eq!(provider.entry_count(), 0);
    assert_eq!(provider.renderer().computations(), 0);

    let image = provider.get_image("a".into()).await.unwrap();
    assert!(!image.cache_hit);
    assert_eq!(image.image.render, 1);
}
