use std::time::Duration;

use futures::StreamExt;
use rendercache::config::RenderCacheConfig;
use rendercache::provider::RenderStream;
use rendercache::{RenderError, RendererImageProvider};
use tokio::runtime::Handle;

pub use rendercache_test::{TestImage, TestRenderError, TestRenderer};

/// The time every render of the [`TestRenderer`] takes, unless configured otherwise.
pub const RENDER_TIME: Duration = Duration::from_millis(50);

pub type TestProvider = RendererImageProvider<TestRenderer>;

/// Setup tests and create a provider on the current runtime.
///
/// The `update_config` closure can modify the default configuration before the provider is
/// created.
pub fn setup_provider(update_config: impl FnOnce(&mut RenderCacheConfig)) -> TestProvider {
    rendercache_test::setup();

    let mut config = RenderCacheConfig::default();
    update_config(&mut config);

    RendererImageProvider::new(
        "test",
        config,
        TestRenderer::new(RENDER_TIME),
        Handle::current(),
    )
}

/// What a single requester got delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Image { render: usize, cache_hit: bool },
    Failed,
    Abandoned,
}

impl Delivery {
    pub fn new(result: &Result<rendercache::RenderResult<TestImage>, RenderError>) -> Self {
        match result {
            Ok(result) => Self::Image {
                render: result.image.render,
                cache_hit: result.cache_hit,
            },
            Err(RenderError::ComputationFailed { .. }) => Self::Failed,
            Err(RenderError::Abandoned { .. }) => Self::Abandoned,
        }
    }
}

/// Drains a stream of results, mapping each to a [`Delivery`].
pub async fn deliveries(stream: RenderStream<TestImage>) -> Vec<Delivery> {
    stream.map(|result| Delivery::new(&result)).collect().await
}
