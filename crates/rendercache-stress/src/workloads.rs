use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rendercache::RendererImageProvider;
use rendercache_test::TestRenderer;

#[derive(Debug, Deserialize, Serialize)]
pub struct WorkloadsConfig {
    pub workloads: Vec<Workload>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Workload {
    /// The number of requests in flight at any time.
    pub concurrency: usize,
    /// The number of distinct render data requested, in round-robin order.
    pub keys: usize,
    /// How long a single render takes.
    #[serde(with = "humantime_serde")]
    pub render_time: Duration,
}

/// The render data requested by a single workload.
#[derive(Debug)]
pub struct KeySpace {
    workload: usize,
    keys: usize,
    next: AtomicUsize,
}

impl KeySpace {
    pub fn new(workload: usize, keys: usize) -> Self {
        Self {
            workload,
            keys: keys.max(1),
            next: AtomicUsize::new(0),
        }
    }

    pub fn next_key(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) % self.keys;
        format!("workload-{}/image-{n}", self.workload)
    }
}

/// Requests the next image of `keys`, returning whether it was served from the cache.
pub async fn process_request(
    provider: &RendererImageProvider<TestRenderer>,
    keys: &KeySpace,
) -> bool {
    match provider.get_image(keys.next_key()).await {
        Ok(result) => result.cache_hit,
        Err(error) => {
            tracing::error!(error = &error as &dyn std::error::Error, "Render failed");
            false
        }
    }
}
