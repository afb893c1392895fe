//! Helpers for testing the render cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Most tests should run with `#[tokio::test(start_paused = true)]`. The [`TestRenderer`]
//!    sleeps on the tokio clock, so paused time makes render timings exact and the tests fast.
//!
//!  - The [`TestRenderer`] counts its computations as soon as a render is *started*, not when it
//!    completes. Asserting on [`TestRenderer::computations`] is therefore meaningful even while
//!    renders are still in flight.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use rendercache::Renderer;
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `rendercache` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("rendercache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// The image produced by the [`TestRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestImage {
    /// The render data this image was rendered from.
    pub name: String,
    /// How many times `name` had been rendered when this image was started, starting at `1`.
    pub render: usize,
}

/// The error returned by the [`TestRenderer`] for render data it was told to fail on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to render {name}")]
pub struct TestRenderError {
    pub name: String,
}

#[derive(Debug, Default)]
struct Behavior {
    failing: BTreeSet<String>,
    panicking: BTreeSet<String>,
}

/// A [`Renderer`] with configurable timing and failures.
///
/// Every render takes `render_time` on the tokio clock. The behavior for a given render data is
/// decided when its render starts, so changing it does not affect renders already in flight.
#[derive(Debug)]
pub struct TestRenderer {
    render_time: Duration,
    behavior: Mutex<Behavior>,
    computations: Mutex<BTreeMap<String, usize>>,
}

impl TestRenderer {
    pub fn new(render_time: Duration) -> Self {
        Self {
            render_time,
            behavior: Default::default(),
            computations: Default::default(),
        }
    }

    /// Makes all following renders of `name` fail.
    pub fn fail_on(&self, name: &str) {
        self.behavior.lock().unwrap().failing.insert(name.into());
    }

    /// Makes all following renders of `name` panic.
    pub fn panic_on(&self, name: &str) {
        self.behavior.lock().unwrap().panicking.insert(name.into());
    }

    /// Makes all following renders of `name` succeed again.
    pub fn succeed_on(&self, name: &str) {
        let mut behavior = self.behavior.lock().unwrap();
        behavior.failing.remove(name);
        behavior.panicking.remove(name);
    }

    /// The total number of renders started.
    pub fn computations(&self) -> usize {
        self.computations.lock().unwrap().values().sum()
    }

    /// The number of renders started for `name`.
    pub fn computations_for(&self, name: &str) -> usize {
        self.computations
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or_default()
    }
}

impl Default for TestRenderer {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl Renderer for TestRenderer {
    type RenderData = String;
    type Image = TestImage;
    type Error = TestRenderError;

    fn render_image<'a>(
        &'a self,
        data: &'a String,
    ) -> BoxFuture<'a, Result<TestImage, TestRenderError>> {
        let render = {
            let mut computations = self.computations.lock().unwrap();
            let count = computations.entry(data.clone()).or_default();
            *count += 1;
            *count
        };
        let (fail, panic) = {
            let behavior = self.behavior.lock().unwrap();
            (
                behavior.failing.contains(data),
                behavior.panicking.contains(data),
            )
        };

        Box::pin(async move {
            tokio::time::sleep(self.render_time).await;

            if panic {
                panic!("rendering {data} panicked");
            }
            if fail {
                return Err(TestRenderError { name: data.clone() });
            }
            Ok(TestImage {
                name: data.clone(),
                render,
            })
        })
    }
}
