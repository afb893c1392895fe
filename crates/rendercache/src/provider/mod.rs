//! The deduplicating front-end to a [`Renderer`].
//!
//! [`RendererImageProvider`] guarantees that images for a given render data are only rendered
//! once, and multicasted to every requester.
//!
//! For every request, the provider looks up the render data in its [`KeyedStore`]:
//!
//! - On a miss, it creates a new pending [`ResultCell`], registers it in the store, and only then
//!   spawns the [`Renderer`] on the execution context. Once the render completes, the cell is
//!   resolved with the image (or the error).
//! - On a hit, it attaches to the existing cell, no matter whether that render is still running or
//!   has long finished.
//!
//! The lookup and the registration happen under a per-key lock, so two concurrent first requests
//! for the same render data can never both start a computation.
//!
//! ## Cache hits
//!
//! The requester that triggered a render is the only one to ever see `cache_hit = false`. Every
//! other requester is attached to an existing computation and sees `cache_hit = true`, even if it
//! had to wait for the render to finish.
//!
//! ## Failures
//!
//! A failed render resolves its cell with a [`RenderError`], which is delivered once to every
//! observer. With [`evict_failures`](RenderCacheConfig::evict_failures) enabled, the failed entry
//! is removed from the store *before* the observers are woken up, so a following request starts a
//! new render. A render that never completes, because it panicked or its runtime shut down, is
//! always removed and observed as [`RenderError::Abandoned`].
//!
//! ## Eviction
//!
//! The store may evict an entry while its render is still running. Everybody attached to it still
//! gets the result, but a new request for the same render data misses and starts a second render.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use sentry::{Hub, SentryFutureExt};
use tokio::runtime::Handle;

use crate::cell::{CellId, CellResolver, Observation, ResultCell};
use crate::config::RenderCacheConfig;
use crate::error::RenderError;
use crate::renderer::Renderer;
use crate::store::{KeyedStore, MemoryStore};
use crate::types::RenderResult;
use crate::utils::defer::defer;

mod locks;

use locks::KeyLocks;

/// The outcome of a render, as stored in its [`ResultCell`].
pub type RenderOutcome<I> = Result<Arc<I>, RenderError>;

/// The cell holding the outcome of a single render.
pub type RenderCell<I> = ResultCell<RenderOutcome<I>>;

/// The store used by [`RendererImageProvider::new`].
pub type DefaultStore<R> =
    MemoryStore<<R as Renderer>::RenderData, RenderCell<<R as Renderer>::Image>>;

/// The single tagged result of [`RendererImageProvider::get_image`].
pub type RenderFuture<I> = BoxFuture<'static, Result<RenderResult<I>, RenderError>>;

/// The tagged results of [`RendererImageProvider::request`].
///
/// The requester that triggered the render receives two elements: the fresh image, followed by
/// the same image tagged as cached. Every other requester receives the cached image only. A
/// failed render yields a single error.
pub type RenderStream<I> = BoxStream<'static, Result<RenderResult<I>, RenderError>>;

/// A request attached to a render cell.
struct Attached<I> {
    cell: RenderCell<I>,
    /// Whether this request registered the cell and started its render.
    originated: bool,
}

/// Deduplicates and caches renders of a [`Renderer`].
pub struct RendererImageProvider<R: Renderer, S = DefaultStore<R>> {
    /// The name of this provider, used to tag metrics.
    name: Arc<str>,

    config: RenderCacheConfig,

    renderer: Arc<R>,

    /// The store holding in-flight and completed renders.
    store: Arc<S>,

    /// Serializes the lookup-or-create sequence per key.
    locks: Arc<KeyLocks>,

    /// The default execution context for renders.
    runtime: Handle,
}

impl<R: Renderer, S> Clone for RendererImageProvider<R, S> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            name: Arc::clone(&self.name),
            config: self.config,
            renderer: Arc::clone(&self.renderer),
            store: Arc::clone(&self.store),
            locks: Arc::clone(&self.locks),
            runtime: self.runtime.clone(),
        }
    }
}

impl<R: Renderer, S> fmt::Debug for RendererImageProvider<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererImageProvider")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl<R: Renderer> RendererImageProvider<R> {
    /// Creates a provider backed by an in-memory store configured by `config`.
    ///
    /// Renders are spawned on `runtime` unless a request specifies its own execution context.
    pub fn new(name: &str, config: RenderCacheConfig, renderer: R, runtime: Handle) -> Self {
        let store = MemoryStore::new(name, &config);
        Self::with_store(name, config, renderer, store, runtime)
    }
}

impl<R, S> RendererImageProvider<R, S>
where
    R: Renderer,
    S: KeyedStore<R::RenderData, RenderCell<R::Image>>,
{
    /// Creates a provider on top of an existing store.
    pub fn with_store(
        name: &str,
        config: RenderCacheConfig,
        renderer: R,
        store: S,
        runtime: Handle,
    ) -> Self {
        Self {
            name: Arc::from(name),
            locks: Arc::new(KeyLocks::new(config.lock_shards)),
            config,
            renderer: Arc::new(renderer),
            store: Arc::new(store),
            runtime,
        }
    }

    /// The name of this provider.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The renderer doing the actual work.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The number of in-flight and completed renders currently held by the store.
    pub fn entry_count(&self) -> u64 {
        self.store.entry_count()
    }

    /// Returns the image for `data`, tagged with whether it was served from the cache.
    ///
    /// The render is started eagerly, before the returned future is first polled. Dropping the
    /// future does not cancel the render.
    pub fn get_image(&self, data: R::RenderData) -> RenderFuture<R::Image> {
        self.get_image_on(data, &self.runtime)
    }

    /// Same as [`get_image`](Self::get_image), spawning a render on `runtime` if needed.
    pub fn get_image_on(&self, data: R::RenderData, runtime: &Handle) -> RenderFuture<R::Image> {
        let Attached { cell, originated } = self.attach(data.clone(), runtime);
        let observation = cell.observe();

        Box::pin(async move {
            let image = observe_outcome(observation, &data).await?;
            Ok(match originated {
                true => RenderResult::fresh(image),
                false => RenderResult::cached(image),
            })
        })
    }

    /// Returns the sequence of tagged results for `data`.
    ///
    /// See [`RenderStream`] for the elements this yields. Like [`get_image`](Self::get_image),
    /// the render is started eagerly and not cancelled when the stream is dropped.
    pub fn request(&self, data: R::RenderData) -> RenderStream<R::Image> {
        self.request_on(data, &self.runtime)
    }

    /// Same as [`request`](Self::request), spawning a render on `runtime` if needed.
    pub fn request_on(&self, data: R::RenderData, runtime: &Handle) -> RenderStream<R::Image> {
        let Attached { cell, originated } = self.attach(data.clone(), runtime);
        let observation = cell.observe();

        stream::once(async move { observe_outcome(observation, &data).await })
            .flat_map(move |outcome| {
                let results = match outcome {
                    Ok(image) if originated => vec![
                        Ok(RenderResult::fresh(Arc::clone(&image))),
                        Ok(RenderResult::cached(image)),
                    ],
                    Ok(image) => vec![Ok(RenderResult::cached(image))],
                    Err(error) => vec![Err(error)],
                };
                stream::iter(results)
            })
            .boxed()
    }

    /// Removes the entry for `data` from the store.
    ///
    /// A render that is still in flight completes for everyone already attached to it, but the
    /// next request for `data` starts a new render.
    pub fn invalidate(&self, data: &R::RenderData) {
        let _guard = self.locks.lock(data);
        self.store.remove(data);
    }

    /// Attaches to the cell for `data`, registering a new one and spawning its render on a miss.
    ///
    /// NOTE: This function itself is *not* `async`, because it should eagerly spawn the render
    /// on the runtime, even if the caller never awaits the result.
    fn attach(&self, data: R::RenderData, runtime: &Handle) -> Attached<R::Image> {
        let name = self.name.as_ref();
        metric!(counter("render.access") += 1, "cache" => name);

        let guard = self.locks.lock(&data);
        if let Some(cell) = self.store.get(&data) {
            drop(guard);
            metric!(counter("render.memory.hit") += 1, "cache" => name);
            tracing::trace!(cache = name, cell = %cell.id(), ?data, "Attaching to existing render");
            return Attached {
                cell,
                originated: false,
            };
        }

        // The cell has to be visible to concurrent lookups before the render starts.
        let (cell, resolver) = ResultCell::pending();
        self.store.set(data.clone(), cell.clone());
        drop(guard);

        tracing::trace!(cache = name, cell = %cell.id(), ?data, "Registered new render");
        self.spawn_render(data, resolver, runtime);

        Attached {
            cell,
            originated: true,
        }
    }

    /// Spawns the render of `data` on `runtime`, resolving the cell of `resolver` once done.
    fn spawn_render(
        &self,
        data: R::RenderData,
        resolver: CellResolver<RenderOutcome<R::Image>>,
        runtime: &Handle,
    ) {
        let cell_id = resolver.id();

        // Removes the entry if the render goes away without resolving its cell.
        let abandoned_token = {
            let name = Arc::clone(&self.name);
            let store = Arc::clone(&self.store);
            let locks = Arc::clone(&self.locks);
            let data = data.clone();
            defer(move || {
                metric!(counter("render.computation.abandoned") += 1, "cache" => name.as_ref());
                tracing::warn!(cache = %name, cell = %cell_id, ?data, "Render abandoned");
                evict_entry::<_, R::Image, _>(&*store, &locks, &data, cell_id);
            })
        };

        let name = Arc::clone(&self.name);
        let renderer = Arc::clone(&self.renderer);
        let store = Arc::clone(&self.store);
        let locks = Arc::clone(&self.locks);
        let evict_failures = self.config.evict_failures;

        let render = async move {
            metric!(counter("render.computation") += 1, "cache" => name.as_ref());
            tracing::debug!(cache = %name, cell = %cell_id, ?data, "Rendering image");

            let start = Instant::now();
            let result = renderer.render_image(&data).await;
            metric!(timer("render.computation.duration") = start.elapsed(), "cache" => name.as_ref());

            let outcome = match result {
                Ok(image) => Ok(Arc::new(image)),
                Err(err) => {
                    let error = RenderError::computation_failed(format!("{data:?}"), err);
                    metric!(counter("render.computation.failed") += 1, "cache" => name.as_ref());
                    tracing::warn!(
                        error = &error as &dyn std::error::Error,
                        cache = %name,
                        cell = %cell_id,
                        "Render failed",
                    );
                    // Evict first, so observers woken up by the failure can retry right away.
                    if evict_failures {
                        evict_entry::<_, R::Image, _>(&*store, &locks, &data, cell_id);
                    }
                    Err(error)
                }
            };

            abandoned_token.disarm();
            if !resolver.resolve(outcome) {
                tracing::trace!(cache = %name, cell = %cell_id, "Render finished without observers");
            }
        };

        // NOTE: Renders are shared between requests, bind a fresh hub so that they do not
        // interfere with the scopes of whoever happened to trigger them.
        runtime.spawn(render.bind_hub(Hub::new_from_top(Hub::current())));
    }
}

/// Waits for the outcome of a render, converting an abandoned cell into a [`RenderError`].
async fn observe_outcome<I, K: fmt::Debug>(
    observation: Observation<RenderOutcome<I>>,
    data: &K,
) -> RenderOutcome<I> {
    match observation.await {
        Ok(outcome) => outcome,
        Err(_abandoned) => Err(RenderError::Abandoned {
            key: format!("{data:?}"),
        }),
    }
}

/// Removes the entry for `key` from `store`, but only if it still is the cell `cell_id`.
///
/// The entry might have been evicted and replaced by a newer render in the meantime, which must
/// not be affected.
fn evict_entry<K, I, S>(store: &S, locks: &KeyLocks, key: &K, cell_id: CellId)
where
    K: Hash,
    S: KeyedStore<K, RenderCell<I>> + ?Sized,
{
    let _guard = locks.lock(key);
    if store.get(key).is_some_and(|cell| cell.id() == cell_id) {
        store.remove(key);
    }
}
