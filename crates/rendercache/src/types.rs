use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A descriptor of the image to render.
///
/// This is the key by which renders are deduplicated and cached. It is blanket-implemented for
/// every type that can be used as a key in the in-memory store.
pub trait RenderData: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> RenderData for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// A rendered image, tagged with whether it was served from the cache.
///
/// `cache_hit` is `false` only for the requester that triggered the computation, and only for
/// the first result it receives. Everybody attaching to an existing computation, whether it is
/// still running or already finished, gets `cache_hit = true`.
pub struct RenderResult<I> {
    /// The rendered image, shared by all requesters of the same render data.
    pub image: Arc<I>,
    /// Whether this requester did not trigger the computation itself.
    pub cache_hit: bool,
}

impl<I> RenderResult<I> {
    /// A freshly rendered image.
    pub fn fresh(image: Arc<I>) -> Self {
        Self {
            image,
            cache_hit: false,
        }
    }

    /// An image served from the cache.
    pub fn cached(image: Arc<I>) -> Self {
        Self {
            image,
            cache_hit: true,
        }
    }
}

impl<I> Clone for RenderResult<I> {
    fn clone(&self) -> Self {
        Self {
            image: Arc::clone(&self.image),
            cache_hit: self.cache_hit,
        }
    }
}

impl<I: fmt::Debug> fmt::Debug for RenderResult<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderResult")
            .field("image", &self.image)
            .field("cache_hit", &self.cache_hit)
            .finish()
    }
}

impl<I: PartialEq> PartialEq for RenderResult<I> {
    fn eq(&self, other: &Self) -> bool {
        self.cache_hit == other.cache_hit && self.image == other.image
    }
}
