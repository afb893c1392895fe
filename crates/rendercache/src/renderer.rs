use std::error::Error;

use futures::future::BoxFuture;

use crate::types::RenderData;

/// The expensive, asynchronous computation behind a
/// [`RendererImageProvider`](crate::provider::RendererImageProvider).
///
/// The provider guarantees that [`render_image`](Renderer::render_image) is invoked at most once
/// per render data for as long as the result stays in its store.
///
/// Renderers that cannot fail should use [`std::convert::Infallible`] as their error type.
pub trait Renderer: Send + Sync + 'static {
    /// The descriptor of the image to render.
    type RenderData: RenderData;

    /// The rendered artifact.
    type Image: Send + Sync + 'static;

    /// The error returned by a failed render.
    type Error: Error + Send + Sync + 'static;

    /// Invoked to render the image described by `data`.
    fn render_image<'a>(
        &'a self,
        data: &'a Self::RenderData,
    ) -> BoxFuture<'a, Result<Self::Image, Self::Error>>;
}
