use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

/// An error delivered to every observer of a failed render.
///
/// Errors are shared between all observers of the same computation, which is why the
/// underlying cause lives behind an [`Arc`] and the error itself is cheap to clone.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The [`Renderer`](crate::renderer::Renderer) returned an error for this render data.
    #[error("rendering {key} failed")]
    ComputationFailed {
        /// The `Debug` representation of the render data.
        key: String,
        /// The error reported by the renderer.
        #[source]
        cause: Arc<dyn Error + Send + Sync>,
    },
    /// The computation went away without ever producing a result.
    ///
    /// This happens if the rendering task panicked or its runtime was shut down.
    #[error("rendering {key} was abandoned before it completed")]
    Abandoned {
        /// The `Debug` representation of the render data.
        key: String,
    },
}

impl RenderError {
    pub(crate) fn computation_failed<E>(key: String, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::ComputationFailed {
            key,
            cause: Arc::new(cause),
        }
    }

    /// The render data this error belongs to.
    pub fn key(&self) -> &str {
        match self {
            Self::ComputationFailed { key, .. } => key,
            Self::Abandoned { key } => key,
        }
    }
}
