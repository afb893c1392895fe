//! # Deduplicating render cache
//!
//! This crate provides a memoizing front-end to an expensive, asynchronous [`Renderer`]. Given
//! a stream of requests for the same render data, the [`RendererImageProvider`] renders the image
//! at most once and delivers the single result to every requester, whether it arrived before,
//! during or after the render.
//!
//! Every delivered [`RenderResult`] is tagged with `cache_hit`, telling the requester whether it
//! triggered the render itself, or was served from the cache.
//!
//! The building blocks are:
//!
//! - [`ResultCell`](cell::ResultCell): a write-once cell multicasting its value to any number of
//!   observers.
//! - [`KeyedStore`](store::KeyedStore): the store holding a cell per render data, with a bounded
//!   in-memory implementation in [`MemoryStore`](store::MemoryStore).
//! - [`RendererImageProvider`]: the coalescing logic deciding whether a request starts a new
//!   render or attaches to an existing one.
//!
//! ### Metrics
//!
//! The following metrics are collected, each of them tagged with a `cache` field that corresponds
//! to the name of the provider:
//!
//! - `render.access`: All requests.
//! - `render.memory.hit`: Requests attached to an existing render.
//! - `render.computation`: Renders actually being started.
//! - `render.computation.duration`: The time renders took.
//! - `render.computation.failed`: Renders that returned an error.
//! - `render.computation.abandoned`: Renders that went away without a result.
//! - `render.memory.evicted`: Entries evicted from the [`MemoryStore`](store::MemoryStore),
//!   tagged with the `cause` of the eviction.

#[macro_use]
pub mod metrics;

pub mod cell;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod renderer;
pub mod store;
pub mod types;
mod utils;

pub use error::RenderError;
pub use provider::RendererImageProvider;
pub use renderer::Renderer;
pub use types::{RenderData, RenderResult};
